use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use librclone::DaemonConfig;
use librclone::config::{DEFAULT_LOG_LEVEL, DEFAULT_RC_PORT, resolve_log_level};

#[derive(Parser, Debug)]
#[command(name = "rclone-csi")]
#[command(version, about = "rclone-backed volumes for rk8s", long_about = None)]
pub(crate) struct Cli {
    #[command(flatten)]
    pub(crate) daemon: DaemonArgs,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

/// Where the daemon lives and how it is launched.
#[derive(Args, Debug)]
pub(crate) struct DaemonArgs {
    /// rclone executable
    #[arg(long, global = true, env = "RCLONE_BIN", default_value = "rclone")]
    pub(crate) rclone_bin: PathBuf,

    /// Port of the daemon's remote-control API
    #[arg(long, global = true, env = "RCLONE_RC_PORT", default_value_t = DEFAULT_RC_PORT)]
    pub(crate) rc_port: u16,

    /// VFS cache directory of the daemon
    #[arg(long, global = true, env = "RCLONE_CACHE_DIR")]
    pub(crate) cache_dir: Option<PathBuf>,

    /// Cache size forced onto every mount, e.g. `10G`
    #[arg(long, global = true, env = "RCLONE_CACHE_SIZE")]
    pub(crate) cache_size: Option<String>,

    /// Daemon log level
    #[arg(long, global = true, env = "LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    pub(crate) log_level: String,

    /// Timeout of each remote-control request, in seconds
    #[arg(long, global = true, env = "RCLONE_RC_TIMEOUT_SECS")]
    pub(crate) rc_timeout_secs: Option<u64>,
}

impl DaemonArgs {
    pub(crate) fn to_config(&self) -> DaemonConfig {
        DaemonConfig {
            rclone_bin: self.rclone_bin.clone(),
            port: self.rc_port,
            cache_dir: self.cache_dir.clone(),
            cache_size: self.cache_size.clone().filter(|s| !s.trim().is_empty()),
            log_level: resolve_log_level(Some(&self.log_level)),
            request_timeout: self.rc_timeout_secs.map(Duration::from_secs),
        }
    }
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    #[command(about = "Run the rclone daemon until it exits or a stop signal arrives")]
    Run,
    #[command(about = "Mount a volume through a running daemon")]
    Mount {
        #[arg(long)]
        volume_id: String,
        /// Remote name as written in the config file section
        #[arg(long, default_value = "")]
        remote: String,
        #[arg(long)]
        remote_path: String,
        #[arg(long)]
        target: PathBuf,
        /// File holding exactly one rclone config section
        #[arg(long)]
        config_file: PathBuf,
        #[arg(long)]
        read_only: bool,
        /// Extra parameter such as `vfsOpt={"CacheMode":"full"}`, repeatable
        #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        params: Vec<(String, String)>,
    },
    #[command(about = "Unmount a volume through a running daemon")]
    Unmount {
        #[arg(long)]
        volume_id: String,
        #[arg(long)]
        target: PathBuf,
    },
    #[command(about = "Create <remote>:<remote-path>/<volume-name>")]
    Mkdir(VolumeCommand),
    #[command(about = "Remove <remote>:<remote-path> and everything below it")]
    Purge(VolumeCommand),
}

#[derive(Args, Debug)]
pub(crate) struct VolumeCommand {
    /// Volume directory name; unused by `purge`
    #[arg(long, default_value = "")]
    pub(crate) volume_name: String,
    #[arg(long)]
    pub(crate) remote: String,
    #[arg(long)]
    pub(crate) remote_path: String,
    /// rclone config file passed as `--config`
    #[arg(long)]
    pub(crate) config_path: PathBuf,
    /// Extra rclone flag without the leading dashes, repeatable
    #[arg(long = "flag", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub(crate) flags: Vec<(String, String)>,
}

impl VolumeCommand {
    pub(crate) fn flag_map(&self) -> HashMap<String, String> {
        self.flags.iter().cloned().collect()
    }
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no `=` found in `{s}`"))?;
    if key.is_empty() {
        return Err(format!("invalid KEY=VALUE: empty key in `{s}`"));
    }
    Ok((key.to_owned(), value.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_val_splits_on_first_equals() {
        assert_eq!(
            parse_key_val("vfsOpt={\"a\":\"b=c\"}").unwrap(),
            ("vfsOpt".to_owned(), "{\"a\":\"b=c\"}".to_owned())
        );
        assert!(parse_key_val("novalue").is_err());
        assert!(parse_key_val("=v").is_err());
    }

    #[test]
    fn mount_arguments_parse() {
        let cli = Cli::try_parse_from([
            "rclone-csi",
            "mount",
            "--volume-id",
            "vol-1",
            "--remote-path",
            "bucket",
            "--target",
            "/mnt/v",
            "--config-file",
            "/etc/v.conf",
            "--read-only",
            "--param",
            "mountOpt={}",
            "--rc-port",
            "6000",
        ])
        .unwrap();
        assert_eq!(cli.daemon.rc_port, 6000);
        match cli.command {
            Commands::Mount {
                volume_id,
                read_only,
                params,
                ..
            } => {
                assert_eq!(volume_id, "vol-1");
                assert!(read_only);
                assert_eq!(params, vec![("mountOpt".to_owned(), "{}".to_owned())]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn blank_cache_size_is_dropped() {
        let args = DaemonArgs {
            rclone_bin: PathBuf::from("rclone"),
            rc_port: DEFAULT_RC_PORT,
            cache_dir: None,
            cache_size: Some(" ".into()),
            log_level: String::new(),
            rc_timeout_secs: Some(5),
        };
        let config = args.to_config();
        assert!(config.cache_size.is_none());
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.request_timeout, Some(Duration::from_secs(5)));
    }
}
