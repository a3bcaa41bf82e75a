//! Supervision of the `rclone rcd` remote-control daemon.
//!
//! [`DaemonSupervisor::start`] launches the daemon in its own process group
//! and hands back the only [`DaemonHandle`] for it. Whoever owns the handle
//! decides when to [`wait`](DaemonHandle::wait) and when to
//! [`kill`](DaemonHandle::kill); nothing else reaches the process.
//!
//! The daemon's stdout and stderr share one pipe, drained line by line into
//! the `rclone` tracing target by a background thread that ends when the
//! pipe closes.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::os::fd::OwnedFd;
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::{Pid, pipe2};
use tempfile::NamedTempFile;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::config::DaemonConfig;
use crate::error::RcloneError;

/// How long directory listings stay fresh in the daemon's cache.
const CACHE_INFO_AGE: &str = "72h";
/// How often the daemon cleans its chunk cache.
const CACHE_CHUNK_CLEAN_INTERVAL: &str = "15m";

/// Launches the daemon from a [`DaemonConfig`].
#[derive(Debug, Clone)]
pub struct DaemonSupervisor {
    config: DaemonConfig,
}

impl DaemonSupervisor {
    pub fn new(config: DaemonConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    /// Arguments of `rclone rcd`, with `config_path` as the daemon's own
    /// config store.
    pub fn daemon_args(&self, config_path: &Path) -> Vec<String> {
        let mut args = vec![
            "rcd".to_owned(),
            format!("--rc-addr=localhost:{}", self.config.port),
            format!("--cache-info-age={CACHE_INFO_AGE}"),
            format!("--cache-chunk-clean-interval={CACHE_CHUNK_CLEAN_INTERVAL}"),
            "--rc-no-auth".to_owned(),
        ];
        if let Some(cache_dir) = &self.config.cache_dir {
            args.push(format!("--cache-dir={}", cache_dir.display()));
        }
        args.push(format!("--log-level={}", self.config.log_level));
        args.push(format!("--config={}", config_path.display()));
        args
    }

    /// Spawn the daemon.
    pub fn start(&self) -> Result<DaemonHandle, RcloneError> {
        // Backend configs arrive over the rc API; the daemon starts from an
        // empty private store that lives as long as the handle.
        let config_file = tempfile::Builder::new()
            .prefix("rclone")
            .suffix(".conf")
            .tempfile()?;
        let args = self.daemon_args(config_file.path());
        info!(
            cmd = %self.config.rclone_bin.display(),
            ?args,
            "running rclone remote control daemon"
        );

        let (reader, writer) = output_pipe()?;
        let child = {
            let stderr = writer.try_clone()?;
            let mut cmd = Command::new(&self.config.rclone_bin);
            cmd.args(&args)
                .stdin(Stdio::null())
                .stdout(Stdio::from(writer))
                .stderr(Stdio::from(stderr))
                .process_group(0);
            // `cmd` drops at the end of this block, closing our copies of the
            // write end so the drain sees EOF once the daemon exits.
            cmd.spawn()?
        };
        let pgid = child.id().map(|pid| Pid::from_raw(pid as i32));
        spawn_log_drain(reader)?;

        info!(pid = ?child.id(), "rclone daemon started");
        Ok(DaemonHandle {
            child,
            pgid,
            exit: None,
            config_file,
        })
    }
}

/// A pipe for a child's merged stdout and stderr. Both ends are close-on-exec
/// so children spawned concurrently do not inherit them.
pub(crate) fn output_pipe() -> std::io::Result<(OwnedFd, OwnedFd)> {
    Ok(pipe2(OFlag::O_CLOEXEC)?)
}

/// Forward each line written to `reader` to the log.
fn spawn_log_drain(reader: OwnedFd) -> Result<(), RcloneError> {
    std::thread::Builder::new()
        .name("rclone-log".to_owned())
        .spawn(move || {
            let mut reader = BufReader::new(File::from(reader));
            let mut line = Vec::new();
            loop {
                line.clear();
                match reader.read_until(b'\n', &mut line) {
                    Ok(0) => break,
                    Ok(_) => {
                        let text = String::from_utf8_lossy(&line);
                        info!(target: "rclone", "rclone log: {}", text.trim_end());
                    }
                    Err(e) => {
                        debug!(error = %e, "rclone log stream closed");
                        break;
                    }
                }
            }
        })?;
    Ok(())
}

/// Exclusive handle on a running daemon.
#[derive(Debug)]
pub struct DaemonHandle {
    child: Child,
    pgid: Option<Pid>,
    exit: Option<ExitStatus>,
    config_file: NamedTempFile,
}

impl DaemonHandle {
    /// OS process id, while the daemon has not been reaped.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Path of the daemon's private config store.
    pub fn config_path(&self) -> &Path {
        self.config_file.path()
    }

    /// Block until the daemon exits and return its status as is.
    pub async fn wait(&mut self) -> Result<ExitStatus, RcloneError> {
        if let Some(status) = self.exit {
            return Ok(status);
        }
        let status = self.child.wait().await?;
        self.exit = Some(status);
        Ok(status)
    }

    /// Kill the daemon's whole process group and reap it.
    ///
    /// Calling this after the daemon has exited, or twice, is a no-op.
    pub async fn kill(&mut self) -> Result<(), RcloneError> {
        info!("cleaning up background process");
        if self.exit.is_some() {
            return Ok(());
        }
        match self.pgid {
            Some(pgid) => match killpg(pgid, Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => return Err(RcloneError::daemon(format!("kill process group: {e}"))),
            },
            None => {
                if let Err(e) = self.child.start_kill() {
                    warn!(error = %e, "rclone daemon already gone");
                }
            }
        }
        let status = self.child.wait().await?;
        debug!(%status, "rclone daemon reaped");
        self.exit = Some(status);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn args_include_policy_flags() {
        let supervisor = DaemonSupervisor::new(DaemonConfig {
            port: 5573,
            cache_dir: Some(PathBuf::from("/var/cache/rclone")),
            log_level: "DEBUG".into(),
            ..Default::default()
        });
        let args = supervisor.daemon_args(Path::new("/tmp/rclone.conf"));
        assert_eq!(
            args,
            vec![
                "rcd",
                "--rc-addr=localhost:5573",
                "--cache-info-age=72h",
                "--cache-chunk-clean-interval=15m",
                "--rc-no-auth",
                "--cache-dir=/var/cache/rclone",
                "--log-level=DEBUG",
                "--config=/tmp/rclone.conf",
            ]
        );
    }

    #[test]
    fn output_pipe_is_close_on_exec() {
        use nix::fcntl::{FcntlArg, FdFlag, fcntl};
        use std::os::fd::AsRawFd;

        let (reader, writer) = output_pipe().unwrap();
        for fd in [&reader, &writer] {
            let bits = fcntl(fd.as_raw_fd(), FcntlArg::F_GETFD).unwrap();
            let flags = FdFlag::from_bits_truncate(bits);
            assert!(flags.contains(FdFlag::FD_CLOEXEC));
        }
    }

    #[test]
    fn cache_dir_is_optional() {
        let supervisor = DaemonSupervisor::new(DaemonConfig {
            log_level: "NOTICE".into(),
            ..Default::default()
        });
        let args = supervisor.daemon_args(Path::new("/tmp/c"));
        assert!(!args.iter().any(|a| a.starts_with("--cache-dir")));
        assert!(args.contains(&"--log-level=NOTICE".to_owned()));
    }
}
