//! One-shot rclone invocations for work that needs no daemon, such as
//! creating or purging a volume directory on the remote.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::daemon::output_pipe;
use crate::error::{RcloneError, exit_reason};

#[derive(Debug, Clone)]
pub struct CommandExecutor {
    rclone_bin: PathBuf,
}

impl CommandExecutor {
    pub fn new(rclone_bin: impl Into<PathBuf>) -> Self {
        Self {
            rclone_bin: rclone_bin.into(),
        }
    }

    /// Argument vector of `rclone <verb> <remote>:<path> --<k>=<v>...`.
    pub fn args(
        verb: &str,
        remote: &str,
        remote_path: &str,
        flags: &BTreeMap<String, String>,
    ) -> Vec<String> {
        let mut args = Vec::with_capacity(flags.len() + 2);
        args.push(verb.to_owned());
        args.push(format!("{remote}:{remote_path}"));
        args.extend(flags.iter().map(|(k, v)| format!("--{k}={v}")));
        args
    }

    /// Run `verb` against `remote:remote_path` and wait for it.
    ///
    /// stdout and stderr are captured together, interleaved as written, and
    /// returned in the error on a non-zero exit. The child is killed if the
    /// returned future is dropped.
    pub async fn run(
        &self,
        verb: &str,
        remote: &str,
        remote_path: &str,
        flags: &BTreeMap<String, String>,
    ) -> Result<(), RcloneError> {
        let args = Self::args(verb, remote, remote_path, flags);
        info!(verb, remote, remote_path, "executing rclone command");

        let fail = |reason: String, output: String| RcloneError::Command {
            verb: verb.to_owned(),
            reason,
            remote: remote.to_owned(),
            remote_path: remote_path.to_owned(),
            args: args.clone(),
            output,
        };

        let io_fail = |e: std::io::Error| fail(e.to_string(), String::new());

        let (reader, writer) = output_pipe().map_err(io_fail)?;
        let mut child = {
            let stderr = writer.try_clone().map_err(io_fail)?;
            let mut cmd = Command::new(&self.rclone_bin);
            cmd.args(&args)
                .stdin(Stdio::null())
                .stdout(Stdio::from(writer))
                .stderr(Stdio::from(stderr))
                .kill_on_drop(true);
            cmd.spawn().map_err(io_fail)?
        };

        // Both streams share one pipe, so the output keeps the order it was
        // written in.
        let mut output = tokio::fs::File::from_std(std::fs::File::from(reader));
        let mut buf = Vec::new();
        let (read, status) = tokio::join!(output.read_to_end(&mut buf), child.wait());
        let status = status.map_err(io_fail)?;
        if let Err(e) = read {
            debug!(verb, error = %e, "rclone output truncated");
        }

        let combined = String::from_utf8_lossy(&buf).into_owned();
        if !status.success() {
            return Err(fail(exit_reason(status), combined));
        }
        debug!(verb, output = %combined, "rclone command finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_follow_cli_layout() {
        let flags = BTreeMap::from([
            ("config".to_owned(), "/etc/rclone.conf".to_owned()),
            ("s3-provider".to_owned(), "Minio".to_owned()),
        ]);
        assert_eq!(
            CommandExecutor::args("mkdir", "s3", "bucket/vol", &flags),
            vec![
                "mkdir",
                "s3:bucket/vol",
                "--config=/etc/rclone.conf",
                "--s3-provider=Minio",
            ]
        );
    }

    #[tokio::test]
    async fn zero_exit_is_success() {
        let exec = CommandExecutor::new("true");
        exec.run("mkdir", "s3", "bucket", &BTreeMap::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn non_zero_exit_reports_everything() {
        let exec = CommandExecutor::new("false");
        let err = exec
            .run("purge", "s3", "bucket/vol", &BTreeMap::new())
            .await
            .unwrap_err();
        match err {
            RcloneError::Command {
                verb,
                reason,
                remote,
                remote_path,
                args,
                ..
            } => {
                assert_eq!(verb, "purge");
                assert_eq!(reason, "exit status 1");
                assert_eq!(remote, "s3");
                assert_eq!(remote_path, "bucket/vol");
                assert_eq!(args, vec!["purge", "s3:bucket/vol"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_binary_is_a_command_error() {
        let exec = CommandExecutor::new("/nonexistent/rclone");
        let err = exec
            .run("mkdir", "s3", "bucket", &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("mkdir failed:"));
    }
}
