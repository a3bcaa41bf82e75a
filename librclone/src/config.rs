//! Adapter-wide settings shared by the supervisor and the control client.

use std::path::PathBuf;
use std::time::Duration;

/// Default port of the rclone remote-control API.
pub const DEFAULT_RC_PORT: u16 = 5572;

/// Daemon log level used when `LOG_LEVEL` is unset or empty.
pub const DEFAULT_LOG_LEVEL: &str = "NOTICE";

/// Environment variable that overrides the daemon's log level.
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

/// How the rclone daemon is launched and reached.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// rclone executable, resolved through `PATH` when relative.
    pub rclone_bin: PathBuf,
    /// Local port of the remote-control API.
    pub port: u16,
    /// VFS cache directory passed to the daemon.
    pub cache_dir: Option<PathBuf>,
    /// Upper bound forced onto every mount's `DiskSpaceTotalSize`.
    pub cache_size: Option<String>,
    /// Daemon `--log-level`.
    pub log_level: String,
    /// Bound on every control-API round-trip. `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            rclone_bin: PathBuf::from("rclone"),
            port: DEFAULT_RC_PORT,
            cache_dir: None,
            cache_size: None,
            log_level: log_level_from_env(),
            request_timeout: None,
        }
    }
}

/// Read the daemon log level from `LOG_LEVEL`.
pub fn log_level_from_env() -> String {
    resolve_log_level(std::env::var(LOG_LEVEL_ENV).ok().as_deref())
}

/// An empty or missing level falls back to [`DEFAULT_LOG_LEVEL`].
pub fn resolve_log_level(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(level) if !level.is_empty() => level.to_owned(),
        _ => DEFAULT_LOG_LEVEL.to_owned(),
    }
}
