//! # librclone: rclone-backed volumes for RK8s
//!
//! `librclone` lets a CSI volume plugin serve remote-filesystem volumes by
//! delegating the mount work to an `rclone rcd` daemon running next to it.
//! Lifecycle calls become JSON requests against the daemon's remote-control
//! API; operations that need no daemon run rclone as a one-shot command.
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`daemon`] | Start, wait for and kill the `rclone rcd` process. |
//! | [`rc`] | Remote-control client, request bodies and option bags. |
//! | [`remote_config`] | Register and drop per-volume backend configs. |
//! | [`mount`] | Mount and unmount volumes through the daemon. |
//! | [`metadata`] | Cluster lookups rebuilding a volume from its handle. |
//! | [`command`] | One-shot `rclone <verb>` invocations. |
//! | [`operations`] | [`Operations`] trait tying the above together. |
//! | [`config`] | [`DaemonConfig`]: how the daemon is launched and reached. |
//! | [`types`] | [`RcloneVolume`] and deployment naming. |
//! | [`error`] | [`RcloneError`]. |

pub mod command;
pub mod config;
pub mod daemon;
pub mod error;
pub mod metadata;
pub mod mount;
pub mod operations;
pub mod rc;
pub mod remote_config;
pub mod types;

pub use config::DaemonConfig;
pub use daemon::{DaemonHandle, DaemonSupervisor};
pub use error::RcloneError;
pub use metadata::{MetadataStore, StaticMetadataStore};
pub use mount::Mounter;
pub use operations::{Operations, Rclone};
pub use types::{RcloneVolume, deployment_name};
