//! rclone remote-control ("rc") API: wire types, option bags and client.

pub mod client;
pub mod message;
pub mod options;

pub use client::{RcClient, check_response, parse_error_body};
pub use message::{
    ConfigCreateOpt, ConfigCreateRequest, ConfigDeleteRequest, MountRequest, ServerErrorResponse,
    UnmountRequest,
};
pub use options::{MountOpt, VfsOpt};
