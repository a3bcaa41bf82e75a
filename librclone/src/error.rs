//! Error types for the rclone adapter.
//!
//! Every failure in `librclone` is an [`RcloneError`]. Variants follow the
//! adapter's failure taxonomy: config shape problems, transport problems,
//! daemon-reported errors, malformed daemon responses, the "volume not found"
//! sentinel and subprocess failures. Lifecycle operations wrap the underlying
//! error with the phase that failed via [`RcloneError::context`].

use std::process::ExitStatus;

use thiserror::Error;

use crate::rc::message::ServerErrorResponse;

/// Unified error type for adapter operations.
#[derive(Debug, Error)]
pub enum RcloneError {
    /// The volume handle does not match any persistent volume.
    #[error("volume {0} is not found")]
    VolumeNotFound(String),

    /// Caller-supplied connection config has the wrong shape.
    #[error("invalid connection config: {0}")]
    InvalidConfig(String),

    /// A caller-supplied argument or volume attribute is missing or invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The request body could not be serialized.
    #[error("couldn't create request body: {0}")]
    Encode(#[source] serde_json::Error),

    /// The daemon could not be reached.
    #[error("couldn't send HTTP request to {endpoint}: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The daemon answered with a well-formed error envelope.
    #[error("received error from the rclone server: {0}")]
    Server(ServerErrorResponse),

    // The three malformed-response variants never carry the body: the daemon
    // may echo back secrets from the request.
    #[error("could not read the error response body from the rclone server")]
    UnreadableErrorBody,

    #[error("could not unmarshal the error response from the rclone server")]
    MalformedErrorBody,

    #[error("unmarshalled the response from the server but it had nothing in the error field")]
    EmptyErrorField,

    /// The cluster metadata store failed.
    #[error("metadata store error: {0}")]
    Metadata(String),

    /// A one-shot rclone invocation failed.
    #[error(
        "{verb} failed: {reason} cmd: 'rclone' remote: '{remote}' remotePath: '{remote_path}' args: {args:?} output: {output:?}"
    )]
    Command {
        verb: String,
        reason: String,
        remote: String,
        remote_path: String,
        args: Vec<String>,
        output: String,
    },

    /// The supervised daemon could not be started or stopped.
    #[error("rclone daemon: {0}")]
    Daemon(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// An error annotated with the lifecycle phase that produced it.
    #[error("{phase}: {source}")]
    Phase {
        phase: String,
        #[source]
        source: Box<RcloneError>,
    },
}

impl RcloneError {
    /// Wrap `self` with the phase that failed, e.g. `"mounting failed"`.
    pub fn context(self, phase: impl Into<String>) -> Self {
        Self::Phase {
            phase: phase.into(),
            source: Box::new(self),
        }
    }

    /// Build a [`RcloneError::Metadata`] from anything displayable.
    pub fn metadata<E: std::fmt::Display>(e: E) -> Self {
        Self::Metadata(e.to_string())
    }

    /// Build a [`RcloneError::Daemon`] from anything displayable.
    pub fn daemon<E: std::fmt::Display>(e: E) -> Self {
        Self::Daemon(e.to_string())
    }

    /// `true` when this is the "volume not found" sentinel, at any depth of
    /// phase wrapping.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::VolumeNotFound(_) => true,
            Self::Phase { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// The innermost error, with all phase wrapping removed.
    pub fn root(&self) -> &RcloneError {
        match self {
            Self::Phase { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Describe an exit status the way the `Command` variant reports it.
pub(crate) fn exit_reason(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit status {code}"),
        None => status.to_string(),
    }
}
