//! Request and error bodies of the rclone remote-control API.
//!
//! See <https://rclone.org/rc/> for the endpoints and
//! <https://rclone.org/rc/#error-returns> for the error envelope.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::rc::options::{MountOpt, VfsOpt};

pub const CONFIG_CREATE: &str = "/config/create";
pub const CONFIG_DELETE: &str = "/config/delete";
pub const MOUNT_MOUNT: &str = "/mount/mount";
pub const MOUNT_UNMOUNT: &str = "/mount/unmount";

/// Body of `POST /config/create`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigCreateRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub storage_type: String,
    pub parameters: BTreeMap<String, String>,
    pub opt: ConfigCreateOpt,
}

/// `opt` of a config creation. With `obscure` set the daemon encodes
/// password-like parameters before storing them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigCreateOpt {
    pub obscure: bool,
}

/// Body of `POST /config/delete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDeleteRequest {
    pub name: String,
}

/// Body of `POST /mount/mount`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MountRequest {
    pub fs: String,
    pub mount_point: String,
    pub vfs_opt: VfsOpt,
    pub mount_opt: MountOpt,
}

/// Body of `POST /mount/unmount`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnmountRequest {
    pub mount_point: String,
}

/// Error envelope returned by the daemon on any non-2xx status.
///
/// The daemon also echoes the request parameters back as `input`, which may
/// include credentials in plain text. That field is dropped while parsing;
/// `Debug` and `Display` show it as [`Self::REDACTED`].
#[derive(Clone, Deserialize)]
pub struct ServerErrorResponse {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub path: String,
    /// Taken from the HTTP status line, not the body.
    #[serde(skip)]
    pub status: u16,
}

impl ServerErrorResponse {
    pub const REDACTED: &'static str = "<redacted>";

    pub(crate) fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }
}

impl fmt::Display for ServerErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{\"error\": {:?}, \"path\": {:?}, \"input\": {:?}, \"status\": {}}}",
            self.error,
            self.path,
            Self::REDACTED,
            self.status,
        )
    }
}

impl fmt::Debug for ServerErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerErrorResponse")
            .field("error", &self.error)
            .field("path", &self.path)
            .field("input", &Self::REDACTED)
            .field("status", &self.status)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn config_create_wire_format() {
        let req = ConfigCreateRequest {
            name: "rclone-mounter-vol-1".into(),
            storage_type: "s3".into(),
            parameters: BTreeMap::from([("access_key_id".into(), "AAA".into())]),
            opt: ConfigCreateOpt { obscure: true },
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({
                "name": "rclone-mounter-vol-1",
                "type": "s3",
                "parameters": {"access_key_id": "AAA"},
                "opt": {"obscure": true},
            })
        );
    }

    #[test]
    fn unmount_uses_camel_case() {
        let req = UnmountRequest {
            mount_point: "/mnt/a".into(),
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({"mountPoint": "/mnt/a"})
        );
    }

    #[test]
    fn envelope_never_prints_input() {
        let body = json!({
            "error": "failed to create",
            "path": "config/create",
            "input": {"parameters": {"secret_access_key": "hunter2"}},
            "status": 500,
        });
        let envelope: ServerErrorResponse = serde_json::from_value(body).unwrap();
        let envelope = envelope.with_status(500);

        let shown = envelope.to_string();
        assert_eq!(
            shown,
            r#"{"error": "failed to create", "path": "config/create", "input": "<redacted>", "status": 500}"#
        );
        assert!(!format!("{envelope:?}").contains("hunter2"));
    }
}
