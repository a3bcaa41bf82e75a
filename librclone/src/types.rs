//! Core data model: the volume view and its derived config name.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix of every rclone config created on behalf of a volume.
pub const CONFIG_NAME_PREFIX: &str = "rclone-mounter";

/// Kubernetes object names are DNS labels, so config names share their bound.
pub const MAX_NAME_LEN: usize = 63;

/// A volume as seen by the adapter.
///
/// Built per call, either from cluster metadata (see
/// [`crate::metadata::resolve_volume`]) or from a bare ID. `remote` and
/// `remote_path` are only empty for a bare-ID view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RcloneVolume {
    /// Backend name the volume lives on.
    pub remote: String,
    /// Path inside the backend.
    pub remote_path: String,
    /// CSI volume handle.
    pub id: String,
}

impl RcloneVolume {
    /// A volume known only by its handle, as on the unmount path.
    pub fn from_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Name of the daemon-side config backing this volume.
    pub fn deployment_name(&self) -> String {
        deployment_name(&self.id)
    }
}

impl fmt::Display for RcloneVolume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.remote, self.remote_path, self.id)
    }
}

/// Derive the config name for a volume handle.
///
/// The name is `rclone-mounter-<id>`, lowercased and then cut to
/// [`MAX_NAME_LEN`] characters. Two handles sharing their first 48
/// characters collide after truncation; callers are expected to keep handles
/// shorter than that.
pub fn deployment_name(volume_id: &str) -> String {
    // Lowercasing may expand a character, so it runs before the cut.
    let name = format!("{CONFIG_NAME_PREFIX}-{volume_id}").to_lowercase();
    name.chars().take(MAX_NAME_LEN).collect()
}
