//! Mount and unmount volumes through the daemon.

use std::collections::HashMap;
use std::path::Path;

use tracing::{info, instrument};

use crate::error::RcloneError;
use crate::rc::client::RcClient;
use crate::rc::message::{MOUNT_MOUNT, MOUNT_UNMOUNT, MountRequest, UnmountRequest};
use crate::rc::options::{MOUNT_OPT_PARAM, MountOpt, VFS_OPT_PARAM, VfsOpt};
use crate::remote_config::RemoteConfigs;
use crate::types::{RcloneVolume, deployment_name};

/// Permissions of a target directory created by [`Mounter::mount`].
const TARGET_DIR_MODE: u32 = 0o750;

/// Drives `mount/mount` and `mount/unmount` together with the volume's
/// backend config.
#[derive(Debug, Clone)]
pub struct Mounter {
    rc: RcClient,
    configs: RemoteConfigs,
    cache_size: Option<String>,
}

impl Mounter {
    /// `cache_size` is forced onto every mount's `DiskSpaceTotalSize`.
    pub fn new(rc: RcClient, cache_size: Option<String>) -> Self {
        Self {
            configs: RemoteConfigs::new(rc.clone()),
            rc,
            cache_size,
        }
    }

    pub fn configs(&self) -> &RemoteConfigs {
        &self.configs
    }

    /// Build the `mount/mount` body for `volume`.
    ///
    /// `vfsOpt` and `mountOpt` in `parameters` hold the caller's JSON
    /// overrides.
    pub fn mount_request(
        &self,
        volume: &RcloneVolume,
        target_path: &Path,
        read_only: bool,
        parameters: &HashMap<String, String>,
    ) -> Result<MountRequest, RcloneError> {
        let vfs_opt = VfsOpt::build(
            parameters.get(VFS_OPT_PARAM).map(String::as_str),
            read_only,
            self.cache_size.as_deref(),
        )?;
        let mount_opt = MountOpt::build(parameters.get(MOUNT_OPT_PARAM).map(String::as_str))?;
        Ok(MountRequest {
            fs: format!("{}:{}", volume.deployment_name(), volume.remote_path),
            mount_point: target_path.to_string_lossy().into_owned(),
            vfs_opt,
            mount_opt,
        })
    }

    /// Mount `volume` at `target_path`.
    ///
    /// Registers `config_text` under the volume's deployment name, creates
    /// the target directory and asks the daemon to mount. A config created
    /// before a later step fails stays registered.
    #[instrument(skip(self, config_text, parameters), fields(volume_id = %volume.id))]
    pub async fn mount(
        &self,
        volume: &RcloneVolume,
        target_path: &Path,
        config_text: &str,
        read_only: bool,
        parameters: &HashMap<String, String>,
    ) -> Result<(), RcloneError> {
        const PHASE: &str = "mounting failed";

        // Option JSON is checked first so a typo does not leave a config behind.
        let request = self
            .mount_request(volume, target_path, read_only, parameters)
            .map_err(|e| e.context(PHASE))?;

        let config_name = volume.deployment_name();
        self.configs
            .ensure_config(&config_name, config_text)
            .await
            .map_err(|e| e.context("couldn't create config").context(PHASE))?;

        create_target_dir(target_path)
            .await
            .map_err(|e| e.context("couldn't create target directory").context(PHASE))?;

        info!(
            fs = %request.fs,
            mount_point = %request.mount_point,
            read_only,
            "executing mount command"
        );
        self.rc
            .post(MOUNT_MOUNT, &request)
            .await
            .map_err(|e| e.context("couldn't create mount").context(PHASE))?;
        info!(config_name, "created mount");
        Ok(())
    }

    /// Unmount `target_path` and drop the volume's config.
    ///
    /// Only the unmount itself can fail the call; config cleanup is
    /// best-effort.
    #[instrument(skip(self))]
    pub async fn unmount(&self, volume_id: &str, target_path: &Path) -> Result<(), RcloneError> {
        let config_name = deployment_name(volume_id);
        info!(config_name, "unmounting");

        let request = UnmountRequest {
            mount_point: target_path.to_string_lossy().into_owned(),
        };
        self.rc
            .post(MOUNT_UNMOUNT, &request)
            .await
            .map_err(|e| e.context("unmounting failed"))?;
        info!(volume_id, target_path = %target_path.display(), "deleted mount");

        self.configs.delete_config(&config_name).await;
        Ok(())
    }
}

/// Create `path` and its parents; an existing directory is fine.
async fn create_target_dir(path: &Path) -> Result<(), RcloneError> {
    tokio::fs::DirBuilder::new()
        .recursive(true)
        .mode(TARGET_DIR_MODE)
        .create(path)
        .await?;
    Ok(())
}
