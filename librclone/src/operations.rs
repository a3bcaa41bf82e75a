//! Volume lifecycle operations offered to the CSI plugin.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use crate::command::CommandExecutor;
use crate::config::DaemonConfig;
use crate::error::RcloneError;
use crate::metadata::{MetadataStore, resolve_volume};
use crate::mount::Mounter;
use crate::rc::client::RcClient;
use crate::types::RcloneVolume;

/// Flag pointing one-shot rclone invocations at a config file.
const CONFIG_FLAG: &str = "config";

/// Volume lifecycle as seen by the CSI plugin.
#[async_trait]
pub trait Operations: Send + Sync {
    /// Create the directory `<remote_path>/<volume_name>` on `remote`.
    async fn create_volume(
        &self,
        volume_name: &str,
        remote: &str,
        remote_path: &str,
        config_path: &Path,
        parameters: &HashMap<String, String>,
    ) -> Result<(), RcloneError>;

    /// Purge the volume's directory on its remote.
    async fn delete_volume(
        &self,
        volume: &RcloneVolume,
        config_path: &Path,
        parameters: &HashMap<String, String>,
    ) -> Result<(), RcloneError>;

    /// Mount `volume` at `target_path` with the backend in `config_text`.
    async fn mount(
        &self,
        volume: &RcloneVolume,
        target_path: &Path,
        config_text: &str,
        read_only: bool,
        parameters: &HashMap<String, String>,
    ) -> Result<(), RcloneError>;

    /// Unmount `target_path` and drop the volume's daemon config.
    async fn unmount(&self, volume_id: &str, target_path: &Path) -> Result<(), RcloneError>;

    /// Rebuild a volume from cluster metadata.
    async fn get_volume_by_id(&self, volume_id: &str) -> Result<RcloneVolume, RcloneError>;
}

/// [`Operations`] backed by an rclone daemon and the rclone CLI.
#[derive(Clone)]
pub struct Rclone {
    mounter: Mounter,
    executor: CommandExecutor,
    metadata: Arc<dyn MetadataStore>,
}

impl Rclone {
    pub fn new(config: &DaemonConfig, metadata: Arc<dyn MetadataStore>) -> Result<Self, RcloneError> {
        let rc = RcClient::new(config.port, config.request_timeout)?;
        Ok(Self {
            mounter: Mounter::new(rc, config.cache_size.clone()),
            executor: CommandExecutor::new(&config.rclone_bin),
            metadata,
        })
    }

    pub fn mounter(&self) -> &Mounter {
        &self.mounter
    }
}

/// Caller parameters plus `--config`, as CLI flags.
fn cli_flags(parameters: &HashMap<String, String>, config_path: &Path) -> BTreeMap<String, String> {
    let mut flags: BTreeMap<String, String> = parameters
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    flags.insert(CONFIG_FLAG.to_owned(), config_path.to_string_lossy().into_owned());
    flags
}

#[async_trait]
impl Operations for Rclone {
    #[instrument(skip(self, parameters))]
    async fn create_volume(
        &self,
        volume_name: &str,
        remote: &str,
        remote_path: &str,
        config_path: &Path,
        parameters: &HashMap<String, String>,
    ) -> Result<(), RcloneError> {
        let path = format!("{remote_path}/{volume_name}");
        self.executor
            .run("mkdir", remote, &path, &cli_flags(parameters, config_path))
            .await
    }

    #[instrument(skip(self, parameters), fields(volume_id = %volume.id))]
    async fn delete_volume(
        &self,
        volume: &RcloneVolume,
        config_path: &Path,
        parameters: &HashMap<String, String>,
    ) -> Result<(), RcloneError> {
        self.executor
            .run(
                "purge",
                &volume.remote,
                &volume.remote_path,
                &cli_flags(parameters, config_path),
            )
            .await
    }

    async fn mount(
        &self,
        volume: &RcloneVolume,
        target_path: &Path,
        config_text: &str,
        read_only: bool,
        parameters: &HashMap<String, String>,
    ) -> Result<(), RcloneError> {
        self.mounter
            .mount(volume, target_path, config_text, read_only, parameters)
            .await
    }

    async fn unmount(&self, volume_id: &str, target_path: &Path) -> Result<(), RcloneError> {
        self.mounter.unmount(volume_id, target_path).await
    }

    async fn get_volume_by_id(&self, volume_id: &str) -> Result<RcloneVolume, RcloneError> {
        resolve_volume(self.metadata.as_ref(), volume_id).await
    }
}
