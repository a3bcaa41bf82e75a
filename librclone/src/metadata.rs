//! Cluster metadata lookups used to rebuild a volume from its handle.
//!
//! The adapter only needs two reads from the cluster: list the persistent
//! volumes, and fetch a secret by reference. [`MetadataStore`] is that
//! capability; [`StaticMetadataStore`] is an in-memory implementation.
//!
//! A volume's remote location and backend parameters are gathered from three
//! sources, highest precedence first:
//!
//! 1. the CSI volume attributes of the persistent volume,
//! 2. the secret referenced by `nodePublishSecretRef`,
//! 3. the legacy secret named after the volume's claim.
//!
//! Older deployments kept their parameters in (3); it is optional.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::RcloneError;
use crate::types::RcloneVolume;

pub const REMOTE_KEY: &str = "remote";
pub const REMOTE_PATH_KEY: &str = "remotePath";
pub const REMOTE_PATH_SUFFIX_KEY: &str = "remotePathSuffix";

/// Namespaced object reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub namespace: String,
    pub name: String,
}

/// CSI source of a persistent volume.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsiVolumeSource {
    pub driver: String,
    pub volume_handle: String,
    #[serde(default)]
    pub volume_attributes: HashMap<String, String>,
    #[serde(default)]
    pub node_publish_secret_ref: Option<ObjectRef>,
}

/// The parts of a persistent volume the adapter reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentVolume {
    pub name: String,
    #[serde(default)]
    pub csi: Option<CsiVolumeSource>,
    #[serde(default)]
    pub claim_ref: Option<ObjectRef>,
}

/// A secret as stored by the cluster: values are base64 encoded.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Secret {
    #[serde(default)]
    pub data: HashMap<String, String>,
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<&String> = self.data.keys().collect();
        keys.sort();
        f.debug_struct("Secret").field("keys", &keys).finish()
    }
}

impl Secret {
    /// Build a secret from plain values, encoding them.
    pub fn from_plain<K, V>(values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: AsRef<[u8]>,
    {
        let data = values
            .into_iter()
            .map(|(k, v)| (k.into(), general_purpose::STANDARD.encode(v)))
            .collect();
        Self { data }
    }

    /// Decode every value. `origin` names the secret in errors; values never
    /// appear in them.
    pub fn decode(&self, origin: &ObjectRef) -> Result<HashMap<String, String>, RcloneError> {
        self.data
            .iter()
            .map(|(key, encoded)| {
                let bytes = general_purpose::STANDARD.decode(encoded).map_err(|_| {
                    RcloneError::Metadata(format!(
                        "secret {}/{} key {key}: value is not valid base64",
                        origin.namespace, origin.name
                    ))
                })?;
                let value = String::from_utf8(bytes).map_err(|_| {
                    RcloneError::Metadata(format!(
                        "secret {}/{} key {key}: value is not valid UTF-8",
                        origin.namespace, origin.name
                    ))
                })?;
                Ok((key.clone(), value))
            })
            .collect()
    }
}

/// Read access to cluster metadata.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Every persistent volume in the cluster.
    async fn list_volumes(&self) -> Result<Vec<PersistentVolume>, RcloneError>;

    /// The secret at `reference`, or `None` when it does not exist.
    async fn get_secret(&self, reference: &ObjectRef) -> Result<Option<Secret>, RcloneError>;
}

/// A fixed set of volumes and secrets held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticMetadataStore {
    volumes: Vec<PersistentVolume>,
    secrets: HashMap<ObjectRef, Secret>,
}

impl StaticMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_volume(mut self, volume: PersistentVolume) -> Self {
        self.volumes.push(volume);
        self
    }

    pub fn with_secret(mut self, reference: ObjectRef, secret: Secret) -> Self {
        self.secrets.insert(reference, secret);
        self
    }
}

#[async_trait]
impl MetadataStore for StaticMetadataStore {
    async fn list_volumes(&self) -> Result<Vec<PersistentVolume>, RcloneError> {
        Ok(self.volumes.clone())
    }

    async fn get_secret(&self, reference: &ObjectRef) -> Result<Option<Secret>, RcloneError> {
        Ok(self.secrets.get(reference).cloned())
    }
}

/// Remote location and backend parameters of a volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeFlags {
    pub remote: String,
    pub remote_path: String,
    /// Everything except the location keys.
    pub parameters: BTreeMap<String, String>,
}

/// Merge the three attribute sources and split off the location.
///
/// `remote` and `remotePath` are required. A `remotePathSuffix` is appended
/// to `remotePath`.
pub fn extract_flags(
    attributes: &HashMap<String, String>,
    secret: &HashMap<String, String>,
    legacy_secret: &HashMap<String, String>,
) -> Result<VolumeFlags, RcloneError> {
    let mut merged: BTreeMap<String, String> = BTreeMap::new();
    for source in [legacy_secret, secret, attributes] {
        merged.extend(source.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    let remote = merged.remove(REMOTE_KEY).ok_or_else(|| {
        RcloneError::InvalidArgument(format!("missing volume context value: {REMOTE_KEY}"))
    })?;
    let mut remote_path = merged.remove(REMOTE_PATH_KEY).ok_or_else(|| {
        RcloneError::InvalidArgument(format!("missing volume context value: {REMOTE_PATH_KEY}"))
    })?;
    if let Some(suffix) = merged.remove(REMOTE_PATH_SUFFIX_KEY) {
        remote_path.push_str(&suffix);
    }

    Ok(VolumeFlags {
        remote,
        remote_path,
        parameters: merged,
    })
}

/// Find the persistent volume with `volume_id` as its CSI handle and rebuild
/// its [`RcloneVolume`].
///
/// Returns [`RcloneError::VolumeNotFound`] when no volume matches. Missing
/// secrets are skipped; any other store failure is returned.
#[instrument(skip(store))]
pub async fn resolve_volume(
    store: &dyn MetadataStore,
    volume_id: &str,
) -> Result<RcloneVolume, RcloneError> {
    let volumes = store.list_volumes().await?;
    let Some((pv, csi)) = volumes.iter().find_map(|pv| {
        pv.csi
            .as_ref()
            .filter(|csi| csi.volume_handle == volume_id)
            .map(|csi| (pv, csi))
    }) else {
        return Err(RcloneError::VolumeNotFound(volume_id.to_owned()));
    };

    let secret = match &csi.node_publish_secret_ref {
        Some(reference) => read_secret(store, reference).await?,
        None => HashMap::new(),
    };
    // Deployments predating nodePublishSecretRef named the secret after the claim.
    let legacy_secret = match &pv.claim_ref {
        Some(claim) => read_secret(store, claim).await?,
        None => HashMap::new(),
    };

    let flags = extract_flags(&csi.volume_attributes, &secret, &legacy_secret)?;
    debug!(
        pv = %pv.name,
        remote = %flags.remote,
        remote_path = %flags.remote_path,
        "resolved volume"
    );
    Ok(RcloneVolume {
        remote: flags.remote,
        remote_path: flags.remote_path,
        id: volume_id.to_owned(),
    })
}

async fn read_secret(
    store: &dyn MetadataStore,
    reference: &ObjectRef,
) -> Result<HashMap<String, String>, RcloneError> {
    match store.get_secret(reference).await? {
        Some(secret) => secret.decode(reference),
        None => {
            debug!(namespace = %reference.namespace, name = %reference.name, "secret not found, skipping");
            Ok(HashMap::new())
        }
    }
}
