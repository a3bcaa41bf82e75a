//! VFS and mount option bags sent with `mount/mount`.
//!
//! Options are built in layers: adapter defaults, then the caller's JSON
//! override, then values the adapter always enforces. Every field is an
//! `Option` so a field the caller left out is told apart from one the caller
//! set to the default value, and unset fields are left out of the request so
//! the daemon applies its own defaults.
//!
//! Override keys match field names without regard to case, so `cacheMode`
//! sets `CacheMode`. A key naming no field is rejected.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RcloneError;

/// Volume parameter carrying the caller's VFS override JSON.
pub const VFS_OPT_PARAM: &str = "vfsOpt";
/// Volume parameter carrying the caller's mount override JSON.
pub const MOUNT_OPT_PARAM: &str = "mountOpt";

pub const DEFAULT_CACHE_MODE: &str = "writes";
pub const DEFAULT_DIR_CACHE_TIME: &str = "60s";

/// Copy every field set in `$top` over `$base`.
macro_rules! overlay_fields {
    ($base:ident, $top:ident, [$($field:ident),* $(,)?]) => {
        $(
            if let Some(value) = $top.$field {
                $base.$field = Some(value);
            }
        )*
    };
}

/// An option bag and the wire names of its fields.
pub trait OptionFields: Default + DeserializeOwned {
    const FIELDS: &'static [&'static str];
}

/// Options for the VFS layer of a mount.
///
/// `Daemon` is absent since rc calls reject it. `DiskSpaceTotalSize` is not a
/// global rclone option; the adapter always sets it from its own cache bound.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct VfsOpt {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_seek: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_checksum: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_mod_time: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir_cache_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub umask: Option<i32>,
    #[serde(rename = "UID", skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
    #[serde(rename = "GID", skip_serializing_if = "Option::is_none")]
    pub gid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir_perms: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_perms: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_size_limit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_max_age: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_max_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_min_free_space: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_poll_interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_insensitive: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_wait: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_wait: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_back: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_ahead: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_is_size: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fast_fingerprint: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_space_total_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_chunk_streams: Option<i32>,
}

impl OptionFields for VfsOpt {
    const FIELDS: &'static [&'static str] = &[
        "NoSeek",
        "NoChecksum",
        "ReadOnly",
        "NoModTime",
        "DirCacheTime",
        "Refresh",
        "PollInterval",
        "Umask",
        "UID",
        "GID",
        "DirPerms",
        "FilePerms",
        "ChunkSize",
        "ChunkSizeLimit",
        "CacheMode",
        "CacheMaxAge",
        "CacheMaxSize",
        "CacheMinFreeSpace",
        "CachePollInterval",
        "CaseInsensitive",
        "WriteWait",
        "ReadWait",
        "WriteBack",
        "ReadAhead",
        "UsedIsSize",
        "FastFingerprint",
        "DiskSpaceTotalSize",
        "ReadChunkStreams",
    ];
}

impl VfsOpt {
    /// Adapter defaults: write caching and a one minute directory cache.
    pub fn defaults() -> Self {
        Self {
            cache_mode: Some(DEFAULT_CACHE_MODE.to_owned()),
            dir_cache_time: Some(DEFAULT_DIR_CACHE_TIME.to_owned()),
            ..Default::default()
        }
    }

    /// Lay `top` over `self`; fields unset in `top` keep their value.
    pub fn overlay(self, top: VfsOpt) -> Self {
        let mut base = self;
        overlay_fields!(base, top, [
            no_seek,
            no_checksum,
            read_only,
            no_mod_time,
            dir_cache_time,
            refresh,
            poll_interval,
            umask,
            uid,
            gid,
            dir_perms,
            file_perms,
            chunk_size,
            chunk_size_limit,
            cache_mode,
            cache_max_age,
            cache_max_size,
            cache_min_free_space,
            cache_poll_interval,
            case_insensitive,
            write_wait,
            read_wait,
            write_back,
            read_ahead,
            used_is_size,
            fast_fingerprint,
            disk_space_total_size,
            read_chunk_streams,
        ]);
        base
    }

    /// Build the VFS options of a mount.
    ///
    /// `read_only` and `cache_size` always win over the override JSON.
    pub fn build(
        override_json: Option<&str>,
        read_only: bool,
        cache_size: Option<&str>,
    ) -> Result<Self, RcloneError> {
        let top = parse_override(override_json, VFS_OPT_PARAM)?;
        let mut opt = Self::defaults().overlay(top);
        opt.read_only = Some(read_only);
        opt.disk_space_total_size = cache_size
            .filter(|size| !size.is_empty())
            .map(str::to_owned);
        Ok(opt)
    }
}

/// Options for the FUSE mount itself. Options without Linux support are
/// omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct MountOpt {
    #[serde(rename = "DebugFUSE", skip_serializing_if = "Option::is_none")]
    pub debug_fuse: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_non_empty: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_root: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_other: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_permissions: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub writeback_cache: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daemon_wait: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_read_ahead: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_options: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_flags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attr_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_apple_double: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_apple_xattr: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub async_read: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_insensitive: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer_size: Option<String>,
}

impl OptionFields for MountOpt {
    const FIELDS: &'static [&'static str] = &[
        "DebugFUSE",
        "AllowNonEmpty",
        "AllowRoot",
        "AllowOther",
        "DefaultPermissions",
        "WritebackCache",
        "DaemonWait",
        "MaxReadAhead",
        "ExtraOptions",
        "ExtraFlags",
        "AttrTimeout",
        "DeviceName",
        "VolumeName",
        "NoAppleDouble",
        "NoAppleXattr",
        "AsyncRead",
        "CaseInsensitive",
        "BufferSize",
    ];
}

impl MountOpt {
    /// Adapter defaults: mount over non-empty directories and let other
    /// users (the pod's) access the mount.
    pub fn defaults() -> Self {
        Self {
            allow_non_empty: Some(true),
            allow_other: Some(true),
            ..Default::default()
        }
    }

    pub fn overlay(self, top: MountOpt) -> Self {
        let mut base = self;
        overlay_fields!(base, top, [
            debug_fuse,
            allow_non_empty,
            allow_root,
            allow_other,
            default_permissions,
            writeback_cache,
            daemon_wait,
            max_read_ahead,
            extra_options,
            extra_flags,
            attr_timeout,
            device_name,
            volume_name,
            no_apple_double,
            no_apple_xattr,
            async_read,
            case_insensitive,
            buffer_size,
        ]);
        base
    }

    /// Build the mount options from the defaults and the override JSON.
    pub fn build(override_json: Option<&str>) -> Result<Self, RcloneError> {
        let top = parse_override(override_json, MOUNT_OPT_PARAM)?;
        Ok(Self::defaults().overlay(top))
    }
}

/// Parse an override; an absent or empty string overrides nothing.
fn parse_override<T: OptionFields>(raw: Option<&str>, param: &str) -> Result<T, RcloneError> {
    let invalid = |e: serde_json::Error| {
        RcloneError::InvalidArgument(format!("could not parse {param}: {e}"))
    };
    let json = match raw.map(str::trim) {
        None | Some("") => return Ok(T::default()),
        Some(json) => json,
    };
    let value = match serde_json::from_str(json).map_err(invalid)? {
        Value::Object(map) => Value::Object(canonical_keys(map, T::FIELDS)),
        other => other,
    };
    serde_json::from_value(value).map_err(invalid)
}

/// Rename every key matching a field name case-insensitively to that name.
/// Other keys are kept as they are.
fn canonical_keys(map: Map<String, Value>, fields: &[&str]) -> Map<String, Value> {
    map.into_iter()
        .map(|(key, value)| {
            let key = match fields.iter().find(|f| f.eq_ignore_ascii_case(&key)) {
                Some(field) => (*field).to_owned(),
                None => key,
            };
            (key, value)
        })
        .collect()
}
