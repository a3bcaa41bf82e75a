//! Per-volume backend configs held by the daemon.
//!
//! A volume's connection config arrives as rclone INI text with exactly one
//! backend section. It is registered with the daemon under the volume's
//! deployment name before mounting and removed again after unmounting.

use std::collections::BTreeMap;
use std::str::FromStr;

use ini::{Ini, ParseOption};
use tracing::{error, info, instrument};

use crate::error::RcloneError;
use crate::rc::client::RcClient;
use crate::rc::message::{
    CONFIG_CREATE, CONFIG_DELETE, ConfigCreateOpt, ConfigCreateRequest, ConfigDeleteRequest,
};

/// Section holding keys shared by every backend; never a backend itself.
const DEFAULT_SECTION: &str = "DEFAULT";

/// Key naming the backend type inside a section.
const TYPE_KEY: &str = "type";

/// The adapter owns token refresh; the daemon must not rewrite its config.
const CONFIG_REFRESH_TOKEN: &str = "config_refresh_token";

/// A parsed connection config: one backend definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Section name in the caller's text.
    pub section: String,
    /// rclone backend type, e.g. `s3`.
    pub storage_type: String,
    /// Every key of the section except `type`.
    pub parameters: BTreeMap<String, String>,
}

impl ConnectionConfig {
    /// Parse INI text holding exactly one named section with a `type` key.
    ///
    /// An explicit `[DEFAULT]` section is allowed and does not count.
    pub fn parse(text: &str) -> Result<Self, RcloneError> {
        let opt = ParseOption {
            enabled_escape: false,
            ..ParseOption::default()
        };
        // Only the position is reported: the text carries credentials.
        let ini = Ini::load_from_str_opt(text, opt).map_err(|e| {
            RcloneError::InvalidConfig(format!(
                "couldn't load config: syntax error at line {} column {}",
                e.line, e.col
            ))
        })?;

        let sections: Vec<_> = ini
            .iter()
            .filter_map(|(name, props)| name.map(|name| (name, props)))
            .filter(|(name, _)| *name != DEFAULT_SECTION)
            .collect();
        let [(name, props)] = sections.as_slice() else {
            let names: Vec<&str> = sections.iter().map(|(name, _)| *name).collect();
            return Err(RcloneError::InvalidConfig(format!(
                "expected only one config section, found {}: {names:?}",
                names.len()
            )));
        };

        let storage_type = props
            .get(TYPE_KEY)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                RcloneError::InvalidConfig(format!("section [{name}] has no `{TYPE_KEY}` key"))
            })?
            .to_owned();
        let parameters = props
            .iter()
            .filter(|(key, _)| *key != TYPE_KEY)
            .map(|(key, value)| (key.to_owned(), value.to_owned()))
            .collect();

        Ok(Self {
            section: (*name).to_owned(),
            storage_type,
            parameters,
        })
    }

    /// The `config/create` request registering this backend as `name`.
    pub fn create_request(&self, name: &str) -> ConfigCreateRequest {
        let mut parameters = self.parameters.clone();
        parameters.insert(CONFIG_REFRESH_TOKEN.to_owned(), "false".to_owned());
        ConfigCreateRequest {
            name: name.to_owned(),
            storage_type: self.storage_type.clone(),
            parameters,
            opt: ConfigCreateOpt { obscure: true },
        }
    }
}

impl FromStr for ConnectionConfig {
    type Err = RcloneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Creates and deletes daemon-side configs.
#[derive(Debug, Clone)]
pub struct RemoteConfigs {
    rc: RcClient,
}

impl RemoteConfigs {
    pub fn new(rc: RcClient) -> Self {
        Self { rc }
    }

    /// Register `config_text` with the daemon under `name`.
    ///
    /// Shape errors are returned before anything is sent.
    #[instrument(skip(self, config_text))]
    pub async fn ensure_config(&self, name: &str, config_text: &str) -> Result<(), RcloneError> {
        let config = ConnectionConfig::parse(config_text)?;
        let request = config.create_request(name);
        info!(
            name,
            storage_type = %request.storage_type,
            "executing create config command"
        );
        self.rc.post(CONFIG_CREATE, &request).await?;
        info!(name, "created config");
        Ok(())
    }

    /// Delete the config `name`, reporting failures.
    pub async fn try_delete_config(&self, name: &str) -> Result<(), RcloneError> {
        let request = ConfigDeleteRequest {
            name: name.to_owned(),
        };
        self.rc.post(CONFIG_DELETE, &request).await
    }

    /// Delete the config `name`, best-effort.
    ///
    /// A failure only leaves an orphaned entry in the daemon's config store,
    /// so it is logged and dropped. Returns whether the deletion succeeded.
    #[instrument(skip(self))]
    pub async fn delete_config(&self, name: &str) -> bool {
        match self.try_delete_config(name).await {
            Ok(()) => {
                info!(name, "deleted config");
                true
            }
            Err(e) => {
                error!(name, error = %e, "deleting config failed");
                false
            }
        }
    }
}
