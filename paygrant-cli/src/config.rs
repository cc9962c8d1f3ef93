//! Client configuration from a dotenv file

use paygrant_core::GrantConfig;
use paygrant_sdk::{parse_wallet_address, OpenPaymentsClient, OpenPaymentsError};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CLIENT_WALLET_ADDRESS: &str = "CLIENT_WALLET_ADDRESS";
pub const KEY_ID: &str = "KEY_ID";
pub const PRIVATE_KEY: &str = "PRIVATE_KEY";
pub const SENDING_WALLET_ADDRESS: &str = "SENDING_WALLET_ADDRESS";
pub const RECEIVING_WALLET_ADDRESS: &str = "RECEIVING_WALLET_ADDRESS";
pub const GRANT_POLL_DEADLINE_MS: &str = "GRANT_POLL_DEADLINE_MS";
pub const INTERACT_FINISH_URI: &str = "INTERACT_FINISH_URI";

#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required key is absent or empty
    #[error("Missing {0}")]
    Missing(&'static str),

    #[error("Invalid {key}: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("Failed to read {}: {source}", path.display())]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },
}

/// Everything needed to start a session without prompting
#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub client_wallet_address: String,
    pub key_id: String,
    /// Path to a PEM file, inline PEM, or base64 of a PEM
    pub private_key: String,
    pub sending_wallet_address: String,
    pub receiving_wallet_address: String,
    pub grant: GrantConfig,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("client_wallet_address", &self.client_wallet_address)
            .field("key_id", &self.key_id)
            .field("private_key", &"[REDACTED]")
            .field("sending_wallet_address", &self.sending_wallet_address)
            .field("receiving_wallet_address", &self.receiving_wallet_address)
            .field("grant", &self.grant)
            .finish()
    }
}

impl ClientConfig {
    /// Load from a dotenv file; the process environment is not consulted
    pub fn from_env_file(path: &Path) -> Result<Self, ConfigError> {
        let env_error = |source| ConfigError::EnvFile {
            path: path.to_path_buf(),
            source,
        };
        let vars = dotenvy::from_path_iter(path)
            .map_err(env_error)?
            .collect::<Result<HashMap<_, _>, _>>()
            .map_err(env_error)?;
        Self::from_vars(&vars)
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let required = |key: &'static str| {
            vars.get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or(ConfigError::Missing(key))
        };
        let wallet_address = |key: &'static str| {
            let value = required(key)?;
            parse_wallet_address(&value).ok_or_else(|| ConfigError::Invalid {
                key,
                message: format!("'{}' is not a wallet address", value),
            })
        };

        let mut grant = GrantConfig::default();
        if let Some(value) = vars.get(GRANT_POLL_DEADLINE_MS) {
            let millis = value.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
                key: GRANT_POLL_DEADLINE_MS,
                message: e.to_string(),
            })?;
            grant.poll_deadline = Duration::from_millis(millis);
        }
        if let Some(uri) = vars.get(INTERACT_FINISH_URI).filter(|v| !v.trim().is_empty()) {
            url::Url::parse(uri.trim()).map_err(|e| ConfigError::Invalid {
                key: INTERACT_FINISH_URI,
                message: e.to_string(),
            })?;
            grant.finish_uri = uri.trim().to_string();
        }

        Ok(Self {
            client_wallet_address: wallet_address(CLIENT_WALLET_ADDRESS)?,
            key_id: required(KEY_ID)?,
            private_key: required(PRIVATE_KEY)?,
            sending_wallet_address: wallet_address(SENDING_WALLET_ADDRESS)?,
            receiving_wallet_address: wallet_address(RECEIVING_WALLET_ADDRESS)?,
            grant,
        })
    }

    /// Signing client for the configured key
    pub fn build_client(&self) -> Result<OpenPaymentsClient, OpenPaymentsError> {
        OpenPaymentsClient::builder()
            .client_wallet_address(&self.client_wallet_address)
            .private_key(&self.key_id, &self.private_key)
            .build()
    }
}
