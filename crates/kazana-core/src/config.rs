//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! the API base URL, the last used username, where tokens are kept and the
//! clock-skew leeway applied to token expiry.
//!
//! Configuration is stored at `~/.config/kazana/config.json`. Environment
//! variables take precedence over the file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::client::DEFAULT_API_BASE_URL;
use crate::auth::{FileTokenStore, KeyringTokenStore, TokenStore};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "kazana";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const ENV_API_URL: &str = "KAZANA_API_URL";
pub const ENV_SESSION_PASSPHRASE: &str = "KAZANA_SESSION_PASSPHRASE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStorage {
    /// `session.json` in the cache directory
    #[default]
    File,
    /// OS keychain
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub last_username: Option<String>,
    #[serde(default)]
    pub token_storage: TokenStorage,
    /// Treat access tokens as expired this many seconds early
    #[serde(default)]
    pub expiry_leeway_secs: i64,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Base URL from the environment, then the config file, then the default
    pub fn api_base_url(&self) -> String {
        std::env::var(ENV_API_URL)
            .ok()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| self.api_base_url.clone())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
    }

    pub fn expiry_leeway(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.expiry_leeway_secs.max(0))
    }

    /// Open the configured token store
    pub fn open_token_store(&self) -> Result<Arc<dyn TokenStore>> {
        match self.token_storage {
            TokenStorage::Keyring => {
                debug!("Using OS keychain for tokens");
                Ok(Arc::new(KeyringTokenStore::new()))
            }
            TokenStorage::File => {
                let mut store = FileTokenStore::new(&self.cache_dir()?);
                if let Ok(passphrase) = std::env::var(ENV_SESSION_PASSPHRASE) {
                    if !passphrase.is_empty() {
                        store = store.with_passphrase(passphrase);
                    }
                }
                debug!(path = %store.path().display(), "Using session file for tokens");
                Ok(Arc::new(store))
            }
        }
    }
}
