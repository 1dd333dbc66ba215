//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! the backend URL, the last email used to sign in, and where tokens are kept.
//!
//! Configuration is stored at `~/.config/huecoapp/config.json`.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::auth::{FileTokenStorage, KeyringTokenStorage, TokenStore};

/// Application name used for config/data directory paths and the keychain service
const APP_NAME: &str = "huecoapp";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Backend used when neither the config nor the environment names one
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Environment variable overriding the configured backend URL
pub const BASE_URL_ENV: &str = "HUECO_API_URL";

/// Where the token pair is persisted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenBackend {
    #[default]
    File,
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub base_url: Option<String>,
    pub last_email: Option<String>,
    #[serde(default)]
    pub token_backend: TokenBackend,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
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

    /// Backend URL: `HUECO_API_URL`, then the config file, then the default.
    pub fn base_url(&self) -> String {
        self.resolve_base_url(std::env::var(BASE_URL_ENV).ok())
    }

    fn resolve_base_url(&self, env: Option<String>) -> String {
        env.filter(|url| !url.trim().is_empty())
            .or_else(|| self.base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Open the token store on the configured backend.
    pub fn open_token_store(&self) -> Result<TokenStore> {
        Ok(match self.token_backend {
            TokenBackend::File => TokenStore::open(FileTokenStorage::new(self.data_dir()?)),
            TokenBackend::Keyring => TokenStore::open(KeyringTokenStorage::new(APP_NAME)),
        })
    }
}
