pub mod discovery_config;
pub mod session_config;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::config::discovery_config::DiscoveryConfig;
use crate::config::session_config::SessionConfig;
use crate::utils::ensure_directory_exists;

const APP_DIR_NAME: &str = "ble-buddy";
const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub discovery: DiscoveryConfig,
    pub session: SessionConfig,
    /// Default log filter; `RUST_LOG` takes precedence
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            discovery: DiscoveryConfig::default(),
            session: SessionConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// `<config_dir>/ble-buddy/config.json`
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("No configuration directory on this system")?;
        Ok(config_dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Loads the config from the default location.
    pub async fn load_config() -> Result<Self> {
        Self::load_from(&Self::default_path()?).await
    }

    /// Loads the config from `file_path`, falling back to defaults when it is missing.
    pub async fn load_from(file_path: &Path) -> Result<Self> {
        if !file_path.exists() {
            warn!("Config file not found at {:?}, using default.", file_path);
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(file_path).await?;
        let config: Self = serde_json::from_str(&config_json)?;

        info!("Config loaded from {:?}", file_path);
        Ok(config)
    }

    /// Saves the config to the default location.
    pub async fn save_config(&self) -> Result<()> {
        self.save_to(&Self::default_path()?).await
    }

    pub async fn save_to(&self, file_path: &Path) -> Result<()> {
        if let Some(parent) = file_path.parent() {
            ensure_directory_exists(parent).await?;
        }

        let config_json = match serde_json::to_string_pretty(&self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize config to JSON: {}", e);
                return Err(e.into());
            }
        };

        fs::write(file_path, config_json).await?;
        info!("Config saved to {:?}", file_path);
        Ok(())
    }
}
