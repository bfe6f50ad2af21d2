use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ShipperConfig;

const PROJECT_CONFIG: &str = "conf/settings.yaml";
const APP_DIR: &str = "techlog-shipper";

/// Configuration file handler
pub struct ConfigFile;

impl ConfigFile {
    /// Get list of config file locations in precedence order.
    /// Order: ./conf/settings.yaml > $XDG_CONFIG_HOME/techlog-shipper/settings.yaml
    pub fn get_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(PROJECT_CONFIG)];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join(APP_DIR).join("settings.yaml"));
        }
        paths
    }

    /// Find the first existing configuration file
    pub fn find_config_path() -> Option<PathBuf> {
        Self::get_config_paths().into_iter().find(|p| p.exists())
    }

    /// Load configuration with optional custom config file path
    pub fn load_with_custom_path(custom_path: Option<&Path>) -> Result<ShipperConfig> {
        let path = match custom_path {
            Some(path) => path.to_path_buf(),
            None => Self::find_config_path().ok_or_else(|| {
                anyhow!(
                    "no configuration file found; looked in {}",
                    Self::get_config_paths()
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })?,
        };
        Self::load_from_path(&path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<ShipperConfig> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = ShipperConfig::from_yaml_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }
}
