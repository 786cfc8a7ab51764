/// Engine configuration.
/// Reads sync.json from ~/.config/modulo/sync.json (or platform equivalent).
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::types::DEFAULT_WORKSPACE_ID;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default = "default_max_title_length")]
    pub max_title_length: usize,
    #[serde(default = "default_max_tag_label_length")]
    pub max_tag_label_length: usize,
    #[serde(default = "default_column_icon")]
    pub default_column_icon: String,
    #[serde(default = "default_board_icon")]
    pub default_board_icon: String,
    #[serde(default = "default_workspace_id")]
    pub default_workspace_id: String,
    /// When false, transactions skip the trailing invalidation.
    #[serde(default = "default_settle_refresh")]
    pub settle_refresh: bool,
}

fn default_max_title_length() -> usize {
    200
}

fn default_max_tag_label_length() -> usize {
    100
}

fn default_column_icon() -> String {
    "Circle".to_string()
}

fn default_board_icon() -> String {
    "Folder".to_string()
}

fn default_workspace_id() -> String {
    DEFAULT_WORKSPACE_ID.to_string()
}

fn default_settle_refresh() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_title_length: default_max_title_length(),
            max_tag_label_length: default_max_tag_label_length(),
            default_column_icon: default_column_icon(),
            default_board_icon: default_board_icon(),
            default_workspace_id: default_workspace_id(),
            settle_refresh: default_settle_refresh(),
        }
    }
}

/// Default config path: ~/.config/modulo/sync.json
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("modulo")
        .join("sync.json")
}

/// Load config from path, surfacing unreadable or malformed files.
/// A missing file is not an error and yields defaults.
pub fn try_load_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(EngineConfig::default()),
        Err(e) => Err(e.into()),
    }
}

/// Load config from path. Returns default if file doesn't exist or can't be parsed.
pub fn load_config(path: &Path) -> EngineConfig {
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            log::warn!("Failed to parse config {}: {}", path.display(), e);
            EngineConfig::default()
        }),
        Err(_) => {
            log::info!("No config at {}, using defaults", path.display());
            EngineConfig::default()
        }
    }
}
