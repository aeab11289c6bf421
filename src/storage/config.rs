//! Export settings loaded from TOML.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::export::types::ExportFormat;

/// Export configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Directory exports are written to
    pub output_dir: PathBuf,
    /// SQLite activity database
    pub database_path: PathBuf,
    /// Application name recorded as the creator of exported files
    pub creator: String,
    /// Decimal places for CSV values; unset prints values exactly
    pub csv_float_precision: Option<usize>,
    /// Format used when none is given on the command line
    pub default_format: ExportFormat,
}

impl Default for ExportSettings {
    fn default() -> Self {
        let data_dir = get_data_dir();
        Self {
            output_dir: data_dir.join("exports"),
            database_path: data_dir.join("activities.db"),
            creator: format!("activity-export {}", env!("CARGO_PKG_VERSION")),
            csv_float_precision: None,
            default_format: ExportFormat::default(),
        }
    }
}

/// Get the application data directory.
pub fn get_data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "activity-export", "ActivityExport")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get the configuration file path.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("config.toml")
}

/// Load settings from the default location.
pub fn load_settings() -> Result<ExportSettings, ConfigError> {
    load_settings_from(&get_config_path())
}

/// Load settings from `path`; a missing file yields the defaults.
pub fn load_settings_from(path: &Path) -> Result<ExportSettings, ConfigError> {
    if !path.exists() {
        return Ok(ExportSettings::default());
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

    toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Save settings to the default location.
pub fn save_settings(settings: &ExportSettings) -> Result<(), ConfigError> {
    save_settings_to(settings, &get_config_path())
}

/// Save settings to `path`, creating parent directories.
pub fn save_settings_to(settings: &ExportSettings, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
    }

    let content =
        toml::to_string_pretty(settings).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

    Ok(())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}
