//! Configuration file handling for ~/.config/rdmount/config.ini.
//!
//! The file is read once at startup and never written by this crate.
//! Settings structs live in [`super::settings`], constants in [`super::defaults`],
//! parsing in [`super::parser`].

use ini::Ini;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use super::defaults::*;
pub use super::settings::*;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// A required value is missing
    #[error("Missing configuration: {section}.{key} must be set in {path}")]
    Missing {
        section: String,
        key: String,
        path: String,
    },
}

impl ConfigFile {
    /// Load configuration from the default path (~/.config/rdmount/config.ini).
    pub fn load() -> Result<Self, ConfigFileError> {
        let path = config_file_path();
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path)?;
        super::parser::parse_ini(&ini)
    }

    /// Returns the API token, or an error naming where to set it.
    pub fn require_token(&self) -> Result<&str, ConfigFileError> {
        let token = self.remote.api_token.trim();
        if token.is_empty() {
            return Err(ConfigFileError::Missing {
                section: "remote".to_string(),
                key: "api_token".to_string(),
                path: config_file_path().display().to_string(),
            });
        }
        Ok(token)
    }
}

/// Get the path to the config directory (~/.config/rdmount).
pub fn config_directory() -> PathBuf {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rdmount")
}

/// Get the path to the config file (~/.config/rdmount/config.ini).
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}
