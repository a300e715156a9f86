//! Settings file support

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Deployment settings loaded from a TOML file
///
/// Searched next to the executable as `<service-name>.toml`, then under
/// the user configuration directory as `<service-name>/config.toml`.
/// Everything here is optional; a missing file yields the defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Log file path (empty = no file logging)
    #[serde(default)]
    pub log_file: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file: String::new(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| SettingsError::Io {
            path: path.as_ref().to_string_lossy().to_string(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| SettingsError::Parse {
            path: path.as_ref().to_string_lossy().to_string(),
            source: e,
        })
    }

    /// Load settings from the default locations, falling back to defaults
    /// when no file exists
    pub fn load_default(service_name: &str) -> Result<Self, SettingsError> {
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                let path = exe_dir.join(format!("{}.toml", service_name));
                if path.exists() {
                    return Self::load(&path);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let path = config_dir.join(service_name).join("config.toml");
            if path.exists() {
                return Self::load(&path);
            }
        }

        Ok(Self::default())
    }

    /// Save settings to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), SettingsError> {
        let content = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| SettingsError::Io {
                path: parent.to_string_lossy().to_string(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| SettingsError::Io {
            path: path.as_ref().to_string_lossy().to_string(),
            source: e,
        })
    }
}

/// Settings error types
#[derive(Error, Debug)]
pub enum SettingsError {
    /// IO error reading or writing the settings file
    #[error("failed to read settings file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Error parsing TOML
    #[error("failed to parse settings file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    /// Error serializing settings
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}
