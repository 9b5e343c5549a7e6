//src/config.rs
use comfy_table::Color;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use strum::IntoEnumIterator;
use strum_macros::EnumIter;
use thiserror::Error;

const CONFIG_FILE_NAME: &str = "config.toml";
const APP_CONFIG_DIR: &str = "liftcycle";
const CONFIG_ENV_VAR: &str = "LIFTCYCLE_CONFIG_DIR"; // Environment variable name
const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine configuration directory.")]
    CannotDetermineConfigDir,
    #[error("I/O error accessing config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file (TOML): {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to serialize config data (TOML): {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Invalid color name: {0}")]
    InvalidColor(String),
    #[error("Invalid API URL '{0}': must start with http:// or https://")]
    InvalidApiUrl(String),
    #[error("Request timeout must be at least one second.")]
    InvalidTimeout,
}

/// Where plans and sessions of record are kept.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// The remote REST API
    #[default]
    Remote,
    /// A SQLite database in the data directory
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum StandardColor {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
    DarkGrey,
    Grey,
}

impl From<StandardColor> for Color {
    fn from(value: StandardColor) -> Self {
        match value {
            StandardColor::Black => Self::Black,
            StandardColor::Red => Self::Red,
            StandardColor::Green => Self::Green,
            StandardColor::Yellow => Self::Yellow,
            StandardColor::Blue => Self::Blue,
            StandardColor::Magenta => Self::Magenta,
            StandardColor::Cyan => Self::Cyan,
            StandardColor::White => Self::White,
            StandardColor::DarkGrey => Self::DarkGrey,
            StandardColor::Grey => Self::Grey,
        }
    }
}

/// Parses a colour name case-insensitively.
/// # Errors
/// Returns `ConfigError::InvalidColor` for unknown names.
pub fn parse_color(color_str: &str) -> Result<StandardColor, ConfigError> {
    StandardColor::iter()
        .find(|color| format!("{color:?}").eq_ignore_ascii_case(color_str))
        .ok_or_else(|| ConfigError::InvalidColor(color_str.to_string()))
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Theme {
    pub header_color: String,
    pub completed_color: String,
    pub skipped_color: String,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            header_color: "Green".to_string(),
            completed_color: "Green".to_string(),
            skipped_color: "DarkGrey".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)] // Ensure defaults are used if fields are missing
pub struct Config {
    pub backend: Backend,
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub theme: Theme,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: 15,
            theme: Theme::default(),
        }
    }
}

impl Config {
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// # Errors
    /// Returns `ConfigError::InvalidApiUrl` unless the URL is http(s).
    pub fn set_api_base_url(&mut self, url: &str) -> Result<(), ConfigError> {
        let trimmed = url.trim();
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            return Err(ConfigError::InvalidApiUrl(trimmed.to_string()));
        }
        self.api_base_url = trimmed.trim_end_matches('/').to_string();
        Ok(())
    }

    /// # Errors
    /// Returns `ConfigError::InvalidTimeout` for zero.
    pub fn set_request_timeout_secs(&mut self, secs: u64) -> Result<(), ConfigError> {
        if secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        self.request_timeout_secs = secs;
        Ok(())
    }
}

/// Determines the path to the configuration file.
/// # Errors
/// Returns `ConfigError` if no config directory can be found or created.
pub fn get_config_path() -> Result<PathBuf, ConfigError> {
    let config_dir_path = if let Ok(path_str) = std::env::var(CONFIG_ENV_VAR) {
        let path = PathBuf::from(path_str);
        if !path.is_dir() {
            tracing::warn!(
                "Environment variable {} points to '{}', which is not a directory. Trying to create it.",
                CONFIG_ENV_VAR,
                path.display()
            );
            fs::create_dir_all(&path)?;
        }
        path
    } else {
        let base_config_dir = dirs::config_dir().ok_or(ConfigError::CannotDetermineConfigDir)?;
        base_config_dir.join(APP_CONFIG_DIR)
    };

    if !config_dir_path.exists() {
        fs::create_dir_all(&config_dir_path)?;
    }

    Ok(config_dir_path.join(CONFIG_FILE_NAME))
}

/// Loads the configuration, writing defaults on first run.
/// # Errors
/// Returns `ConfigError` on I/O or TOML failures.
pub fn load(config_path: &Path) -> Result<Config, ConfigError> {
    if config_path.exists() {
        let config_content = fs::read_to_string(config_path)?;
        let config: Config = toml::from_str(&config_content)?;
        Ok(config)
    } else {
        let default_config = Config::default();
        save(config_path, &default_config)?;
        Ok(default_config)
    }
}

/// Saves the configuration to the TOML file.
/// # Errors
/// Returns `ConfigError` on I/O or TOML failures.
pub fn save(config_path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(parent_dir) = config_path.parent() {
        if !parent_dir.exists() {
            fs::create_dir_all(parent_dir)?;
        }
    }
    let config_content = toml::to_string_pretty(config)?;
    fs::write(config_path, config_content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: Config = toml::from_str("backend = \"local\"").unwrap();
        assert_eq!(config.backend, Backend::Local);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.theme, Theme::default());
    }

    #[test]
    fn load_writes_defaults_then_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = load(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config, Config::default());

        let mut changed = config;
        changed.set_api_base_url("https://fit.example.com/api/").unwrap();
        save(&path, &changed).unwrap();
        assert_eq!(load(&path).unwrap().api_base_url, "https://fit.example.com/api");
    }

    #[test]
    fn rejects_bad_values() {
        let mut config = Config::default();
        assert!(matches!(
            config.set_api_base_url("ftp://nope"),
            Err(ConfigError::InvalidApiUrl(_))
        ));
        assert!(matches!(
            config.set_request_timeout_secs(0),
            Err(ConfigError::InvalidTimeout)
        ));
        assert!(parse_color("darkgrey").is_ok());
        assert!(parse_color("chartreuse").is_err());
    }
}
