use crate::errors::{DownloaderError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Spotify API credentials
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiKeys {
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
}

/// Application configuration.
///
/// Constructed once at startup and passed into the orchestrator; there is no
/// ambient global instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub download_directory: PathBuf,
    pub max_workers: usize,
    pub api_keys: ApiKeys,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_directory: PathBuf::from("songs"),
            max_workers: 10,
            api_keys: ApiKeys::default(),
        }
    }
}

impl Config {
    /// Get the configuration directory path
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .ok_or_else(|| DownloaderError::Config("Could not find config directory".to_string()))
            .map(|dir| dir.join("playlist-dl"))
    }

    /// Get the settings file path (TOML format)
    pub fn settings_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("settings.toml"))
    }

    /// Get the JSON settings file path
    pub fn json_settings_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("settings.json"))
    }

    /// Load configuration from file (tries JSON first, then TOML).
    ///
    /// Writes a default settings file on first run.
    pub fn load() -> Result<Self> {
        if let Ok(json_path) = Self::json_settings_path() {
            if json_path.exists() {
                if let Ok(config) = Self::load_from_json(&json_path) {
                    return Ok(config);
                }
            }
        }

        let settings_path = Self::settings_path()?;

        if !settings_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&settings_path)
            .map_err(|e| DownloaderError::Config(format!("Failed to read settings file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| DownloaderError::Config(format!("Failed to parse settings file: {}", e)))
    }

    /// Load configuration from JSON file
    fn load_from_json(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DownloaderError::Config(format!("Failed to read JSON settings file: {}", e)))?;

        serde_json::from_str(&content)
            .map_err(|e| DownloaderError::Config(format!("Failed to parse JSON settings file: {}", e)))
    }

    /// Save configuration to file (saves both JSON and TOML)
    pub fn save(&self) -> Result<()> {
        let config_dir = Self::config_dir()?;
        std::fs::create_dir_all(&config_dir)
            .map_err(|e| DownloaderError::Config(format!("Failed to create config directory: {}", e)))?;

        let settings_path = Self::settings_path()?;
        let toml_content = toml::to_string_pretty(self)
            .map_err(|e| DownloaderError::Config(format!("Failed to serialize TOML settings: {}", e)))?;

        std::fs::write(&settings_path, toml_content)
            .map_err(|e| DownloaderError::Config(format!("Failed to write TOML settings file: {}", e)))?;

        let json_path = Self::json_settings_path()?;
        let json_content = serde_json::to_string_pretty(self)
            .map_err(|e| DownloaderError::Config(format!("Failed to serialize JSON settings: {}", e)))?;

        std::fs::write(&json_path, json_content)
            .map_err(|e| DownloaderError::Config(format!("Failed to write JSON settings file: {}", e)))?;

        Ok(())
    }

    /// Ensure download directory exists
    pub fn ensure_download_directory(&self) -> Result<()> {
        std::fs::create_dir_all(&self.download_directory)
            .map_err(|e| DownloaderError::Config(format!("Failed to create download directory: {}", e)))?;
        Ok(())
    }
}
