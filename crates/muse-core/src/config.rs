use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform;

/// Environment override for the backend base URL. Takes precedence over the
/// config file so deployments can point the client without editing TOML.
pub const API_URL_ENV: &str = "MUSE_API_URL";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Backend base URL. Defaults to the local development target.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    #[serde(default = "default_volume")]
    pub default_volume: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// The persisted track collection. Defaults to `<data_dir>/library.json`.
    #[serde(default = "default_library_file")]
    pub library_file: PathBuf,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            default_volume: default_volume(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            library_file: default_library_file(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:5678".to_string()
}

fn default_volume() -> f32 {
    0.8
}

fn default_library_file() -> PathBuf {
    platform::data_dir().join("library.json")
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }

    /// Effective backend base URL: `MUSE_API_URL` when set, the config value
    /// otherwise.
    pub fn api_base_url(&self) -> String {
        std::env::var(API_URL_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| self.api.base_url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api.base_url, "http://127.0.0.1:5678");
        assert!((config.player.default_volume - 0.8).abs() < f32::EPSILON);
        assert!(config.paths.library_file.ends_with("muse/library.json"));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [api]
            base_url = "https://gen.example.com"
            "#,
        )
        .unwrap();
        assert_eq!(config.api.base_url, "https://gen.example.com");
        assert!((config.player.default_volume - 0.8).abs() < f32::EPSILON);
    }
}
