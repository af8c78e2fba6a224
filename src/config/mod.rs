//! Configuration loading.
//!
//! Keys match the coordinator's external interface (`API_BASE`, `ID`,
//! `IMAGE_SECONDS`, ...). Loaded once at startup from a TOML file; a missing
//! file is not an error; one is written out from `Config::default()` instead
//! so the operator has something to edit.

use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api_base: String,
    pub id: String,

    #[serde(default = "default_image_seconds")]
    pub image_seconds: u64,

    #[serde(default = "default_restart_hours")]
    pub restart_hours: u64,

    #[serde(default = "default_max_cache_mb")]
    pub max_cache_mb: u64,

    #[serde(default)]
    pub orientation: u16,

    #[serde(default)]
    pub auth_header: Option<String>,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub player: PlayerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub state_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub socket_path: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("/data/player/state"),
            cache_dir: PathBuf::from("/data/assets"),
            socket_path: PathBuf::from("/data/player/mpv.sock"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    pub binary: PathBuf,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("mpv"),
        }
    }
}

fn default_image_seconds() -> u64 {
    15
}

fn default_restart_hours() -> u64 {
    24
}

fn default_max_cache_mb() -> u64 {
    30_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            id: String::new(),
            image_seconds: default_image_seconds(),
            restart_hours: default_restart_hours(),
            max_cache_mb: default_max_cache_mb(),
            orientation: 0,
            auth_header: None,
            paths: PathsConfig::default(),
            player: PlayerConfig::default(),
        }
    }
}

impl Config {
    /// Load from the file named by `$CONFIG_FILE` (default `config.toml`).
    /// Writes out a default config on first run rather than failing, the
    /// way a kiosk device wants a file to exist for the operator to edit.
    pub fn load() -> AppResult<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());
        Self::load_from(&config_file)
    }

    pub fn load_from(config_file: &str) -> AppResult<Self> {
        let config = if std::path::Path::new(config_file).exists() {
            let contents = std::fs::read_to_string(config_file)?;
            toml::from_str(&contents)
                .map_err(|e| AppError::config(format!("invalid config file: {e}")))?
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)
                .map_err(|e| AppError::config(format!("failed to render default config: {e}")))?;
            std::fs::write(config_file, contents)?;
            default_config
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> AppResult<()> {
        if self.api_base.is_empty() {
            return Err(AppError::config("API_BASE is required"));
        }
        if self.id.is_empty() {
            return Err(AppError::config("ID is required"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_default_config_on_first_run_but_then_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let err = Config::load_from(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, AppError::Config { .. }));
        assert!(path.exists());
    }

    #[test]
    fn loads_existing_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "api_base = \"https://example.test\"\nid = \"dev-1\"\n").unwrap();
        let config = Config::load_from(path.to_str().unwrap()).unwrap();
        assert_eq!(config.api_base, "https://example.test");
        assert_eq!(config.id, "dev-1");
        assert_eq!(config.image_seconds, 15);
    }
}
