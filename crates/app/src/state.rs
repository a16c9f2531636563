use std::time::Duration;
use std::{fs, path::PathBuf};

use common::blob::{BlobConfig, DEFAULT_TIMEOUT};
use serde::{Deserialize, Serialize};
use url::Url;

pub const APP_NAME: &str = "blobvault";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DEFAULT_REMOTE: &str = "http://localhost:8080";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the blob vault server
    #[serde(default = "default_remote")]
    pub remote: Url,
    /// Bound on every remote call, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Default log directive, overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Also write daily-rotated logs here when set
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_remote() -> Url {
    Url::parse(DEFAULT_REMOTE).expect("hardcoded URL must parse")
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            remote: default_remote(),
            timeout_secs: default_timeout_secs(),
            log_level: default_log_level(),
            log_dir: None,
        }
    }
}

impl AppConfig {
    pub fn blob_config(&self) -> BlobConfig {
        BlobConfig {
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the state directory (~/.blobvault)
    pub app_dir: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the state directory path (custom or default ~/.blobvault)
    pub fn app_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new state directory
    pub fn init(
        custom_path: Option<PathBuf>,
        config: Option<AppConfig>,
    ) -> Result<Self, StateError> {
        let app_dir = Self::app_dir(custom_path)?;
        let config_path = app_dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            return Err(StateError::AlreadyInitialized);
        }

        fs::create_dir_all(&app_dir)?;

        let config = config.unwrap_or_default();
        let config_toml = toml::to_string_pretty(&config)?;
        fs::write(&config_path, config_toml)?;

        Ok(Self {
            app_dir,
            config_path,
            config,
        })
    }

    /// Load existing state from the state directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let app_dir = Self::app_dir(custom_path)?;

        if !app_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let config_path = app_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&config_toml)?;

        Ok(Self {
            app_dir,
            config_path,
            config,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("blobvault directory not initialized. Run 'bvault init' first")]
    NotInitialized,

    #[error("blobvault directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_then_load() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("state");

        let config = AppConfig {
            remote: Url::parse("https://vault.example.com").unwrap(),
            timeout_secs: 3,
            ..AppConfig::default()
        };
        let state = AppState::init(Some(dir.clone()), Some(config.clone())).unwrap();
        assert!(state.config_path.exists());

        let loaded = AppState::load(Some(dir.clone())).unwrap();
        assert_eq!(loaded.config, config);
        assert_eq!(loaded.config.blob_config().timeout, Duration::from_secs(3));

        assert!(matches!(
            AppState::init(Some(dir), None),
            Err(StateError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_load_requires_init() {
        let temp = tempfile::tempdir().unwrap();
        assert!(matches!(
            AppState::load(Some(temp.path().join("missing"))),
            Err(StateError::NotInitialized)
        ));
        assert!(matches!(
            AppState::load(Some(temp.path().to_path_buf())),
            Err(StateError::MissingFile(_))
        ));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: AppConfig = toml::from_str("timeout_secs = 2").unwrap();
        assert_eq!(config.remote.as_str(), "http://localhost:8080/");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_dir, None);
    }
}
