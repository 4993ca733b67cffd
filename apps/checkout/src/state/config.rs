//! # Checkout Configuration
//!
//! Stores application configuration loaded at startup.
//!
//! ## Configuration Sources (Priority Order)
//! 1. Environment variables (`LYS_*`)
//! 2. Config file (`checkout.toml`)
//! 3. Defaults (platform directories)
//!
//! ## Platform Defaults
//! - **macOS**: `~/Library/Application Support/com.lys.checkout/`
//! - **Windows**: `%APPDATA%\lys\checkout\`
//! - **Linux**: `~/.local/share/checkout/` (data), `~/.config/checkout/` (config)
//!
//! Configuration is read-only after initialization, so no mutex needed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use lys_db::DbConfig;

/// Environment override for the SQLite file.
pub const ENV_DATABASE_PATH: &str = "LYS_DATABASE_PATH";
/// Environment override for the client-state directory.
pub const ENV_STATE_DIR: &str = "LYS_STATE_DIR";
/// Environment override for the pool size.
pub const ENV_DB_MAX_CONNECTIONS: &str = "LYS_DB_MAX_CONNECTIONS";

const CONFIG_FILE_NAME: &str = "checkout.toml";
const DATABASE_FILE_NAME: &str = "lys.db";

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Checkout application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case", deny_unknown_fields)]
pub struct CheckoutConfig {
    /// SQLite database file.
    pub database_path: PathBuf,

    /// Directory for the persisted cart and attribution session.
    pub state_dir: PathBuf,

    /// Connection pool size.
    pub db_max_connections: u32,

    /// How long a write waits on SQLite's lock before failing as busy.
    pub db_busy_timeout_secs: u64,
}

impl Default for CheckoutConfig {
    /// Platform data directory, or the working directory when the platform
    /// has none.
    fn default() -> Self {
        let (data_dir, state_dir) = match project_dirs() {
            Some(dirs) => (
                dirs.data_dir().to_path_buf(),
                dirs.data_local_dir().join("state"),
            ),
            None => (PathBuf::from("."), PathBuf::from("./state")),
        };

        CheckoutConfig {
            database_path: data_dir.join(DATABASE_FILE_NAME),
            state_dir,
            db_max_connections: 5,
            db_busy_timeout_secs: 5,
        }
    }
}

impl CheckoutConfig {
    /// Loads configuration from `path` (or the platform config file when
    /// `None`), then applies `LYS_*` environment overrides and validates.
    ///
    /// A missing default config file is fine; a missing explicit one is not.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_file() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => CheckoutConfig::default(),
            },
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;

        info!(
            database = %config.database_path.display(),
            state_dir = %config.state_dir.display(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Parses a TOML config file. Keys left out keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "Reading config file");
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Applies environment overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_DATABASE_PATH) {
            self.database_path = PathBuf::from(path);
        }

        if let Some(dir) = lookup(ENV_STATE_DIR) {
            self.state_dir = PathBuf::from(dir);
        }

        if let Some(raw) = lookup(ENV_DB_MAX_CONNECTIONS) {
            self.db_max_connections = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: ENV_DB_MAX_CONNECTIONS.to_string(),
                value: raw.clone(),
            })?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database_path is empty".to_string()));
        }
        if self.state_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("state_dir is empty".to_string()));
        }
        if self.db_max_connections == 0 {
            return Err(ConfigError::Invalid(
                "db_max_connections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Pool settings for [`lys_db::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database_path)
            .max_connections(self.db_max_connections)
            .busy_timeout(Duration::from_secs(self.db_busy_timeout_secs))
    }

    pub fn cart_file(&self) -> PathBuf {
        self.state_dir.join("cart.json")
    }

    pub fn session_file(&self) -> PathBuf {
        self.state_dir.join("attribution.json")
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "lys", "checkout")
}

fn default_config_file() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}
