//! # Configuration
//!
//! Runtime configuration for processes embedding hearth-db.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     HEARTH_DB_PATH=/var/lib/hearth/hearth.db                           │
//! │     HEARTH_LOG=hearth_db=debug                                         │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/hearth/hearth.toml (Linux)                               │
//! │     ~/Library/Application Support/com.hearth.hearth/hearth.toml (macOS)│
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "/var/lib/hearth/hearth.db"
//! max_connections = 5
//! connect_timeout_secs = 30
//!
//! [logging]
//! filter = "info,hearth_db=debug"
//!
//! [tenant]
//! default_id = "00000000-0000-0000-0000-000000000001"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::pool::DbConfig;
use hearth_core::DEFAULT_TENANT_ID;

// =============================================================================
// Errors
// =============================================================================

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Sections
// =============================================================================

/// `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Defaults to the platform data dir.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

fn default_max_connections() -> u32 {
    5
}
fn default_min_connections() -> u32 {
    1
}
fn default_connect_timeout() -> u64 {
    30
}
fn default_run_migrations() -> bool {
    true
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            run_migrations: default_run_migrations(),
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// `tracing_subscriber::EnvFilter` directive.
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            filter: default_filter(),
        }
    }
}

/// `[tenant]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantSettings {
    /// Tenant used when a request carries none (single-property installs).
    #[serde(default = "default_tenant_id")]
    pub default_id: String,
}

fn default_tenant_id() -> String {
    DEFAULT_TENANT_ID.to_string()
}

impl Default for TenantSettings {
    fn default() -> Self {
        TenantSettings {
            default_id: default_tenant_id(),
        }
    }
}

// =============================================================================
// Hearth Configuration
// =============================================================================

/// Complete configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HearthConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub tenant: TenantSettings,
}

impl HearthConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (hearth.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> ConfigResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ConfigError::Invalid("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid(
                "database.min_connections must not exceed max_connections".into(),
            ));
        }
        if self.tenant.default_id.trim().is_empty() {
            return Err(ConfigError::Invalid("tenant.default_id is required".into()));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("HEARTH_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }

        if let Ok(max) = std::env::var("HEARTH_DB_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %max, "Ignoring invalid HEARTH_DB_MAX_CONNECTIONS"),
            }
        }

        if let Ok(filter) = std::env::var("HEARTH_LOG") {
            self.logging.filter = filter;
        }

        if let Ok(id) = std::env::var("HEARTH_TENANT_ID") {
            self.tenant.default_id = id;
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "hearth", "hearth")
            .map(|dirs| dirs.config_dir().join("hearth.toml"))
    }

    /// Returns the database path, falling back to the platform data dir.
    pub fn database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .or_else(|| {
                directories::ProjectDirs::from("com", "hearth", "hearth")
                    .map(|dirs| dirs.data_dir().join("hearth.db"))
            })
            .unwrap_or_else(|| PathBuf::from("hearth.db"))
    }

    /// Builds the pool configuration.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.database_path())
            .max_connections(self.database.max_connections)
            .min_connections(self.database.min_connections)
            .connect_timeout(Duration::from_secs(self.database.connect_timeout_secs))
            .run_migrations(self.database.run_migrations)
    }
}
