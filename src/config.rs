//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::time::Duration;

use crate::codec::MasterKey;
use crate::repository::{SnapshotMode, SnapshotPolicy, DEFAULT_SNAPSHOT_FREQUENCY};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Events between snapshots
    pub snapshot_frequency: i64,

    pub snapshot_mode: SnapshotMode,

    /// Deadline for store calls when the caller gives none
    pub store_timeout: Duration,

    /// Enables payload encryption when set
    pub encryption_key: Option<MasterKey>,

    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = lookup("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|| "10".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS"))?;

        let host = lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string());

        let port = lookup("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("PORT"))?;

        let environment = lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string());

        let snapshot_frequency: i64 = lookup("SNAPSHOT_FREQUENCY")
            .map_or(Ok(DEFAULT_SNAPSHOT_FREQUENCY), |v| v.parse())
            .map_err(|_| ConfigError::InvalidValue("SNAPSHOT_FREQUENCY"))?;
        if snapshot_frequency <= 0 {
            return Err(ConfigError::InvalidValue("SNAPSHOT_FREQUENCY"));
        }

        let snapshot_mode = lookup("SNAPSHOT_MODE")
            .map_or(Ok(SnapshotMode::default()), |v| v.parse())
            .map_err(|_| ConfigError::InvalidValue("SNAPSHOT_MODE"))?;

        let store_timeout_ms: u64 = lookup("STORE_TIMEOUT_MS")
            .unwrap_or_else(|| "5000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("STORE_TIMEOUT_MS"))?;

        let encryption_key = lookup("EVENT_ENCRYPTION_KEY")
            .filter(|v| !v.trim().is_empty())
            .map(|v| MasterKey::from_hex(&v))
            .transpose()
            .map_err(|_| ConfigError::InvalidValue("EVENT_ENCRYPTION_KEY"))?;

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(_) => return Err(ConfigError::InvalidValue("LOG_FORMAT")),
        };

        let config = Self {
            database_url,
            database_max_connections,
            host,
            port,
            environment,
            snapshot_frequency,
            snapshot_mode,
            store_timeout: Duration::from_millis(store_timeout_ms),
            encryption_key,
            log_format,
        };

        if config.is_production() && config.encryption_key.is_none() {
            return Err(ConfigError::MissingEnv("EVENT_ENCRYPTION_KEY"));
        }

        Ok(config)
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn snapshot_policy(&self) -> SnapshotPolicy {
        SnapshotPolicy::new(self.snapshot_frequency, self.snapshot_mode)
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
