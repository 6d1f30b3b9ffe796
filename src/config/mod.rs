/// Configuration management for statsink
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::batcher::BatcherConfig;
use crate::cluster::Node;
use crate::pool::PoolConfig;

/// Main statsink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Cluster coordinator and credentials
    pub cluster: ClusterConfig,
    /// Connection pool sizing
    #[serde(default)]
    pub pool: PoolSettings,
    /// Batching and flush behavior
    #[serde(default)]
    pub writer: WriterSettings,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Cluster coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Coordinator hostname or address (required)
    pub host: String,
    /// Coordinator port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Username used for every cluster connection
    #[serde(default = "default_user")]
    pub user: String,
    /// Password used for every cluster connection
    #[serde(default)]
    pub password: String,
    /// Database holding the analytics and classifiers tables
    #[serde(default = "default_database")]
    pub database: String,
    /// Seconds between automatic node list refreshes
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_sec: u64,
}

/// Connection pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSettings {
    /// Maximum concurrently-live connections
    pub max_connections: usize,
    /// Seconds an idle connection survives before eviction
    pub idle_timeout_sec: u64,
}

/// Write batching settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterSettings {
    /// Milliseconds within which repeated flush calls coalesce
    pub flush_throttle_ms: u64,
    /// Dimension rows per INSERT statement
    pub dimension_batch: usize,
    /// Fact rows per INSERT statement
    pub fact_batch: usize,
    /// Seconds between seen-classifier cache resets
    pub seen_reset_interval_sec: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Log to stdout
    pub stdout: bool,
    /// Log file path (optional)
    pub file: Option<String>,
}

fn default_port() -> u16 {
    3306
}

fn default_user() -> String {
    "root".to_string()
}

fn default_database() -> String {
    "dashboard".to_string()
}

fn default_refresh_interval() -> u64 {
    60
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 5,
            idle_timeout_sec: 10,
        }
    }
}

impl Default for WriterSettings {
    fn default() -> Self {
        Self {
            flush_throttle_ms: 1000,
            dimension_batch: 64,
            fact_batch: 128,
            seen_reset_interval_sec: 300,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            stdout: true,
            file: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cluster: ClusterConfig {
                host: "127.0.0.1".to_string(),
                port: default_port(),
                user: default_user(),
                password: String::new(),
                database: default_database(),
                refresh_interval_sec: default_refresh_interval(),
            },
            pool: PoolSettings::default(),
            writer: WriterSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster.host.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "cluster host cannot be empty".to_string(),
            ));
        }

        if self.cluster.port == 0 {
            return Err(ConfigError::ValidationError(
                "cluster port must be greater than 0".to_string(),
            ));
        }

        // the database name is spliced into statements as an identifier, so
        // restrict it to characters that cannot break out of the backticks
        if self.cluster.database.is_empty()
            || !self
                .cluster
                .database
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ConfigError::ValidationError(format!(
                "invalid database name: {}",
                self.cluster.database
            )));
        }

        if self.cluster.refresh_interval_sec == 0 {
            return Err(ConfigError::ValidationError(
                "refresh_interval_sec must be greater than 0".to_string(),
            ));
        }

        if self.pool.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "max_connections must be greater than 0".to_string(),
            ));
        }

        if self.pool.idle_timeout_sec == 0 {
            return Err(ConfigError::ValidationError(
                "idle_timeout_sec must be greater than 0".to_string(),
            ));
        }

        if self.writer.dimension_batch == 0 || self.writer.fact_batch == 0 {
            return Err(ConfigError::ValidationError(
                "batch sizes must be greater than 0".to_string(),
            ));
        }

        if self.writer.seen_reset_interval_sec == 0 {
            return Err(ConfigError::ValidationError(
                "seen_reset_interval_sec must be greater than 0".to_string(),
            ));
        }

        match self.logging.level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {}",
                    self.logging.level
                )))
            }
        }

        Ok(())
    }

    /// The coordinator endpoint as a connectable node
    pub fn coordinator(&self) -> Node {
        Node {
            host: self.cluster.host.clone(),
            port: self.cluster.port,
            user: self.cluster.user.clone(),
            password: self.cluster.password.clone(),
        }
    }

    /// Pool knobs in the pool's own terms
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_connections: self.pool.max_connections,
            idle_timeout: Duration::from_secs(self.pool.idle_timeout_sec),
            refresh_interval: Duration::from_secs(self.cluster.refresh_interval_sec),
        }
    }

    /// Batcher knobs in the batcher's own terms
    pub fn batcher_config(&self) -> BatcherConfig {
        BatcherConfig {
            flush_throttle: Duration::from_millis(self.writer.flush_throttle_ms),
            dimension_batch: self.writer.dimension_batch,
            fact_batch: self.writer.fact_batch,
            seen_reset_interval: Duration::from_secs(self.writer.seen_reset_interval_sec),
        }
    }

    /// Create example configuration file
    pub fn create_example_config<P: AsRef<Path>>(path: P) -> Result<(), ConfigError> {
        let config = Config {
            cluster: ClusterConfig {
                host: "10.0.1.10".to_string(),
                port: 3306,
                user: "root".to_string(),
                password: String::new(),
                database: "dashboard".to_string(),
                refresh_interval_sec: 60,
            },
            ..Default::default()
        };

        config.save_to_file(path)
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
