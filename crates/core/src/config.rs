//! Shared configuration loader for vidfeed services
//!
//! Configuration is read from environment variables, optionally seeded from a
//! `.env` file via dotenvy. Service settings use the `VIDFEED_` prefix; the
//! upstream-facing settings keep their historical names (`YOUTUBE_API_KEYS`,
//! `SEARCH_QUERY`) so existing deployments keep working.
//!
//! # Example
//!
//! ```no_run
//! use vidfeed_core::config::{ConfigLoader, IngestionConfig, RedisConfig};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! vidfeed_core::config::load_dotenv();
//!
//! let redis = RedisConfig::from_env()?;
//! redis.validate()?;
//!
//! let ingestion = IngestionConfig::from_env()?;
//! ingestion.validate()?;
//! # Ok(())
//! # }
//! ```

use crate::error::VidfeedError;
use std::time::Duration;
use url::Url;

/// Configuration loader trait
///
/// Provides standardized methods for loading and validating configuration from
/// environment variables.
pub trait ConfigLoader: Sized {
    /// Load configuration from environment variables, applying defaults for
    /// optional values.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` if a required variable is missing or a
    /// value cannot be parsed.
    fn from_env() -> Result<Self, VidfeedError>;

    /// Validate configuration values
    fn validate(&self) -> Result<(), VidfeedError>;
}

/// Database configuration
///
/// # Environment Variables
///
/// - `VIDFEED_DATABASE_URL` or `DATABASE_URL` (required)
/// - `VIDFEED_DATABASE_MAX_CONNECTIONS` (default: 10)
/// - `VIDFEED_DATABASE_MIN_CONNECTIONS` (default: 1)
/// - `VIDFEED_DATABASE_CONNECT_TIMEOUT` seconds (default: 30)
/// - `VIDFEED_DATABASE_IDLE_TIMEOUT` seconds (default: 600)
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    pub min_connections: u32,
    /// Connection timeout duration
    pub connect_timeout: Duration,
    /// Idle connection timeout duration
    pub idle_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/vidfeed".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

impl ConfigLoader for DatabaseConfig {
    fn from_env() -> Result<Self, VidfeedError> {
        let url = std::env::var("VIDFEED_DATABASE_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .map_err(|_| {
                VidfeedError::config(
                    "DATABASE_URL or VIDFEED_DATABASE_URL must be set",
                    "VIDFEED_DATABASE_URL",
                )
            })?;

        let defaults = DatabaseConfig::default();
        let max_connections =
            parse_env_var("VIDFEED_DATABASE_MAX_CONNECTIONS", defaults.max_connections)?;
        let min_connections =
            parse_env_var("VIDFEED_DATABASE_MIN_CONNECTIONS", defaults.min_connections)?;
        let connect_timeout_secs = parse_env_var("VIDFEED_DATABASE_CONNECT_TIMEOUT", 30u64)?;
        let idle_timeout_secs = parse_env_var("VIDFEED_DATABASE_IDLE_TIMEOUT", 600u64)?;

        Ok(Self {
            url,
            max_connections,
            min_connections,
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            idle_timeout: Duration::from_secs(idle_timeout_secs),
        })
    }

    fn validate(&self) -> Result<(), VidfeedError> {
        Url::parse(&self.url).map_err(|e| {
            VidfeedError::config(
                format!("Invalid DATABASE_URL: {}", e),
                "VIDFEED_DATABASE_URL",
            )
        })?;

        if self.max_connections == 0 {
            return Err(VidfeedError::config(
                "max_connections must be greater than 0",
                "VIDFEED_DATABASE_MAX_CONNECTIONS",
            ));
        }

        if self.min_connections > self.max_connections {
            return Err(VidfeedError::config(
                format!(
                    "min_connections ({}) cannot exceed max_connections ({})",
                    self.min_connections, self.max_connections
                ),
                "VIDFEED_DATABASE_MIN_CONNECTIONS",
            ));
        }

        if self.connect_timeout.as_secs() == 0 {
            return Err(VidfeedError::config(
                "connect_timeout must be greater than 0 seconds",
                "VIDFEED_DATABASE_CONNECT_TIMEOUT",
            ));
        }

        Ok(())
    }
}

/// Redis configuration
///
/// Redis backs the quota ledger, fetch cursor, fetch lock and dead-letter list.
///
/// # Environment Variables
///
/// - `VIDFEED_REDIS_URL` or `REDIS_URL` (required)
/// - `VIDFEED_REDIS_KEY_PREFIX` (default: "youtube")
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,
    /// Namespace prepended to every coordination key
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379/0".to_string(),
            key_prefix: "youtube".to_string(),
        }
    }
}

impl ConfigLoader for RedisConfig {
    fn from_env() -> Result<Self, VidfeedError> {
        let url = std::env::var("VIDFEED_REDIS_URL")
            .or_else(|_| std::env::var("REDIS_URL"))
            .map_err(|_| {
                VidfeedError::config(
                    "REDIS_URL or VIDFEED_REDIS_URL must be set",
                    "VIDFEED_REDIS_URL",
                )
            })?;

        let key_prefix = std::env::var("VIDFEED_REDIS_KEY_PREFIX")
            .unwrap_or_else(|_| RedisConfig::default().key_prefix);

        Ok(Self { url, key_prefix })
    }

    fn validate(&self) -> Result<(), VidfeedError> {
        Url::parse(&self.url).map_err(|e| {
            VidfeedError::config(format!("Invalid REDIS_URL: {}", e), "VIDFEED_REDIS_URL")
        })?;

        if self.key_prefix.trim().is_empty() {
            return Err(VidfeedError::config(
                "key_prefix must not be empty",
                "VIDFEED_REDIS_KEY_PREFIX",
            ));
        }

        Ok(())
    }
}

/// HTTP service configuration
///
/// # Environment Variables
///
/// - `VIDFEED_SERVICE_HOST` or `HOST` (default: "0.0.0.0")
/// - `VIDFEED_SERVICE_PORT` or `PORT` (default: 8085)
/// - `VIDFEED_LOG_LEVEL` or `RUST_LOG` (default: "info")
/// - `VIDFEED_LOG_FORMAT` (default: "json")
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Service bind host
    pub host: String,
    /// Service bind port
    pub port: u16,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format ("json" or "pretty")
    pub log_format: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8085,
            log_level: "info".to_string(),
            log_format: "json".to_string(),
        }
    }
}

impl ConfigLoader for ServiceConfig {
    fn from_env() -> Result<Self, VidfeedError> {
        let defaults = ServiceConfig::default();

        let host = std::env::var("VIDFEED_SERVICE_HOST")
            .or_else(|_| std::env::var("HOST"))
            .unwrap_or(defaults.host);

        let port = match std::env::var("VIDFEED_SERVICE_PORT") {
            Ok(_) => parse_env_var("VIDFEED_SERVICE_PORT", defaults.port)?,
            Err(_) => parse_env_var("PORT", defaults.port)?,
        };

        let log_level = std::env::var("VIDFEED_LOG_LEVEL")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(defaults.log_level);

        let log_format = std::env::var("VIDFEED_LOG_FORMAT").unwrap_or(defaults.log_format);

        Ok(Self {
            host,
            port,
            log_level,
            log_format,
        })
    }

    fn validate(&self) -> Result<(), VidfeedError> {
        if self.port == 0 {
            return Err(VidfeedError::config(
                "port must be greater than 0",
                "VIDFEED_SERVICE_PORT",
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(VidfeedError::config(
                format!(
                    "Invalid log_format '{}'. Must be one of: {}",
                    self.log_format,
                    valid_formats.join(", ")
                ),
                "VIDFEED_LOG_FORMAT",
            ));
        }

        Ok(())
    }
}

/// Ingestion configuration
///
/// # Environment Variables
///
/// - `YOUTUBE_API_KEYS`: comma-separated API keys; blank entries are dropped
/// - `SEARCH_QUERY` (default: "how to tea")
/// - `YOUTUBE_API_BASE_URL` (default: "https://www.googleapis.com/youtube/v3")
/// - `VIDFEED_FETCH_INTERVAL_SECS` (default: 300)
/// - `VIDFEED_HTTP_TIMEOUT_SECS` (default: 30)
#[derive(Debug, Clone)]
pub struct IngestionConfig {
    /// Candidate API keys, tried in order
    pub api_keys: Vec<String>,
    /// Search term sent to the platform
    pub search_query: String,
    /// Base URL of the platform's data API
    pub api_base_url: String,
    /// Interval between scheduled runs
    pub fetch_interval: Duration,
    /// Per-request HTTP timeout
    pub http_timeout: Duration,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            search_query: "how to tea".to_string(),
            api_base_url: "https://www.googleapis.com/youtube/v3".to_string(),
            fetch_interval: Duration::from_secs(300),
            http_timeout: Duration::from_secs(30),
        }
    }
}

impl ConfigLoader for IngestionConfig {
    fn from_env() -> Result<Self, VidfeedError> {
        let defaults = IngestionConfig::default();

        let api_keys = parse_key_list(&std::env::var("YOUTUBE_API_KEYS").unwrap_or_default());

        let search_query = std::env::var("SEARCH_QUERY").unwrap_or(defaults.search_query);
        let api_base_url = std::env::var("YOUTUBE_API_BASE_URL").unwrap_or(defaults.api_base_url);
        let fetch_interval_secs = parse_env_var("VIDFEED_FETCH_INTERVAL_SECS", 300u64)?;
        let http_timeout_secs = parse_env_var("VIDFEED_HTTP_TIMEOUT_SECS", 30u64)?;

        Ok(Self {
            api_keys,
            search_query,
            api_base_url,
            fetch_interval: Duration::from_secs(fetch_interval_secs),
            http_timeout: Duration::from_secs(http_timeout_secs),
        })
    }

    fn validate(&self) -> Result<(), VidfeedError> {
        if self.search_query.trim().is_empty() {
            return Err(VidfeedError::config(
                "search query must not be empty",
                "SEARCH_QUERY",
            ));
        }

        Url::parse(&self.api_base_url).map_err(|e| {
            VidfeedError::config(
                format!("Invalid YOUTUBE_API_BASE_URL: {}", e),
                "YOUTUBE_API_BASE_URL",
            )
        })?;

        if self.fetch_interval.as_secs() == 0 {
            return Err(VidfeedError::config(
                "fetch interval must be greater than 0 seconds",
                "VIDFEED_FETCH_INTERVAL_SECS",
            ));
        }

        if self.http_timeout.as_secs() == 0 {
            return Err(VidfeedError::config(
                "http timeout must be greater than 0 seconds",
                "VIDFEED_HTTP_TIMEOUT_SECS",
            ));
        }

        // An empty key list is allowed: runs become no-ops that issue no HTTP calls.
        Ok(())
    }
}

/// Split a comma-separated key list, trimming whitespace and dropping blanks
pub fn parse_key_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// Parse an environment variable into `T`, falling back to `default` when unset
///
/// # Errors
///
/// Returns a `ConfigurationError` if the variable is set but cannot be parsed
pub fn parse_env_var<T>(key: &str, default: T) -> Result<T, VidfeedError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    std::env::var(key)
        .ok()
        .map(|v| {
            v.parse::<T>()
                .map_err(|e| VidfeedError::config(format!("Failed to parse {}: {}", key, e), key))
        })
        .unwrap_or(Ok(default))
}

/// Load a `.env` file if present
pub fn load_dotenv() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }
}
