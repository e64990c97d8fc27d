//! Structured logging setup

use crate::error::VidfeedError;
use tracing_subscriber::{fmt, EnvFilter};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line, for log shippers
    Json,
    /// Human-readable output for local development
    Pretty,
}

impl LogFormat {
    /// Parse a format name, defaulting to JSON for anything unrecognised
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "pretty" => Self::Pretty,
            _ => Self::Json,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter directive, e.g. `info` or `vidfeed_ingestion=debug,info`
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

/// Install the global tracing subscriber
///
/// Must be called once per process, before any other component logs.
pub fn init_logging(config: &LogConfig) -> Result<(), VidfeedError> {
    let filter = EnvFilter::try_new(&config.level).map_err(|e| {
        VidfeedError::config(
            format!("Invalid log filter '{}': {}", config.level, e),
            "VIDFEED_LOG_LEVEL",
        )
    })?;

    let builder = fmt().with_env_filter(filter).with_target(true);

    let result = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };

    result.map_err(|e| VidfeedError::Internal {
        message: format!("Failed to install tracing subscriber: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("PRETTY"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("anything"), LogFormat::Json);
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let config = LogConfig {
            level: "vidfeed=notalevel".to_string(),
            format: LogFormat::Json,
        };
        assert!(matches!(
            init_logging(&config),
            Err(VidfeedError::ConfigurationError { .. })
        ));
    }
}
