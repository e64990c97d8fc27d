//! Error type shared by vidfeed crates

use thiserror::Error;

/// Top-level error for the shared building blocks
#[derive(Debug, Error)]
pub enum VidfeedError {
    #[error("Configuration error: {message}")]
    ConfigurationError {
        message: String,
        /// Environment variable or setting that caused the error
        key: Option<String>,
    },

    #[error("Database error: {message}")]
    DatabaseError {
        message: String,
        #[source]
        source: Option<sqlx::Error>,
    },

    #[error("Network error: {message}")]
    NetworkError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Validation error: {message}")]
    ValidationError {
        message: String,
        field: Option<String>,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl VidfeedError {
    /// Shorthand for a configuration error tied to a specific key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Shorthand for a validation error on a named field
    pub fn validation_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Whether retrying the failed operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError { .. } | Self::DatabaseError { .. }
        )
    }
}

impl From<sqlx::Error> for VidfeedError {
    fn from(err: sqlx::Error) -> Self {
        Self::DatabaseError {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let network = VidfeedError::NetworkError {
            message: "connection reset".to_string(),
            source: None,
        };
        assert!(network.is_retryable());

        let config = VidfeedError::config("missing", "YOUTUBE_API_KEYS");
        assert!(!config.is_retryable());

        let validation = VidfeedError::validation_field("bad sort", "sort");
        assert!(!validation.is_retryable());
    }

    #[test]
    fn test_display_includes_message() {
        let err = VidfeedError::config("REDIS_URL must be set", "REDIS_URL");
        assert_eq!(err.to_string(), "Configuration error: REDIS_URL must be set");
    }
}
