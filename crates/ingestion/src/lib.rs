//! vidfeed ingestion pipeline
//!
//! Periodically pulls recent videos for a search term from the YouTube Data
//! API, deduplicates and persists them, and serves them back through a
//! filtered, sortable, cursor-paginated list endpoint.
//!
//! The moving parts, leaves first:
//!
//! - [`store`]: the shared coordination store every replica talks to
//! - [`quota`]: which API keys are temporarily quota-blocked
//! - [`cursor`]: the watermark bounding the next fetch window
//! - [`lock`]: the leased lock keeping runs from overlapping
//! - [`youtube`]: the search client with key rotation
//! - [`writer`]: field extraction and bulk insert-ignore-conflict
//! - [`dead_letter`]: where malformed items and failed runs end up
//! - [`pipeline`]: the per-run state machine, retry envelope and scheduler
//! - [`repository`] and [`api`]: the filtered, paginated list view

pub mod api;
pub mod cursor;
pub mod dead_letter;
pub mod lock;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod quota;
pub mod repository;
pub mod store;
pub mod writer;
pub mod youtube;

pub use cursor::FetchCursor;
pub use dead_letter::{DeadLetterEntry, DeadLetterSink, MockDeadLetterSink, RedisDeadLetterSink};
pub use lock::FetchLock;
pub use metrics::{IngestionMetrics, MetricsSnapshot};
pub use models::{SortField, SortOrder, VideoPage, VideoQuery, VideoRecord};
pub use pipeline::{
    IngestionPipeline, IngestionScheduler, RunOutcome, RunReport, RunState, RUN_RETRY_DELAY,
    RUN_RETRY_LIMIT,
};
pub use quota::QuotaLedger;
pub use repository::{MockVideoRepository, PostgresVideoRepository, VideoRepository};
pub use store::{CoordinationStore, InMemoryCoordinationStore, KeySpace, RedisCoordinationStore};
pub use writer::{PersistReport, VideoWriter};
pub use youtube::{ApiErrorReason, FetchOutcome, FetchStop, YouTubeClient};

/// Common error type for the ingestion pipeline
#[derive(Debug, thiserror::Error)]
pub enum IngestionError {
    /// Carries no request URL, which would include the API key
    #[error("HTTP request failed: {0}")]
    HttpError(reqwest::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Coordination store error: {0}")]
    StoreError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IngestionError {
    /// Whether a later attempt of the same run may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::HttpError(_)
                | Self::MalformedResponse(_)
                | Self::StoreError(_)
                | Self::DatabaseError(_)
        )
    }
}

impl From<reqwest::Error> for IngestionError {
    fn from(err: reqwest::Error) -> Self {
        Self::HttpError(err.without_url())
    }
}

impl From<redis::RedisError> for IngestionError {
    fn from(err: redis::RedisError) -> Self {
        Self::StoreError(err.to_string())
    }
}

impl From<sqlx::Error> for IngestionError {
    fn from(err: sqlx::Error) -> Self {
        Self::DatabaseError(err.to_string())
    }
}

impl From<vidfeed_core::VidfeedError> for IngestionError {
    fn from(err: vidfeed_core::VidfeedError) -> Self {
        match err {
            vidfeed_core::VidfeedError::ConfigurationError { message, .. } => {
                Self::ConfigError(message)
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestionError>;
pub type Error = IngestionError;
