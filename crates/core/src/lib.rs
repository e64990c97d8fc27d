//! # vidfeed core
//!
//! Shared building blocks for the vidfeed services.
//!
//! ## Modules
//!
//! - `error`: the shared error type
//! - `config`: environment-driven configuration loading and validation
//! - `database`: PostgreSQL connection pool
//! - `observability`: tracing subscriber setup
//! - `pagination`: opaque-cursor pagination for list endpoints
//! - `retry`: bounded retry policies (fixed delay and exponential backoff)

pub mod config;
pub mod database;
pub mod error;
pub mod observability;
pub mod pagination;
pub mod retry;

pub use config::{
    load_dotenv, parse_key_list, ConfigLoader, DatabaseConfig, IngestionConfig, RedisConfig,
    ServiceConfig,
};
pub use database::{DatabasePool, PoolStats};
pub use error::VidfeedError;
pub use observability::{init_logging, LogConfig, LogFormat};
pub use pagination::{
    decode_cursor, encode_cursor, PageRequest, PaginatedResponse, DEFAULT_PAGE_SIZE,
    MAX_PAGE_SIZE,
};
pub use retry::{retry_with_backoff, Backoff, RetryPolicy};

/// Result type alias for vidfeed core operations
pub type Result<T> = std::result::Result<T, VidfeedError>;
