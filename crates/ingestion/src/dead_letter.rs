//! Dead-letter sink for unprocessable items and failed runs
//!
//! Recording never fails from the caller's point of view: a broken backend is
//! logged and the entry is lost.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{aio::ConnectionManager, AsyncCommands};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

/// One dead-lettered payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub error: String,
    pub context: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl DeadLetterEntry {
    pub fn new(error: impl Into<String>, context: serde_json::Value) -> Self {
        Self {
            error: error.into(),
            context,
            recorded_at: Utc::now(),
        }
    }
}

/// Append-only destination for dead-lettered payloads
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    /// Append an entry; failures are logged, never returned
    async fn record(&self, entry: DeadLetterEntry);

    /// Number of entries currently held
    async fn len(&self) -> u64;
}

/// Redis list-backed sink
pub struct RedisDeadLetterSink {
    conn: ConnectionManager,
    list_key: String,
}

impl RedisDeadLetterSink {
    pub fn new(conn: ConnectionManager, list_key: impl Into<String>) -> Self {
        Self {
            conn,
            list_key: list_key.into(),
        }
    }
}

#[async_trait]
impl DeadLetterSink for RedisDeadLetterSink {
    async fn record(&self, entry: DeadLetterEntry) {
        let payload = match serde_json::to_string(&entry) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "Failed to serialize dead-letter entry");
                return;
            }
        };

        let mut conn = self.conn.clone();
        match conn.rpush::<_, _, i64>(&self.list_key, payload).await {
            Ok(depth) => debug!(list = %self.list_key, depth, "Dead-lettered entry"),
            Err(e) => error!(
                list = %self.list_key,
                error = %e,
                entry_error = %entry.error,
                "Failed to write dead-letter entry"
            ),
        }
    }

    async fn len(&self) -> u64 {
        let mut conn = self.conn.clone();
        conn.llen(&self.list_key).await.unwrap_or(0)
    }
}

/// In-memory sink for testing and development
#[derive(Default)]
pub struct MockDeadLetterSink {
    entries: Arc<tokio::sync::Mutex<Vec<DeadLetterEntry>>>,
}

impl MockDeadLetterSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets all recorded entries (for testing)
    pub async fn entries(&self) -> Vec<DeadLetterEntry> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl DeadLetterSink for MockDeadLetterSink {
    async fn record(&self, entry: DeadLetterEntry) {
        debug!(error = %entry.error, "Dead-lettered entry (mock)");
        self.entries.lock().await.push(entry);
    }

    async fn len(&self) -> u64 {
        self.entries.lock().await.len() as u64
    }
}
