//! Ingestion run metrics

use crate::pipeline::RunOutcome;
use crate::writer::PersistReport;
use crate::youtube::FetchStop;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// Ingestion metrics tracker
#[derive(Debug, Clone, Default)]
pub struct IngestionMetrics {
    runs_completed: Arc<AtomicU64>,
    runs_abandoned: Arc<AtomicU64>,
    runs_failed: Arc<AtomicU64>,
    failed_attempts: Arc<AtomicU64>,
    videos_inserted: Arc<AtomicU64>,
    duplicates_skipped: Arc<AtomicU64>,
    items_dead_lettered: Arc<AtomicU64>,
    api_errors: Arc<AtomicU64>,
    keys_exhausted: Arc<AtomicU64>,
    last_completed_at: Arc<AtomicI64>,
}

impl IngestionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one failed attempt that will be retried or give up
    pub fn record_failed_attempt(&self) {
        self.failed_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch(&self, stop: &FetchStop) {
        match stop {
            FetchStop::Succeeded { .. } => {}
            FetchStop::ApiError { .. } => {
                self.api_errors.fetch_add(1, Ordering::Relaxed);
            }
            FetchStop::KeysExhausted => {
                self.keys_exhausted.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn record_persist(&self, report: &PersistReport) {
        self.videos_inserted
            .fetch_add(report.inserted, Ordering::Relaxed);
        self.duplicates_skipped
            .fetch_add(report.skipped_duplicates, Ordering::Relaxed);
        self.items_dead_lettered
            .fetch_add(report.dead_lettered, Ordering::Relaxed);
    }

    /// Record how a whole run (including retries) ended
    pub fn record_outcome(&self, outcome: &RunOutcome) {
        match outcome {
            RunOutcome::Completed(_) => {
                self.runs_completed.fetch_add(1, Ordering::Relaxed);
                self.last_completed_at
                    .store(Utc::now().timestamp(), Ordering::Relaxed);
            }
            RunOutcome::Abandoned => {
                self.runs_abandoned.fetch_add(1, Ordering::Relaxed);
            }
            RunOutcome::Failed { .. } => {
                self.runs_failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let last = self.last_completed_at.load(Ordering::Relaxed);
        MetricsSnapshot {
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            runs_abandoned: self.runs_abandoned.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
            videos_inserted: self.videos_inserted.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
            items_dead_lettered: self.items_dead_lettered.load(Ordering::Relaxed),
            api_errors: self.api_errors.load(Ordering::Relaxed),
            keys_exhausted: self.keys_exhausted.load(Ordering::Relaxed),
            last_completed_at: (last > 0)
                .then(|| Utc.timestamp_opt(last, 0).single())
                .flatten(),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub runs_completed: u64,
    pub runs_abandoned: u64,
    pub runs_failed: u64,
    pub failed_attempts: u64,
    pub videos_inserted: u64,
    pub duplicates_skipped: u64,
    pub items_dead_lettered: u64,
    pub api_errors: u64,
    pub keys_exhausted: u64,
    pub last_completed_at: Option<DateTime<Utc>>,
}
