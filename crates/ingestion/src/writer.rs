//! Upsert/dedup writer
//!
//! Turns raw search items into stored videos. Items that cannot be mapped are
//! dead-lettered one by one; the rest go to the repository in a single
//! insert-ignore-conflict statement.

use crate::dead_letter::{DeadLetterEntry, DeadLetterSink};
use crate::models::NewVideo;
use crate::repository::VideoRepository;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What a persist call did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PersistReport {
    /// Rows newly stored
    pub inserted: u64,
    /// Valid items whose id was already stored or repeated in the batch
    pub skipped_duplicates: u64,
    /// Items that failed field extraction
    pub dead_lettered: u64,
    /// True when the bulk insert itself failed
    pub insert_failed: bool,
    /// Newest `published_at` among durably handled items; `None` when nothing
    /// survived or the insert failed
    pub latest_published_at: Option<DateTime<Utc>>,
}

pub struct VideoWriter {
    repository: Arc<dyn VideoRepository>,
    dead_letters: Arc<dyn DeadLetterSink>,
}

impl VideoWriter {
    pub fn new(repository: Arc<dyn VideoRepository>, dead_letters: Arc<dyn DeadLetterSink>) -> Self {
        Self {
            repository,
            dead_letters,
        }
    }

    /// Persist a batch of raw items; never fails
    pub async fn persist(&self, items: &[Value]) -> PersistReport {
        let mut report = PersistReport::default();
        let mut seen = HashSet::new();
        let mut videos = Vec::with_capacity(items.len());

        for item in items {
            match NewVideo::from_search_item(item) {
                Ok(video) => {
                    if seen.insert(video.video_id.clone()) {
                        videos.push(video);
                    } else {
                        report.skipped_duplicates += 1;
                    }
                }
                Err(reason) => {
                    warn!(reason = %reason, "Dead-lettering malformed search item");
                    self.dead_letters
                        .record(DeadLetterEntry::new(reason, json!({ "item": item })))
                        .await;
                    report.dead_lettered += 1;
                }
            }
        }

        if videos.is_empty() {
            debug!(
                dead_lettered = report.dead_lettered,
                "No valid items to persist"
            );
            return report;
        }

        match self.repository.insert_ignore_conflicts(&videos).await {
            Ok(inserted) => {
                report.inserted = inserted;
                report.skipped_duplicates += (videos.len() as u64).saturating_sub(inserted);
                report.latest_published_at = videos.iter().map(|v| v.published_at).max();

                info!(
                    inserted = report.inserted,
                    skipped_duplicates = report.skipped_duplicates,
                    dead_lettered = report.dead_lettered,
                    "Persisted search items"
                );
            }
            Err(e) => {
                error!(
                    error = %e,
                    batch_size = videos.len(),
                    "Bulk insert failed, cursor will not advance"
                );
                report.insert_failed = true;
            }
        }

        report
    }
}
