//! Ingestion run orchestration with bounded retry and scheduling
//!
//! A run moves through `Started -> LockCheck -> {Abandoned | Running}` and a
//! running attempt ends `Completed` or `Failed`. Failed attempts are
//! dead-lettered and retried from `LockCheck` until the retry policy gives up.

use crate::cursor::FetchCursor;
use crate::dead_letter::{DeadLetterEntry, DeadLetterSink};
use crate::lock::FetchLock;
use crate::metrics::IngestionMetrics;
use crate::quota::QuotaLedger;
use crate::repository::VideoRepository;
use crate::store::{CoordinationStore, KeySpace};
use crate::writer::{PersistReport, VideoWriter};
use crate::youtube::{FetchStop, YouTubeClient};
use crate::Result;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};
use vidfeed_core::RetryPolicy;

/// Retries after the first failed attempt
pub const RUN_RETRY_LIMIT: u32 = 5;

/// Fixed delay between attempts
pub const RUN_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Task name recorded with run-level dead-letter entries
pub const RUN_TASK_NAME: &str = "fetch_youtube_videos";

/// Per-run state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Started,
    LockCheck,
    Abandoned,
    Running,
    Completed,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::LockCheck => "lock_check",
            Self::Abandoned => "abandoned",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// What a completed run did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    /// Watermark the fetch window started from
    pub published_after: Option<DateTime<Utc>>,
    /// How key rotation ended
    pub stop: Option<FetchStop>,
    /// Raw items returned by the API
    pub fetched: usize,
    pub persist: PersistReport,
    /// Watermark after the run
    pub cursor: Option<DateTime<Utc>>,
}

/// Final result of a run including its retries
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(RunReport),
    /// Another run held the fetch lock
    Abandoned,
    /// Retry budget exhausted or a non-retryable error
    Failed { attempts: u32, error: String },
}

impl RunOutcome {
    pub fn state(&self) -> RunState {
        match self {
            Self::Completed(_) => RunState::Completed,
            Self::Abandoned => RunState::Abandoned,
            Self::Failed { .. } => RunState::Failed,
        }
    }
}

/// One ingestion job: lock, fetch, persist, advance
pub struct IngestionPipeline {
    store: Arc<dyn CoordinationStore>,
    keys: KeySpace,
    ledger: QuotaLedger,
    cursor: FetchCursor,
    client: YouTubeClient,
    writer: VideoWriter,
    dead_letters: Arc<dyn DeadLetterSink>,
    search_term: String,
    api_keys: Vec<String>,
    retry: RetryPolicy,
    metrics: IngestionMetrics,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        keys: KeySpace,
        client: YouTubeClient,
        repository: Arc<dyn VideoRepository>,
        dead_letters: Arc<dyn DeadLetterSink>,
        search_term: impl Into<String>,
        api_keys: Vec<String>,
    ) -> Self {
        Self {
            ledger: QuotaLedger::new(store.clone(), keys.clone()),
            cursor: FetchCursor::new(store.clone(), keys.clone()),
            writer: VideoWriter::new(repository, dead_letters.clone()),
            store,
            keys,
            client,
            dead_letters,
            search_term: search_term.into(),
            api_keys,
            retry: RetryPolicy::fixed(RUN_RETRY_LIMIT, RUN_RETRY_DELAY),
            metrics: IngestionMetrics::new(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Share a metrics handle, e.g. with the HTTP stats endpoint
    pub fn with_metrics(mut self, metrics: IngestionMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &IngestionMetrics {
        &self.metrics
    }

    fn enter(state: RunState) {
        debug!(state = state.as_str(), "Run state");
    }

    /// Single attempt; `Ok(None)` means the lock was held elsewhere
    #[instrument(skip(self), fields(search_term = %self.search_term))]
    pub async fn run_once(&self) -> Result<Option<RunReport>> {
        Self::enter(RunState::Started);
        Self::enter(RunState::LockCheck);

        let lock = FetchLock::new(self.store.clone(), self.keys.clone());
        if !lock.try_acquire().await? {
            Self::enter(RunState::Abandoned);
            info!("Another ingestion run is in progress, abandoning");
            return Ok(None);
        }

        Self::enter(RunState::Running);
        let result = self.execute().await;

        match lock.release().await {
            Ok(true) => {}
            Ok(false) => warn!("Fetch lock expired before release"),
            Err(e) => warn!(error = %e, "Failed to release fetch lock"),
        }

        Self::enter(if result.is_ok() {
            RunState::Completed
        } else {
            RunState::Failed
        });
        result.map(Some)
    }

    async fn execute(&self) -> Result<RunReport> {
        let published_after = self.cursor.get().await?;

        let outcome = self
            .client
            .fetch(
                &self.search_term,
                published_after,
                &self.api_keys,
                &self.ledger,
            )
            .await?;
        self.metrics.record_fetch(&outcome.stop);

        let persist = self.writer.persist(&outcome.items).await;
        self.metrics.record_persist(&persist);

        let cursor = match persist.latest_published_at {
            Some(latest) => self.cursor.advance(published_after, latest).await?,
            None => published_after,
        };

        info!(
            fetched = outcome.items.len(),
            inserted = persist.inserted,
            dead_lettered = persist.dead_lettered,
            cursor = %cursor,
            "Ingestion run completed"
        );

        Ok(RunReport {
            published_after: Some(published_after),
            stop: Some(outcome.stop),
            fetched: outcome.items.len(),
            persist,
            cursor: Some(cursor),
        })
    }

    /// Run with the retry envelope; every failed attempt is dead-lettered
    pub async fn run_with_retry(&self) -> RunOutcome {
        let mut retries = 0;

        let outcome = loop {
            let attempt = retries + 1;

            let err = match self.run_once().await {
                Ok(Some(report)) => break RunOutcome::Completed(report),
                Ok(None) => break RunOutcome::Abandoned,
                Err(e) => e,
            };

            self.metrics.record_failed_attempt();
            error!(attempt, error = %err, "Ingestion attempt failed");
            self.dead_letters
                .record(DeadLetterEntry::new(
                    err.to_string(),
                    json!({ "task": RUN_TASK_NAME, "attempt": attempt }),
                ))
                .await;

            if !err.is_retryable() || !self.retry.allows_retry(retries) {
                error!(
                    attempts = attempt,
                    error = %err,
                    "Ingestion run failed permanently"
                );
                break RunOutcome::Failed {
                    attempts: attempt,
                    error: err.to_string(),
                };
            }

            let delay = self.retry.delay_for(retries);
            info!(
                attempt,
                delay_secs = delay.as_secs(),
                "Retrying ingestion run"
            );
            sleep(delay).await;
            retries += 1;
        };

        self.metrics.record_outcome(&outcome);
        outcome
    }
}

/// Fires the pipeline on a fixed interval until shut down
pub struct IngestionScheduler {
    pipeline: Arc<IngestionPipeline>,
    period: Duration,
}

impl IngestionScheduler {
    pub fn new(pipeline: Arc<IngestionPipeline>, period: Duration) -> Self {
        Self { pipeline, period }
    }

    /// Run until `shutdown` flips to true or its sender is dropped
    ///
    /// A run already in progress is allowed to finish.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.period.as_secs(),
            "Starting ingestion scheduler"
        );

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let outcome = self.pipeline.run_with_retry().await;
                    debug!(state = outcome.state().as_str(), "Scheduled run finished");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Ingestion scheduler stopped");
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dead_letter::MockDeadLetterSink;
    use crate::repository::MockVideoRepository;
    use crate::store::InMemoryCoordinationStore;

    struct Harness {
        store: Arc<InMemoryCoordinationStore>,
        sink: Arc<MockDeadLetterSink>,
    }

    fn pipeline(base_url: &str, api_keys: Vec<String>) -> (IngestionPipeline, Harness) {
        let store = Arc::new(InMemoryCoordinationStore::new());
        let sink = Arc::new(MockDeadLetterSink::new());
        let client = YouTubeClient::new(base_url, Duration::from_millis(200)).unwrap();

        let pipeline = IngestionPipeline::new(
            store.clone(),
            KeySpace::default(),
            client,
            Arc::new(MockVideoRepository::new()),
            sink.clone(),
            "how to tea",
            api_keys,
        )
        .with_retry_policy(RetryPolicy::fixed(2, Duration::from_millis(1)));

        (pipeline, Harness { store, sink })
    }

    #[test]
    fn test_outcome_states() {
        assert_eq!(RunOutcome::Abandoned.state(), RunState::Abandoned);
        assert_eq!(
            RunOutcome::Completed(RunReport::default()).state(),
            RunState::Completed
        );
        assert_eq!(
            RunOutcome::Failed {
                attempts: 1,
                error: "x".to_string()
            }
            .state(),
            RunState::Failed
        );
    }

    #[test]
    fn test_default_retry_policy() {
        let (pipeline, _) = pipeline("http://127.0.0.1:9", vec![]);
        assert_eq!(pipeline.retry.max_retries, 2);

        let production = RetryPolicy::fixed(RUN_RETRY_LIMIT, RUN_RETRY_DELAY);
        assert_eq!(production.max_retries, 5);
        assert_eq!(production.delay_for(3), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_empty_key_list_completes_without_fetching() {
        let (pipeline, harness) = pipeline("http://127.0.0.1:9", vec![]);

        let outcome = pipeline.run_with_retry().await;

        match outcome {
            RunOutcome::Completed(report) => {
                assert_eq!(report.stop, Some(FetchStop::KeysExhausted));
                assert_eq!(report.fetched, 0);
                assert_eq!(report.cursor, report.published_after);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(harness.sink.len().await, 0);
        assert_eq!(pipeline.metrics().snapshot().runs_completed, 1);
    }

    #[tokio::test]
    async fn test_held_lock_abandons_without_dead_letter() {
        let (pipeline, harness) = pipeline("http://127.0.0.1:9", vec!["key".to_string()]);

        let other = FetchLock::new(harness.store.clone(), KeySpace::default());
        assert!(other.try_acquire().await.unwrap());

        assert_eq!(pipeline.run_with_retry().await, RunOutcome::Abandoned);
        assert_eq!(harness.sink.len().await, 0);
        assert_eq!(pipeline.metrics().snapshot().runs_abandoned, 1);
    }

    #[tokio::test]
    async fn test_transport_failure_retries_then_fails() {
        // Nothing listens on the discard port, so every request errors
        let (pipeline, harness) = pipeline("http://127.0.0.1:9", vec!["key".to_string()]);

        let outcome = pipeline.run_with_retry().await;

        match outcome {
            RunOutcome::Failed { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected outcome: {:?}", other),
        }

        let entries = harness.sink.entries().await;
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].context["task"], RUN_TASK_NAME);
        assert_eq!(entries[0].context["attempt"], 1);
        assert_eq!(entries[2].context["attempt"], 3);

        // A failed attempt must not leave the lock behind
        let lock = FetchLock::new(harness.store.clone(), KeySpace::default());
        assert!(lock.try_acquire().await.unwrap());

        let snapshot = pipeline.metrics().snapshot();
        assert_eq!(snapshot.failed_attempts, 3);
        assert_eq!(snapshot.runs_failed, 1);
    }

    #[tokio::test]
    async fn test_scheduler_stops_on_shutdown() {
        let (pipeline, _) = pipeline("http://127.0.0.1:9", vec![]);
        let pipeline = Arc::new(pipeline);
        let (tx, rx) = watch::channel(false);

        let handle =
            IngestionScheduler::new(pipeline.clone(), Duration::from_millis(10)).spawn(rx);

        tokio::time::sleep(Duration::from_millis(60)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();

        assert!(pipeline.metrics().snapshot().runs_completed >= 1);
    }
}
