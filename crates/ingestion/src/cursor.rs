//! Fetch watermark
//!
//! Holds the `published_at` of the newest successfully persisted video. The
//! next run only asks for videos published at or after it.

use crate::store::{CoordinationStore, KeySpace};
use crate::Result;
use chrono::{DateTime, NaiveTime, SecondsFormat, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

/// Global fetch cursor backed by the coordination store
#[derive(Clone)]
pub struct FetchCursor {
    store: Arc<dyn CoordinationStore>,
    keys: KeySpace,
}

impl FetchCursor {
    pub fn new(store: Arc<dyn CoordinationStore>, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    /// Stored watermark, or 00:00:00Z of the current UTC day when unset
    pub async fn get(&self) -> Result<DateTime<Utc>> {
        let stored = self.store.get(&self.keys.last_fetch_time()).await?;

        let parsed = stored.as_deref().and_then(|raw| {
            match DateTime::parse_from_rfc3339(raw) {
                Ok(ts) => Some(ts.with_timezone(&Utc)),
                Err(e) => {
                    warn!(value = raw, error = %e, "Ignoring unparseable fetch cursor");
                    None
                }
            }
        });

        Ok(parsed.unwrap_or_else(|| start_of_day(Utc::now())))
    }

    /// Overwrite the watermark unconditionally
    pub async fn set(&self, ts: DateTime<Utc>) -> Result<()> {
        let value = format_timestamp(ts);
        self.store
            .set(&self.keys.last_fetch_time(), &value, None)
            .await?;
        debug!(cursor = %value, "Fetch cursor updated");
        Ok(())
    }

    /// Move the watermark to `candidate` only if it is newer than `current`
    ///
    /// Returns the watermark in effect afterwards.
    pub async fn advance(
        &self,
        current: DateTime<Utc>,
        candidate: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        if candidate > current {
            self.set(candidate).await?;
            Ok(candidate)
        } else {
            debug!(
                current = %format_timestamp(current),
                candidate = %format_timestamp(candidate),
                "Fetch cursor not advanced"
            );
            Ok(current)
        }
    }
}

/// Midnight UTC of the day containing `now`
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// ISO-8601 UTC with second precision and a `Z` suffix
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryCoordinationStore;
    use chrono::TimeZone;

    fn cursor() -> (FetchCursor, Arc<InMemoryCoordinationStore>) {
        let store = Arc::new(InMemoryCoordinationStore::new());
        (FetchCursor::new(store.clone(), KeySpace::default()), store)
    }

    #[test]
    fn test_start_of_day() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 17, 42, 9).unwrap();
        assert_eq!(
            start_of_day(now),
            Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_format_timestamp() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(format_timestamp(ts), "2024-01-02T03:04:05Z");
    }

    #[tokio::test]
    async fn test_default_is_start_of_current_day() {
        let (cursor, _) = cursor();
        let value = cursor.get().await.unwrap();
        assert_eq!(value, start_of_day(Utc::now()));
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let (cursor, _) = cursor();
        let ts = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

        cursor.set(ts).await.unwrap();
        assert_eq!(cursor.get().await.unwrap(), ts);
    }

    #[tokio::test]
    async fn test_set_is_unconditional() {
        let (cursor, _) = cursor();
        let later = Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

        cursor.set(later).await.unwrap();
        cursor.set(earlier).await.unwrap();
        assert_eq!(cursor.get().await.unwrap(), earlier);
    }

    #[tokio::test]
    async fn test_advance_never_regresses() {
        let (cursor, _) = cursor();
        let t1 = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        let t0 = Utc.with_ymd_and_hms(2024, 5, 31, 0, 0, 0).unwrap();

        let mut current = cursor.advance(t0, t1).await.unwrap();
        assert_eq!(current, t1);

        current = cursor.advance(current, t2).await.unwrap();
        assert_eq!(current, t2);

        current = cursor.advance(current, t1).await.unwrap();
        assert_eq!(current, t2);
        assert_eq!(cursor.get().await.unwrap(), t2);
    }

    #[tokio::test]
    async fn test_garbage_value_falls_back_to_day_start() {
        let (cursor, store) = cursor();
        store
            .set(&KeySpace::default().last_fetch_time(), "yesterday-ish", None)
            .await
            .unwrap();

        assert_eq!(cursor.get().await.unwrap(), start_of_day(Utc::now()));
    }
}
