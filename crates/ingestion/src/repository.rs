//! Video repository for database persistence

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering as AtomicOrdering};
use tokio::sync::Mutex;
use tracing::debug;
use vidfeed_core::PaginatedResponse;

use crate::models::{
    ListedVideo, NewVideo, SortField, SortOrder, VideoCursor, VideoPage, VideoQuery, VideoRecord,
};

/// Text search configuration shared with the migration's GIN index
const TS_CONFIG: &str = "english";

/// Video repository trait for persistence operations
#[async_trait]
pub trait VideoRepository: Send + Sync {
    /// Insert all videos in one statement, skipping ids that already exist
    ///
    /// Returns the number of rows actually inserted.
    async fn insert_ignore_conflicts(&self, videos: &[NewVideo]) -> Result<u64>;

    /// Filtered, ordered, paginated listing
    async fn list(&self, query: &VideoQuery) -> Result<VideoPage>;

    /// Total stored videos
    async fn count(&self) -> Result<i64>;
}

/// PostgreSQL implementation of VideoRepository
pub struct PostgresVideoRepository {
    pool: PgPool,
}

impl PostgresVideoRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn push_weighted_vector(builder: &mut QueryBuilder<'_, Postgres>) {
        builder.push(format!(
            "(setweight(to_tsvector('{cfg}', coalesce(title, '')), 'A') || \
             setweight(to_tsvector('{cfg}', coalesce(description, '')), 'B'))",
            cfg = TS_CONFIG
        ));
    }

    fn push_rank_expr<'a>(builder: &mut QueryBuilder<'a, Postgres>, term: Option<&'a str>) {
        match term {
            Some(term) => {
                builder.push("ts_rank(");
                Self::push_weighted_vector(builder);
                builder.push(format!(", plainto_tsquery('{}', ", TS_CONFIG));
                builder.push_bind(term);
                builder.push("))");
            }
            None => {
                builder.push("0::real");
            }
        }
    }

    fn push_similarity_expr<'a>(
        builder: &mut QueryBuilder<'a, Postgres>,
        term: Option<&'a str>,
    ) {
        match term {
            Some(term) => {
                builder.push("(similarity(title, ");
                builder.push_bind(term);
                builder.push(") + similarity(description, ");
                builder.push_bind(term);
                builder.push("))");
            }
            None => {
                builder.push("0::real");
            }
        }
    }

    fn push_key_value(
        builder: &mut QueryBuilder<'_, Postgres>,
        field: SortField,
        key: &VideoCursor,
    ) {
        match field {
            SortField::PublishedAt => builder.push_bind(key.published_at),
            SortField::Title => builder.push_bind(key.title.clone()),
            SortField::Rank => builder.push_bind(key.rank),
            SortField::Similarity => builder.push_bind(key.similarity),
            SortField::Id => builder.push_bind(key.id),
        };
    }

    /// Rows strictly after `key` in `ordering`, expanded lexicographically
    fn push_keyset(
        builder: &mut QueryBuilder<'_, Postgres>,
        ordering: &[(SortField, SortOrder)],
        key: &VideoCursor,
    ) {
        builder.push(" AND (");
        for (i, (field, order)) in ordering.iter().enumerate() {
            if i > 0 {
                builder.push(" OR ");
            }
            builder.push("(");
            for (prefix, _) in &ordering[..i] {
                builder.push(prefix.as_str());
                builder.push(" = ");
                Self::push_key_value(builder, *prefix, key);
                builder.push(" AND ");
            }
            builder.push(field.as_str());
            builder.push(order.after_op());
            Self::push_key_value(builder, *field, key);
            builder.push(")");
        }
        builder.push(")");
    }
}

/// Escape LIKE metacharacters so the term matches literally
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl VideoRepository for PostgresVideoRepository {
    async fn insert_ignore_conflicts(&self, videos: &[NewVideo]) -> Result<u64> {
        if videos.is_empty() {
            return Ok(0);
        }

        let mut builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO videos (video_id, title, description, published_at, thumbnails, channel_title) ",
        );
        builder.push_values(videos, |mut row, video| {
            row.push_bind(&video.video_id)
                .push_bind(&video.title)
                .push_bind(&video.description)
                .push_bind(video.published_at)
                .push_bind(&video.thumbnails)
                .push_bind(&video.channel_title);
        });
        builder.push(" ON CONFLICT (video_id) DO NOTHING");

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .context("Failed to bulk insert videos")?;

        debug!(
            submitted = videos.len(),
            inserted = result.rows_affected(),
            "Bulk insert finished"
        );
        Ok(result.rows_affected())
    }

    async fn list(&self, query: &VideoQuery) -> Result<VideoPage> {
        let term = query.search_term();
        let ordering = query.ordering();

        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT * FROM (SELECT id, video_id, title, description, published_at, thumbnails, \
             channel_title, created_at, ",
        );
        Self::push_rank_expr(&mut builder, term);
        builder.push(" AS rank, ");
        Self::push_similarity_expr(&mut builder, term);
        builder.push(" AS similarity FROM videos WHERE 1=1");

        if let Some(after) = query.published_after {
            builder.push(" AND published_at >= ");
            builder.push_bind(after);
        }
        if let Some(before) = query.published_before {
            builder.push(" AND published_at <= ");
            builder.push_bind(before);
        }

        if let Some(term) = term {
            let pattern = format!("%{}%", escape_like(term));

            builder.push(" AND (");
            Self::push_weighted_vector(&mut builder);
            builder.push(format!(" @@ plainto_tsquery('{}', ", TS_CONFIG));
            builder.push_bind(term);
            builder.push(") OR title ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR description ILIKE ");
            builder.push_bind(pattern);
            builder.push(")");
        }

        builder.push(") AS listed WHERE 1=1");
        if let Some(key) = query.position() {
            Self::push_keyset(&mut builder, &ordering, &key);
        }

        builder.push(" ORDER BY ");
        for (i, (field, order)) in ordering.iter().enumerate() {
            if i > 0 {
                builder.push(", ");
            }
            builder.push(format!("{} {}", field.as_str(), order.as_sql()));
        }

        builder.push(" LIMIT ");
        builder.push_bind(query.page.limit + 1);

        let rows = builder
            .build_query_as::<ListedVideo>()
            .fetch_all(&self.pool)
            .await
            .context("Failed to list videos")?;

        Ok(PaginatedResponse::from_lookahead(rows, query.page.limit, ListedVideo::cursor)
            .map(|row| row.video))
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM videos")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count videos")?;
        Ok(count)
    }
}

/// In-memory repository for tests and local development
///
/// Text relevance is not modelled: `rank` and `similarity` are always 0, so
/// those orderings fall through to the `published_at, id` tie-break.
#[derive(Default)]
pub struct MockVideoRepository {
    videos: Mutex<Vec<VideoRecord>>,
    next_id: AtomicI64,
    fail_inserts: AtomicBool,
}

impl MockVideoRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent insert fail
    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, AtomicOrdering::SeqCst);
    }

    /// Snapshot of stored videos in insertion order
    pub async fn all(&self) -> Vec<VideoRecord> {
        self.videos.lock().await.clone()
    }

    fn compare(
        a: &VideoCursor,
        b: &VideoCursor,
        ordering: &[(SortField, SortOrder)],
    ) -> Ordering {
        ordering
            .iter()
            .map(|(field, order)| {
                let ordering = match field {
                    SortField::PublishedAt => a.published_at.cmp(&b.published_at),
                    SortField::Title => a.title.cmp(&b.title),
                    SortField::Rank => a.rank.total_cmp(&b.rank),
                    SortField::Similarity => a.similarity.total_cmp(&b.similarity),
                    SortField::Id => a.id.cmp(&b.id),
                };
                match order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                }
            })
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

#[async_trait]
impl VideoRepository for MockVideoRepository {
    async fn insert_ignore_conflicts(&self, videos: &[NewVideo]) -> Result<u64> {
        if self.fail_inserts.load(AtomicOrdering::SeqCst) {
            anyhow::bail!("Failed to bulk insert videos: injected failure");
        }

        let mut stored = self.videos.lock().await;
        let mut inserted = 0;

        for video in videos {
            if stored.iter().any(|v| v.video_id == video.video_id) {
                continue;
            }
            let id = self.next_id.fetch_add(1, AtomicOrdering::SeqCst) + 1;
            stored.push(VideoRecord {
                id,
                video_id: video.video_id.clone(),
                title: video.title.clone(),
                description: video.description.clone(),
                published_at: video.published_at,
                thumbnails: video.thumbnails.clone(),
                channel_title: video.channel_title.clone(),
                created_at: chrono::Utc::now(),
            });
            inserted += 1;
        }

        Ok(inserted)
    }

    async fn list(&self, query: &VideoQuery) -> Result<VideoPage> {
        let needle = query.search_term().map(str::to_lowercase);
        let ordering = query.ordering();
        let position = query.position();

        let mut rows: Vec<ListedVideo> = self
            .videos
            .lock()
            .await
            .iter()
            .filter(|v| query.published_after.map_or(true, |t| v.published_at >= t))
            .filter(|v| query.published_before.map_or(true, |t| v.published_at <= t))
            .filter(|v| {
                needle.as_deref().map_or(true, |n| {
                    v.title.to_lowercase().contains(n) || v.description.to_lowercase().contains(n)
                })
            })
            .map(|v| ListedVideo {
                video: v.clone(),
                rank: 0.0,
                similarity: 0.0,
            })
            .collect();

        rows.sort_by(|a, b| Self::compare(&a.cursor(), &b.cursor(), &ordering));

        let limit = query.page.limit;
        let rows: Vec<ListedVideo> = rows
            .into_iter()
            .filter(|row| {
                position.as_ref().map_or(true, |key| {
                    Self::compare(&row.cursor(), key, &ordering) == Ordering::Greater
                })
            })
            .take((limit + 1) as usize)
            .collect();

        Ok(PaginatedResponse::from_lookahead(rows, limit, ListedVideo::cursor).map(|row| row.video))
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.videos.lock().await.len() as i64)
    }
}
