//! Video listing and ingestion stats endpoints

use crate::dead_letter::DeadLetterSink;
use crate::metrics::{IngestionMetrics, MetricsSnapshot};
use crate::models::{SortField, SortOrder, VideoQuery};
use crate::repository::VideoRepository;
use actix_web::{web, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use vidfeed_core::PageRequest;

/// Video API routes
///
/// Expects `web::Data<Arc<dyn VideoRepository>>`, `web::Data<Arc<dyn DeadLetterSink>>`
/// and `web::Data<IngestionMetrics>` in app data.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/videos", web::get().to(list_videos))
            .route("/ingestion/stats", web::get().to(get_stats)),
    );
}

/// Query string of the list endpoint
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub search: Option<String>,
    pub category: Option<String>,
    pub published_after: Option<String>,
    pub published_before: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub cursor: Option<String>,
    pub page_size: Option<i64>,
}

impl ListParams {
    /// Resolve into a repository query
    pub fn into_query(self) -> Result<VideoQuery, String> {
        let published_after = parse_bound("published_after", self.published_after.as_deref())?;
        let published_before = parse_bound("published_before", self.published_before.as_deref())?;

        Ok(VideoQuery {
            search: self.search,
            category: self.category,
            published_after,
            published_before,
            sort: self
                .sort
                .as_deref()
                .map(SortField::parse)
                .unwrap_or_default(),
            order: self
                .order
                .as_deref()
                .map(SortOrder::parse)
                .unwrap_or_default(),
            page: PageRequest::new(self.cursor.as_deref(), self.page_size),
        })
    }
}

fn parse_bound(name: &str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>, String> {
    match raw.filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|ts| Some(ts.with_timezone(&Utc)))
            .map_err(|_| format!("{} must be an RFC 3339 timestamp", name)),
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub runs: MetricsSnapshot,
    pub dead_letter_depth: u64,
    pub stored_videos: Option<i64>,
}

/// GET /api/v1/videos
async fn list_videos(
    repository: web::Data<Arc<dyn VideoRepository>>,
    params: web::Query<ListParams>,
) -> impl Responder {
    let query = match params.into_inner().into_query() {
        Ok(query) => query,
        Err(message) => {
            return HttpResponse::BadRequest().json(ErrorResponse { error: message });
        }
    };

    match repository.list(&query).await {
        Ok(page) => HttpResponse::Ok().json(page),
        Err(e) => {
            error!(error = %e, "Failed to list videos");
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Failed to list videos".to_string(),
            })
        }
    }
}

/// GET /api/v1/ingestion/stats
async fn get_stats(
    metrics: web::Data<IngestionMetrics>,
    dead_letters: web::Data<Arc<dyn DeadLetterSink>>,
    repository: web::Data<Arc<dyn VideoRepository>>,
) -> impl Responder {
    let stored_videos = match repository.count().await {
        Ok(count) => Some(count),
        Err(e) => {
            error!(error = %e, "Failed to count videos");
            None
        }
    };

    HttpResponse::Ok().json(StatsResponse {
        runs: metrics.snapshot(),
        dead_letter_depth: dead_letters.len().await,
        stored_videos,
    })
}
