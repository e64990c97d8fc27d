//! vidfeed ingestion service
//!
//! Runs the scheduled ingestion loop and serves the list and stats API.
//! Port: 8085

use actix_web::{web, App, HttpResponse, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use vidfeed_core::{
    init_logging, load_dotenv, retry_with_backoff, ConfigLoader, DatabaseConfig, DatabasePool,
    IngestionConfig, LogConfig, LogFormat, RedisConfig, RetryPolicy, ServiceConfig,
};
use vidfeed_ingestion::{
    api::configure_routes, DeadLetterSink, IngestionError, IngestionMetrics, IngestionPipeline,
    IngestionScheduler, KeySpace, PostgresVideoRepository, RedisCoordinationStore,
    RedisDeadLetterSink, VideoRepository, YouTubeClient,
};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let service = ServiceConfig::from_env()?;
    service.validate()?;

    init_logging(&LogConfig {
        level: service.log_level.clone(),
        format: LogFormat::parse(&service.log_format),
    })?;

    let db_config = DatabaseConfig::from_env()?;
    db_config.validate()?;
    let redis_config = RedisConfig::from_env()?;
    redis_config.validate()?;
    let ingestion = IngestionConfig::from_env()?;
    ingestion.validate()?;

    if ingestion.api_keys.is_empty() {
        warn!("YOUTUBE_API_KEYS is empty, scheduled runs will fetch nothing");
    }

    let db = retry_with_backoff(
        || DatabasePool::new(&db_config),
        RetryPolicy::default(),
        |_: &sqlx::Error| true,
    )
    .await
    .context("Failed to connect to PostgreSQL")?;

    sqlx::migrate!("./migrations")
        .run(db.pool())
        .await
        .context("Failed to apply migrations")?;

    let store = retry_with_backoff(
        || RedisCoordinationStore::connect(&redis_config.url),
        RetryPolicy::default(),
        IngestionError::is_retryable,
    )
    .await
    .context("Failed to connect to Redis")?;

    let keys = KeySpace::new(redis_config.key_prefix.clone());
    let dead_letters: Arc<dyn DeadLetterSink> = Arc::new(RedisDeadLetterSink::new(
        store.connection(),
        keys.dead_letter(),
    ));
    let repository: Arc<dyn VideoRepository> =
        Arc::new(PostgresVideoRepository::new(db.pool().clone()));
    let client = YouTubeClient::new(&ingestion.api_base_url, ingestion.http_timeout)?;
    let metrics = IngestionMetrics::new();

    let pipeline = Arc::new(
        IngestionPipeline::new(
            Arc::new(store),
            keys,
            client,
            repository.clone(),
            dead_letters.clone(),
            ingestion.search_query.clone(),
            ingestion.api_keys.clone(),
        )
        .with_metrics(metrics.clone()),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = IngestionScheduler::new(pipeline, ingestion.fetch_interval).spawn(shutdown_rx);

    info!(
        host = %service.host,
        port = service.port,
        search_query = %ingestion.search_query,
        "Starting ingestion service"
    );

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(repository.clone()))
            .app_data(web::Data::new(dead_letters.clone()))
            .app_data(web::Data::new(metrics.clone()))
            .app_data(web::Data::new(db.clone()))
            .route("/health", web::get().to(health_check))
            .configure(configure_routes)
    })
    .bind((service.host.as_str(), service.port))?
    .run()
    .await?;

    info!("HTTP server stopped, waiting for scheduler");
    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler.await {
        warn!(error = %e, "Scheduler task ended abnormally");
    }

    Ok(())
}

async fn health_check(db: web::Data<DatabasePool>) -> HttpResponse {
    let database_ok = db.is_healthy().await;
    let body = serde_json::json!({
        "status": if database_ok { "healthy" } else { "degraded" },
        "service": "vidfeed-ingestion",
        "version": env!("CARGO_PKG_VERSION"),
        "database": database_ok,
        "pool": db.stats(),
    });

    if database_ok {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}
