mod admin;
mod analysis;
mod config;
mod conversion;
mod errors;
mod file_fetch;
mod llm_client;
mod models;
mod requests;
mod routes;
mod state;
mod storage;

#[cfg(test)]
mod test_support;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::admin::{AdminAuth, AuthSettings};
use crate::analysis::AnalysisOrchestrator;
use crate::config::{Config, S3Settings};
use crate::conversion::{ConversionCapability, DocumentPipeline, HttpConverter};
use crate::file_fetch::{FileFetcher, S3FileFetcher};
use crate::llm_client::LlmClient;
use crate::requests::RequestManager;
use crate::routes::build_router;
use crate::state::AppState;
use crate::storage::{RedisKv, Storage};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting JobMatch API v{} ({:?})",
        env!("CARGO_PKG_VERSION"),
        config.environment
    );

    // Initialize Redis
    let kv = Arc::new(RedisKv::connect(&config.redis_url).await?);
    let storage = Storage::new(kv.clone(), Some(config.request_ttl_hours * 3600));

    // Initialize LLM client
    let llm = LlmClient::new(config.anthropic_api_key.clone());
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    // Document conversion service is optional; the pipeline falls back without it
    let capability = match &config.conversion_api_url {
        Some(url) => ConversionCapability::Available(Arc::new(HttpConverter::new(
            url.clone(),
            config.conversion_api_token.clone(),
        ))),
        None => ConversionCapability::Unavailable,
    };
    info!(
        available = capability.is_available(),
        url = config.conversion_api_url.as_deref().unwrap_or("-"),
        "Document conversion service"
    );

    let pipeline = Arc::new(DocumentPipeline::new(storage.clone(), capability));
    let orchestrator = Arc::new(AnalysisOrchestrator::new(Arc::new(llm)));
    let manager = RequestManager::new(storage, pipeline, orchestrator);

    let auth = Arc::new(AdminAuth::new(kv, AuthSettings::from_config(&config)));

    // Initialize S3 / MinIO
    let file_fetcher: Option<Arc<dyn FileFetcher>> = match &config.s3 {
        Some(s3) => {
            let client = build_s3_client(s3).await;
            info!("S3 file fetching enabled (bucket: {})", s3.bucket);
            Some(Arc::new(S3FileFetcher::new(client, s3.bucket.clone())) as Arc<dyn FileFetcher>)
        }
        None => None,
    };

    spawn_cleanup_task(
        manager.clone(),
        config.cleanup_after_hours,
        config.cleanup_interval_minutes,
    );

    // Build app state
    let state = AppState {
        manager,
        auth,
        file_fetcher,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Periodically deletes requests idle for longer than `older_than_hours`.
fn spawn_cleanup_task(manager: RequestManager, older_than_hours: i64, interval_minutes: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_minutes.max(1) * 60));
        // The first tick fires immediately; skip it so startup stays quiet
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match manager.cleanup_old_requests(older_than_hours).await {
                Ok(deleted) => info!(deleted, "Scheduled cleanup finished"),
                Err(e) => error!("Scheduled cleanup failed: {e}"),
            }
        }
    });
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(settings: &S3Settings) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &settings.access_key_id,
        &settings.secret_access_key,
        None,
        None,
        "jobmatch-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&settings.endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::new(&s3_config)
}
