use axum::{routing::get, routing::post, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use std::time::Duration;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use inventory_enrich::app_state::AppState;
use inventory_enrich::config::AppConfig;
use inventory_enrich::routes;
use inventory_enrich::services::{
    detection::DetectApiClient,
    enhance::{EnhanceApiClient, EnhancementService},
    pipeline::{EnrichmentPipeline, PipelineConfig},
    status_store::{MemoryStatusStore, StatusStore},
    storage::R2Client,
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing inventory-enrich server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");

    // Register application metrics
    metrics::describe_counter!("enrichment_jobs_total", "Total enrichment jobs created");
    metrics::describe_counter!(
        "enrichment_objects_completed",
        "Object tasks that reached a terminal state cleanly"
    );
    metrics::describe_counter!(
        "enrichment_objects_failed",
        "Object tasks that ended in error"
    );
    metrics::describe_counter!(
        "enhancement_retries_total",
        "Failed image-edit attempts, retried or fallen back"
    );
    metrics::describe_gauge!(
        "enrichment_jobs_active",
        "Jobs currently held in the status store"
    );
    metrics::describe_histogram!(
        "enrichment_object_seconds",
        "Time for one object task to reach a terminal state"
    );

    // Initialize R2 storage client
    tracing::info!("Initializing R2 storage client");
    let storage = R2Client::new(
        &config.r2_bucket,
        &config.r2_endpoint,
        &config.r2_access_key,
        &config.r2_secret_key,
        &config.r2_public_base_url,
    )
    .expect("Failed to initialize R2 client");

    // Initialize external AI adapters
    tracing::info!("Initializing detection and enhancement clients");
    let detector = DetectApiClient::new(&config.detect_api_url, &config.detect_api_key);
    let enhancer = EnhancementService::new(
        EnhanceApiClient::new(&config.enhance_api_url, &config.enhance_api_key),
        config.enhance_max_attempts,
        config.enhanced_max_dim,
    );

    let store: Arc<dyn StatusStore> = Arc::new(MemoryStatusStore::new());

    let pipeline = EnrichmentPipeline::new(
        Arc::new(detector),
        Arc::new(enhancer),
        Arc::new(storage),
        Arc::clone(&store),
        PipelineConfig {
            max_objects_per_job: config.max_objects_per_job,
            crop_padding_px: config.crop_padding_px,
            job_timeout: Duration::from_secs(config.job_timeout_secs),
        },
    );

    // Create shared application state
    let state = AppState::new(pipeline, Arc::clone(&store));

    // Background sweeper: completed jobs stay queryable for the retention
    // window, then drop out of the store.
    let sweeper_store = Arc::clone(&store);
    let retention = chrono::Duration::seconds(config.job_retention_secs);
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(60));
        loop {
            tick.tick().await;
            let evicted = sweeper_store.evict_expired(retention);
            if evicted > 0 {
                tracing::debug!(evicted, "evicted expired jobs");
            }
        }
    });

    // Build API routes
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/v1/enrich", post(routes::enrich::submit_enrichment))
        .route(
            "/api/v1/enrich/{job_id}",
            get(routes::enrich::get_job_status),
        )
        .with_state(state)
        // Prometheus metrics endpoint
        .route(
            "/metrics",
            get(move || async move { prometheus_handle.render() }),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(10 * 1024 * 1024)); // 10 MB limit

    tracing::info!("Starting inventory-enrich on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
