use std::sync::Arc;

use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use photopipe::app_state::AppState;
use photopipe::config::AppConfig;
use photopipe::routes;
use photopipe::services::artifacts::ArtifactStore;
use photopipe::services::backends::faceswap::SwapEngineClient;
use photopipe::services::backends::gpt::GptEditClient;
use photopipe::services::dispatcher::Dispatcher;
use photopipe::services::registry::JobRegistry;
use photopipe::services::scheduler::{RetryPolicy, Scheduler};

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

    tracing::info!("Initializing photopipe server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_counter!("jobs_submitted_total", "Total jobs accepted for processing");
    metrics::describe_counter!("jobs_completed_total", "Total jobs that reached done");
    metrics::describe_counter!("jobs_failed_total", "Total jobs that reached failed");
    metrics::describe_gauge!("job_queue_depth", "Jobs waiting for a worker");
    metrics::describe_histogram!(
        "stage_processing_seconds",
        "Time spent in a single backend stage, labeled by stage"
    );

    // Prepare the media tree (uploads and per-job artifact directories)
    tracing::info!(media_root = %config.media_root.display(), "Preparing artifact store");
    let artifacts = Arc::new(ArtifactStore::new(&config.media_root, &config.public_base_url));
    artifacts
        .ensure_dirs()
        .await
        .expect("Failed to create media directories");

    // Backend clients
    let edit_backend = Arc::new(GptEditClient::new(
        &config.openai_base_url,
        &config.openai_api_key,
        &config.gpt_image_model,
        config.stage_timeout(),
    ));
    let swap_backend = Arc::new(SwapEngineClient::new(
        &config.faceswap_url,
        config.stage_timeout(),
    ));

    // Job registry and worker pool
    let registry = Arc::new(JobRegistry::new());
    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&registry),
        Arc::clone(&artifacts),
        edit_backend,
        swap_backend,
        RetryPolicy {
            max_attempts: config.backend_max_attempts,
            base_delay: config.retry_base_delay(),
        },
        config.stage_timeout(),
    ));
    tracing::info!(workers = config.worker_count, "Starting worker pool");
    let (queue, _workers) = scheduler.spawn(config.worker_count);

    let dispatcher = Dispatcher::new(Arc::clone(&registry), queue);

    // Create shared application state
    let state = AppState::new(registry, artifacts, dispatcher);

    // Build API routes
    let app = routes::router(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(50 * 1024 * 1024)); // 50 MB limit

    tracing::info!("Starting photopipe on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
