use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use kittypup_worker::{app_state::AppState, config::AppConfig, routes, wiring};

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

    tracing::info!("Initializing kittypup-worker");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_histogram!(
        "generation_processing_seconds",
        "Time to run one generation job through the pipeline"
    );
    metrics::describe_counter!("generation_jobs_total", "Total generation jobs received");
    metrics::describe_counter!(
        "generation_jobs_completed",
        "Total generation jobs completed"
    );
    metrics::describe_counter!(
        "generation_jobs_failed",
        "Total generation jobs that failed, by failure kind"
    );
    metrics::describe_counter!(
        "generation_callbacks_failed",
        "Outcome callbacks that could not be delivered"
    );
    metrics::describe_gauge!(
        "generation_jobs_in_flight",
        "Jobs currently holding a pipeline slot"
    );

    // Storage, stages and callback client are built once and shared by every request
    let orchestrator =
        wiring::build_orchestrator(&config).expect("Failed to initialize generation pipeline");

    let gpu_available = wiring::detect_gpu();
    tracing::info!(gpu_available, "GPU probe complete");

    let state = AppState::new(orchestrator, gpu_available);
    let orchestrator = state.orchestrator.clone();

    let app = routes::router(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(1024 * 1024)); // 1 MB limit

    tracing::info!("Starting kittypup-worker on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown signal received, draining in-flight jobs");
            orchestrator.shutdown();
        })
        .await
        .expect("Server error");
}
