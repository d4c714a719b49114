use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use tryon_relay::app_state::AppState;
use tryon_relay::config::AppConfig;
use tryon_relay::routes;

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

    tracing::info!("Initializing tryon-relay server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    metrics::describe_counter!("tryon_jobs_submitted", "Try-on jobs created");
    metrics::describe_counter!("tryon_jobs_completed", "Try-on jobs that reached done");
    metrics::describe_counter!("tryon_jobs_failed", "Try-on jobs that reached failed");
    metrics::describe_counter!(
        "tryon_terminal_write_failures",
        "Pipeline outcomes that could not be written to the job store"
    );
    metrics::describe_histogram!(
        "tryon_pipeline_seconds",
        "Wall time of one try-on pipeline run"
    );

    let state = AppState::build(&config)
        .await
        .expect("Failed to initialize application state");

    let app = routes::router(state, Some(prometheus_handle));

    tracing::info!("Starting tryon-relay on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
