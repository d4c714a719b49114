pub mod health;
pub mod metrics;
pub mod tryon;
pub mod uploads;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

/// Inline person images make bodies large; 15 MB covers a base64 phone photo.
const BODY_LIMIT_BYTES: usize = 15 * 1024 * 1024;

/// Build the HTTP router. `/metrics` is mounted only when a recorder is installed.
pub fn router(state: AppState, prometheus: Option<Arc<PrometheusHandle>>) -> Router {
    let mut app = Router::new()
        .route("/", get(health::banner))
        .route("/health", get(health::health_check))
        .route("/tryon", post(tryon::submit_tryon))
        .route("/tryon-status/{id}", get(tryon::get_tryon_status))
        .route("/tryons", get(tryon::list_tryons))
        .route("/uploads", post(uploads::create_upload))
        .with_state(state);

    if let Some(handle) = prometheus {
        app = app.route(
            "/metrics",
            get(metrics::prometheus_metrics).with_state(handle),
        );
    }

    app.layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
}
