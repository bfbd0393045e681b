//! HTTP server for the volume monitor.
//!
//! # Endpoints
//!
//! - `GET /healthz` - Returns 200 if the server is running
//! - `GET /metrics` - Prometheus text exposition
//! - `GET /api/v1/volumes` - Returns the tracker table as JSON

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::state::SharedTracker;

pub mod health;
pub mod metrics;
pub mod volumes;

pub use health::health_handler;
pub use metrics::metrics_handler;
pub use volumes::volumes_handler;

/// Shared application state.
///
/// This is passed to all handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// The tracker table. Handlers only take read locks.
    tracker: SharedTracker,

    /// Handle to the installed Prometheus recorder.
    metrics: PrometheusHandle,
}

impl AppState {
    pub fn new(tracker: SharedTracker, metrics: PrometheusHandle) -> Self {
        AppState {
            inner: Arc::new(AppStateInner { tracker, metrics }),
        }
    }

    pub fn tracker(&self) -> SharedTracker {
        self.inner.tracker.clone()
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.inner.metrics
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::get;

    axum::Router::new()
        .route("/healthz", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/v1/volumes", get(volumes_handler))
        .with_state(app_state)
}
