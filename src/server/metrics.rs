//! Prometheus scrape endpoint.

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;

use super::AppState;
use crate::observability::record_table_gauges;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Renders every registered metric in the Prometheus text format.
///
/// The table gauges are refreshed from the tracker first so a scrape never
/// reports counts older than the last completed tick, and so the stuck flag of
/// every still-stuck volume is kept from expiring.
pub async fn metrics_handler(State(app_state): State<AppState>) -> impl IntoResponse {
    {
        let tracker = app_state.tracker();
        let table = tracker.read().await;
        record_table_gauges(&table);
    }

    let metrics = app_state.metrics();
    metrics.run_upkeep();

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        metrics.render(),
    )
}
