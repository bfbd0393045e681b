//! `GET /healthz`: process liveness.
//!
//! Answers `ok` for as long as the HTTP server runs. It never consults the
//! tracker or the provider. A failing provider shows up as
//! `volume_monitor_provider_degraded` on `/metrics`, and a dead poll loop
//! stops the whole process, so liveness alone is enough here.

use axum::http::StatusCode;

/// Liveness handler.
///
/// # Example
///
/// ```ignore
/// GET /healthz HTTP/1.1
///
/// HTTP/1.1 200 OK
/// Content-Type: text/plain
///
/// ok
/// ```
pub async fn health_handler() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_returns_200_ok() {
        let (status, body) = health_handler().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }
}
