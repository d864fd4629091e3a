//! Internal HTTP façade: Prometheus metrics plus liveness and readiness
//! probes. Never exposed outside the operator's own network.

use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::timeout::TimeoutLayer;
use tracing::info;

const MAX_HEADER_BYTES: usize = 100_000;
const IO_TIMEOUT: Duration = Duration::from_secs(2);

pub fn router(handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/livez", get(|| async { StatusCode::OK }))
        .route("/readyz", get(|| async { StatusCode::OK }))
        .layer(TimeoutLayer::new(IO_TIMEOUT))
        .with_state(handle)
}

async fn metrics_handler(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}

/// Serve the internal façade on `address` until the process exits.
pub async fn serve(address: &str, handle: PrometheusHandle) -> std::io::Result<()> {
    let app = router(handle);
    info!(address, "starting internal http server");
    super::serve_with_header_limit(address, app, MAX_HEADER_BYTES).await
}
