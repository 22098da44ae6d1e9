//! Liveness and readiness endpoints.

use crate::error::ControllerError;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

pub fn routes(ready: Arc<AtomicBool>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(ready)
}

/// Serve probes on `addr` until the listener fails.
pub async fn serve(addr: SocketAddr, ready: Arc<AtomicBool>) -> Result<(), ControllerError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Serving health probes");
    axum::serve(listener, routes(ready)).await?;
    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

/// Ready once the machine cache has synced
async fn readyz(State(ready): State<Arc<AtomicBool>>) -> (StatusCode, &'static str) {
    if ready.load(Ordering::SeqCst) {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "machine cache not synced")
    }
}
