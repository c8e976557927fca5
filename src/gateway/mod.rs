//! Axum-based HTTP gateway bridging synchronous callers to asynchronous
//! task confirmations, with body limits and request timeouts.

mod correlation;
mod handlers;
mod service;

pub use correlation::{CorrelationTable, Waiter};
pub use service::{CreatedTask, GatewayService};

use anyhow::Result;
use axum::{Router, routing::get};
use handlers::{handle_create_task, handle_health};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Maximum request body size (64KB) — prevents memory exhaustion
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout (30s) — prevents slow-loris attacks; must exceed the
/// configured response wait so the handler, not the layer, reports a
/// gateway timeout.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<GatewayService>,
}

pub fn router(service: Arc<GatewayService>) -> Router {
    let state = AppState { service };

    Router::new()
        .route("/create-task", get(handle_create_task))
        .route("/health", get(handle_health))
        .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .with_state(state)
}

/// Run the HTTP gateway.
pub async fn run_gateway(host: &str, port: u16, service: Arc<GatewayService>) -> Result<()> {
    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    run_gateway_with_listener(host, listener, service).await
}

/// Run the HTTP gateway from a pre-bound listener.
pub async fn run_gateway_with_listener(
    host: &str,
    listener: tokio::net::TcpListener,
    service: Arc<GatewayService>,
) -> Result<()> {
    let actual_port = listener.local_addr()?.port();

    println!("◆ Gateway listening on {host}:{actual_port}");
    println!("  GET /create-task?contents=<text>&scoreDifference=<uint>");
    println!("  GET /health");
    println!("  Press Ctrl+C to stop\n");

    axum::serve(listener, router(service)).await?;
    Ok(())
}
