//! `/metrics` HTTP endpoint.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, Registry, TextEncoder};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Router exposing `registry` at `GET /metrics`.
pub fn router(registry: Arc<Registry>) -> Router {
    Router::new().route("/metrics", get(metrics)).with_state(registry)
}

async fn metrics(State(registry): State<Arc<Registry>>) -> Response {
    let mut body = Vec::new();
    if let Err(err) = TextEncoder::new().encode(&registry.gather(), &mut body) {
        error!(error = %err, "cannot encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
    }
    ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response()
}

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve<F>(addr: SocketAddr, registry: Arc<Registry>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    serve_listener(listener, registry, shutdown).await
}

/// Serve on an already bound listener until `shutdown` resolves.
pub async fn serve_listener<F>(listener: TcpListener, registry: Arc<Registry>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(address = %listener.local_addr()?, "serving metrics");
    axum::serve(listener, router(registry)).with_graceful_shutdown(shutdown).await
}

/// Parse a listen address; a bare `:port` binds every interface.
pub fn parse_listen_addr(raw: &str) -> Result<SocketAddr, std::net::AddrParseError> {
    match raw.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}").parse(),
        None => raw.parse(),
    }
}
