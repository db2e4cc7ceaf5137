//! HTTP exposition of the aggregated metrics.

use std::io;
use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;
use log::info;
use tokio::net::TcpListener;

use crate::registry::Registry;

const INDEX: &str = r#"<html>
<head><title>nodescrape</title></head>
<body>
<h1>nodescrape</h1>
<p><a href="/metrics">Metrics</a></p>
</body>
</html>"#;

pub fn router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/metrics", get(handle_metrics))
        .route("/", get(handle_index))
        .with_state(registry)
}

async fn handle_metrics(State(registry): State<Arc<Registry>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        registry.metrics().await,
    )
}

async fn handle_index() -> Html<&'static str> {
    Html(INDEX)
}

/// Binds `addr` and serves until the registry shuts down.
pub async fn serve(registry: Arc<Registry>, addr: &str) -> io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("listen {}", listener.local_addr()?);
    serve_on(registry, listener).await
}

pub async fn serve_on(registry: Arc<Registry>, listener: TcpListener) -> io::Result<()> {
    let cancel = registry.cancellation_token();
    axum::serve(listener, router(registry))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}
