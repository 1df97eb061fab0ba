//! HTTP server for the Prometheus metrics endpoint.

use std::net::SocketAddr;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::collector::SharedCollector;

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    collector: SharedCollector,
}

/// Create the HTTP router.
fn create_router(collector: SharedCollector, metrics_path: &str) -> Router {
    let state = AppState { collector };

    Router::new()
        .route(metrics_path, get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Handler for the metrics endpoint.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    let body = state.collector.render();

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response()
}

/// Handler for the /health endpoint.
async fn health_handler() -> Response {
    (StatusCode::OK, "healthy\n").into_response()
}

/// Handler for the /ready endpoint. Ready once one poll has succeeded.
async fn ready_handler(State(state): State<AppState>) -> Response {
    let stats = state.collector.stats();

    if stats.polls_succeeded > 0 {
        (StatusCode::OK, "ready\n").into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "not ready - no successful poll yet\n",
        )
            .into_response()
    }
}

/// HTTP server for scrape requests.
pub struct HttpServer {
    collector: SharedCollector,
    listen_addr: SocketAddr,
    metrics_path: String,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(collector: SharedCollector, listen_addr: SocketAddr, metrics_path: String) -> Self {
        Self {
            collector,
            listen_addr,
            metrics_path,
        }
    }

    /// Run the HTTP server until the shutdown signal is received.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let router = create_router(self.collector, &self.metrics_path);

        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;

        info!(
            addr = %self.listen_addr,
            path = %self.metrics_path,
            "HTTP server listening"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}
