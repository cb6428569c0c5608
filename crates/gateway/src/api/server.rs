//! HTTP API server implementation

use crate::api::routes;
use crate::app::AppState;
use anyhow::{Context, Result};
use axum::{http::Method, Router};
use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

/// HTTP API server
pub struct ApiServer {
    app: Router,
    addr: SocketAddr,
}

/// Full router with middleware layers
pub fn build_router(state: Arc<AppState>) -> Router {
    let server = &state.config.server;

    let cors = if server.cors_enabled {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any)
    } else {
        CorsLayer::new()
    };

    let timeout = Duration::from_secs(server.request_timeout_seconds);

    let router = routes::create_routes();
    let router = if state.config.logging.request_logging {
        router.layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
    } else {
        router
    };

    router
        .layer(TimeoutLayer::new(timeout))
        .layer(cors)
        .with_state(state)
}

impl ApiServer {
    /// Create a new API server
    pub fn new(state: Arc<AppState>) -> Result<Self> {
        let config = &state.config;

        let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
            .parse()
            .context("Invalid server host/port configuration")?;

        let app = build_router(state.clone());

        info!(%addr, "API server configured");

        Ok(Self { app, addr })
    }

    /// Serve until `signal` resolves, then drain in-flight requests
    pub async fn run<F>(&self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr)
            .await
            .context("Failed to bind to server address")?;

        info!(addr = %self.addr, "API server listening");

        axum::serve(listener, self.app.clone())
            .with_graceful_shutdown(signal)
            .await
            .context("API server error")?;

        info!("API server stopped");
        Ok(())
    }
}
