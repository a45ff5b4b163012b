use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use super::api::{self, SharedState, WorkerState};
use super::runs::RunRegistry;
use crate::engine::EngineRegistry;
use crate::ports::PortAllocator;

/// Configuration for a worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Allow cross-origin requests
    pub permissive_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8181,
            permissive_cors: false,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

/// Fresh worker state: an empty run table and a port table that lives as
/// long as the returned state.
pub fn worker_state(engines: EngineRegistry) -> SharedState {
    Arc::new(WorkerState {
        runs: Arc::new(RunRegistry::new(Arc::new(engines))),
        ports: PortAllocator::new(),
    })
}

/// Build the worker router with request tracing.
pub fn build_router(state: SharedState) -> Router {
    api::api_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Worker server error")
}

/// Start a worker and run until Ctrl+C.
pub async fn start_server(config: ServerConfig, engines: EngineRegistry) -> Result<()> {
    let mut app = build_router(worker_state(engines));
    if config.permissive_cors {
        app = app.layer(CorsLayer::permissive());
    }

    let addr = config.address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    println!("Ferry worker listening on http://{}", local_addr);
    info!(address = %local_addr, "Worker started");

    serve(listener, app, shutdown_signal()).await?;

    println!("Worker shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    println!("\nShutting down...");
}
