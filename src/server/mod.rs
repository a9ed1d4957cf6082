//! HTTP server for the avatar overlay.
//!
//! Exposes the state store to display clients and command issuers, hosts the
//! overlay's static assets, and carries the MCP endpoint.
//!
//! # Endpoints
//!
//! - `GET  /health`             : Liveness probe
//! - `GET  /currentExpression`  : Current state snapshot
//! - `GET  /setExpression`      : Single-expression command
//! - `GET  /expressions`        : Catalog listing
//! - `*    /setBatchExpressions`: Batch install
//! - `POST /mcp`                : MCP JSON-RPC

pub mod routes;

use std::future::Future;
use std::path::PathBuf;

use tokio::net::TcpListener;

pub use routes::{app_router, AppState};

/// Serve the router on `listener` until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    state: AppState,
    static_dir: Option<PathBuf>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("avatar-overlay server listening on http://{}", addr);
    }
    if let Some(dir) = &static_dir {
        tracing::info!("Serving static files from {}", dir.display());
    }
    let app = app_router(state, static_dir);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    tracing::info!("avatar-overlay server stopped");
    Ok(())
}
