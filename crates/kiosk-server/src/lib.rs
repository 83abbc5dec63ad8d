//! HTTP front end for the card-dispensing terminal.
//!
//! Exposes the two-phase workflow (`/issue-card`, then `/confirm`) and the
//! sensor query (`/card-status`) over JSON, with permissive CORS so a
//! browser-based kiosk UI can call it directly.

pub mod api;
pub mod logging;

use std::net::SocketAddr;

use anyhow::Context;
use kiosk_terminal::Terminal;
use tokio::net::TcpListener;
use tracing::info;

pub use api::{AppState, build_router};

/// Serve the API on `addr` until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(addr: SocketAddr, terminal: Terminal) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on http://{}", listener.local_addr()?);

    let app = build_router(AppState::new(terminal));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
