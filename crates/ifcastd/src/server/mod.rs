//! WebSocket server for browser clients.
//!
//! The server:
//! - listens on the configured TCP address and upgrades `/ws`
//! - spawns a session handler per client
//! - supports graceful shutdown via CancellationToken
//!
//! TLS termination and authentication are left to a front-end proxy;
//! the daemon speaks plain WebSocket.

mod session;

pub use session::ws_handler;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::broadcast::ClientRegistry;
use crate::store::StoreHandle;

/// Shared state handed to every session handler.
#[derive(Clone)]
pub struct AppState {
    /// Read access to interface state
    pub store: StoreHandle,

    /// Session lifetime owner
    pub registry: Arc<ClientRegistry>,

    /// Daemon-wide shutdown signal
    pub cancel_token: CancellationToken,
}

/// Builds the router serving the WebSocket endpoint.
pub fn router(state: AppState) -> Router {
    Router::new().route("/ws", get(ws_handler)).with_state(state)
}

/// Binds the listen address and serves until the cancellation token
/// fires.
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<(), ServerError> {
    let cancel_token = state.cancel_token.clone();

    let listener = TcpListener::bind(addr).await.map_err(|e| ServerError::Bind {
        addr,
        error: e.to_string(),
    })?;

    info!(listen = %addr, "WebSocket server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel_token.cancelled_owned())
        .await
        .map_err(|e| ServerError::Serve(e.to_string()))?;

    info!("WebSocket server stopped");
    Ok(())
}

/// Errors that can occur in server operations.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: SocketAddr, error: String },

    #[error("Server error: {0}")]
    Serve(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_display() {
        let err = ServerError::Bind {
            addr: "127.0.0.1:8766".parse().unwrap(),
            error: "address in use".to_string(),
        };
        assert!(err.to_string().contains("127.0.0.1:8766"));
        assert!(err.to_string().contains("address in use"));
    }
}
