//! Session handler for individual WebSocket clients.
//!
//! Each client connection gets its own task that:
//! - sends a `full_state` message covering every configured interface
//!   before anything else
//! - registers with the client registry for fan-out updates
//! - drains its session queue to the socket in FIFO order
//! - answers pings and tears down cleanly on close, error, or
//!   daemon shutdown

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use ifcast_protocol::{ClientMessage, ServerMessage};
use tracing::{debug, error, info, warn};

use super::AppState;

/// Upgrades the HTTP request and hands the socket to the session
/// loop.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    // Snapshot before registering: queued updates are then always at
    // least as new as the full state they follow.
    let interfaces = state.store.snapshot_all().await;

    let session = match state.registry.register().await {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, "Rejecting client connection");
            let mut socket = socket;
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };
    let session_id = session.id;

    let (mut sender, mut receiver) = socket.split();

    let full_state = ServerMessage::full_state(interfaces);
    match serde_json::to_string(&full_state) {
        Ok(json) => {
            if sender.send(Message::Text(json)).await.is_err() {
                debug!(session_id, "Client gone before full state was sent");
                state.registry.unregister(session_id).await;
                return;
            }
        }
        Err(e) => {
            error!(session_id, error = %e, "Failed to serialize full state");
            state.registry.unregister(session_id).await;
            return;
        }
    }

    info!(session_id, "Client session started");

    loop {
        tokio::select! {
            biased;

            _ = state.cancel_token.cancelled() => {
                debug!(session_id, "Closing session for shutdown");
                let _ = sender.send(Message::Close(None)).await;
                break;
            }

            item = session.queue.pop() => {
                match item {
                    Some(json) => {
                        if sender.send(Message::Text(json.to_string())).await.is_err() {
                            debug!(session_id, "Write failed, closing session");
                            break;
                        }
                    }
                    // Queue closed underneath us (unregistered elsewhere)
                    None => break,
                }
            }

            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if !handle_client_text(&text, &mut sender, session_id).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(session_id, "Client closed connection");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Binary and transport-level ping/pong frames
                    }
                    Some(Err(e)) => {
                        debug!(session_id, error = %e, "Transport error, closing session");
                        break;
                    }
                }
            }
        }
    }

    state.registry.unregister(session_id).await;
    info!(session_id, "Client session ended");
}

/// Handles one text frame from the client. Returns false when the
/// session should end.
async fn handle_client_text(
    text: &str,
    sender: &mut SplitSink<WebSocket, Message>,
    session_id: u64,
) -> bool {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Ping { seq }) => {
            let pong = ServerMessage::pong(seq);
            match serde_json::to_string(&pong) {
                Ok(json) => sender.send(Message::Text(json)).await.is_ok(),
                Err(e) => {
                    error!(session_id, error = %e, "Failed to serialize pong");
                    true
                }
            }
        }
        Ok(ClientMessage::Disconnect) => {
            debug!(session_id, "Client requested disconnect");
            false
        }
        Err(e) => {
            debug!(session_id, error = %e, "Ignoring unrecognized client message");
            true
        }
    }
}
