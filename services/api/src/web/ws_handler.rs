//! services/api/src/web/ws_handler.rs
//!
//! The WebSocket fan-out for real-time aggregate updates. Connections are
//! listen-only: every published event is forwarded as a JSON text frame and
//! inbound frames other than close are ignored.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::StreamExt;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::web::state::AppState;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    info!("New realtime listener connected");

    let mut events = state.broadcaster.subscribe();
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let json = match serde_json::to_string(&event) {
                            Ok(json) => json,
                            Err(e) => {
                                warn!("Failed to serialize broadcast event: {}", e);
                                continue;
                            }
                        };
                        if futures::SinkExt::send(&mut sender, Message::Text(json.into()))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    // Slow listener overran its buffer. Delivery is
                    // best-effort, so skip ahead rather than disconnect.
                    Err(RecvError::Lagged(missed)) => {
                        warn!("Realtime listener lagged, skipped {} events", missed);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            frame = receiver.next() => {
                match frame {
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Realtime listener disconnected");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("WebSocket receive error: {}", e);
                        break;
                    }
                }
            }
        }
    }
}
