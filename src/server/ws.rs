//! WebSocket session handler.
//!
//! Each connection gets a session id and an outbound queue; inbound
//! frames are parsed into typed events and forwarded to the dispatcher
//! queue in arrival order, which preserves per-connection ordering.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use super::event::GatewayEvent;
use super::messages::{ClientEvent, ServerEvent};

/// Shared state for the WebSocket handler.
#[derive(Clone)]
pub struct GatewayState {
    /// Dispatcher event queue.
    pub events: mpsc::Sender<GatewayEvent>,
}

/// WebSocket upgrade handler.
///
/// GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<GatewayState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drive one WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<GatewayState>) {
    let session_id = Uuid::new_v4().to_string();
    debug!(session_id = %session_id, "WebSocket session started");

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerEvent>();

    if state
        .events
        .send(GatewayEvent::SessionOpened {
            session_id: session_id.clone(),
            sender: out_tx.clone(),
        })
        .await
        .is_err()
    {
        debug!(session_id = %session_id, "Dispatcher gone; closing socket");
        return;
    }

    loop {
        tokio::select! {
            // Inbound frames from the client.
            inbound = ws_receiver.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientEvent>(&text) {
                            Ok(event) => {
                                let event = GatewayEvent::from_client(&session_id, event);
                                if state.events.send(event).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                debug!(session_id = %session_id, error = %e, "Unparseable client event");
                                let _ = out_tx.send(ServerEvent::error(
                                    "invalid_event",
                                    "Invalid event format",
                                ));
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_sender.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(session_id = %session_id, "WebSocket closed by client");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(session_id = %session_id, error = %e, "WebSocket error");
                        break;
                    }
                }
            }

            // Outbound events from the dispatcher.
            outbound = out_rx.recv() => {
                match outbound {
                    Some(event) => {
                        match serde_json::to_string(&event) {
                            Ok(json) => {
                                if ws_sender.send(Message::Text(json.into())).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                debug!(session_id = %session_id, error = %e, "Failed to serialize event");
                            }
                        }
                    }
                    None => break,
                }
            }
        }
    }

    // The dispatcher cleans up presence, rooms, and typing state.
    let _ = state
        .events
        .send(GatewayEvent::Disconnect {
            session_id: session_id.clone(),
        })
        .await;
    debug!(session_id = %session_id, "WebSocket session ended");
}
