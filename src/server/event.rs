//! Internal gateway events.
//!
//! Every inbound wire event (plus connection lifecycle and the idle
//! sweep) becomes one variant of this union, pushed onto a single queue
//! and handled by the dispatcher one at a time. That queue is the
//! serialization boundary for all shared chat state.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::messages::{ClientEvent, ServerEvent};

/// An event processed by the gateway dispatcher.
#[derive(Debug)]
pub enum GatewayEvent {
    /// A WebSocket session opened; carries its outbound channel.
    SessionOpened {
        /// Session id.
        session_id: String,
        /// Sender draining into the session's socket.
        sender: mpsc::UnboundedSender<ServerEvent>,
    },
    /// Bind identity without joining a room.
    RegisterUser {
        /// Session id.
        session_id: String,
        /// User id.
        user_id: String,
        /// Display name, if supplied.
        display_name: Option<String>,
    },
    /// Join a room.
    JoinRoom {
        /// Session id.
        session_id: String,
        /// Room id.
        room_id: String,
        /// User id.
        user_id: String,
        /// Display name.
        user_name: String,
    },
    /// Send a message.
    SendMessage {
        /// Session id.
        session_id: String,
        /// Room id.
        room_id: String,
        /// Author's user id.
        user_id: String,
        /// Author's display name.
        user_name: String,
        /// Content.
        content: String,
        /// Kind string off the wire; defaults to text.
        kind: Option<String>,
    },
    /// Leave a room.
    LeaveRoom {
        /// Session id.
        session_id: String,
        /// Room id.
        room_id: String,
        /// User id.
        user_id: String,
    },
    /// Pick up rooms created out-of-band.
    RefreshRooms,
    /// Typing started.
    Typing {
        /// Room id.
        room_id: String,
        /// User id.
        user_id: String,
        /// Display name, if supplied.
        display_name: Option<String>,
    },
    /// Typing stopped.
    StopTyping {
        /// Room id.
        room_id: String,
        /// User id.
        user_id: String,
    },
    /// A message was read.
    MessageRead {
        /// Session id of the reader.
        session_id: String,
        /// Room id.
        room_id: String,
        /// Reader's user id.
        user_id: String,
        /// Message id.
        message_id: String,
    },
    /// A room was caught up on.
    ReadRoom {
        /// Room id.
        room_id: String,
        /// User id.
        user_id: String,
    },
    /// Drop a room from recent chats.
    RemoveRecent {
        /// Session id (for the failure reply).
        session_id: String,
        /// User id.
        user_id: String,
        /// Room id.
        room_id: String,
    },
    /// A session closed.
    Disconnect {
        /// Session id.
        session_id: String,
    },
    /// Idle sweep tick. The timestamp is injected so tests can simulate
    /// time passage instead of sleeping.
    SweepIdle {
        /// Sweep instant.
        now: DateTime<Utc>,
    },
}

impl GatewayEvent {
    /// Wrap a parsed wire event with its session id.
    pub fn from_client(session_id: &str, event: ClientEvent) -> Self {
        let session_id = session_id.to_string();
        match event {
            ClientEvent::JoinRoom { room_id, user } => GatewayEvent::JoinRoom {
                session_id,
                room_id,
                user_id: user.id,
                user_name: user.name,
            },
            ClientEvent::SendMessage { room_id, message } => GatewayEvent::SendMessage {
                session_id,
                room_id,
                user_id: message.user_id,
                user_name: message.user_name,
                content: message.content,
                kind: message.kind,
            },
            ClientEvent::LeaveRoom { room_id, user_id } => GatewayEvent::LeaveRoom {
                session_id,
                room_id,
                user_id,
            },
            ClientEvent::RefreshRoomsCache => GatewayEvent::RefreshRooms,
            ClientEvent::Typing {
                room_id,
                user_id,
                display_name,
            } => GatewayEvent::Typing {
                room_id,
                user_id,
                display_name,
            },
            ClientEvent::StopTyping { room_id, user_id } => {
                GatewayEvent::StopTyping { room_id, user_id }
            }
            ClientEvent::MessageRead {
                room_id,
                user_id,
                message_id,
            } => GatewayEvent::MessageRead {
                session_id,
                room_id,
                user_id,
                message_id,
            },
            ClientEvent::ReadRoom { room_id, user_id } => {
                GatewayEvent::ReadRoom { room_id, user_id }
            }
            ClientEvent::RemoveRoomFromRecent { user_id, room_id } => GatewayEvent::RemoveRecent {
                session_id,
                user_id,
                room_id,
            },
            ClientEvent::RegisterUser {
                user_id,
                display_name,
            } => GatewayEvent::RegisterUser {
                session_id,
                user_id,
                display_name,
            },
        }
    }
}
