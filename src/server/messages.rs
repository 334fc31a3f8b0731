//! Wire protocol for the WebSocket gateway.
//!
//! Events are JSON objects tagged by a "type" field; names and payload
//! shapes match the protocol the web client already speaks. Timestamps
//! travel as RFC 3339 strings and are parsed back before comparison.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::{Message, Participant, RoomSnapshot};

/// User identity as supplied by a joining client.
#[derive(Debug, Clone, Deserialize)]
pub struct UserRef {
    /// Externally issued user id.
    pub id: String,
    /// Display name.
    pub name: String,
}

/// Message body as supplied by a sending client.
///
/// Id and timestamp are server-assigned, so the client sends neither.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageBody {
    /// Author's user id.
    pub user_id: String,
    /// Author's display name.
    pub user_name: String,
    /// Message content.
    pub content: String,
    /// Message kind: text, image, or video.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// Events sent from client to server.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Join a room (binds identity as a side effect).
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        /// Room id to join.
        room_id: String,
        /// Joining user.
        user: UserRef,
    },
    /// Send a message to a room.
    #[serde(rename_all = "camelCase")]
    SendMessage {
        /// Target room id.
        room_id: String,
        /// Message body.
        message: MessageBody,
    },
    /// Leave a room.
    #[serde(rename_all = "camelCase")]
    LeaveRoom {
        /// Room id to leave.
        room_id: String,
        /// Leaving user id.
        user_id: String,
    },
    /// Pick up rooms created out-of-band.
    RefreshRoomsCache,
    /// User started typing.
    #[serde(rename_all = "camelCase")]
    Typing {
        /// Room id.
        room_id: String,
        /// Typing user id.
        user_id: String,
        /// Display name for the sidebar indicator.
        #[serde(default)]
        display_name: Option<String>,
    },
    /// User stopped typing.
    #[serde(rename_all = "camelCase")]
    StopTyping {
        /// Room id.
        room_id: String,
        /// User id.
        user_id: String,
    },
    /// User read a specific message.
    #[serde(rename_all = "camelCase")]
    MessageRead {
        /// Room id.
        room_id: String,
        /// Reader's user id.
        user_id: String,
        /// Message id.
        message_id: String,
    },
    /// User caught up on a room; reset its unread count.
    #[serde(rename_all = "camelCase")]
    ReadRoom {
        /// Room id.
        room_id: String,
        /// User id.
        user_id: String,
    },
    /// Drop a room from the user's recent chats.
    #[serde(rename_all = "camelCase")]
    RemoveRoomFromRecent {
        /// User id.
        user_id: String,
        /// Room id.
        room_id: String,
    },
    /// Bind identity without joining a room.
    #[serde(rename_all = "camelCase")]
    RegisterUser {
        /// User id.
        user_id: String,
        /// Display name.
        #[serde(default)]
        display_name: Option<String>,
    },
}

/// A user as sent over the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireUser {
    /// User id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Derived badges.
    pub badges: Vec<String>,
    /// Trust score.
    pub trust_score: f64,
    /// Profile creation timestamp, RFC 3339.
    pub profile_age: String,
    /// Messages sent.
    pub message_count: i64,
    /// Connection timestamp, RFC 3339.
    pub joined_at: String,
}

impl From<&Participant> for WireUser {
    fn from(p: &Participant) -> Self {
        Self {
            id: p.id.clone(),
            name: p.name.clone(),
            badges: p.badges.iter().map(|b| b.as_str().to_string()).collect(),
            trust_score: p.trust_score,
            profile_age: p.profile_age.to_rfc3339(),
            message_count: p.message_count,
            joined_at: p.joined_at.to_rfc3339(),
        }
    }
}

/// A room as sent over the wire on join.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRoom {
    /// Room id.
    pub id: String,
    /// Room name.
    pub name: String,
    /// Capacity.
    pub max_participants: usize,
    /// Creation timestamp, RFC 3339.
    pub created_at: String,
    /// Current live participants.
    pub participants: Vec<WireUser>,
}

impl From<&RoomSnapshot> for WireRoom {
    fn from(snapshot: &RoomSnapshot) -> Self {
        Self {
            id: snapshot.room.id.clone(),
            name: snapshot.room.name.clone(),
            max_participants: snapshot.room.max_participants,
            created_at: snapshot.room.created_at.to_rfc3339(),
            participants: snapshot.participants.iter().map(WireUser::from).collect(),
        }
    }
}

/// A message as sent over the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    /// Message id.
    pub id: String,
    /// Author's user id.
    pub user_id: String,
    /// Author's display name.
    pub user_name: String,
    /// Content.
    pub content: String,
    /// Creation timestamp, RFC 3339.
    pub timestamp: String,
    /// Message kind.
    #[serde(rename = "type")]
    pub kind: String,
}

impl From<&Message> for WireMessage {
    fn from(m: &Message) -> Self {
        Self {
            id: m.id.clone(),
            user_id: m.user_id.clone(),
            user_name: m.sender_name.clone(),
            content: m.content.clone(),
            timestamp: m.created_at.to_rfc3339(),
            kind: m.kind.as_str().to_string(),
        }
    }
}

impl WireMessage {
    /// Parse the wire timestamp back to an instant.
    pub fn timestamp_parsed(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Events sent from server to client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Connection greeting.
    Connected {
        /// Human-readable confirmation.
        message: String,
    },
    /// Rejection of a single operation.
    Error {
        /// Machine-readable code.
        code: String,
        /// Human-readable message.
        message: String,
    },
    /// Join succeeded.
    #[serde(rename_all = "camelCase")]
    JoinedRoom {
        /// The joined room with live participants.
        room: WireRoom,
        /// The caller's own profile.
        user: WireUser,
    },
    /// Target room is full; re-issue the join against this room.
    #[serde(rename_all = "camelCase")]
    RoomRedirect {
        /// Id of the same-name room with spare capacity.
        new_room_id: String,
    },
    /// Another user joined the room.
    #[serde(rename_all = "camelCase")]
    UserJoined {
        /// The joining user.
        user: WireUser,
        /// New participant count.
        participant_count: usize,
    },
    /// A user left the room.
    #[serde(rename_all = "camelCase")]
    UserLeft {
        /// The leaving user id.
        user_id: String,
        /// New participant count.
        participant_count: usize,
        /// "idle" when the idle reaper evicted the user.
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Direct notice to a session evicted for inactivity.
    KickedForIdle,
    /// A new message in the room.
    NewMessage {
        /// The message.
        message: WireMessage,
    },
    /// Recent history delivered on join, oldest-to-newest.
    RecentMessages {
        /// The messages.
        messages: Vec<WireMessage>,
    },
    /// Online participants of a room changed.
    #[serde(rename_all = "camelCase")]
    SidebarPresence {
        /// Room id.
        room_id: String,
        /// Ids of online participants.
        online_user_ids: Vec<String>,
        /// Participant count.
        participant_count: usize,
    },
    /// Unread count for a room changed.
    #[serde(rename_all = "camelCase")]
    SidebarUnread {
        /// Room id.
        room_id: String,
        /// User the count belongs to.
        user_id: String,
        /// Messages newer than the user's last_seen, excluding their own.
        unread_count: i64,
    },
    /// Typing indicator state for the sidebar.
    #[serde(rename_all = "camelCase")]
    SidebarTyping {
        /// Room id.
        room_id: String,
        /// Display names of typing users.
        typing_user_names: Vec<String>,
    },
    /// Someone read a message.
    #[serde(rename_all = "camelCase")]
    MessageRead {
        /// Reader's user id.
        user_id: String,
        /// Message id.
        message_id: String,
    },
    /// The user's recent-chats list changed.
    #[serde(rename_all = "camelCase")]
    RecentChatsUpdated {
        /// User id.
        user_id: String,
    },
}

impl ServerEvent {
    /// Create an error event.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create the connection greeting.
    pub fn connected() -> Self {
        Self::Connected {
            message: "Connected to server successfully".to_string(),
        }
    }
}
