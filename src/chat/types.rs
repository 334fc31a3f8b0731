//! Core domain types for the chat service.

use chrono::{DateTime, Utc};

use super::badges::Badge;

/// Kind of chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Plain text message.
    Text,
    /// Image message.
    Image,
    /// Video message.
    Video,
}

impl MessageKind {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Video => "video",
        }
    }

    /// Parse from a string, defaulting to Text for unknown values.
    pub fn parse(s: &str) -> Self {
        match s {
            "image" => MessageKind::Image,
            "video" => MessageKind::Video,
            _ => MessageKind::Text,
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A chat message.
///
/// Immutable once created; the id is assigned server-side (UUIDv7, so ids
/// sort in creation order closely enough for display).
#[derive(Debug, Clone)]
pub struct Message {
    /// Server-assigned id.
    pub id: String,
    /// Room the message was sent to.
    pub room_id: String,
    /// Author's user id.
    pub user_id: String,
    /// Author's display name at send time.
    pub sender_name: String,
    /// Message content.
    pub content: String,
    /// Message kind.
    pub kind: MessageKind,
    /// Timestamp when the message was created.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a new message with a fresh id and the given timestamp.
    pub fn new(
        room_id: impl Into<String>,
        user_id: impl Into<String>,
        sender_name: impl Into<String>,
        content: impl Into<String>,
        kind: MessageKind,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            room_id: room_id.into(),
            user_id: user_id.into(),
            sender_name: sender_name.into(),
            content: content.into(),
            kind,
            created_at,
        }
    }
}

/// A connected user's live profile.
///
/// Owned by the presence registry while the user is connected; the
/// canonical copy lives in the users table.
#[derive(Debug, Clone)]
pub struct Participant {
    /// Externally issued user id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Derived badge set.
    pub badges: Vec<Badge>,
    /// Trust score, bounded to [0, 100].
    pub trust_score: f64,
    /// Profile creation timestamp.
    pub profile_age: DateTime<Utc>,
    /// Number of messages sent.
    pub message_count: i64,
    /// When this participant connected.
    pub joined_at: DateTime<Utc>,
}

impl Participant {
    /// Create a fresh participant profile with a neutral trust score.
    pub fn new(id: impl Into<String>, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            badges: Vec::new(),
            trust_score: 50.0,
            profile_age: now,
            message_count: 0,
            joined_at: now,
        }
    }
}

/// Room metadata as mirrored from storage.
#[derive(Debug, Clone)]
pub struct Room {
    /// Room id.
    pub id: String,
    /// Room name. Not unique: overflow rooms share a name.
    pub name: String,
    /// Maximum number of participants.
    pub max_participants: usize,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Snapshot of a room handed to a joining session.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    /// Room metadata.
    pub room: Room,
    /// Current live participants, join order.
    pub participants: Vec<Participant>,
}
