//! Persistence repositories for rooms, memberships, and messages.

use chrono::{DateTime, Utc};

use super::types::{Message, MessageKind, Room};
use crate::db::DbPool;
use crate::{ParleyError, Result};

/// Database row type for Room.
#[derive(sqlx::FromRow)]
struct RoomRow {
    id: String,
    name: String,
    max_participants: i64,
    created_at: String,
}

impl From<RoomRow> for Room {
    fn from(row: RoomRow) -> Self {
        let created_at = DateTime::parse_from_rfc3339(&row.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Self {
            id: row.id,
            name: row.name,
            max_participants: row.max_participants.max(0) as usize,
            created_at,
        }
    }
}

/// New room for insertion.
#[derive(Debug, Clone)]
pub struct NewRoom {
    /// Room id.
    pub id: String,
    /// Room name.
    pub name: String,
    /// Maximum number of participants.
    pub max_participants: usize,
}

impl NewRoom {
    /// Create a new room record with the default capacity.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            max_participants: 50,
        }
    }

    /// Set the capacity.
    pub fn with_capacity(mut self, max_participants: usize) -> Self {
        self.max_participants = max_participants;
        self
    }
}

/// Repository for room rows.
pub struct RoomRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> RoomRepository<'a> {
    /// Create a new RoomRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// List all rooms.
    pub async fn list_all(&self) -> Result<Vec<Room>> {
        let rows = sqlx::query_as::<_, RoomRow>(
            "SELECT id, name, max_participants, created_at FROM rooms ORDER BY id",
        )
        .fetch_all(self.pool)
        .await
        .map_err(|e| ParleyError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Room::from).collect())
    }

    /// Get a room by id.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Room>> {
        let row = sqlx::query_as::<_, RoomRow>(
            "SELECT id, name, max_participants, created_at FROM rooms WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| ParleyError::Database(e.to_string()))?;

        Ok(row.map(Room::from))
    }

    /// Create a room.
    ///
    /// Room creation is owned by the outer CRUD layer, which rejects
    /// duplicate names; this mirrors that contract for the seed path.
    /// Overflow rooms that intentionally share a name are inserted by
    /// that outer layer directly.
    pub async fn create(&self, new_room: &NewRoom) -> Result<Room> {
        let existing: Option<String> = sqlx::query_scalar("SELECT id FROM rooms WHERE name = ?")
            .bind(&new_room.name)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| ParleyError::Database(e.to_string()))?;

        if existing.is_some() {
            return Err(ParleyError::Conflict(format!(
                "room name '{}' already exists",
                new_room.name
            )));
        }

        sqlx::query(
            "INSERT INTO rooms (id, name, max_participants, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&new_room.id)
        .bind(&new_room.name)
        .bind(new_room.max_participants as i64)
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool)
        .await
        .map_err(|e| ParleyError::Database(e.to_string()))?;

        self.get_by_id(&new_room.id)
            .await?
            .ok_or_else(|| ParleyError::NotFound("room".to_string()))
    }

    /// Number of rooms. Used to decide whether to seed defaults.
    pub async fn count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM rooms")
            .fetch_one(self.pool)
            .await
            .map_err(|e| ParleyError::Database(e.to_string()))
    }
}

/// A room membership row.
#[derive(Debug, Clone)]
pub struct Membership {
    /// User id.
    pub user_id: String,
    /// Room id.
    pub room_id: String,
    /// Whether the membership shows in recent chats.
    pub is_active: bool,
    /// Last time the user saw the room.
    pub last_seen: DateTime<Utc>,
}

/// Database row type for Membership.
#[derive(sqlx::FromRow)]
struct MembershipRow {
    user_id: String,
    room_id: String,
    is_active: i64,
    last_seen: String,
}

impl From<MembershipRow> for Membership {
    fn from(row: MembershipRow) -> Self {
        let last_seen = DateTime::parse_from_rfc3339(&row.last_seen)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Self {
            user_id: row.user_id,
            room_id: row.room_id,
            is_active: row.is_active != 0,
            last_seen,
        }
    }
}

/// Repository for (user, room) membership rows.
pub struct MembershipRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> MembershipRepository<'a> {
    /// Create a new MembershipRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create or reactivate a membership on join.
    pub async fn upsert_active(
        &self,
        user_id: &str,
        room_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO room_members (user_id, room_id, is_active, last_seen)
             VALUES (?, ?, 1, ?)
             ON CONFLICT(user_id, room_id) DO UPDATE SET
                 is_active = 1,
                 last_seen = excluded.last_seen",
        )
        .bind(user_id)
        .bind(room_id)
        .bind(now.to_rfc3339())
        .execute(self.pool)
        .await
        .map_err(|e| ParleyError::Database(e.to_string()))?;

        Ok(())
    }

    /// Deactivate a membership (leave, idle kick, remove-from-recent).
    pub async fn set_inactive(&self, user_id: &str, room_id: &str) -> Result<()> {
        sqlx::query("UPDATE room_members SET is_active = 0 WHERE user_id = ? AND room_id = ?")
            .bind(user_id)
            .bind(room_id)
            .execute(self.pool)
            .await
            .map_err(|e| ParleyError::Database(e.to_string()))?;

        Ok(())
    }

    /// Advance last_seen (the read-room path).
    pub async fn touch_last_seen(
        &self,
        user_id: &str,
        room_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("UPDATE room_members SET last_seen = ? WHERE user_id = ? AND room_id = ?")
            .bind(now.to_rfc3339())
            .bind(user_id)
            .bind(room_id)
            .execute(self.pool)
            .await
            .map_err(|e| ParleyError::Database(e.to_string()))?;

        Ok(())
    }

    /// Find a membership.
    pub async fn find(&self, user_id: &str, room_id: &str) -> Result<Option<Membership>> {
        let row = sqlx::query_as::<_, MembershipRow>(
            "SELECT user_id, room_id, is_active, last_seen
             FROM room_members WHERE user_id = ? AND room_id = ?",
        )
        .bind(user_id)
        .bind(room_id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| ParleyError::Database(e.to_string()))?;

        Ok(row.map(Membership::from))
    }

    /// Ids of users with an active membership in a room.
    pub async fn active_user_ids(&self, room_id: &str) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar(
            "SELECT user_id FROM room_members WHERE room_id = ? AND is_active = 1",
        )
        .bind(room_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| ParleyError::Database(e.to_string()))?;

        Ok(ids)
    }
}

/// Database row type for Message.
#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    room_id: String,
    user_id: String,
    sender_name: String,
    content: String,
    kind: String,
    created_at: String,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        let created_at = DateTime::parse_from_rfc3339(&row.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Self {
            id: row.id,
            room_id: row.room_id,
            user_id: row.user_id,
            sender_name: row.sender_name,
            content: row.content,
            kind: MessageKind::parse(&row.kind),
            created_at,
        }
    }
}

/// Repository for message rows.
pub struct MessageRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> MessageRepository<'a> {
    /// Create a new MessageRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Insert a message.
    pub async fn insert(&self, message: &Message) -> Result<()> {
        sqlx::query(
            "INSERT INTO messages (id, room_id, user_id, sender_name, content, kind, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.id)
        .bind(&message.room_id)
        .bind(&message.user_id)
        .bind(&message.sender_name)
        .bind(&message.content)
        .bind(message.kind.as_str())
        .bind(message.created_at.to_rfc3339())
        .execute(self.pool)
        .await
        .map_err(|e| ParleyError::Database(e.to_string()))?;

        Ok(())
    }

    /// The most recent `limit` messages in a room, oldest-to-newest.
    pub async fn recent(&self, room_id: &str, limit: usize) -> Result<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT id, room_id, user_id, sender_name, content, kind, created_at
             FROM messages WHERE room_id = ?
             ORDER BY created_at DESC, id DESC
             LIMIT ?",
        )
        .bind(room_id)
        .bind(limit as i64)
        .fetch_all(self.pool)
        .await
        .map_err(|e| ParleyError::Database(e.to_string()))?;

        let mut messages: Vec<Message> = rows.into_iter().map(Message::from).collect();
        messages.reverse();
        Ok(messages)
    }

    /// Count messages in a room newer than `after`, excluding those
    /// authored by `exclude_user`. The unread-count query.
    pub async fn count_since(
        &self,
        room_id: &str,
        after: DateTime<Utc>,
        exclude_user: &str,
    ) -> Result<i64> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages
             WHERE room_id = ? AND created_at > ? AND user_id != ?",
        )
        .bind(room_id)
        .bind(after.to_rfc3339())
        .bind(exclude_user)
        .fetch_one(self.pool)
        .await
        .map_err(|e| ParleyError::Database(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, NewUser, UserRepository};

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    async fn seed_user(db: &Database, id: &str) {
        UserRepository::new(db.pool())
            .upsert(&NewUser::new(id, format!("user-{id}")))
            .await
            .unwrap();
    }

    async fn seed_room(db: &Database, id: &str, name: &str) -> Room {
        RoomRepository::new(db.pool())
            .create(&NewRoom::new(id, name).with_capacity(10))
            .await
            .unwrap()
    }

    fn message_at(room_id: &str, user_id: &str, content: &str, at: DateTime<Utc>) -> Message {
        Message::new(room_id, user_id, format!("user-{user_id}"), content, MessageKind::Text, at)
    }

    #[tokio::test]
    async fn test_room_create_and_list() {
        let db = setup().await;
        let repo = RoomRepository::new(db.pool());

        let room = repo.create(&NewRoom::new("general", "general").with_capacity(2)).await.unwrap();
        assert_eq!(room.id, "general");
        assert_eq!(room.max_participants, 2);

        let rooms = repo.list_all().await.unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_room_create_duplicate_name_conflicts() {
        let db = setup().await;
        let repo = RoomRepository::new(db.pool());

        repo.create(&NewRoom::new("general", "general")).await.unwrap();
        let err = repo.create(&NewRoom::new("general-2", "general")).await.unwrap_err();
        assert!(matches!(err, ParleyError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_room_get_by_id_not_found() {
        let db = setup().await;
        let repo = RoomRepository::new(db.pool());
        assert!(repo.get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_membership_upsert_and_find() {
        let db = setup().await;
        seed_user(&db, "u1").await;
        seed_room(&db, "r1", "Room 1").await;

        let repo = MembershipRepository::new(db.pool());
        let t0 = Utc::now();

        repo.upsert_active("u1", "r1", t0).await.unwrap();
        let membership = repo.find("u1", "r1").await.unwrap().unwrap();
        assert!(membership.is_active);
        assert_eq!(membership.last_seen.to_rfc3339(), t0.to_rfc3339());

        // Upsert again reactivates and advances last_seen.
        repo.set_inactive("u1", "r1").await.unwrap();
        let t1 = t0 + chrono::Duration::seconds(5);
        repo.upsert_active("u1", "r1", t1).await.unwrap();

        let membership = repo.find("u1", "r1").await.unwrap().unwrap();
        assert!(membership.is_active);
        assert_eq!(membership.last_seen.to_rfc3339(), t1.to_rfc3339());
    }

    #[tokio::test]
    async fn test_membership_active_user_ids() {
        let db = setup().await;
        seed_user(&db, "u1").await;
        seed_user(&db, "u2").await;
        seed_room(&db, "r1", "Room 1").await;

        let repo = MembershipRepository::new(db.pool());
        let now = Utc::now();
        repo.upsert_active("u1", "r1", now).await.unwrap();
        repo.upsert_active("u2", "r1", now).await.unwrap();
        repo.set_inactive("u2", "r1").await.unwrap();

        let ids = repo.active_user_ids("r1").await.unwrap();
        assert_eq!(ids, vec!["u1".to_string()]);
    }

    #[tokio::test]
    async fn test_membership_touch_last_seen() {
        let db = setup().await;
        seed_user(&db, "u1").await;
        seed_room(&db, "r1", "Room 1").await;

        let repo = MembershipRepository::new(db.pool());
        let t0 = Utc::now();
        repo.upsert_active("u1", "r1", t0).await.unwrap();

        let t1 = t0 + chrono::Duration::seconds(60);
        repo.touch_last_seen("u1", "r1", t1).await.unwrap();

        let membership = repo.find("u1", "r1").await.unwrap().unwrap();
        assert_eq!(membership.last_seen.to_rfc3339(), t1.to_rfc3339());
    }

    #[tokio::test]
    async fn test_message_insert_and_recent_order() {
        let db = setup().await;
        seed_user(&db, "u1").await;
        seed_room(&db, "r1", "Room 1").await;

        let repo = MessageRepository::new(db.pool());
        let t0 = Utc::now();
        for i in 0..5 {
            let msg = message_at("r1", "u1", &format!("m{i}"), t0 + chrono::Duration::seconds(i));
            repo.insert(&msg).await.unwrap();
        }

        let recent = repo.recent("r1", 3).await.unwrap();
        let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn test_message_count_since_excludes_author() {
        let db = setup().await;
        seed_user(&db, "alice").await;
        seed_user(&db, "bob").await;
        seed_room(&db, "r1", "Room 1").await;

        let repo = MessageRepository::new(db.pool());
        let t0 = Utc::now();

        // Bob reads the room at t0, then three messages from Alice and
        // one of Bob's own arrive.
        for i in 1..=3 {
            repo.insert(&message_at("r1", "alice", &format!("a{i}"), t0 + chrono::Duration::seconds(i)))
                .await
                .unwrap();
        }
        repo.insert(&message_at("r1", "bob", "b1", t0 + chrono::Duration::seconds(4)))
            .await
            .unwrap();

        let unread = repo.count_since("r1", t0, "bob").await.unwrap();
        assert_eq!(unread, 3);

        // Messages at or before the read mark don't count.
        let unread = repo
            .count_since("r1", t0 + chrono::Duration::seconds(3), "bob")
            .await
            .unwrap();
        assert_eq!(unread, 0);
    }
}
