//! User repository for Parley.

use chrono::Utc;
use sqlx::SqlitePool;

use super::user::{NewUser, User, UserRow};
use crate::{ParleyError, Result};

/// Repository for user CRUD operations.
pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    /// Create a new UserRepository with the given database pool reference.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a user, or update the display name if the id already exists.
    ///
    /// Trust score and message count are preserved on conflict; the
    /// canonical stats belong to the storage row, not the caller.
    pub async fn upsert(&self, new_user: &NewUser) -> Result<User> {
        sqlx::query(
            "INSERT INTO users (id, display_name, created_at)
             VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET display_name = excluded.display_name",
        )
        .bind(&new_user.id)
        .bind(&new_user.display_name)
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool)
        .await
        .map_err(|e| ParleyError::Database(e.to_string()))?;

        self.get_by_id(&new_user.id)
            .await?
            .ok_or_else(|| ParleyError::NotFound("user".to_string()))
    }

    /// Get a user by id.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, display_name, trust_score, message_count, created_at
             FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| ParleyError::Database(e.to_string()))?;

        Ok(row.map(User::from))
    }

    /// Record a sent message: message_count + 1 and a clamped trust delta.
    pub async fn bump_message_stats(&self, id: &str, trust_delta: f64) -> Result<()> {
        sqlx::query(
            "UPDATE users
             SET message_count = message_count + 1,
                 trust_score = MAX(0.0, MIN(100.0, trust_score + ?))
             WHERE id = ?",
        )
        .bind(trust_delta)
        .bind(id)
        .execute(self.pool)
        .await
        .map_err(|e| ParleyError::Database(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    #[tokio::test]
    async fn test_upsert_creates_user() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = UserRepository::new(db.pool());

        let user = repo.upsert(&NewUser::new("u1", "Alice")).await.unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(user.display_name, "Alice");
        assert_eq!(user.trust_score, 50.0);
        assert_eq!(user.message_count, 0);
    }

    #[tokio::test]
    async fn test_upsert_updates_name_preserves_stats() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = UserRepository::new(db.pool());

        repo.upsert(&NewUser::new("u1", "Alice")).await.unwrap();
        repo.bump_message_stats("u1", 0.1).await.unwrap();

        let user = repo.upsert(&NewUser::new("u1", "Alicia")).await.unwrap();
        assert_eq!(user.display_name, "Alicia");
        assert_eq!(user.message_count, 1);
        assert!((user.trust_score - 50.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_get_by_id_not_found() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = UserRepository::new(db.pool());

        let user = repo.get_by_id("missing").await.unwrap();
        assert!(user.is_none());
    }

    #[tokio::test]
    async fn test_bump_message_stats_clamps_at_100() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = UserRepository::new(db.pool());

        repo.upsert(&NewUser::new("u1", "Alice")).await.unwrap();
        repo.bump_message_stats("u1", 75.0).await.unwrap();
        repo.bump_message_stats("u1", 75.0).await.unwrap();

        let user = repo.get_by_id("u1").await.unwrap().unwrap();
        assert_eq!(user.trust_score, 100.0);
        assert_eq!(user.message_count, 2);
    }

    #[tokio::test]
    async fn test_bump_message_stats_clamps_at_0() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = UserRepository::new(db.pool());

        repo.upsert(&NewUser::new("u1", "Alice")).await.unwrap();
        repo.bump_message_stats("u1", -200.0).await.unwrap();

        let user = repo.get_by_id("u1").await.unwrap().unwrap();
        assert_eq!(user.trust_score, 0.0);
    }
}
