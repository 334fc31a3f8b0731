//! User row types for Parley.

use chrono::{DateTime, Utc};

/// A user as stored in the database.
///
/// This is the canonical copy; while a user is connected the presence
/// registry holds a live profile derived from it.
#[derive(Debug, Clone)]
pub struct User {
    /// Externally issued opaque id.
    pub id: String,
    /// Display name.
    pub display_name: String,
    /// Trust score, bounded to [0, 100].
    pub trust_score: f64,
    /// Number of messages sent.
    pub message_count: i64,
    /// Profile creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Database row type for User.
#[derive(sqlx::FromRow)]
pub(crate) struct UserRow {
    pub id: String,
    pub display_name: String,
    pub trust_score: f64,
    pub message_count: i64,
    pub created_at: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        let created_at = DateTime::parse_from_rfc3339(&row.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Self {
            id: row.id,
            display_name: row.display_name,
            trust_score: row.trust_score,
            message_count: row.message_count,
            created_at,
        }
    }
}

/// New user for insertion.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Externally issued opaque id.
    pub id: String,
    /// Display name.
    pub display_name: String,
}

impl NewUser {
    /// Create a new user record.
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user() {
        let user = NewUser::new("u1", "Alice");
        assert_eq!(user.id, "u1");
        assert_eq!(user.display_name, "Alice");
    }

    #[test]
    fn test_user_row_conversion() {
        let row = UserRow {
            id: "u1".to_string(),
            display_name: "Alice".to_string(),
            trust_score: 50.0,
            message_count: 3,
            created_at: "2024-01-01T00:00:00+00:00".to_string(),
        };

        let user: User = row.into();
        assert_eq!(user.id, "u1");
        assert_eq!(user.trust_score, 50.0);
        assert_eq!(user.message_count, 3);
        assert_eq!(user.created_at.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_user_row_bad_timestamp_falls_back() {
        let row = UserRow {
            id: "u1".to_string(),
            display_name: "Alice".to_string(),
            trust_score: 50.0,
            message_count: 0,
            created_at: "not a timestamp".to_string(),
        };

        // Should not panic; falls back to now.
        let user: User = row.into();
        assert_eq!(user.id, "u1");
    }
}
