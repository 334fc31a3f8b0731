//! Presence registry: which user is connected on which session.
//!
//! Maps user ids to transport session ids in both directions and tracks
//! last-activity timestamps. The registry is a plain struct owned by the
//! gateway dispatcher task; that single-task ownership is the
//! serialization, so no locking happens here.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::types::Participant;

/// Per-user presence entry.
#[derive(Debug, Clone)]
struct Binding {
    session_id: String,
    last_activity: DateTime<Utc>,
}

/// Registry of connected users.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    /// user id -> session binding.
    bindings: HashMap<String, Binding>,
    /// session id -> user id (reverse lookup for disconnects).
    sessions: HashMap<String, String>,
    /// Live profiles of connected users.
    profiles: HashMap<String, Participant>,
}

impl PresenceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a user to a session, overwriting any prior binding.
    ///
    /// Only one session per user is modeled; a new binding displaces the
    /// old session's reverse mapping so user-addressed delivery follows
    /// the latest connection.
    pub fn register(&mut self, user_id: &str, session_id: &str, now: DateTime<Utc>) {
        if let Some(old) = self.bindings.get(user_id) {
            if old.session_id != session_id {
                debug!(
                    user_id,
                    old_session = %old.session_id,
                    new_session = %session_id,
                    "Rebinding user to new session"
                );
                self.sessions.remove(&old.session_id);
            }
        }

        self.bindings.insert(
            user_id.to_string(),
            Binding {
                session_id: session_id.to_string(),
                last_activity: now,
            },
        );
        self.sessions
            .insert(session_id.to_string(), user_id.to_string());
    }

    /// Update the last-activity timestamp. No-op for unknown users.
    pub fn touch(&mut self, user_id: &str, now: DateTime<Utc>) {
        if let Some(binding) = self.bindings.get_mut(user_id) {
            binding.last_activity = now;
        }
    }

    /// Session currently bound to a user.
    pub fn session_for(&self, user_id: &str) -> Option<&str> {
        self.bindings.get(user_id).map(|b| b.session_id.as_str())
    }

    /// User bound to a session.
    pub fn user_for(&self, session_id: &str) -> Option<&str> {
        self.sessions.get(session_id).map(String::as_str)
    }

    /// Last recorded activity for a user.
    pub fn last_activity(&self, user_id: &str) -> Option<DateTime<Utc>> {
        self.bindings.get(user_id).map(|b| b.last_activity)
    }

    /// Remove a user's binding (both directions) and profile. Idempotent.
    pub fn unregister(&mut self, user_id: &str) {
        if let Some(binding) = self.bindings.remove(user_id) {
            self.sessions.remove(&binding.session_id);
        }
        self.profiles.remove(user_id);
    }

    /// Store or replace the live profile of a connected user.
    pub fn put_profile(&mut self, profile: Participant) {
        self.profiles.insert(profile.id.clone(), profile);
    }

    /// Live profile of a connected user.
    pub fn profile(&self, user_id: &str) -> Option<&Participant> {
        self.profiles.get(user_id)
    }

    /// Mutable live profile of a connected user.
    pub fn profile_mut(&mut self, user_id: &str) -> Option<&mut Participant> {
        self.profiles.get_mut(user_id)
    }

    /// Users whose activity age exceeds the threshold at `now`.
    pub fn idle_users(&self, threshold: Duration, now: DateTime<Utc>) -> Vec<String> {
        let threshold = chrono::Duration::from_std(threshold).unwrap_or(chrono::Duration::MAX);
        self.bindings
            .iter()
            .filter(|(_, b)| now - b.last_activity > threshold)
            .map(|(user_id, _)| user_id.clone())
            .collect()
    }

    /// Number of tracked users.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = PresenceRegistry::new();
        let now = Utc::now();

        registry.register("u1", "s1", now);
        assert_eq!(registry.session_for("u1"), Some("s1"));
        assert_eq!(registry.user_for("s1"), Some("u1"));
        assert_eq!(registry.last_activity("u1"), Some(now));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_overwrites_previous_session() {
        let mut registry = PresenceRegistry::new();
        let now = Utc::now();

        registry.register("u1", "s1", now);
        registry.register("u1", "s2", now);

        assert_eq!(registry.session_for("u1"), Some("s2"));
        assert_eq!(registry.user_for("s2"), Some("u1"));
        // The displaced session no longer resolves.
        assert_eq!(registry.user_for("s1"), None);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_touch_updates_activity() {
        let mut registry = PresenceRegistry::new();
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(10);

        registry.register("u1", "s1", t0);
        registry.touch("u1", t1);
        assert_eq!(registry.last_activity("u1"), Some(t1));
    }

    #[test]
    fn test_touch_unknown_user_is_noop() {
        let mut registry = PresenceRegistry::new();
        registry.touch("ghost", Utc::now());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister_idempotent() {
        let mut registry = PresenceRegistry::new();
        let now = Utc::now();

        registry.register("u1", "s1", now);
        registry.unregister("u1");
        assert_eq!(registry.session_for("u1"), None);
        assert_eq!(registry.user_for("s1"), None);

        // Second call must not panic or error.
        registry.unregister("u1");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_profiles_follow_registration() {
        let mut registry = PresenceRegistry::new();
        let now = Utc::now();

        registry.register("u1", "s1", now);
        registry.put_profile(Participant::new("u1", "Alice", now));
        assert_eq!(registry.profile("u1").unwrap().name, "Alice");

        registry.profile_mut("u1").unwrap().message_count = 5;
        assert_eq!(registry.profile("u1").unwrap().message_count, 5);

        registry.unregister("u1");
        assert!(registry.profile("u1").is_none());
    }

    #[test]
    fn test_idle_users() {
        let mut registry = PresenceRegistry::new();
        let t0 = Utc::now();

        registry.register("idle", "s1", t0);
        registry.register("fresh", "s2", t0 + chrono::Duration::seconds(100));

        let now = t0 + chrono::Duration::seconds(130);
        let idle = registry.idle_users(Duration::from_secs(60), now);

        assert_eq!(idle, vec!["idle".to_string()]);
    }

    #[test]
    fn test_idle_users_at_exact_threshold_not_idle() {
        let mut registry = PresenceRegistry::new();
        let t0 = Utc::now();

        registry.register("u1", "s1", t0);

        // Exactly at the threshold: age must *exceed* it.
        let now = t0 + chrono::Duration::seconds(60);
        let idle = registry.idle_users(Duration::from_secs(60), now);
        assert!(idle.is_empty());
    }
}
