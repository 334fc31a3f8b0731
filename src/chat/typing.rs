//! Ephemeral typing indicators and read receipts.
//!
//! Typing entries clear on stop-typing, disconnect, or idle eviction
//! only; there is no independent timeout (the client debounces its own
//! stop-typing, so a vanished client can leave a stale indicator until
//! its disconnect is observed).

use std::collections::{HashMap, HashSet};

/// Per-room typing sets and per-message read-receipt sets.
#[derive(Debug, Default)]
pub struct TypingTracker {
    /// room id -> ids of users currently typing.
    typing: HashMap<String, HashSet<String>>,
    /// message id -> ids of users who read it.
    receipts: HashMap<String, HashSet<String>>,
}

impl TypingTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a user as typing in a room.
    pub fn start(&mut self, room_id: &str, user_id: &str) {
        self.typing
            .entry(room_id.to_string())
            .or_default()
            .insert(user_id.to_string());
    }

    /// Clear a user's typing state in a room. Idempotent.
    pub fn stop(&mut self, room_id: &str, user_id: &str) {
        if let Some(set) = self.typing.get_mut(room_id) {
            set.remove(user_id);
            if set.is_empty() {
                self.typing.remove(room_id);
            }
        }
    }

    /// Ids of users typing in a room.
    pub fn typing_in(&self, room_id: &str) -> Vec<String> {
        self.typing
            .get(room_id)
            .map(|set| {
                let mut ids: Vec<String> = set.iter().cloned().collect();
                ids.sort();
                ids
            })
            .unwrap_or_default()
    }

    /// Remove a user from every room's typing set.
    ///
    /// The disconnect/idle-eviction path. Returns the rooms that changed.
    pub fn clear_user(&mut self, user_id: &str) -> Vec<String> {
        let mut cleared = Vec::new();
        self.typing.retain(|room_id, set| {
            if set.remove(user_id) {
                cleared.push(room_id.clone());
            }
            !set.is_empty()
        });
        cleared.sort();
        cleared
    }

    /// Record that a user read a message. Append-only.
    pub fn mark_read(&mut self, message_id: &str, user_id: &str) {
        self.receipts
            .entry(message_id.to_string())
            .or_default()
            .insert(user_id.to_string());
    }

    /// Ids of users who read a message.
    pub fn readers(&self, message_id: &str) -> Vec<String> {
        self.receipts
            .get(message_id)
            .map(|set| {
                let mut ids: Vec<String> = set.iter().cloned().collect();
                ids.sort();
                ids
            })
            .unwrap_or_default()
    }

    /// Drop receipts for a message that fell off the ring buffer.
    pub fn forget_message(&mut self, message_id: &str) {
        self.receipts.remove(message_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_stop() {
        let mut tracker = TypingTracker::new();

        tracker.start("r1", "u1");
        tracker.start("r1", "u2");
        assert_eq!(tracker.typing_in("r1"), vec!["u1", "u2"]);

        tracker.stop("r1", "u1");
        assert_eq!(tracker.typing_in("r1"), vec!["u2"]);
    }

    #[test]
    fn test_start_is_set_semantics() {
        let mut tracker = TypingTracker::new();
        tracker.start("r1", "u1");
        tracker.start("r1", "u1");
        assert_eq!(tracker.typing_in("r1"), vec!["u1"]);
    }

    #[test]
    fn test_stop_unknown_is_noop() {
        let mut tracker = TypingTracker::new();
        tracker.stop("r1", "u1");
        assert!(tracker.typing_in("r1").is_empty());
    }

    #[test]
    fn test_clear_user_across_rooms() {
        let mut tracker = TypingTracker::new();
        tracker.start("r1", "u1");
        tracker.start("r2", "u1");
        tracker.start("r2", "u2");

        let cleared = tracker.clear_user("u1");
        assert_eq!(cleared, vec!["r1", "r2"]);
        assert!(tracker.typing_in("r1").is_empty());
        assert_eq!(tracker.typing_in("r2"), vec!["u2"]);

        assert!(tracker.clear_user("u1").is_empty());
    }

    #[test]
    fn test_read_receipts_append_only() {
        let mut tracker = TypingTracker::new();

        tracker.mark_read("m1", "u1");
        tracker.mark_read("m1", "u2");
        tracker.mark_read("m1", "u1");

        assert_eq!(tracker.readers("m1"), vec!["u1", "u2"]);
        assert!(tracker.readers("m2").is_empty());
    }

    #[test]
    fn test_forget_message_drops_receipts() {
        let mut tracker = TypingTracker::new();
        tracker.mark_read("m1", "u1");

        tracker.forget_message("m1");
        assert!(tracker.readers("m1").is_empty());
    }
}
