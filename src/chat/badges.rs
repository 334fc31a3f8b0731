//! Badge derivation and trust scoring.
//!
//! Badges are a pure function of a participant's stats; the core never
//! stores them, it recomputes after every stat change.

use chrono::{DateTime, Utc};

use super::types::Participant;

/// Trust score delta applied on every message send.
pub const SEND_TRUST_DELTA: f64 = 0.1;

/// A derived badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Badge {
    /// Everyone gets this.
    Member,
    /// Profile at least 7 days old.
    Regular,
    /// Profile at least 30 days old.
    Veteran,
    /// At least 100 messages.
    Active,
    /// At least 500 messages.
    Chatty,
    /// At least 1000 messages.
    Superstar,
    /// Trust score at least 50.
    Trusted,
    /// Trust score at least 80.
    Reliable,
    /// Trust score at least 95.
    Exemplary,
}

impl Badge {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Badge::Member => "member",
            Badge::Regular => "regular",
            Badge::Veteran => "veteran",
            Badge::Active => "active",
            Badge::Chatty => "chatty",
            Badge::Superstar => "superstar",
            Badge::Trusted => "trusted",
            Badge::Reliable => "reliable",
            Badge::Exemplary => "exemplary",
        }
    }
}

impl std::fmt::Display for Badge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Compute the badge set for a participant at the given instant.
pub fn calculate_badges(participant: &Participant, now: DateTime<Utc>) -> Vec<Badge> {
    let mut badges = vec![Badge::Member];

    let days_old = (now - participant.profile_age).num_days();
    if days_old >= 30 {
        badges.push(Badge::Veteran);
    }
    if days_old >= 7 {
        badges.push(Badge::Regular);
    }

    if participant.message_count >= 100 {
        badges.push(Badge::Active);
    }
    if participant.message_count >= 500 {
        badges.push(Badge::Chatty);
    }
    if participant.message_count >= 1000 {
        badges.push(Badge::Superstar);
    }

    if participant.trust_score >= 50.0 {
        badges.push(Badge::Trusted);
    }
    if participant.trust_score >= 80.0 {
        badges.push(Badge::Reliable);
    }
    if participant.trust_score >= 95.0 {
        badges.push(Badge::Exemplary);
    }

    badges
}

/// Apply a trust delta, clamp to [0, 100] and recompute badges.
///
/// The core only ever passes `SEND_TRUST_DELTA`; the signed parameter is
/// the hook for external scoring policies (moderation, mutes).
pub fn nudge_trust(participant: &mut Participant, delta: f64, now: DateTime<Utc>) {
    participant.trust_score = (participant.trust_score + delta).clamp(0.0, 100.0);
    participant.badges = calculate_badges(participant, now);
}
