//! Chat core for Parley.
//!
//! In-memory presence, room state, typing/read tracking, and the badge
//! and trust glue, plus the persistence repositories behind them. All
//! mutable state in this module is owned by the gateway dispatcher task.

pub mod badges;
pub mod presence;
pub mod repository;
pub mod rooms;
pub mod types;
pub mod typing;

pub use badges::{calculate_badges, nudge_trust, Badge, SEND_TRUST_DELTA};
pub use presence::PresenceRegistry;
pub use repository::{
    Membership, MembershipRepository, MessageRepository, NewRoom, RoomRepository,
};
pub use rooms::{CachedRoom, JoinOutcome, MessageBuffer, RoomStateCache};
pub use types::{Message, MessageKind, Participant, Room, RoomSnapshot};
pub use typing::TypingTracker;
