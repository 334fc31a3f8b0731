//! Room state cache: the in-memory mirror of rooms, their live
//! participants, and a bounded buffer of recent messages.
//!
//! Storage stays canonical for room metadata and message history; this
//! cache exists so the hot join/send/broadcast path never waits on the
//! database. Like the presence registry it is owned by the dispatcher
//! task and does no locking of its own.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};

use super::repository::RoomRepository;
use super::types::{Message, Participant, Room, RoomSnapshot};
use crate::db::DbPool;

/// Fixed-capacity ring buffer of recent messages.
///
/// Oldest entries are evicted first; append and evict are O(1).
#[derive(Debug)]
pub struct MessageBuffer {
    messages: VecDeque<Message>,
    capacity: usize,
}

impl MessageBuffer {
    /// Create a buffer with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    /// Append a message, returning the evicted message's id if the
    /// buffer was full.
    pub fn push(&mut self, message: Message) -> Option<String> {
        let evicted = if self.messages.len() == self.capacity {
            self.messages.pop_front().map(|m| m.id)
        } else {
            None
        };
        self.messages.push_back(message);
        evicted
    }

    /// The newest `limit` messages, oldest-to-newest.
    pub fn recent(&self, limit: usize) -> Vec<Message> {
        let skip = self.messages.len().saturating_sub(limit);
        self.messages.iter().skip(skip).cloned().collect()
    }

    /// Number of buffered messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// A cached room: metadata plus live state.
#[derive(Debug)]
pub struct CachedRoom {
    room: Room,
    participants: Vec<Participant>,
    messages: MessageBuffer,
}

impl CachedRoom {
    fn new(room: Room, buffer_cap: usize) -> Self {
        Self {
            room,
            participants: Vec::new(),
            messages: MessageBuffer::new(buffer_cap),
        }
    }

    /// Room metadata.
    pub fn room(&self) -> &Room {
        &self.room
    }

    /// Live participants in join order.
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// Number of live participants.
    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    /// Whether a user is currently in this room.
    pub fn contains(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p.id == user_id)
    }

    /// Ids of the online participants.
    pub fn online_user_ids(&self) -> Vec<String> {
        self.participants.iter().map(|p| p.id.clone()).collect()
    }

    fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room: self.room.clone(),
            participants: self.participants.clone(),
        }
    }
}

/// Outcome of a join attempt.
#[derive(Debug)]
pub enum JoinOutcome {
    /// Joined; snapshot for the joining session.
    Joined(RoomSnapshot),
    /// Room full, but a same-name room has spare capacity. No state was
    /// mutated; the caller must re-issue the join against the alternative.
    Redirect {
        /// Id of the alternative room.
        room_id: String,
    },
    /// Room full and no same-name alternative exists. No mutation.
    Full,
    /// Room not in the cache. No mutation.
    NotFound,
}

/// In-memory cache of all rooms.
#[derive(Debug)]
pub struct RoomStateCache {
    rooms: HashMap<String, CachedRoom>,
    buffer_cap: usize,
}

impl RoomStateCache {
    /// Create an empty cache whose per-room buffers hold `buffer_cap`
    /// messages.
    pub fn new(buffer_cap: usize) -> Self {
        Self {
            rooms: HashMap::new(),
            buffer_cap,
        }
    }

    /// Insert a room with empty live state. No-op if already cached.
    pub fn insert_room(&mut self, room: Room) -> bool {
        if self.rooms.contains_key(&room.id) {
            return false;
        }
        self.rooms.insert(room.id.clone(), CachedRoom::new(room, self.buffer_cap));
        true
    }

    /// Populate the cache from storage at startup.
    ///
    /// A storage failure is logged and leaves the cache as-is; the
    /// process keeps serving whatever did load.
    pub async fn load_all(&mut self, pool: &DbPool) -> usize {
        match RoomRepository::new(pool).list_all().await {
            Ok(rooms) => {
                let mut added = 0;
                for room in rooms {
                    if self.insert_room(room) {
                        added += 1;
                    }
                }
                debug!("Loaded {} rooms from storage", added);
                added
            }
            Err(e) => {
                error!(error = %e, "Failed to load rooms from storage");
                0
            }
        }
    }

    /// Add rooms present in storage but absent from the cache.
    ///
    /// Never removes or mutates existing entries, so out-of-band room
    /// creation is picked up without disturbing live state.
    pub async fn refresh(&mut self, pool: &DbPool) -> usize {
        self.load_all(pool).await
    }

    /// Get a cached room.
    pub fn get(&self, room_id: &str) -> Option<&CachedRoom> {
        self.rooms.get(room_id)
    }

    /// Number of cached rooms.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Attempt to join a room.
    ///
    /// On success the participant is removed from every other room first,
    /// so a user is live in at most one room. Capacity rejections and
    /// redirects mutate nothing.
    pub fn join(&mut self, room_id: &str, participant: Participant, now: DateTime<Utc>) -> JoinOutcome {
        let (name, max) = match self.rooms.get(room_id) {
            Some(cached) => (cached.room.name.clone(), cached.room.max_participants),
            None => return JoinOutcome::NotFound,
        };

        let count = self.rooms[room_id].participant_count();
        if count >= max {
            // Overflow rooms share a name; send the caller to one with a
            // spare seat if it exists.
            let mut alternatives: Vec<&CachedRoom> = self
                .rooms
                .values()
                .filter(|c| {
                    c.room.id != room_id
                        && c.room.name == name
                        && c.participant_count() < c.room.max_participants
                })
                .collect();
            alternatives.sort_by(|a, b| a.room.id.cmp(&b.room.id));

            return match alternatives.first() {
                Some(alt) => JoinOutcome::Redirect {
                    room_id: alt.room.id.clone(),
                },
                None => JoinOutcome::Full,
            };
        }

        self.remove_everywhere(&participant.id);

        let cached = self.rooms.get_mut(room_id).expect("room checked above");
        let mut participant = participant;
        participant.joined_at = now;
        cached.participants.push(participant);

        JoinOutcome::Joined(cached.snapshot())
    }

    /// Remove a user from one room.
    ///
    /// Returns the new participant count if the user was present;
    /// idempotent otherwise.
    pub fn leave(&mut self, room_id: &str, user_id: &str) -> Option<usize> {
        let cached = self.rooms.get_mut(room_id)?;
        let before = cached.participants.len();
        cached.participants.retain(|p| p.id != user_id);
        if cached.participants.len() < before {
            Some(cached.participants.len())
        } else {
            None
        }
    }

    /// Remove a user from every room they occupy.
    ///
    /// Returns (room id, new participant count) for each room actually
    /// left. Used by the disconnect and idle-eviction paths.
    pub fn leave_all(&mut self, user_id: &str) -> Vec<(String, usize)> {
        let mut left = Vec::new();
        for (room_id, cached) in self.rooms.iter_mut() {
            let before = cached.participants.len();
            cached.participants.retain(|p| p.id != user_id);
            if cached.participants.len() < before {
                left.push((room_id.clone(), cached.participants.len()));
            }
        }
        left
    }

    fn remove_everywhere(&mut self, user_id: &str) {
        for cached in self.rooms.values_mut() {
            cached.participants.retain(|p| p.id != user_id);
        }
    }

    /// Rooms whose live participant list contains the user.
    pub fn rooms_containing(&self, user_id: &str) -> Vec<String> {
        self.rooms
            .iter()
            .filter(|(_, c)| c.contains(user_id))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Verify the at-most-one-room invariant for a user, healing on
    /// violation by keeping only the most recently joined room.
    ///
    /// The join protocol makes a violation unreachable; hitting this path
    /// means a programming defect, so it logs loudly.
    pub fn audit_single_room(&mut self, user_id: &str) -> Vec<String> {
        let mut occupied: Vec<(String, DateTime<Utc>)> = self
            .rooms
            .iter()
            .filter_map(|(id, c)| {
                c.participants
                    .iter()
                    .find(|p| p.id == user_id)
                    .map(|p| (id.clone(), p.joined_at))
            })
            .collect();

        if occupied.len() <= 1 {
            return Vec::new();
        }

        occupied.sort_by_key(|(_, joined_at)| *joined_at);
        let keep = occupied.pop().expect("len > 1").0;
        let evicted: Vec<String> = occupied.into_iter().map(|(id, _)| id).collect();

        error!(
            user_id,
            keep_room = %keep,
            evicted_rooms = ?evicted,
            "Participant found in multiple rooms; healing to most recent"
        );

        for room_id in &evicted {
            if let Some(cached) = self.rooms.get_mut(room_id) {
                cached.participants.retain(|p| p.id != user_id);
            }
        }
        evicted
    }

    /// Append a message to a room's ring buffer.
    ///
    /// Returns the evicted message's id when the buffer was at capacity.
    /// Unknown rooms are a logged no-op; the caller persists the message
    /// independently.
    pub fn append_message(&mut self, room_id: &str, message: Message) -> Option<String> {
        match self.rooms.get_mut(room_id) {
            Some(cached) => cached.messages.push(message),
            None => {
                warn!(room_id, "Dropping buffer append for unknown room");
                None
            }
        }
    }

    /// The newest `limit` buffered messages, oldest-to-newest.
    ///
    /// This is the fallback when the persisted history cannot be read.
    pub fn buffered_messages(&self, room_id: &str, limit: usize) -> Vec<Message> {
        self.rooms
            .get(room_id)
            .map(|c| c.messages.recent(limit))
            .unwrap_or_default()
    }
}
