//! The serialized gateway dispatcher.
//!
//! One task owns every piece of mutable chat state (presence registry,
//! room cache, typing tracker, outbox) and consumes gateway events from
//! a single queue, so handlers never interleave. Persistence calls are
//! awaited inside a handler; the next event is not taken until the
//! handler finishes, which also means a disconnect arriving behind an
//! in-flight send cannot cut its persistence or broadcast short.
//!
//! Storage failures on the join/send paths are logged and the in-memory
//! effect proceeds: a database hiccup must not take the chat down.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::chat::{
    calculate_badges, nudge_trust, JoinOutcome, MembershipRepository, Message, MessageKind,
    MessageRepository, Participant, PresenceRegistry, RoomStateCache, TypingTracker,
    SEND_TRUST_DELTA,
};
use crate::config::ChatConfig;
use crate::db::{Database, NewUser, UserRepository};

use super::event::GatewayEvent;
use super::messages::{ServerEvent, WireMessage, WireRoom, WireUser};
use super::outbox::Outbox;

/// The gateway dispatcher. See the module docs for the ownership model.
pub struct Dispatcher {
    db: Database,
    config: ChatConfig,
    presence: PresenceRegistry,
    rooms: RoomStateCache,
    typing: TypingTracker,
    /// user id -> display name, fed by register-user and typing events.
    names: HashMap<String, String>,
    outbox: Outbox,
}

impl Dispatcher {
    /// Create a dispatcher over the given database and configuration.
    pub fn new(db: Database, config: ChatConfig) -> Self {
        let rooms = RoomStateCache::new(config.message_buffer_cap);
        Self {
            db,
            config,
            presence: PresenceRegistry::new(),
            rooms,
            typing: TypingTracker::new(),
            names: HashMap::new(),
            outbox: Outbox::new(),
        }
    }

    /// Populate the room cache from storage.
    ///
    /// Called once at startup; a storage failure leaves a partial cache
    /// and is not fatal.
    pub async fn init(&mut self) {
        let loaded = self.rooms.load_all(self.db.pool()).await;
        info!("Gateway dispatcher ready ({} rooms cached)", loaded);
    }

    /// Consume events until every queue sender is dropped.
    pub async fn run(mut self, mut events: mpsc::Receiver<GatewayEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        debug!("Gateway dispatcher stopped");
    }

    /// Handle a single event. Public so tests can drive the dispatcher
    /// directly with fabricated timestamps.
    pub async fn handle(&mut self, event: GatewayEvent) {
        match event {
            GatewayEvent::SessionOpened { session_id, sender } => {
                self.outbox.register(&session_id, sender);
                self.outbox.send(&session_id, ServerEvent::connected());
            }
            GatewayEvent::RegisterUser {
                session_id,
                user_id,
                display_name,
            } => self.handle_register_user(&session_id, &user_id, display_name).await,
            GatewayEvent::JoinRoom {
                session_id,
                room_id,
                user_id,
                user_name,
            } => self.handle_join(&session_id, &room_id, &user_id, &user_name).await,
            GatewayEvent::SendMessage {
                session_id: _,
                room_id,
                user_id,
                user_name,
                content,
                kind,
            } => self.handle_send(&room_id, &user_id, &user_name, content, kind).await,
            GatewayEvent::LeaveRoom {
                session_id: _,
                room_id,
                user_id,
            } => self.handle_leave(&room_id, &user_id).await,
            GatewayEvent::RefreshRooms => {
                let added = self.rooms.refresh(self.db.pool()).await;
                debug!("Room cache refreshed ({} rooms added)", added);
            }
            GatewayEvent::Typing {
                room_id,
                user_id,
                display_name,
            } => self.handle_typing(&room_id, &user_id, display_name),
            GatewayEvent::StopTyping { room_id, user_id } => {
                self.handle_stop_typing(&room_id, &user_id)
            }
            GatewayEvent::MessageRead {
                session_id,
                room_id,
                user_id,
                message_id,
            } => self.handle_message_read(&session_id, &room_id, &user_id, &message_id),
            GatewayEvent::ReadRoom { room_id, user_id } => {
                self.handle_read_room(&room_id, &user_id).await
            }
            GatewayEvent::RemoveRecent {
                session_id,
                user_id,
                room_id,
            } => self.handle_remove_recent(&session_id, &user_id, &room_id).await,
            GatewayEvent::Disconnect { session_id } => self.handle_disconnect(&session_id),
            GatewayEvent::SweepIdle { now } => self.handle_sweep(now).await,
        }
    }

    /// Sessions of a room's live participants, optionally excluding one user.
    fn room_sessions(&self, room_id: &str, exclude_user: Option<&str>) -> Vec<String> {
        let Some(cached) = self.rooms.get(room_id) else {
            return Vec::new();
        };
        cached
            .participants()
            .iter()
            .filter(|p| exclude_user != Some(p.id.as_str()))
            .filter_map(|p| self.presence.session_for(&p.id))
            .map(String::from)
            .collect()
    }

    /// Deliver an event to the user's currently bound session.
    fn send_to_user(&self, user_id: &str, event: ServerEvent) {
        if let Some(session_id) = self.presence.session_for(user_id) {
            self.outbox.send(session_id, event);
        }
    }

    /// Broadcast the online set of a room to its participants.
    fn emit_sidebar_presence(&self, room_id: &str) {
        let Some(cached) = self.rooms.get(room_id) else {
            return;
        };
        let event = ServerEvent::SidebarPresence {
            room_id: room_id.to_string(),
            online_user_ids: cached.online_user_ids(),
            participant_count: cached.participant_count(),
        };
        let sessions = self.room_sessions(room_id, None);
        self.outbox
            .send_many(sessions.iter().map(String::as_str), &event);
    }

    /// Resolve a display name: live profile, then registered name, then
    /// the wire-supplied fallback.
    fn display_name(&self, user_id: &str, fallback: &str) -> String {
        if let Some(profile) = self.presence.profile(user_id) {
            return profile.name.clone();
        }
        self.names
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| fallback.to_string())
    }

    /// Load the canonical profile from storage, falling back to any live
    /// profile or a fresh one when storage is unavailable.
    async fn hydrate_profile(&self, user_id: &str, user_name: &str, now: DateTime<Utc>) -> Participant {
        match UserRepository::new(self.db.pool())
            .upsert(&NewUser::new(user_id, user_name))
            .await
        {
            Ok(user) => {
                let mut profile = Participant {
                    id: user.id,
                    name: user.display_name,
                    badges: Vec::new(),
                    trust_score: user.trust_score,
                    profile_age: user.created_at,
                    message_count: user.message_count,
                    joined_at: now,
                };
                profile.badges = calculate_badges(&profile, now);
                profile
            }
            Err(e) => {
                warn!(user_id, error = %e, "User upsert failed; using in-memory profile");
                let mut profile = self
                    .presence
                    .profile(user_id)
                    .cloned()
                    .unwrap_or_else(|| Participant::new(user_id, user_name, now));
                profile.name = user_name.to_string();
                profile.badges = calculate_badges(&profile, now);
                profile
            }
        }
    }

    async fn handle_register_user(
        &mut self,
        session_id: &str,
        user_id: &str,
        display_name: Option<String>,
    ) {
        let now = Utc::now();
        self.presence.register(user_id, session_id, now);

        if let Some(name) = display_name {
            self.names.insert(user_id.to_string(), name.clone());
            if let Err(e) = UserRepository::new(self.db.pool())
                .upsert(&NewUser::new(user_id, &name))
                .await
            {
                warn!(user_id, error = %e, "User upsert failed during registration");
            }
        }
    }

    async fn handle_join(&mut self, session_id: &str, room_id: &str, user_id: &str, user_name: &str) {
        if self.rooms.get(room_id).is_none() {
            self.outbox
                .send(session_id, ServerEvent::error("room_not_found", "Room not found"));
            return;
        }

        let now = Utc::now();

        // Await storage before touching shared state; rooms.join re-checks
        // existence and capacity afterwards against the current cache.
        let profile = self.hydrate_profile(user_id, user_name, now).await;

        match self.rooms.join(room_id, profile.clone(), now) {
            JoinOutcome::NotFound => {
                self.outbox
                    .send(session_id, ServerEvent::error("room_not_found", "Room not found"));
            }
            JoinOutcome::Redirect { room_id: new_room_id } => {
                self.outbox
                    .send(session_id, ServerEvent::RoomRedirect { new_room_id });
            }
            JoinOutcome::Full => {
                self.outbox.send(
                    session_id,
                    ServerEvent::error(
                        "room_full",
                        "Room is full and no alternatives available",
                    ),
                );
            }
            JoinOutcome::Joined(snapshot) => {
                self.rooms.audit_single_room(user_id);
                self.presence.register(user_id, session_id, now);
                self.presence.put_profile(profile.clone());
                self.names.insert(user_id.to_string(), profile.name.clone());

                if let Err(e) = MembershipRepository::new(self.db.pool())
                    .upsert_active(user_id, room_id, now)
                    .await
                {
                    warn!(user_id, room_id, error = %e, "Membership upsert failed; continuing join");
                }

                info!(user_id, room_id, "User joined room");

                self.outbox.send(
                    session_id,
                    ServerEvent::JoinedRoom {
                        room: WireRoom::from(&snapshot),
                        user: WireUser::from(&profile),
                    },
                );

                let joined = ServerEvent::UserJoined {
                    user: WireUser::from(&profile),
                    participant_count: snapshot.participants.len(),
                };
                let others = self.room_sessions(room_id, Some(user_id));
                self.outbox
                    .send_many(others.iter().map(String::as_str), &joined);

                self.emit_sidebar_presence(room_id);
                self.deliver_recent_messages(session_id, room_id).await;
            }
        }
    }

    /// Recent history for a joining session: persisted messages are
    /// authoritative, the ring buffer is the fallback when the read fails.
    async fn deliver_recent_messages(&self, session_id: &str, room_id: &str) {
        let limit = self.config.recent_message_limit;
        let messages = match MessageRepository::new(self.db.pool()).recent(room_id, limit).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(room_id, error = %e, "History read failed; serving buffered messages");
                self.rooms.buffered_messages(room_id, limit)
            }
        };

        self.outbox.send(
            session_id,
            ServerEvent::RecentMessages {
                messages: messages.iter().map(WireMessage::from).collect(),
            },
        );
    }

    async fn handle_send(
        &mut self,
        room_id: &str,
        user_id: &str,
        user_name: &str,
        content: String,
        kind: Option<String>,
    ) {
        if self.rooms.get(room_id).is_none() {
            debug!(room_id, "Dropping message for unknown room");
            return;
        }

        let now = Utc::now();
        self.presence.touch(user_id, now);

        // Participation nudges the author's stats.
        if let Some(profile) = self.presence.profile_mut(user_id) {
            profile.message_count += 1;
            nudge_trust(profile, SEND_TRUST_DELTA, now);
        }

        let sender_name = self.display_name(user_id, user_name);
        let kind = kind.as_deref().map(MessageKind::parse).unwrap_or(MessageKind::Text);
        let message = Message::new(room_id, user_id, sender_name, content, kind, now);

        if let Err(e) = MessageRepository::new(self.db.pool()).insert(&message).await {
            warn!(room_id, error = %e, "Message persist failed; broadcasting anyway");
        }
        if let Err(e) = UserRepository::new(self.db.pool())
            .bump_message_stats(user_id, SEND_TRUST_DELTA)
            .await
        {
            warn!(user_id, error = %e, "Message stats update failed");
        }

        if let Some(evicted) = self.rooms.append_message(room_id, message.clone()) {
            self.typing.forget_message(&evicted);
        }

        let event = ServerEvent::NewMessage {
            message: WireMessage::from(&message),
        };
        let sessions = self.room_sessions(room_id, None);
        self.outbox
            .send_many(sessions.iter().map(String::as_str), &event);

        self.fan_out_unread(room_id, user_id).await;
    }

    /// Recompute and push unread counts to every other active member.
    ///
    /// Read-only persistence path: a failed query degrades to skipping
    /// that member rather than failing the send.
    async fn fan_out_unread(&self, room_id: &str, author_id: &str) {
        let memberships = MembershipRepository::new(self.db.pool());
        let messages = MessageRepository::new(self.db.pool());

        let member_ids = match memberships.active_user_ids(room_id).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(room_id, error = %e, "Active member query failed; skipping unread fan-out");
                return;
            }
        };

        for member_id in member_ids {
            if member_id == author_id {
                continue;
            }

            let last_seen = match memberships.find(&member_id, room_id).await {
                Ok(Some(membership)) => membership.last_seen,
                Ok(None) => DateTime::<Utc>::UNIX_EPOCH,
                Err(e) => {
                    warn!(user_id = %member_id, room_id, error = %e, "Membership read failed; skipping unread update");
                    continue;
                }
            };

            match messages.count_since(room_id, last_seen, &member_id).await {
                Ok(unread_count) => {
                    self.send_to_user(
                        &member_id,
                        ServerEvent::SidebarUnread {
                            room_id: room_id.to_string(),
                            user_id: member_id.clone(),
                            unread_count,
                        },
                    );
                }
                Err(e) => {
                    warn!(user_id = %member_id, room_id, error = %e, "Unread count failed; skipping update");
                }
            }
        }
    }

    async fn handle_leave(&mut self, room_id: &str, user_id: &str) {
        if let Some(count) = self.rooms.leave(room_id, user_id) {
            let event = ServerEvent::UserLeft {
                user_id: user_id.to_string(),
                participant_count: count,
                reason: None,
            };
            let sessions = self.room_sessions(room_id, None);
            self.outbox
                .send_many(sessions.iter().map(String::as_str), &event);
            self.emit_sidebar_presence(room_id);
        }

        if let Err(e) = MembershipRepository::new(self.db.pool())
            .set_inactive(user_id, room_id)
            .await
        {
            warn!(user_id, room_id, error = %e, "Membership deactivation failed on leave");
        }

        self.presence.unregister(user_id);
    }

    fn handle_typing(&mut self, room_id: &str, user_id: &str, display_name: Option<String>) {
        let now = Utc::now();
        self.presence.touch(user_id, now);

        if let Some(name) = display_name {
            self.names.insert(user_id.to_string(), name);
        }

        self.typing.start(room_id, user_id);
        self.emit_sidebar_typing(room_id, user_id);
    }

    fn handle_stop_typing(&mut self, room_id: &str, user_id: &str) {
        self.typing.stop(room_id, user_id);
        self.emit_sidebar_typing(room_id, user_id);
    }

    /// Push the room's typing names to the acting user's session.
    fn emit_sidebar_typing(&self, room_id: &str, user_id: &str) {
        let typing_user_names = self
            .typing
            .typing_in(room_id)
            .iter()
            .map(|id| {
                self.names
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| "Someone".to_string())
            })
            .collect();

        self.send_to_user(
            user_id,
            ServerEvent::SidebarTyping {
                room_id: room_id.to_string(),
                typing_user_names,
            },
        );
    }

    fn handle_message_read(
        &mut self,
        session_id: &str,
        room_id: &str,
        user_id: &str,
        message_id: &str,
    ) {
        self.typing.mark_read(message_id, user_id);

        let event = ServerEvent::MessageRead {
            user_id: user_id.to_string(),
            message_id: message_id.to_string(),
        };
        let sessions: Vec<String> = self
            .room_sessions(room_id, None)
            .into_iter()
            .filter(|s| s != session_id)
            .collect();
        self.outbox
            .send_many(sessions.iter().map(String::as_str), &event);
    }

    async fn handle_read_room(&mut self, room_id: &str, user_id: &str) {
        let now = Utc::now();
        self.presence.touch(user_id, now);

        if let Err(e) = MembershipRepository::new(self.db.pool())
            .touch_last_seen(user_id, room_id, now)
            .await
        {
            warn!(user_id, room_id, error = %e, "last_seen update failed; reporting zero unread anyway");
        }

        self.send_to_user(
            user_id,
            ServerEvent::SidebarUnread {
                room_id: room_id.to_string(),
                user_id: user_id.to_string(),
                unread_count: 0,
            },
        );
    }

    async fn handle_remove_recent(&mut self, session_id: &str, user_id: &str, room_id: &str) {
        match MembershipRepository::new(self.db.pool())
            .set_inactive(user_id, room_id)
            .await
        {
            Ok(()) => {
                self.send_to_user(
                    user_id,
                    ServerEvent::RecentChatsUpdated {
                        user_id: user_id.to_string(),
                    },
                );
            }
            Err(e) => {
                warn!(user_id, room_id, error = %e, "Remove-from-recent failed");
                self.outbox.send(
                    session_id,
                    ServerEvent::error("remove_recent_failed", "Failed to remove room from recent."),
                );
            }
        }
    }

    fn handle_disconnect(&mut self, session_id: &str) {
        let user_id = self.presence.user_for(session_id).map(String::from);

        if let Some(user_id) = user_id {
            debug!(session_id, user_id = %user_id, "Session disconnected");

            for (room_id, participant_count) in self.rooms.leave_all(&user_id) {
                let event = ServerEvent::UserLeft {
                    user_id: user_id.clone(),
                    participant_count,
                    reason: None,
                };
                let sessions = self.room_sessions(&room_id, None);
                self.outbox
                    .send_many(sessions.iter().map(String::as_str), &event);
                self.emit_sidebar_presence(&room_id);
            }

            self.typing.clear_user(&user_id);
            self.presence.unregister(&user_id);
        }

        self.outbox.remove(session_id);
    }

    /// Evict every user idle past the threshold.
    ///
    /// Runs as an ordinary event so it serializes with joins and sends;
    /// the timestamp comes from the caller so tests can simulate time.
    async fn handle_sweep(&mut self, now: DateTime<Utc>) {
        let idle = self.presence.idle_users(self.config.idle_timeout(), now);
        if idle.is_empty() {
            return;
        }

        info!("Idle sweep evicting {} user(s)", idle.len());

        for user_id in idle {
            let session_id = self.presence.session_for(&user_id).map(String::from);

            for (room_id, participant_count) in self.rooms.leave_all(&user_id) {
                let event = ServerEvent::UserLeft {
                    user_id: user_id.clone(),
                    participant_count,
                    reason: Some("idle".to_string()),
                };
                let sessions = self.room_sessions(&room_id, None);
                self.outbox
                    .send_many(sessions.iter().map(String::as_str), &event);
                self.emit_sidebar_presence(&room_id);

                if let Err(e) = MembershipRepository::new(self.db.pool())
                    .set_inactive(&user_id, &room_id)
                    .await
                {
                    warn!(user_id = %user_id, room_id = %room_id, error = %e, "Membership deactivation failed on idle kick");
                }
            }

            // A distinct signal, not a generic leave: the client shows a
            // "kicked for inactivity" state.
            if let Some(session_id) = &session_id {
                self.outbox.send(session_id, ServerEvent::KickedForIdle);
            }

            self.typing.clear_user(&user_id);
            self.presence.unregister(&user_id);
            info!(user_id = %user_id, "User evicted for inactivity");
        }
    }
}
