//! Test helpers for gateway tests.
//!
//! Drives the dispatcher directly: sessions are registered with in-memory
//! outbound queues and events are fed through `Dispatcher::handle`, so
//! scenarios run deterministically without sockets or sleeps.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use parley::chat::{NewRoom, RoomRepository};
use parley::config::ChatConfig;
use parley::server::{Dispatcher, GatewayEvent, ServerEvent};
use parley::Database;

/// A dispatcher over an in-memory database with compressed timeouts.
pub struct TestGateway {
    pub db: Database,
    pub dispatcher: Dispatcher,
}

/// Idle threshold used by tests, in seconds.
pub const TEST_IDLE_TIMEOUT_SECS: u64 = 60;

impl TestGateway {
    /// Create a gateway with no rooms.
    pub async fn new() -> Self {
        let db = Database::open_in_memory().await.expect("in-memory db");
        let config = ChatConfig {
            idle_timeout_secs: TEST_IDLE_TIMEOUT_SECS,
            sweep_interval_secs: 1,
            message_buffer_cap: 1000,
            recent_message_limit: 50,
        };
        let dispatcher = Dispatcher::new(db.clone(), config);
        Self { db, dispatcher }
    }

    /// Create a room in storage and refresh the cache.
    pub async fn seed_room(&mut self, id: &str, name: &str, capacity: usize) {
        RoomRepository::new(self.db.pool())
            .create(&NewRoom::new(id, name).with_capacity(capacity))
            .await
            .expect("seed room");
        self.dispatcher.handle(GatewayEvent::RefreshRooms).await;
    }

    /// Insert a room row directly, bypassing the duplicate-name check.
    ///
    /// Overflow rooms intentionally share a name; the outer CRUD layer
    /// owns that decision, so tests model it with a raw insert.
    pub async fn seed_overflow_room(&mut self, id: &str, name: &str, capacity: usize) {
        sqlx::query("INSERT INTO rooms (id, name, max_participants, created_at) VALUES (?, ?, ?, ?)")
            .bind(id)
            .bind(name)
            .bind(capacity as i64)
            .bind(Utc::now().to_rfc3339())
            .execute(self.db.pool())
            .await
            .expect("seed overflow room");
        self.dispatcher.handle(GatewayEvent::RefreshRooms).await;
    }

    /// Open a session and return its outbound tap.
    ///
    /// The `connected` greeting is consumed so tests start from a clean
    /// queue.
    pub async fn open_session(&mut self, session_id: &str) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.dispatcher
            .handle(GatewayEvent::SessionOpened {
                session_id: session_id.to_string(),
                sender: tx,
            })
            .await;

        match rx.try_recv() {
            Ok(ServerEvent::Connected { .. }) => {}
            other => panic!("expected connected greeting, got {other:?}"),
        }
        rx
    }

    /// Join a room as a user on a session.
    pub async fn join(&mut self, session_id: &str, room_id: &str, user_id: &str, name: &str) {
        self.dispatcher
            .handle(GatewayEvent::JoinRoom {
                session_id: session_id.to_string(),
                room_id: room_id.to_string(),
                user_id: user_id.to_string(),
                user_name: name.to_string(),
            })
            .await;
    }

    /// Send a text message.
    pub async fn send_message(&mut self, session_id: &str, room_id: &str, user_id: &str, name: &str, content: &str) {
        self.dispatcher
            .handle(GatewayEvent::SendMessage {
                session_id: session_id.to_string(),
                room_id: room_id.to_string(),
                user_id: user_id.to_string(),
                user_name: name.to_string(),
                content: content.to_string(),
                kind: Some("text".to_string()),
            })
            .await;
    }

    /// Run an idle sweep at a fabricated instant.
    pub async fn sweep_at(&mut self, now: DateTime<Utc>) {
        self.dispatcher.handle(GatewayEvent::SweepIdle { now }).await;
    }
}

/// Drain every queued event from a session tap.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Find the first event matching a predicate, if any.
pub fn find<'a, F>(events: &'a [ServerEvent], pred: F) -> Option<&'a ServerEvent>
where
    F: Fn(&ServerEvent) -> bool,
{
    events.iter().find(|e| pred(e))
}
