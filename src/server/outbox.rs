//! Per-session outbound queues.
//!
//! Each connected WebSocket registers an unbounded sender here; the
//! socket task drains the matching receiver. The dispatcher fans events
//! out by pushing into these queues, so a slow client only ever delays
//! itself.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::trace;

use super::messages::ServerEvent;

/// Fan-out table from session id to its outbound queue.
#[derive(Debug, Default)]
pub struct Outbox {
    senders: HashMap<String, mpsc::UnboundedSender<ServerEvent>>,
}

impl Outbox {
    /// Create an empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session's outbound queue.
    pub fn register(&mut self, session_id: &str, sender: mpsc::UnboundedSender<ServerEvent>) {
        self.senders.insert(session_id.to_string(), sender);
    }

    /// Remove a session. Idempotent.
    pub fn remove(&mut self, session_id: &str) {
        self.senders.remove(session_id);
    }

    /// Send an event to one session.
    ///
    /// A closed or missing session is not an error; the disconnect event
    /// will clean the entry up.
    pub fn send(&self, session_id: &str, event: ServerEvent) {
        if let Some(sender) = self.senders.get(session_id) {
            if sender.send(event).is_err() {
                trace!(session_id, "Dropped event for closed session");
            }
        }
    }

    /// Send an event to many sessions.
    pub fn send_many<'a>(
        &self,
        session_ids: impl IntoIterator<Item = &'a str>,
        event: &ServerEvent,
    ) {
        for session_id in session_ids {
            self.send(session_id, event.clone());
        }
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.senders.len()
    }

    /// Whether no sessions are registered.
    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}
