//! Session gateway for Parley.
//!
//! The WebSocket boundary: wire protocol, the typed event union, the
//! serialized dispatcher owning all chat state, per-session outbound
//! queues, and the idle reaper that feeds sweep events into the same
//! dispatcher queue.

pub mod dispatcher;
pub mod event;
pub mod messages;
pub mod outbox;
pub mod reaper;
pub mod server;
pub mod ws;

pub use dispatcher::Dispatcher;
pub use event::GatewayEvent;
pub use messages::{ClientEvent, ServerEvent, WireMessage, WireRoom, WireUser};
pub use outbox::Outbox;
pub use reaper::{start_idle_reaper, IdleReaper};
pub use server::GatewayServer;
pub use ws::GatewayState;
