//! Parley - real-time chat room presence and messaging server.
//!
//! Tracks which users are connected, which room each is in, how messages
//! are ordered and fanned out, and how idle users are reclaimed.

pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod server;

pub use config::Config;
pub use db::{Database, NewUser, User, UserRepository};
pub use error::{ParleyError, Result};
pub use server::GatewayServer;
