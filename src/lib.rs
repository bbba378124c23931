//! Pixelhub - shared pixel canvas hub
//!
//! Many WebSocket clients share one small canvas and a live user roster.
//!
//! ## Features
//!
//! - 32x32 sparse canvas with pixel updates and clears fanned out to everyone
//! - Live roster with join/leave notices
//! - Free-form text and heartbeat messages relayed to all clients
//! - Bounded per-client queues: slow clients are disconnected, never buffered
//! - Ping/pong liveness with read and write deadlines

pub mod api;
pub mod config;
pub mod error;
pub mod hub;
pub mod models;

pub use config::Config;
pub use error::{HubError, Result};
pub use hub::{Canvas, Hub, HubHandle};
