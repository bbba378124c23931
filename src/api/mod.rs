//! HTTP server
//!
//! Exposes the WebSocket upgrade endpoint for the hub plus health and
//! status endpoints.

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod websocket;

pub use server::{drain_sessions, ApiServer};
