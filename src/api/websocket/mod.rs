//! WebSocket handlers
//!
//! Each upgraded connection becomes a hub agent with a bounded outbound
//! queue; slow readers are disconnected instead of buffered.

pub mod canvas;
