//! Real-time fan-out hub
//!
//! Connections share one canvas and one roster. The coordinator owns the
//! registry; each connection runs an agent with an inbound and an outbound
//! pump.

pub mod agent;
pub mod canvas;
pub mod coordinator;

pub use agent::{run_session, AgentHandle, InboundExit, OutboundExit};
pub use canvas::Canvas;
pub use coordinator::{Hub, HubHandle};
