//! Wire protocol exchanged over every hub connection
//!
//! Each frame is one JSON object tagged by `type`. Every message carries a
//! server-assigned `timestamp`; the remaining fields depend on the variant.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::client::ClientId;
use super::pixel::Point;
use crate::error::Result;

/// A serialized message, shared by every queue it is fanned out to
pub type Frame = Arc<str>;

/// Sparse pixel mapping used by canvas snapshots
pub type PixelMap = HashMap<Point, String>;

/// One protocol message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(flatten)]
    pub event: Event,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// The closed set of message variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    TextUpdate {
        content: String,
    },
    UserJoined {
        client_id: ClientId,
    },
    UserLeft {
        client_id: ClientId,
    },
    Heartbeat,
    UserList {
        user_list: Vec<ClientId>,
    },
    PixelUpdate {
        x: i32,
        y: i32,
        color: String,
        /// Author of the change; filled in by the server
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<ClientId>,
    },
    /// Full canvas snapshot, sent to a client when it joins
    CanvasState {
        pixels: PixelMap,
    },
    CanvasClear,
}

/// A requested change to the shared canvas
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanvasEdit {
    Paint { point: Point, color: String },
    Clear,
}

impl Message {
    /// Wrap an event with the current time
    pub fn new(event: Event) -> Self {
        Self {
            event,
            timestamp: Utc::now(),
        }
    }

    pub fn text_update(content: impl Into<String>) -> Self {
        Self::new(Event::TextUpdate {
            content: content.into(),
        })
    }

    pub fn user_joined(client_id: ClientId) -> Self {
        Self::new(Event::UserJoined { client_id })
    }

    pub fn user_left(client_id: ClientId) -> Self {
        Self::new(Event::UserLeft { client_id })
    }

    pub fn heartbeat() -> Self {
        Self::new(Event::Heartbeat)
    }

    pub fn user_list(user_list: Vec<ClientId>) -> Self {
        Self::new(Event::UserList { user_list })
    }

    pub fn pixel_update(point: Point, color: impl Into<String>, author: ClientId) -> Self {
        Self::new(Event::PixelUpdate {
            x: point.x,
            y: point.y,
            color: color.into(),
            client_id: Some(author),
        })
    }

    pub fn canvas_state(pixels: PixelMap) -> Self {
        Self::new(Event::CanvasState { pixels })
    }

    pub fn canvas_clear() -> Self {
        Self::new(Event::CanvasClear)
    }

    /// Decode one inbound frame
    pub fn decode(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Serialize for fan-out
    pub fn encode(&self) -> Result<Frame> {
        Ok(Arc::from(serde_json::to_string(self)?))
    }

    /// Replace the timestamp with the current time
    pub fn restamp(mut self) -> Self {
        self.timestamp = Utc::now();
        self
    }

    /// The wire tag of this message
    pub fn kind(&self) -> &'static str {
        match self.event {
            Event::TextUpdate { .. } => "text_update",
            Event::UserJoined { .. } => "user_joined",
            Event::UserLeft { .. } => "user_left",
            Event::Heartbeat => "heartbeat",
            Event::UserList { .. } => "user_list",
            Event::PixelUpdate { .. } => "pixel_update",
            Event::CanvasState { .. } => "canvas_state",
            Event::CanvasClear => "canvas_clear",
        }
    }

    /// Canvas mutation requested by this message, if any
    pub fn canvas_edit(&self) -> Option<CanvasEdit> {
        match &self.event {
            Event::PixelUpdate { x, y, color, .. } => Some(CanvasEdit::Paint {
                point: Point::new(*x, *y),
                color: color.clone(),
            }),
            Event::CanvasClear => Some(CanvasEdit::Clear),
            _ => None,
        }
    }
}
