//! Shared pixel canvas
//!
//! A fixed-size grid stored sparsely: only pixels that differ from the
//! background color are kept, so snapshots scale with painted area.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::models::{PixelMap, Point, BACKGROUND_COLOR, CANVAS_HEIGHT, CANVAS_WIDTH};

struct CanvasState {
    pixels: PixelMap,
    last_update: DateTime<Utc>,
}

/// Thread-safe bounded color grid
pub struct Canvas {
    width: i32,
    height: i32,
    state: RwLock<CanvasState>,
}

impl Canvas {
    /// Create an empty canvas of the given size
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            state: RwLock::new(CanvasState {
                pixels: PixelMap::new(),
                last_update: Utc::now(),
            }),
        }
    }

    /// Canvas width in pixels
    pub fn width(&self) -> i32 {
        self.width
    }

    /// Canvas height in pixels
    pub fn height(&self) -> i32 {
        self.height
    }

    fn contains(&self, point: Point) -> bool {
        (0..self.width).contains(&point.x) && (0..self.height).contains(&point.y)
    }

    /// Paint one pixel
    ///
    /// Returns `false` without touching the canvas when the point is out of
    /// bounds. Painting with the background color erases the entry.
    pub fn set_pixel(&self, point: Point, color: &str) -> bool {
        if !self.contains(point) {
            return false;
        }

        let mut state = self.state.write();
        if color == BACKGROUND_COLOR {
            state.pixels.remove(&point);
        } else {
            state.pixels.insert(point, color.to_string());
        }
        state.last_update = Utc::now();
        true
    }

    /// Color at `point`, or the background when unset or out of bounds
    pub fn get_pixel(&self, point: Point) -> String {
        if !self.contains(point) {
            return BACKGROUND_COLOR.to_string();
        }

        self.state
            .read()
            .pixels
            .get(&point)
            .cloned()
            .unwrap_or_else(|| BACKGROUND_COLOR.to_string())
    }

    /// Point-in-time copy of every painted pixel
    pub fn snapshot(&self) -> PixelMap {
        self.state.read().pixels.clone()
    }

    /// Erase every pixel
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.pixels = PixelMap::new();
        state.last_update = Utc::now();
    }

    /// Time of the most recent mutation (or creation)
    pub fn last_update(&self) -> DateTime<Utc> {
        self.state.read().last_update
    }

    /// Number of painted pixels
    pub fn painted(&self) -> usize {
        self.state.read().pixels.len()
    }
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new(CANVAS_WIDTH, CANVAS_HEIGHT)
    }
}
