use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Canvas width in pixels
pub const CANVAS_WIDTH: i32 = 32;
/// Canvas height in pixels
pub const CANVAS_HEIGHT: i32 = 32;
/// Color of every pixel that has never been painted
pub const BACKGROUND_COLOR: &str = "#0d1117";

/// A canvas coordinate
///
/// On the wire a point is the string `"x,y"` so it can be used as a JSON
/// object key in canvas snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

impl FromStr for Point {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (x, y) = s
            .split_once(',')
            .ok_or_else(|| format!("invalid point {:?}: expected \"x,y\"", s))?;
        let x = x
            .trim()
            .parse()
            .map_err(|_| format!("invalid x coordinate in {:?}", s))?;
        let y = y
            .trim()
            .parse()
            .map_err(|_| format!("invalid y coordinate in {:?}", s))?;
        Ok(Self { x, y })
    }
}

impl Serialize for Point {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Point {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}
