// Spatial types shared across the map crate, plus re-exports of the protocol
// ID types so callers can import everything from `conquest_core::types`.

use serde::{Deserialize, Serialize};

pub use conquest_protocol::types::{Color, PlayerId, TerritoryIndex};

/// A territory's centre in map units. Only used for edge costs and the A*
/// heuristic.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Straight-line distance between two positions.
    pub fn distance(self, other: Self) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}
