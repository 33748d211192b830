use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

use super::coord::GridCoord;
use super::segment::Side;

new_key_type! {
    /// Stable handle into the board's ball storage. Generational, so it
    /// stays safe to hold across kills and reincarnations.
    pub struct BallId;
}

/// A colored ball riding the tracks. The color never changes for the
/// ball's lifetime and doubles as its identity toward the presentation
/// layer (at most one live ball per color).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ball {
    pub color: u8,
    /// Cell the ball currently occupies.
    pub coord: GridCoord,
    /// Index of the segment it rides within its cell. None while the
    /// ball is parked at a side waiting for a junction decision.
    pub segment: Option<u8>,
    /// Normalized position along the segment, measured from `from_side`.
    pub progress: f32,
    /// The side of the cell the ball most recently entered from.
    pub from_side: Side,
}

impl Ball {
    pub fn new(color: u8, coord: GridCoord, segment: u8, from_side: Side) -> Self {
        Self {
            color,
            coord,
            segment: Some(segment),
            progress: 0.0,
            from_side,
        }
    }
}
