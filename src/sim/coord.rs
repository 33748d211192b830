use serde::{Deserialize, Serialize};

use super::segment::Side;

/// Integer position of a cell on the toroidal grid. Live coordinates are
/// always normalized into `[0, size)` on both axes; the `UNSET` sentinel
/// marks a cell still in the player's hand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridCoord {
    pub x: i32,
    pub y: i32,
}

impl GridCoord {
    /// Marker for "not on the board".
    pub const UNSET: GridCoord = GridCoord { x: -999, y: -999 };

    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn is_set(&self) -> bool {
        *self != Self::UNSET
    }

    /// Normalize both axes into `[0, size)`, wrapping over the edges.
    pub fn wrapped(self, size: i32) -> Self {
        Self {
            x: self.x.rem_euclid(size),
            y: self.y.rem_euclid(size),
        }
    }

    /// The neighbor coordinate across the given side, wrapping at the
    /// grid edges. `y` grows toward `Side::Top`.
    pub fn step(self, side: Side, size: i32) -> Self {
        let (dx, dy) = side.offset();
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
        .wrapped(size)
    }

    pub fn in_bounds(&self, size: i32) -> bool {
        (0..size).contains(&self.x) && (0..size).contains(&self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapped_negative_and_overflow() {
        assert_eq!(GridCoord::new(-1, 7).wrapped(7), GridCoord::new(6, 0));
        assert_eq!(GridCoord::new(-8, 15).wrapped(7), GridCoord::new(6, 1));
        assert_eq!(GridCoord::new(3, 4).wrapped(7), GridCoord::new(3, 4));
    }

    #[test]
    fn test_step_wraps_each_edge() {
        let size = 7;
        assert_eq!(
            GridCoord::new(0, 6).step(Side::Top, size),
            GridCoord::new(0, 0)
        );
        assert_eq!(
            GridCoord::new(0, 0).step(Side::Bottom, size),
            GridCoord::new(0, 6)
        );
        assert_eq!(
            GridCoord::new(6, 0).step(Side::Right, size),
            GridCoord::new(0, 0)
        );
        assert_eq!(
            GridCoord::new(0, 0).step(Side::Left, size),
            GridCoord::new(6, 0)
        );
    }

    #[test]
    fn test_unset_sentinel() {
        assert!(!GridCoord::UNSET.is_set());
        assert!(GridCoord::new(0, 0).is_set());
        assert!(!GridCoord::UNSET.in_bounds(7));
    }
}
