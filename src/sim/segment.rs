use glam::Vec2;
use serde::{Deserialize, Serialize};

/// One of the four edges of a cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Top,
    Right,
    Bottom,
    Left,
}

impl Side {
    pub const ALL: [Side; 4] = [Side::Top, Side::Right, Side::Bottom, Side::Left];

    /// The same physical edge seen from the adjacent cell.
    pub fn opposite(self) -> Self {
        match self {
            Self::Top => Self::Bottom,
            Self::Right => Self::Left,
            Self::Bottom => Self::Top,
            Self::Left => Self::Right,
        }
    }

    /// Grid-space unit offset toward this side: +x = Right, +y = Top.
    pub fn offset(self) -> (i32, i32) {
        match self {
            Self::Top => (0, 1),
            Self::Right => (1, 0),
            Self::Bottom => (0, -1),
            Self::Left => (-1, 0),
        }
    }

    /// Index into per-side arrays (intents).
    pub fn index(self) -> usize {
        match self {
            Self::Top => 0,
            Self::Right => 1,
            Self::Bottom => 2,
            Self::Left => 3,
        }
    }

    /// Midpoint of this side in unit-cell coordinates (bottom-left origin).
    pub fn unit_midpoint(self) -> Vec2 {
        match self {
            Self::Top => Vec2::new(0.5, 1.0),
            Self::Right => Vec2::new(1.0, 0.5),
            Self::Bottom => Vec2::new(0.5, 0.0),
            Self::Left => Vec2::new(0.0, 0.5),
        }
    }
}

/// Track shape inside a cell. Each shape joins a fixed pair of sides:
/// two straight lines through the middle and four quarter arcs around
/// the corners.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SegmentShape {
    LineBT,
    LineLR,
    ArcLT,
    ArcTR,
    ArcRB,
    ArcBL,
}

impl SegmentShape {
    pub const ALL: [SegmentShape; 6] = [
        SegmentShape::LineBT,
        SegmentShape::LineLR,
        SegmentShape::ArcLT,
        SegmentShape::ArcTR,
        SegmentShape::ArcRB,
        SegmentShape::ArcBL,
    ];

    /// The two sides this shape connects. The order fixes which end is
    /// "first" for color and split bookkeeping.
    pub fn sides(self) -> [Side; 2] {
        match self {
            Self::LineBT => [Side::Bottom, Side::Top],
            Self::LineLR => [Side::Left, Side::Right],
            Self::ArcLT => [Side::Left, Side::Top],
            Self::ArcTR => [Side::Top, Side::Right],
            Self::ArcRB => [Side::Right, Side::Bottom],
            Self::ArcBL => [Side::Bottom, Side::Left],
        }
    }

    pub fn connects(self, side: Side) -> bool {
        self.sides().contains(&side)
    }

    /// The exit side when entering from `side`, or None if the shape
    /// does not touch that side.
    pub fn other_side(self, side: Side) -> Option<Side> {
        let [a, b] = self.sides();
        if side == a {
            Some(b)
        } else if side == b {
            Some(a)
        } else {
            None
        }
    }

    /// Arc start angle in radians (0 = +x, counterclockwise), paired
    /// with the arc center. Lines have no angle.
    fn arc_center_and_start(self) -> Option<(Vec2, f32)> {
        use std::f32::consts::PI;
        match self {
            Self::ArcLT => Some((Vec2::new(0.0, 1.0), -PI / 2.0)),
            Self::ArcTR => Some((Vec2::new(1.0, 1.0), -PI)),
            Self::ArcRB => Some((Vec2::new(1.0, 0.0), PI / 2.0)),
            Self::ArcBL => Some((Vec2::new(0.0, 0.0), 0.0)),
            _ => None,
        }
    }
}

/// A track fragment connecting two sides of its cell. The track may be
/// colored by the plan: colors start from both ends and meet at the
/// split position. `split == 0` means the whole segment belongs to the
/// second end's color.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub shape: SegmentShape,
    /// Color entering from each of the shape's two sides, 0 = uncolored.
    pub colors: [u8; 2],
    /// Where the two colors meet, in `[0, 1]` from the first side.
    pub split: f32,
}

impl Segment {
    pub fn new(shape: SegmentShape) -> Self {
        Self {
            shape,
            colors: [0, 0],
            split: 0.0,
        }
    }

    pub fn is_uncolored(&self) -> bool {
        self.colors == [0, 0]
    }

    pub fn clear_colors(&mut self) {
        self.colors = [0, 0];
        self.split = 0.0;
    }

    /// Point on the track for a split position, in unit-cell coordinates
    /// relative to the bottom-left corner. Lines run between the
    /// midpoints of their two sides; arcs are quarter circles of radius
    /// one half about the shared corner.
    pub fn point_at(&self, split: f32) -> Vec2 {
        use std::f32::consts::PI;
        match self.shape {
            SegmentShape::LineBT => Vec2::new(0.5, split),
            SegmentShape::LineLR => Vec2::new(split, 0.5),
            shape => {
                // Guarded by the match: every other shape is an arc.
                let Some((center, start)) = shape.arc_center_and_start() else {
                    return Vec2::new(0.5, 0.5);
                };
                let angle = start + split * PI / 2.0;
                center + 0.5 * Vec2::new(angle.cos(), angle.sin())
            }
        }
    }

    /// Translate a ball's progress, measured from its entry side, into
    /// a split position measured from the segment's first side.
    pub fn split_for(&self, from_side: Side, progress: f32) -> f32 {
        if from_side == self.shape.sides()[0] {
            progress
        } else {
            1.0 - progress
        }
    }
}
