use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::coord::GridCoord;
use super::intent::{MoveIntent, SegmentChoice};
use super::segment::{Segment, SegmentShape, Side};

/// Square cell carrying 1–4 track segments. Once placed on the board a
/// cell never moves; its segments never change, they only change colors
/// as plans come and go. Every side of the cell is always covered by at
/// least one segment, so no track ever dead-ends at a cell boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub segments: SmallVec<[Segment; 4]>,
    /// One planning record per side, indexed by `Side::index`.
    pub intents: [MoveIntent; 4],
    /// Position on the board; `UNSET` while the cell is in hand.
    pub coord: GridCoord,
}

impl Cell {
    /// Random cell: shapes are drawn in shuffled order until every side
    /// is covered, which yields two to four segments.
    pub fn random(rng: &mut impl Rng) -> Self {
        let mut shapes = SegmentShape::ALL;
        shapes.shuffle(rng);
        let mut picked: SmallVec<[SegmentShape; 4]> = SmallVec::new();
        let mut covered = 0u8;
        for shape in shapes {
            picked.push(shape);
            for side in shape.sides() {
                covered |= 1 << side.index();
            }
            if covered == 0b1111 {
                break;
            }
        }
        // Coverage is guaranteed: the six shapes together touch every side.
        Self::from_shapes_unchecked(&picked)
    }

    /// Build a cell from explicit shapes. Returns None unless every side
    /// is covered by at least one shape.
    pub fn from_shapes(shapes: &[SegmentShape]) -> Option<Self> {
        let mut covered = 0u8;
        for shape in shapes {
            for side in shape.sides() {
                covered |= 1 << side.index();
            }
        }
        if covered != 0b1111 {
            return None;
        }
        Some(Self::from_shapes_unchecked(shapes))
    }

    fn from_shapes_unchecked(shapes: &[SegmentShape]) -> Self {
        let segments: SmallVec<[Segment; 4]> =
            shapes.iter().map(|&shape| Segment::new(shape)).collect();
        let mut cell = Self {
            segments,
            intents: Side::ALL.map(|_| MoveIntent::new(SegmentChoice::Undecided)),
            coord: GridCoord::UNSET,
        };
        for side in Side::ALL {
            let default = cell.default_choice(side);
            cell.intents[side.index()] = MoveIntent::new(default);
        }
        cell
    }

    /// Indices of the segments leaving `side`.
    pub fn segments_from(&self, side: Side) -> SmallVec<[u8; 4]> {
        self.segments
            .iter()
            .enumerate()
            .filter(|(_, s)| s.shape.connects(side))
            .map(|(i, _)| i as u8)
            .collect()
    }

    /// Exit sides reachable from `side`: the junction candidates shown
    /// to the player when there is more than one.
    pub fn directions_from(&self, side: Side) -> SmallVec<[Side; 3]> {
        let mut out: SmallVec<[Side; 3]> = SmallVec::new();
        for seg in &self.segments {
            if let Some(exit) = seg.shape.other_side(side) {
                if !out.contains(&exit) {
                    out.push(exit);
                }
            }
        }
        out
    }

    /// Segment index for leaving `side` toward `direction`.
    pub fn segment_toward(&self, side: Side, direction: Side) -> Option<u8> {
        self.segments
            .iter()
            .position(|s| s.shape.other_side(side) == Some(direction))
            .map(|i| i as u8)
    }

    /// `SinglePath` when the side has exactly one outgoing segment,
    /// `Undecided` otherwise.
    pub fn default_choice(&self, side: Side) -> SegmentChoice {
        let from = self.segments_from(side);
        match from.as_slice() {
            [only] => SegmentChoice::SinglePath(*only),
            _ => SegmentChoice::Undecided,
        }
    }

    pub fn intent(&self, side: Side) -> &MoveIntent {
        &self.intents[side.index()]
    }

    pub fn intent_mut(&mut self, side: Side) -> &mut MoveIntent {
        &mut self.intents[side.index()]
    }

    /// Reset every plan record before a new planning pass. Selector
    /// choices survive.
    pub fn clear_intents(&mut self) {
        for side in Side::ALL {
            let default = self.default_choice(side);
            self.intents[side.index()].clear(default);
        }
    }

    pub fn clear_segment_colors(&mut self) {
        for seg in &mut self.segments {
            seg.clear_colors();
        }
    }

    /// Segment for seeding a ball at the cell bottom: the vertical line
    /// if present, otherwise any segment touching the bottom side.
    pub fn startup_bottom_segment(&self) -> u8 {
        if let Some(i) = self
            .segments
            .iter()
            .position(|s| s.shape == SegmentShape::LineBT)
        {
            return i as u8;
        }
        self.segments
            .iter()
            .position(|s| s.shape.connects(Side::Bottom))
            .unwrap_or(0) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    fn covered_sides(cell: &Cell) -> u8 {
        let mut covered = 0u8;
        for seg in &cell.segments {
            for side in seg.shape.sides() {
                covered |= 1 << side.index();
            }
        }
        covered
    }

    #[test]
    fn random_cells_cover_every_side() {
        let mut rng = Pcg32::seed_from_u64(7);
        for _ in 0..500 {
            let cell = Cell::random(&mut rng);
            assert_eq!(covered_sides(&cell), 0b1111);
            assert!((2..=4).contains(&cell.segments.len()));
        }
    }

    #[test]
    fn test_from_shapes_rejects_uncovered_side() {
        // Bottom-Top plus Left-Top never touches the right side.
        assert!(Cell::from_shapes(&[SegmentShape::LineBT, SegmentShape::ArcLT]).is_none());
        assert!(Cell::from_shapes(&[SegmentShape::LineBT, SegmentShape::LineLR]).is_some());
    }

    #[test]
    fn test_default_choice_single_vs_multi() {
        let cell = Cell::from_shapes(&[SegmentShape::LineBT, SegmentShape::LineLR]).unwrap();
        assert!(matches!(
            cell.default_choice(Side::Bottom),
            SegmentChoice::SinglePath(0)
        ));
        let cell = Cell::from_shapes(&[
            SegmentShape::LineBT,
            SegmentShape::ArcBL,
            SegmentShape::ArcRB,
        ])
        .unwrap();
        assert_eq!(cell.default_choice(Side::Bottom), SegmentChoice::Undecided);
        assert!(matches!(
            cell.default_choice(Side::Left),
            SegmentChoice::SinglePath(1)
        ));
    }

    #[test]
    fn test_directions_exclude_entry_side() {
        let cell = Cell::from_shapes(&[
            SegmentShape::LineBT,
            SegmentShape::ArcBL,
            SegmentShape::ArcRB,
        ])
        .unwrap();
        let dirs = cell.directions_from(Side::Bottom);
        assert_eq!(dirs.len(), 3);
        assert!(!dirs.contains(&Side::Bottom));
        assert!(dirs.contains(&Side::Top));
        assert!(dirs.contains(&Side::Left));
        assert!(dirs.contains(&Side::Right));
    }

    #[test]
    fn test_segment_toward() {
        let cell = Cell::from_shapes(&[
            SegmentShape::LineBT,
            SegmentShape::ArcBL,
            SegmentShape::ArcRB,
        ])
        .unwrap();
        assert_eq!(cell.segment_toward(Side::Bottom, Side::Left), Some(1));
        assert_eq!(cell.segment_toward(Side::Bottom, Side::Right), Some(2));
        assert_eq!(cell.segment_toward(Side::Bottom, Side::Top), Some(0));
        assert_eq!(cell.segment_toward(Side::Left, Side::Right), None);
    }

    #[test]
    fn test_startup_bottom_segment_prefers_vertical_line() {
        let cell = Cell::from_shapes(&[
            SegmentShape::ArcBL,
            SegmentShape::LineBT,
            SegmentShape::ArcTR,
        ])
        .unwrap();
        assert_eq!(cell.startup_bottom_segment(), 1);
        let cell = Cell::from_shapes(&[
            SegmentShape::ArcLT,
            SegmentShape::ArcTR,
            SegmentShape::ArcRB,
            SegmentShape::ArcBL,
        ])
        .unwrap();
        let idx = cell.startup_bottom_segment() as usize;
        assert!(cell.segments[idx].shape.connects(Side::Bottom));
    }

    #[test]
    fn test_clear_intents_preserves_selector() {
        let mut cell = Cell::from_shapes(&[
            SegmentShape::LineBT,
            SegmentShape::ArcBL,
            SegmentShape::ArcRB,
        ])
        .unwrap();
        cell.intent_mut(Side::Bottom).color = 2;
        cell.intent_mut(Side::Bottom).selector_color = 2;
        cell.intent_mut(Side::Bottom).selector = SegmentChoice::Decided(1);
        cell.clear_intents();
        let intent = cell.intent(Side::Bottom);
        assert_eq!(intent.color, 0);
        assert_eq!(intent.choice, SegmentChoice::Undecided);
        assert_eq!(intent.selector_color, 2);
        assert_eq!(intent.selector, SegmentChoice::Decided(1));
    }
}
