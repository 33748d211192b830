use serde::{Deserialize, Serialize};

/// Which segment a ball entering a side will take. A side with exactly
/// one outgoing segment can never be ambiguous, so the undecided state
/// only ever occurs on multi-exit sides.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentChoice {
    /// The side has a single outgoing segment; no decision exists.
    SinglePath(u8),
    /// A multi-exit side whose segment has been fixed (by the plan or
    /// by the player).
    Decided(u8),
    /// A multi-exit side still waiting for a decision.
    Undecided,
}

impl SegmentChoice {
    /// The chosen segment index, if any.
    pub fn segment(self) -> Option<u8> {
        match self {
            Self::SinglePath(i) | Self::Decided(i) => Some(i),
            Self::Undecided => None,
        }
    }
}

/// Planning record for one cell side: the color and arrival order of the
/// track planned through it, the segment that track takes, and the
/// player's persisted junction choice. Plan fields are rebuilt wholesale
/// on every pass; only the selector pair survives between passes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MoveIntent {
    /// Planned track color through this side, 0 = none.
    pub color: u8,
    /// Arrival order in the current plan, 0 = unplanned.
    pub step: u32,
    /// Segment the plan routes through this side.
    pub choice: SegmentChoice,
    /// Ball color the selector is armed for, 0 = unarmed.
    pub selector_color: u8,
    /// Player-chosen segment for this side.
    pub selector: SegmentChoice,
}

impl MoveIntent {
    /// A fresh intent. `default` is `SinglePath` when the side has one
    /// outgoing segment, `Undecided` otherwise.
    pub fn new(default: SegmentChoice) -> Self {
        Self {
            color: 0,
            step: 0,
            choice: default,
            selector_color: 0,
            selector: default,
        }
    }

    /// Reset the plan fields before a new planning pass.
    pub fn clear(&mut self, default: SegmentChoice) {
        self.color = 0;
        self.step = 0;
        self.choice = default;
    }

    /// Drop the player's choice: the ball has passed, or the plan no
    /// longer routes a matching track through this side.
    pub fn reset_selector(&mut self, default: SegmentChoice) {
        self.selector_color = 0;
        self.selector = default;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_keeps_selector() {
        let mut intent = MoveIntent::new(SegmentChoice::Undecided);
        intent.color = 3;
        intent.step = 5;
        intent.choice = SegmentChoice::Decided(1);
        intent.selector_color = 3;
        intent.selector = SegmentChoice::Decided(1);

        intent.clear(SegmentChoice::Undecided);
        assert_eq!(intent.color, 0);
        assert_eq!(intent.step, 0);
        assert_eq!(intent.choice, SegmentChoice::Undecided);
        assert_eq!(intent.selector_color, 3);
        assert_eq!(intent.selector, SegmentChoice::Decided(1));
    }

    #[test]
    fn test_reset_selector_restores_default() {
        let mut intent = MoveIntent::new(SegmentChoice::SinglePath(0));
        intent.selector_color = 2;
        intent.selector = SegmentChoice::Decided(0);
        intent.reset_selector(SegmentChoice::SinglePath(0));
        assert_eq!(intent.selector_color, 0);
        assert_eq!(intent.selector, SegmentChoice::SinglePath(0));
    }
}
