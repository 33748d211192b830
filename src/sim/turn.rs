use serde::{Deserialize, Serialize};

/// Where the turn loop currently stands. The board derives the phase
/// after every planning pass; `Advancing` is only entered through
/// `Board::begin_advance`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnPhase {
    /// Plans are current; the player still has to place the cell in hand.
    Planning,
    /// One or more junctions need a player decision.
    AwaitingSelectors,
    /// Cell placed and no open junctions; the turn can be committed.
    Ready,
    /// Balls are moving to their next cells.
    Advancing,
}

/// What happened while the balls moved.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TurnReport {
    /// Colors of the balls destroyed during the move, in death order.
    pub destroyed: Vec<u8>,
    /// Colors reborn onto free segments after the move.
    pub reborn: Vec<u8>,
    /// The hazard line crossed a whole-cell boundary; an external view
    /// should shift its scroll frame.
    pub scrolled: bool,
}
