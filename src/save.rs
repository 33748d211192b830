use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;

use crate::game::config::GameConfig;
use crate::game::score::Score;
use crate::sim::ball::Ball;
use crate::sim::segment::{SegmentShape, Side};

/// Why a persisted game could not be restored. Callers are expected to
/// fall back to a fresh game; the board is never left half-built.
#[derive(Debug, Error)]
pub enum SaveError {
    /// The byte stream does not decode as a snapshot at all.
    #[error("save data does not decode: {0}")]
    Undecodable(#[from] bincode::Error),
    /// A decoded field is outside its legal range.
    #[error("save data is inconsistent: {0}")]
    Inconsistent(&'static str),
}

/// Player junction choice surviving on one cell side. Only an actual
/// player decision is stored; single-exit defaults are rebuilt from the
/// shapes on restore.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedSelector {
    /// Ball color the selector is armed for, 0 = unarmed.
    pub color: u8,
    /// Segment the player chose, None while undecided.
    pub segment: Option<u8>,
}

/// One placed cell: its fixed shapes plus the per-side selector state,
/// in `Side::index` order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedCell {
    pub shapes: SmallVec<[SegmentShape; 4]>,
    pub selectors: [SavedSelector; 4],
}

/// Complete serializable image of a game between turns. Intents and
/// segment colors are derived state and are recomputed by the first
/// planning pass after restore.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SaveState {
    pub config: GameConfig,
    pub score: Score,
    /// Hazard line row, `[0, field_size)`.
    pub hazard_y: f32,
    /// Row-major, `y * field_size + x`.
    pub cells: Vec<SavedCell>,
    /// Shapes of the cell in hand, if any.
    pub hand: Option<SmallVec<[SegmentShape; 4]>>,
    /// Live balls, sorted by color.
    pub balls: Vec<Ball>,
    /// Destroyed balls still eligible for reincarnation, death order.
    pub dead_balls: Vec<Ball>,
    /// Selector colors the player already resolved this turn.
    pub resolved_colors: Vec<u8>,
}

impl SaveState {
    pub fn encode(&self) -> Result<Vec<u8>, SaveError> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode and range-check a snapshot. Every field is validated here
    /// so a successful decode is safe to hand to `Board::restore`.
    pub fn decode(bytes: &[u8]) -> Result<Self, SaveError> {
        let state: SaveState = bincode::deserialize(bytes)?;
        state.validate()?;
        Ok(state)
    }

    pub fn validate(&self) -> Result<(), SaveError> {
        if self.config != self.config.sanitized() {
            return Err(SaveError::Inconsistent("config out of range"));
        }
        let size = self.config.field_size;
        if self.cells.len() != (size * size) as usize {
            return Err(SaveError::Inconsistent("cell count does not match grid size"));
        }
        for saved in &self.cells {
            validate_shapes(&saved.shapes)?;
            for side in Side::ALL {
                let sel = saved.selectors[side.index()];
                if sel.color != 0 && sel.color > self.config.colors {
                    return Err(SaveError::Inconsistent("selector color out of range"));
                }
                if let Some(seg) = sel.segment {
                    let Some(shape) = saved.shapes.get(seg as usize) else {
                        return Err(SaveError::Inconsistent("selector segment out of range"));
                    };
                    if !shape.connects(side) {
                        return Err(SaveError::Inconsistent(
                            "selector segment does not touch its side",
                        ));
                    }
                }
            }
        }
        if let Some(hand) = &self.hand {
            validate_shapes(hand)?;
        }
        if !(0.0..size as f32).contains(&self.hazard_y) {
            return Err(SaveError::Inconsistent("hazard position out of range"));
        }
        let mut colors_seen: HashSet<u8> = HashSet::new();
        for ball in &self.balls {
            self.validate_ball(ball, true)?;
            if !colors_seen.insert(ball.color) {
                return Err(SaveError::Inconsistent("duplicate live ball color"));
            }
        }
        for ball in &self.dead_balls {
            self.validate_ball(ball, false)?;
        }
        if self
            .resolved_colors
            .iter()
            .any(|&c| c == 0 || c > self.config.colors)
        {
            return Err(SaveError::Inconsistent("resolved color out of range"));
        }
        Ok(())
    }

    fn validate_ball(&self, ball: &Ball, live: bool) -> Result<(), SaveError> {
        let size = self.config.field_size;
        if ball.color == 0 || ball.color > self.config.colors {
            return Err(SaveError::Inconsistent("ball color out of range"));
        }
        if !ball.coord.in_bounds(size) {
            return Err(SaveError::Inconsistent("ball coordinate off the grid"));
        }
        if !(0.0..=1.0).contains(&ball.progress) {
            return Err(SaveError::Inconsistent("ball progress out of range"));
        }
        if let Some(seg) = ball.segment {
            let cell = &self.cells[(ball.coord.y * size + ball.coord.x) as usize];
            let Some(shape) = cell.shapes.get(seg as usize) else {
                return Err(SaveError::Inconsistent("ball segment out of range"));
            };
            if live && !shape.connects(ball.from_side) {
                return Err(SaveError::Inconsistent("ball segment does not touch its side"));
            }
        }
        Ok(())
    }
}

fn validate_shapes(shapes: &[SegmentShape]) -> Result<(), SaveError> {
    if shapes.is_empty() || shapes.len() > 4 {
        return Err(SaveError::Inconsistent("cell segment count out of range"));
    }
    let mut covered = 0u8;
    for (i, shape) in shapes.iter().enumerate() {
        if shapes[..i].contains(shape) {
            return Err(SaveError::Inconsistent("duplicate segment shape in cell"));
        }
        for side in shape.sides() {
            covered |= 1 << side.index();
        }
    }
    if covered != 0b1111 {
        return Err(SaveError::Inconsistent("cell leaves a side uncovered"));
    }
    Ok(())
}
