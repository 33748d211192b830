use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A ball is considered cut when its distance to the line lands within
/// this margin of zero.
const CONTACT_EPSILON: f32 = 0.01;

/// Horizontal line sweeping up the toroidal grid by a fixed fraction of
/// a cell per turn. Any ball it passes through is destroyed. Distances
/// are tracked per ball color between turns so a crossing is detected
/// even when both snapshots land off the line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HazardLine {
    /// Row position in cell units, in `[0, size)`.
    y: f32,
    /// Cells advanced per turn.
    step: f32,
    size: f32,
    /// Signed distance per ball color at the last snapshot.
    prev_dist: HashMap<u8, f32>,
}

impl HazardLine {
    pub fn new(size: i32, start_y: f32, step: f32) -> Self {
        Self {
            y: start_y,
            step,
            size: size as f32,
            prev_dist: HashMap::new(),
        }
    }

    pub fn y(&self) -> f32 {
        self.y
    }

    /// Signed wraparound distance from a field row to the line,
    /// normalized into `[-size/2, size/2]`. Positive means above.
    pub fn distance_to(&self, field_y: f32) -> f32 {
        let half = self.size / 2.0;
        let dist = field_y - self.y;
        if dist > half {
            dist - self.size
        } else if dist < -half {
            dist + self.size
        } else {
            dist
        }
    }

    /// Record the current distances. Call before the line moves so the
    /// next `swept` can detect sign changes.
    pub fn snapshot(&mut self, distances: impl IntoIterator<Item = (u8, f32)>) {
        self.prev_dist.clear();
        for (color, y) in distances {
            self.prev_dist.insert(color, self.distance_to(y));
        }
    }

    /// Advance by the per-turn step, wrapping past the far edge.
    /// Returns true when the line crossed a whole-cell boundary, the
    /// signal for an external view to shift its scroll frame.
    pub fn advance(&mut self) -> bool {
        let prev_row = self.y.floor();
        self.y = (self.y + self.step).rem_euclid(self.size);
        self.y.floor() != prev_row
    }

    /// Colors of the balls the line cut through since the last
    /// snapshot: distance at zero, or sign flipped within one cell.
    /// Swept colors are dropped from the tracked distances.
    pub fn swept(&mut self, positions: impl IntoIterator<Item = (u8, f32)>) -> Vec<u8> {
        let mut cut = Vec::new();
        let mut remaining = HashMap::new();
        for (color, y) in positions {
            let dist = self.distance_to(y);
            let crossed = match self.prev_dist.get(&color) {
                Some(prev) => {
                    dist.abs() < CONTACT_EPSILON
                        || (dist.abs() < 1.0 && dist.signum() != prev.signum())
                }
                None => dist.abs() < CONTACT_EPSILON,
            };
            if crossed {
                cut.push(color);
            } else {
                remaining.insert(color, dist);
            }
        }
        self.prev_dist = remaining;
        cut
    }
}
