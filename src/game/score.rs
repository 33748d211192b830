use serde::{Deserialize, Serialize};

/// Move and point counters. The engine only increments and reads them;
/// records, persistence and display formatting belong to the caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    moves: u32,
    points: u32,
}

impl Score {
    pub fn moves(&self) -> u32 {
        self.moves
    }

    pub fn points(&self) -> u32 {
        self.points
    }

    pub fn increment_moves(&mut self) {
        self.moves += 1;
    }

    pub fn add_points(&mut self, points: u32) {
        self.points += points;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_and_query() {
        let mut score = Score::default();
        score.increment_moves();
        score.increment_moves();
        score.add_points(15);
        assert_eq!(score.moves(), 2);
        assert_eq!(score.points(), 15);
        score.reset();
        assert_eq!(score, Score::default());
    }
}
