pub mod ball;
pub mod board;
pub mod cell;
pub mod coord;
pub mod hazard;
pub mod intent;
pub mod segment;
pub mod turn;
