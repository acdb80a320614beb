//! Game simulation modules

pub mod ai;
pub mod constants;
pub mod replay;
pub mod sim;
pub mod state;
pub mod vec2;

pub use replay::ReplayData;
pub use state::{GameState, GameStats};
pub use vec2::Vec2;
