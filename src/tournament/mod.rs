//! Tournament modules: registry, bracket tree, and round execution

pub mod bracket;
pub mod manager;
pub mod runner;

pub use manager::{Tournament, TournamentError, TournamentRegistry};
pub use runner::run_bracket;
