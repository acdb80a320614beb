//! Per-match mutable state and derived counters

use serde::{Deserialize, Serialize};

use super::constants::PADDLE_HOME_Y;
use super::vec2::Vec2;

/// The ball: position and velocity in field coordinates
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Ball {
    pub position: Vec2,
    pub velocity: Vec2,
}

/// Authoritative state of one match, owned exclusively by its room.
/// Serialized as-is into the per-tick state broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub ball: Ball,
    pub paddle1_position: Vec2,
    pub paddle2_position: Vec2,
    pub p1_score: u32,
    pub p2_score: u32,
}

impl GameState {
    pub fn new() -> Self {
        Self {
            ball: Ball::default(),
            paddle1_position: Vec2::new(0.0, PADDLE_HOME_Y),
            paddle2_position: Vec2::new(0.0, -PADDLE_HOME_Y),
            p1_score: 0,
            p2_score: 0,
        }
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

/// Match counters, accumulated during play and frozen at termination
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStats {
    /// Unix millis at match start
    pub game_start_time: u64,
    /// Unix millis at match end, 0 while running
    pub game_end_time: u64,
    pub ball_exchanges_count: u32,
    pub ball_collisions_count: u32,
    pub paddle1_distance_travelled: f64,
    pub paddle2_distance_travelled: f64,
}
