//! Sparse match recording for replays
//!
//! Samples are keyed by elapsed milliseconds since match start. A position
//! sample is appended only when any coordinate moved by more than an epsilon
//! since the previous sample, and a score sample only when the score pair
//! changed, which bounds storage for long rallies.

use serde::{Deserialize, Serialize};

use super::state::GameState;

/// Movement threshold below which a tick is not worth recording
const POSITION_EPSILON: f64 = 1e-6;

/// (ball, paddle1, paddle2) positions as [x, y] pairs
pub type PositionSample = [[f64; 2]; 3];
/// (p1, p2) scores
pub type ScoreSample = [u32; 2];

/// Recording of one match, written to the replay store at match end
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayData {
    /// Total match duration in milliseconds
    pub game_duration: u64,
    pub p1_skin: String,
    pub p2_skin: String,
    /// Time-ordered position samples, sparse
    pub position_data: Vec<(u64, PositionSample)>,
    /// Time-ordered score samples, sparse
    pub score_data: Vec<(u64, ScoreSample)>,
}

impl ReplayData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current state at `elapsed_ms` if it changed enough since
    /// the previous sample.
    pub fn snapshot(&mut self, elapsed_ms: u64, state: &GameState) {
        let positions: PositionSample = [
            [state.ball.position.x, state.ball.position.y],
            [state.paddle1_position.x, state.paddle1_position.y],
            [state.paddle2_position.x, state.paddle2_position.y],
        ];

        let moved = match self.position_data.last() {
            None => true,
            Some((_, last)) => last
                .iter()
                .zip(positions.iter())
                .any(|(a, b)| (a[0] - b[0]).abs() > POSITION_EPSILON
                    || (a[1] - b[1]).abs() > POSITION_EPSILON),
        };
        if moved {
            self.position_data.push((elapsed_ms, positions));
        }

        let scores: ScoreSample = [state.p1_score, state.p2_score];
        if self.score_data.last().map(|(_, s)| *s) != Some(scores) {
            self.score_data.push((elapsed_ms, scores));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::vec2::Vec2;

    #[test]
    fn first_snapshot_is_always_recorded() {
        let mut replay = ReplayData::new();
        replay.snapshot(0, &GameState::new());
        assert_eq!(replay.position_data.len(), 1);
        assert_eq!(replay.score_data.len(), 1);
        assert_eq!(replay.score_data[0], (0, [0, 0]));
    }

    #[test]
    fn unchanged_state_is_not_resampled() {
        let mut replay = ReplayData::new();
        let state = GameState::new();
        replay.snapshot(0, &state);
        replay.snapshot(16, &state);
        replay.snapshot(33, &state);
        assert_eq!(replay.position_data.len(), 1);
        assert_eq!(replay.score_data.len(), 1);
    }

    #[test]
    fn sub_epsilon_movement_is_suppressed() {
        let mut replay = ReplayData::new();
        let mut state = GameState::new();
        replay.snapshot(0, &state);

        state.ball.position = Vec2::new(1e-9, 0.0);
        replay.snapshot(16, &state);
        assert_eq!(replay.position_data.len(), 1);

        state.ball.position = Vec2::new(0.01, 0.0);
        replay.snapshot(33, &state);
        assert_eq!(replay.position_data.len(), 2);
        assert_eq!(replay.position_data[1].0, 33);
    }

    #[test]
    fn score_changes_are_recorded_even_when_positions_hold() {
        let mut replay = ReplayData::new();
        let mut state = GameState::new();
        replay.snapshot(0, &state);

        state.p1_score = 1;
        replay.snapshot(500, &state);
        assert_eq!(replay.position_data.len(), 1);
        assert_eq!(replay.score_data.len(), 2);
        assert_eq!(replay.score_data[1], (500, [1, 0]));
    }
}
