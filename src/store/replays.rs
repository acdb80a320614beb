//! Replay file storage
//!
//! Each finished match leaves a `<match_id>.replay` JSON file. Coordinates
//! are rounded to 3 decimals on the way out; the in-memory recording keeps
//! full precision so the change-detection epsilon stays meaningful.

use std::path::PathBuf;
use uuid::Uuid;

use crate::config::Config;
use crate::game::ReplayData;

use super::StoreError;

#[derive(Clone)]
pub struct ReplayStore {
    dir: PathBuf,
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

fn rounded(replay: &ReplayData) -> ReplayData {
    let mut out = replay.clone();
    for (_, sample) in &mut out.position_data {
        for pair in sample.iter_mut() {
            pair[0] = round3(pair[0]);
            pair[1] = round3(pair[1]);
        }
    }
    out
}

impl ReplayStore {
    pub fn new(config: &Config) -> Self {
        Self {
            dir: config.replay_dir.clone(),
        }
    }

    /// Write the replay blob for a finished match
    pub async fn save(&self, match_id: Uuid, replay: &ReplayData) -> Result<(), StoreError> {
        let payload = serde_json::to_string(&rounded(replay))?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!("{match_id}.replay"));
        tokio::fs::write(path, payload).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::GameState;
    use crate::game::Vec2;

    #[test]
    fn values_are_rounded_to_three_decimals() {
        let mut replay = ReplayData::new();
        let mut state = GameState::new();
        state.ball.position = Vec2::new(1.23456789, -0.000999);
        replay.snapshot(16, &state);

        let out = rounded(&replay);
        assert_eq!(out.position_data[0].1[0], [1.235, -0.001]);
        // The original recording is untouched
        assert_eq!(replay.position_data[0].1[0][0], 1.23456789);
    }

    #[tokio::test]
    async fn save_writes_a_readable_replay_file() {
        let store = ReplayStore::new(&Config::for_tests());
        let match_id = Uuid::new_v4();

        let mut replay = ReplayData::new();
        replay.p1_skin = "comet".into();
        replay.game_duration = 61_543;
        replay.snapshot(0, &GameState::new());

        store.save(match_id, &replay).await.unwrap();

        let path = Config::for_tests().replay_dir.join(format!("{match_id}.replay"));
        let contents = tokio::fs::read_to_string(path).await.unwrap();
        let parsed: ReplayData = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed.p1_skin, "comet");
        assert_eq!(parsed.game_duration, 61_543);
        assert_eq!(parsed.position_data.len(), 1);
    }
}
