//! Match result persistence client
//!
//! Posts finished match records to the persistence service. Failures are
//! the caller's to log; nothing is retried. When no service is configured
//! the records are dropped, which keeps isolated deployments and tests off
//! the network.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::config::Config;
use crate::room::RoomType;

use super::StoreError;

/// Winner marker persisted with every match record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WinnerMark {
    A,
    B,
    #[serde(rename = "draw")]
    Draw,
}

/// One finished match, exactly as handed to persistence
#[derive(Debug, Clone, Serialize)]
pub struct MatchRecord {
    pub match_id: Uuid,
    pub player_a: Option<Uuid>,
    pub player_b: Option<Uuid>,
    pub score_a: u32,
    pub score_b: u32,
    pub winner: WinnerMark,
    pub mode: RoomType,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct MatchStore {
    client: Client,
    base_url: Option<String>,
    service_key: Option<String>,
}

impl MatchStore {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: config.persistence_url.clone(),
            service_key: config.persistence_service_key.clone(),
        }
    }

    /// Send one match record to the persistence service
    pub async fn record(&self, record: &MatchRecord) -> Result<(), StoreError> {
        let Some(base_url) = &self.base_url else {
            debug!(match_id = %record.match_id, "Match persistence disabled, dropping record");
            return Ok(());
        };

        let mut request = self
            .client
            .post(format!("{base_url}/matches"))
            .json(record);
        if let Some(key) = &self.service_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Api { status, body });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_serializes_every_required_field() {
        let record = MatchRecord {
            match_id: Uuid::new_v4(),
            player_a: Some(Uuid::new_v4()),
            player_b: Some(Uuid::new_v4()),
            score_a: 7,
            score_b: 4,
            winner: WinnerMark::A,
            mode: RoomType::Tournament,
            recorded_at: Utc::now(),
        };

        let json = serde_json::to_value(&record).unwrap();
        for field in [
            "match_id",
            "player_a",
            "player_b",
            "score_a",
            "score_b",
            "winner",
            "mode",
            "recorded_at",
        ] {
            assert!(json.get(field).is_some(), "missing field {field}");
        }
        assert_eq!(json["winner"], "A");
        assert_eq!(json["mode"], "tournament");
    }

    #[test]
    fn draw_marker_is_lowercase() {
        assert_eq!(serde_json::to_value(WinnerMark::Draw).unwrap(), "draw");
        assert_eq!(serde_json::to_value(WinnerMark::B).unwrap(), "B");
    }

    #[tokio::test]
    async fn disabled_store_accepts_records_silently() {
        let store = MatchStore::new(&Config::for_tests());
        let record = MatchRecord {
            match_id: Uuid::new_v4(),
            player_a: None,
            player_b: None,
            score_a: 0,
            score_b: 0,
            winner: WinnerMark::Draw,
            mode: RoomType::Matchmaking,
            recorded_at: Utc::now(),
        };
        assert!(store.record(&record).await.is_ok());
    }
}
