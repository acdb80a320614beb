//! WebSocket protocol message definitions
//! These are the wire types for client-server communication.
//!
//! Every frame is a `{type, data}` envelope whose `type` names the channel
//! (game / tournament) or a flat notification/error, and whose inner payload
//! carries its own `type` tag. Dispatch is exhaustive over these enums.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::constants::MAX_SCORE_TO_WIN;
use crate::game::{GameState, GameStats, Vec2};

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ClientEnvelope {
    Game(GameClientMessage),
    Tournament(TournamentClientMessage),
}

/// Gameplay channel, client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GameClientMessage {
    /// Enter the matchmaking pool
    Matchmaking,

    /// Leave the current match or stop spectating
    LeaveGame,

    /// Start a friendly match against a chosen opponent
    #[serde(rename_all = "camelCase")]
    ReadyToPlay { opponent_uuid: Uuid },

    /// Move own paddle; the server clamps and applies it
    PaddlePosition { position: Vec2 },

    /// Select a paddle cosmetic
    #[serde(rename_all = "camelCase")]
    SkinId { skin_id: String },

    /// Watch the match the target player is currently in
    SpectatingRequest { target: Uuid },
}

/// Tournament channel, client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TournamentClientMessage {
    Create {
        name: String,
        settings: TournamentSettings,
    },

    /// Join under a per-tournament alias
    Join { uuid: Uuid, username: String },

    Leave { uuid: Uuid },

    Close { uuid: Uuid },

    /// Acknowledgment of a bracket launch prompt
    LaunchMatch,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerEnvelope {
    Game { data: GameServerMessage },
    Tournament { data: TournamentServerMessage },
    Notif {
        #[serde(rename = "notifType")]
        notif_type: NotifLevel,
        msg: String,
    },
    Error {
        msg: String,
        #[serde(rename = "errorType", skip_serializing_if = "Option::is_none")]
        error_type: Option<ErrorKind>,
    },
}

impl ServerEnvelope {
    pub fn game(data: GameServerMessage) -> Self {
        Self::Game { data }
    }

    pub fn notif(level: NotifLevel, msg: impl Into<String>) -> Self {
        Self::Notif {
            notif_type: level,
            msg: msg.into(),
        }
    }

    pub fn error(msg: impl Into<String>, error_type: ErrorKind) -> Self {
        Self::Error {
            msg: msg.into(),
            error_type: Some(error_type),
        }
    }
}

/// Gameplay channel, server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GameServerMessage {
    /// Match launched; `id` is the recipient's paddle slot (1 or 2)
    GameStarted { id: u8 },

    /// Per-tick authoritative state broadcast
    GameData { data: GameState },

    /// A player's paddle cosmetic changed
    #[serde(rename_all = "camelCase")]
    SkinId { id: u8, skin_id: String },

    /// Sent to a player rejoining a room they were seated in
    #[serde(rename_all = "camelCase")]
    Reconnection {
        id: u8,
        self_skin_id: String,
        other_skin_id: String,
    },

    /// A slot forfeited through disconnection
    Disconnection { id: u8 },

    /// Terminal result of a match
    #[serde(rename_all = "camelCase")]
    GameResult {
        p1_score: u32,
        p2_score: u32,
        #[serde(rename = "winnerUUID")]
        winner_uuid: String,
        winner: String,
        game_stats: GameStats,
    },
}

/// Tournament channel, server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TournamentServerMessage {
    /// Bracket launch prompt; the client must reply with the same tag
    /// within the acknowledgment window
    LaunchMatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifLevel {
    Info,
    Success,
    Error,
}

/// Machine-readable rejection categories attached to error notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    ConnectionRefused,
    MatchmakingRefused,
    TournamentCreationFailed,
    TournamentJoinFailed,
    TournamentLeaveFailed,
    TournamentCloseFailed,
    SpectatingFailed,
    UnknownError,
}

/// Tournament creation settings, validated by the manager
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentSettings {
    pub max_player_count: u32,
    pub score_to_win: u32,
}

impl TournamentSettings {
    /// Capacity must be a supported bracket size, the score target in range
    pub fn is_valid(&self) -> bool {
        matches!(self.max_player_count, 4 | 8 | 16 | 32)
            && (1..=MAX_SCORE_TO_WIN).contains(&self.score_to_win)
    }
}
