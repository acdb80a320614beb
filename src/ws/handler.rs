//! WebSocket upgrade handler and inbound message dispatch

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::room::{self, RoomType};
use crate::session::Player;
use crate::tournament::run_bracket;
use crate::util::rate_limit::PlayerRateLimiter;
use crate::ws::protocol::{
    ClientEnvelope, ErrorKind, GameClientMessage, ServerEnvelope, TournamentClientMessage,
};

/// Query parameters for WebSocket connection.
/// Identity is verified upstream by the auth gateway; the core trusts it.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub uuid: Uuid,
    pub name: String,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    info!(player_id = %query.uuid, "WebSocket upgrade");
    ws.on_upgrade(move |socket| handle_socket(socket, query, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(mut socket: WebSocket, query: WsQuery, state: AppState) {
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();

    let player = match state
        .sessions
        .connect(query.uuid, query.name, outbound_tx, &state.rooms)
    {
        Ok(player) => player,
        Err(err) => {
            let refusal = ServerEnvelope::error(err.to_string(), ErrorKind::ConnectionRefused);
            if let Ok(json) = serde_json::to_string(&refusal) {
                let _ = socket.send(Message::Text(json)).await;
            }
            return;
        }
    };

    let (mut ws_sink, mut ws_stream) = socket.split();

    // Writer task: outbound queue -> WebSocket
    let writer_player_id = player.id;
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if let Err(err) = ws_sink.send(Message::Text(json)).await {
                        debug!(player_id = %writer_player_id, error = %err, "WebSocket send failed");
                        break;
                    }
                }
                Err(err) => {
                    warn!(player_id = %writer_player_id, error = %err, "Failed to serialize outbound message");
                }
            }
        }
    });

    // Reader loop: WebSocket -> dispatch
    let rate_limiter = PlayerRateLimiter::new();
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(player_id = %player.id, "Rate limited inbound message");
                    continue;
                }

                match serde_json::from_str::<ClientEnvelope>(&text) {
                    Ok(msg) => dispatch(&state, &player, msg),
                    Err(err) => {
                        warn!(player_id = %player.id, error = %err, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(player_id = %player.id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(player_id = %player.id, "Client initiated close");
                break;
            }
            Err(err) => {
                error!(player_id = %player.id, error = %err, "WebSocket error");
                break;
            }
        }
    }

    state.sessions.disconnect(&player, &state.rooms);
    writer_handle.abort();
}

/// Route one classified inbound message to the room, tournament, or
/// session operation it targets. Synchronous rejections go back to the
/// sender only, as typed error notifications.
fn dispatch(state: &AppState, player: &Arc<Player>, msg: ClientEnvelope) {
    match msg {
        ClientEnvelope::Game(game_msg) => dispatch_game(state, player, game_msg),
        ClientEnvelope::Tournament(tournament_msg) => {
            dispatch_tournament(state, player, tournament_msg)
        }
    }
}

fn dispatch_game(state: &AppState, player: &Arc<Player>, msg: GameClientMessage) {
    match msg {
        GameClientMessage::Matchmaking => {
            if player.room().is_some() || player.spectating().is_some() {
                player.send(ServerEnvelope::error(
                    "Already inside a room",
                    ErrorKind::MatchmakingRefused,
                ));
                return;
            }
            info!(player_id = %player.id, name = %player.name(), "Matchmaking request");
            room::join_matchmaking(state, player);
        }

        GameClientMessage::LeaveGame => {
            if let Some(current) = player.room().and_then(|id| state.rooms.get(&id)) {
                current.remove_player(player);
            }
            if let Some(watched) = player.spectating().and_then(|id| state.rooms.get(&id)) {
                watched.remove_spectator(player);
            }
        }

        GameClientMessage::ReadyToPlay { opponent_uuid } => {
            let Some(opponent) = state.sessions.get(&opponent_uuid) else {
                warn!(player_id = %player.id, "Friendly match opponent not found");
                return;
            };
            if player.room().is_some() || opponent.room().is_some() {
                warn!(
                    player_id = %player.id,
                    opponent_id = %opponent.id,
                    "Refusing friendly match, a participant is already in a room"
                );
                return;
            }

            let friendly = state.rooms.create(RoomType::Friendly);
            if friendly.add_player(player, &state.rooms).is_err()
                || friendly.add_player(&opponent, &state.rooms).is_err()
            {
                warn!(room_id = %friendly.id, "Could not seat both friendly match players");
                friendly.dispose(&state.rooms);
                return;
            }
            room::start_room(state, &friendly);
        }

        GameClientMessage::PaddlePosition { position } => {
            if let Some(current) = player.room().and_then(|id| state.rooms.get(&id)) {
                current.set_paddle_position(player, position);
            }
        }

        GameClientMessage::SkinId { skin_id } => {
            player.set_skin_id(state.skins.resolve_or_random(&skin_id));
            if let Some(current) = player.room().and_then(|id| state.rooms.get(&id)) {
                if current.is_launched() {
                    current.notify_skin_update(player);
                }
            }
        }

        GameClientMessage::SpectatingRequest { target } => {
            let Some(target_player) = state.sessions.get(&target) else {
                player.send(ServerEnvelope::error(
                    "No player has been found",
                    ErrorKind::SpectatingFailed,
                ));
                return;
            };
            let Some(watched) = target_player.room().and_then(|id| state.rooms.get(&id)) else {
                player.send(ServerEnvelope::error(
                    "The player is not in a game",
                    ErrorKind::SpectatingFailed,
                ));
                return;
            };
            if let Err(err) = watched.add_spectator(player) {
                player.send(ServerEnvelope::error(
                    err.to_string(),
                    ErrorKind::SpectatingFailed,
                ));
            }
        }
    }
}

fn dispatch_tournament(state: &AppState, player: &Arc<Player>, msg: TournamentClientMessage) {
    match msg {
        TournamentClientMessage::Create { name, settings } => {
            if let Err(err) = state.tournaments.create(&name, player, settings) {
                player.send(ServerEnvelope::error(
                    err.to_string(),
                    ErrorKind::TournamentCreationFailed,
                ));
            }
        }

        TournamentClientMessage::Join { uuid, username } => {
            match state.tournaments.add_player(uuid, player, Some(username)) {
                Ok(Some(tournament)) => {
                    // The join filled the roster; the bracket starts now
                    tokio::spawn(run_bracket(tournament, state.clone()));
                }
                Ok(None) => {}
                Err(err) => {
                    player.send(ServerEnvelope::error(
                        err.to_string(),
                        ErrorKind::TournamentJoinFailed,
                    ));
                }
            }
        }

        TournamentClientMessage::Leave { uuid } => {
            if let Err(err) = state.tournaments.remove_player(uuid, player) {
                player.send(ServerEnvelope::error(
                    err.to_string(),
                    ErrorKind::TournamentLeaveFailed,
                ));
            }
        }

        TournamentClientMessage::Close { uuid } => {
            match state.tournaments.close(uuid, player) {
                Ok(Some(tournament)) => {
                    tokio::spawn(run_bracket(tournament, state.clone()));
                }
                Ok(None) => {}
                Err(err) => {
                    player.send(ServerEnvelope::error(
                        err.to_string(),
                        ErrorKind::TournamentCloseFailed,
                    ));
                }
            }
        }

        TournamentClientMessage::LaunchMatch => {
            if let Some(ack) = player.take_ready_ack() {
                let _ = ack.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::protocol::TournamentSettings;

    fn connect(state: &AppState, name: &str) -> (Arc<Player>, mpsc::UnboundedReceiver<ServerEnvelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let player = state
            .sessions
            .connect(Uuid::new_v4(), name.into(), tx, &state.rooms)
            .unwrap();
        (player, rx)
    }

    #[tokio::test]
    async fn matchmaking_pairs_two_players_into_one_room() {
        let state = AppState::for_tests();
        let (alice, mut rx_a) = connect(&state, "alice");
        let (bob, _rx_b) = connect(&state, "bob");

        dispatch(
            &state,
            &alice,
            ClientEnvelope::Game(GameClientMessage::Matchmaking),
        );
        assert!(alice.room().is_some());
        assert_eq!(state.rooms.active_rooms(), 1);

        dispatch(
            &state,
            &bob,
            ClientEnvelope::Game(GameClientMessage::Matchmaking),
        );
        assert_eq!(alice.room(), bob.room());

        // The second join filled the room and launched the game
        let first = rx_a.recv().await.unwrap();
        assert!(matches!(
            first,
            ServerEnvelope::Game {
                data: crate::ws::protocol::GameServerMessage::GameStarted { id: 1 }
            }
        ));
    }

    #[tokio::test]
    async fn matchmaking_while_seated_is_rejected_with_a_typed_error() {
        let state = AppState::for_tests();
        let (alice, mut rx_a) = connect(&state, "alice");

        dispatch(
            &state,
            &alice,
            ClientEnvelope::Game(GameClientMessage::Matchmaking),
        );
        dispatch(
            &state,
            &alice,
            ClientEnvelope::Game(GameClientMessage::Matchmaking),
        );

        let rejection = rx_a.recv().await.unwrap();
        assert!(matches!(
            rejection,
            ServerEnvelope::Error {
                error_type: Some(ErrorKind::MatchmakingRefused),
                ..
            }
        ));
        // Still only one room, with alice seated once
        assert_eq!(state.rooms.active_rooms(), 1);
    }

    #[tokio::test]
    async fn tournament_validation_errors_reach_only_the_requester() {
        let state = AppState::for_tests();
        let (alice, mut rx_a) = connect(&state, "alice");

        dispatch(
            &state,
            &alice,
            ClientEnvelope::Tournament(TournamentClientMessage::Create {
                name: "  ".into(),
                settings: TournamentSettings {
                    max_player_count: 8,
                    score_to_win: 5,
                },
            }),
        );

        let rejection = rx_a.recv().await.unwrap();
        assert!(matches!(
            rejection,
            ServerEnvelope::Error {
                error_type: Some(ErrorKind::TournamentCreationFailed),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn ready_ack_fires_the_armed_channel() {
        let state = AppState::for_tests();
        let (alice, _rx_a) = connect(&state, "alice");

        let (tx, rx) = tokio::sync::oneshot::channel();
        alice.arm_ready_ack(tx);
        dispatch(
            &state,
            &alice,
            ClientEnvelope::Tournament(TournamentClientMessage::LaunchMatch),
        );
        assert!(rx.await.is_ok());
    }
}
