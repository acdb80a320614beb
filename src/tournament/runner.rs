//! Bracket execution: round driving and per-match resolution
//!
//! One task per tournament walks the bracket round by round. All matches of
//! a round play concurrently; the round joins before the next one is
//! computed. A single player's failure (disconnect, missed acknowledgment)
//! resolves that match by forfeit and never stalls the rest of the bracket.

use futures::future;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::room::RoomType;
use crate::session::Player;
use crate::store::matches::{MatchRecord, WinnerMark};
use crate::ws::protocol::{ServerEnvelope, TournamentServerMessage};

use super::bracket::{NodeId, Slot};
use super::manager::Tournament;

/// Pause between rounds, giving clients time for bracket transitions
pub const ROUND_DELAY: Duration = Duration::from_secs(10);
/// How long a human participant has to acknowledge the launch prompt
pub const READY_ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Drive a closed tournament's bracket to completion
pub async fn run_bracket(tournament: Arc<Tournament>, state: AppState) {
    let mut round: Vec<NodeId> = { tournament.inner.lock().bracket.first_round() };

    while !round.is_empty() {
        tokio::time::sleep(ROUND_DELAY).await;

        let pairings: Vec<(NodeId, Arc<Player>, Arc<Player>)> = {
            let inner = tournament.inner.lock();
            round
                .iter()
                .filter_map(|&id| {
                    inner
                        .bracket
                        .contestants(id)
                        .map(|(p1, p2)| (id, p1, p2))
                })
                .collect()
        };

        let plays = pairings.into_iter().map(|(id, p1, p2)| {
            let state = state.clone();
            let score_to_win = tournament.settings.score_to_win;
            async move { (id, play_match(&state, score_to_win, p1, p2).await) }
        });
        let results = future::join_all(plays).await;

        {
            let mut inner = tournament.inner.lock();
            for (id, winner) in results {
                if let Err(err) = inner.bracket.record_winner(id, winner) {
                    error!(
                        tournament_id = %tournament.id,
                        node = id,
                        error = %err,
                        "Failed to record a bracket winner"
                    );
                }
            }
        }

        round = { tournament.inner.lock().bracket.next_round(&round) };
    }

    let champion = {
        let mut inner = tournament.inner.lock();
        inner.ended = true;
        inner.bracket.winner().map(|p| p.name())
    };
    info!(
        tournament_id = %tournament.id,
        name = %tournament.name,
        winner = champion.as_deref().unwrap_or("-"),
        "Tournament finished"
    );
}

/// Resolve one bracket match and return the winning slot
async fn play_match(
    state: &AppState,
    score_to_win: u32,
    p1: Arc<Player>,
    p2: Arc<Player>,
) -> Slot {
    // Bot versus bot needs no room: flip a coin and move on
    if p1.is_bot && p2.is_bot {
        let winner = coin_flip();
        persist_forfeit(state, &p1, &p2, winner);
        return winner;
    }

    let room = state.rooms.create(RoomType::Tournament);

    if let Err(err) = room.add_player(&p1, &state.rooms) {
        warn!(room_id = %room.id, player = %p1.name(), error = %err, "Contestant cannot take a seat");
        room.dispose(&state.rooms);
        let winner = Slot::B;
        persist_forfeit(state, &p1, &p2, winner);
        return winner;
    }
    if let Err(err) = room.add_player(&p2, &state.rooms) {
        warn!(room_id = %room.id, player = %p2.name(), error = %err, "Contestant cannot take a seat");
        room.dispose(&state.rooms);
        let winner = Slot::A;
        persist_forfeit(state, &p1, &p2, winner);
        return winner;
    }

    room.set_score_to_win(score_to_win);
    let (done_tx, done_rx) = oneshot::channel();
    room.set_completion(done_tx);

    let (ready1, ready2) = tokio::join!(wait_for_ready(&p1), wait_for_ready(&p2));
    if !ready1 || !ready2 {
        warn!(
            room_id = %room.id,
            p1_ready = ready1,
            p2_ready = ready2,
            "Launch prompt not acknowledged in time"
        );
        room.dispose(&state.rooms);
        let winner = match (ready1, ready2) {
            (true, false) => Slot::A,
            (false, true) => Slot::B,
            _ => coin_flip(),
        };
        persist_forfeit(state, &p1, &p2, winner);
        return winner;
    }

    if let Err(err) = room.start_game(state) {
        error!(room_id = %room.id, error = %err, "Error starting tournament game");
        room.dispose(&state.rooms);
        let winner = coin_flip();
        persist_forfeit(state, &p1, &p2, winner);
        return winner;
    }

    match done_rx.await {
        // Draws cannot happen at a positive score target; A keeps the tie
        Ok(outcome) => {
            if outcome.winner_id == Some(p2.id) {
                Slot::B
            } else {
                Slot::A
            }
        }
        Err(_) => {
            error!(room_id = %room.id, "Match ended without reporting a result");
            coin_flip()
        }
    }
}

/// Prompt a participant and wait for its acknowledgment. Bots acknowledge
/// instantly; a reconnecting human can still answer the pending prompt.
async fn wait_for_ready(player: &Arc<Player>) -> bool {
    if player.is_bot {
        return true;
    }

    let (tx, rx) = oneshot::channel();
    player.arm_ready_ack(tx);
    player.send(ServerEnvelope::Tournament {
        data: TournamentServerMessage::LaunchMatch,
    });

    matches!(tokio::time::timeout(READY_ACK_TIMEOUT, rx).await, Ok(Ok(())))
}

fn coin_flip() -> Slot {
    if rand::thread_rng().gen::<bool>() {
        Slot::A
    } else {
        Slot::B
    }
}

/// Record a zero-score result for a match that never got played
fn persist_forfeit(state: &AppState, p1: &Arc<Player>, p2: &Arc<Player>, winner: Slot) {
    let record = MatchRecord {
        match_id: Uuid::new_v4(),
        player_a: Some(p1.id),
        player_b: Some(p2.id),
        score_a: 0,
        score_b: 0,
        winner: match winner {
            Slot::A => WinnerMark::A,
            Slot::B => WinnerMark::B,
        },
        mode: RoomType::Tournament,
        recorded_at: chrono::Utc::now(),
    };

    let store = state.matches.clone();
    tokio::spawn(async move {
        if let Err(err) = store.record(&record).await {
            warn!(match_id = %record.match_id, error = %err, "Failed to persist a forfeited match");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::skins::SkinCatalog;
    use crate::tournament::manager::TournamentRegistry;
    use crate::ws::protocol::TournamentSettings;

    fn bots(count: usize) -> Vec<Arc<Player>> {
        (0..count)
            .map(|i| Arc::new(Player::new_bot(format!("Bot {}", i + 1), String::new())))
            .collect()
    }

    #[tokio::test]
    async fn bot_match_resolves_without_a_room() {
        let state = AppState::for_tests();
        let players = bots(2);

        let winner = play_match(&state, 5, players[0].clone(), players[1].clone()).await;
        assert!(matches!(winner, Slot::A | Slot::B));
        assert_eq!(state.rooms.active_rooms(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn an_all_bot_bracket_runs_to_completion() {
        let state = AppState::for_tests();
        let registry = TournamentRegistry::new(Arc::new(SkinCatalog::new()));
        let owner = {
            let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
            Arc::new(Player::new_human(Uuid::new_v4(), "alice".into(), tx))
        };
        let tournament = registry
            .create(
                "bot cup",
                &owner,
                TournamentSettings {
                    max_player_count: 4,
                    score_to_win: 3,
                },
            )
            .unwrap();

        {
            let mut inner = tournament.inner.lock();
            inner.players = bots(4);
            inner.closed = true;
            let roster = inner.players.clone();
            inner
                .bracket
                .generate(&roster, &mut rand::thread_rng())
                .unwrap();
        }

        // The paused clock auto-advances through the inter-round delays
        run_bracket(tournament.clone(), state.clone()).await;

        assert!(tournament.is_ended());
        let inner = tournament.inner.lock();
        let champion = inner.bracket.winner().expect("bracket must have a winner");
        assert!(champion.is_bot);
        assert_eq!(state.rooms.active_rooms(), 0);
    }
}
