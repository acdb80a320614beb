//! Room: one match instance and its authoritative tick loop
//!
//! Lifecycle: open (0-1 seats) -> full -> launched (tick task running) ->
//! ended -> disposed (removed from the registry). While launched, all
//! external mutation (paddle input, joins, spectators) goes through the
//! room's own mutex and interleaves safely with the tick task.
//!
//! Lock ordering: room -> player. Nothing locks a room while holding a
//! player's lock, and rooms never lock each other.

use dashmap::DashMap;
use parking_lot::Mutex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::time::interval;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::ai::{clamp_paddle_x, drive_bot_paddle};
use crate::game::constants::DEFAULT_SCORE_TO_WIN;
use crate::game::{sim, GameState, GameStats, ReplayData, Vec2};
use crate::session::Player;
use crate::store::matches::{MatchRecord, WinnerMark};
use crate::util::time::{unix_millis, TICK_DURATION};
use crate::ws::protocol::{GameServerMessage, ServerEnvelope};

/// How long a seat may stay dead before the match is forfeited
pub const DISCONNECT_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomType {
    Matchmaking,
    Friendly,
    Tournament,
}

#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("Player is not connected")]
    PlayerNotAlive,

    #[error("The room cannot be joined")]
    NotJoinable,

    #[error("Player is already in the room")]
    AlreadyInRoom,

    #[error("Player is already in another room")]
    InAnotherRoom,

    #[error("Game already ended")]
    GameEnded,

    #[error("Game already started")]
    AlreadyLaunched,

    #[error("Room is not full")]
    NotFull,

    #[error("Player {0} disconnected before the game start")]
    SeatDisconnected(u8),

    #[error("The room cannot be spectated")]
    NotSpectatable,
}

/// Final result handed to the completion callback (tournament bracket)
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub p1_score: u32,
    pub p2_score: u32,
    /// None on a draw
    pub winner_id: Option<Uuid>,
}

struct Seat {
    player: Arc<Player>,
    /// Set when the player leaves a launched match; the reference is kept
    /// so the result can still name them
    left: bool,
}

struct RoomInner {
    seats: [Option<Seat>; 2],
    spectators: Vec<Arc<Player>>,
    state: GameState,
    stats: GameStats,
    replay: ReplayData,
    launched: bool,
    ended: bool,
    /// Winning seat index once ended; None = undecided or draw
    winner: Option<usize>,
    score_to_win: u32,
    completion: Option<oneshot::Sender<MatchOutcome>>,
    rng: ChaCha8Rng,
}

pub struct Room {
    pub id: Uuid,
    room_type: RoomType,
    inner: Mutex<RoomInner>,
}

impl Room {
    fn new(room_type: RoomType) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_type,
            inner: Mutex::new(RoomInner {
                seats: [None, None],
                spectators: Vec::new(),
                state: GameState::new(),
                stats: GameStats::default(),
                replay: ReplayData::new(),
                launched: false,
                ended: false,
                winner: None,
                score_to_win: DEFAULT_SCORE_TO_WIN,
                completion: None,
                rng: ChaCha8Rng::seed_from_u64(rand::random()),
            }),
        }
    }

    pub fn room_type(&self) -> RoomType {
        self.room_type
    }

    pub fn is_launched(&self) -> bool {
        self.inner.lock().launched
    }

    pub fn is_ended(&self) -> bool {
        self.inner.lock().ended
    }

    pub fn is_full(&self) -> bool {
        Self::full_locked(&self.inner.lock())
    }

    /// Joinable while open: not full, not launched, not ended
    pub fn is_joinable(&self) -> bool {
        let inner = self.inner.lock();
        !Self::full_locked(&inner) && !inner.launched && !inner.ended
    }

    pub fn contains(&self, player: &Player) -> bool {
        Self::seat_index_locked(&self.inner.lock(), player).is_some()
    }

    fn full_locked(inner: &RoomInner) -> bool {
        inner.seats.iter().all(|seat| seat.is_some())
    }

    fn seat_index_locked(inner: &RoomInner, player: &Player) -> Option<usize> {
        inner
            .seats
            .iter()
            .position(|seat| seat.as_ref().is_some_and(|s| s.player.id == player.id))
    }

    /// The score a player must reach to win; tournaments override this
    pub fn set_score_to_win(&self, score: u32) {
        self.inner.lock().score_to_win = score;
    }

    /// Register the channel the final result is reported on
    pub fn set_completion(&self, tx: oneshot::Sender<MatchOutcome>) {
        self.inner.lock().completion = Some(tx);
    }

    /// Seat a player. Returns whether the room just became full.
    pub fn add_player(
        &self,
        player: &Arc<Player>,
        rooms: &RoomRegistry,
    ) -> Result<bool, RoomError> {
        if !player.is_alive() {
            return Err(RoomError::PlayerNotAlive);
        }

        let (was_spectating, now_full) = {
            let mut inner = self.inner.lock();
            if Self::full_locked(&inner) || inner.launched || inner.ended {
                return Err(RoomError::NotJoinable);
            }
            if Self::seat_index_locked(&inner, player).is_some() {
                return Err(RoomError::AlreadyInRoom);
            }
            if player.room().is_some_and(|room_id| room_id != self.id) {
                return Err(RoomError::InAnotherRoom);
            }

            let idx = if inner.seats[0].is_none() { 0 } else { 1 };
            inner.seats[idx] = Some(Seat {
                player: player.clone(),
                left: false,
            });
            player.set_room(Some(self.id));
            (player.spectating(), Self::full_locked(&inner))
        };

        // Taking a seat supersedes any spectating relationship
        if let Some(spectated) = was_spectating {
            match rooms.get(&spectated) {
                Some(other) => other.remove_spectator(player),
                None => player.set_spectating(None),
            }
        }

        Ok(now_full)
    }

    /// Unseat a player. Before launch the slot is freed outright; after
    /// launch only the "left" flag is set and the tick loop forfeits the
    /// match on its next pass.
    pub fn remove_player(&self, player: &Arc<Player>) {
        let mut inner = self.inner.lock();
        let Some(idx) = Self::seat_index_locked(&inner, player) else {
            return;
        };

        player.clear_room_if(self.id);

        if inner.launched {
            if let Some(seat) = &mut inner.seats[idx] {
                seat.left = true;
            }
            return;
        }

        inner.seats[idx] = None;
    }

    /// Attach a spectator to a running match and send it the current
    /// paddle cosmetics.
    pub fn add_spectator(&self, player: &Arc<Player>) -> Result<(), RoomError> {
        if !player.is_alive() {
            return Err(RoomError::PlayerNotAlive);
        }

        let mut inner = self.inner.lock();
        if !inner.launched || inner.ended {
            return Err(RoomError::NotSpectatable);
        }
        if Self::seat_index_locked(&inner, player).is_some()
            || inner.spectators.iter().any(|s| s.id == player.id)
        {
            return Err(RoomError::AlreadyInRoom);
        }
        if player.room().is_some() || player.spectating().is_some() {
            return Err(RoomError::InAnotherRoom);
        }

        inner.spectators.push(player.clone());
        player.set_spectating(Some(self.id));

        for (idx, seat) in inner.seats.iter().enumerate() {
            let skin_id = seat
                .as_ref()
                .map(|s| s.player.skin_id())
                .unwrap_or_default();
            player.send(ServerEnvelope::game(GameServerMessage::SkinId {
                id: idx as u8 + 1,
                skin_id,
            }));
        }
        Ok(())
    }

    pub fn remove_spectator(&self, player: &Arc<Player>) {
        player.clear_spectating_if(self.id);
        self.inner
            .lock()
            .spectators
            .retain(|s| s.id != player.id);
    }

    /// Apply a paddle update from the seated player, clamped to the
    /// playable width; the goal-line axis is pinned.
    pub fn set_paddle_position(&self, player: &Player, position: Vec2) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if !inner.launched || inner.ended {
            return;
        }
        let Some(idx) = Self::seat_index_locked(inner, player) else {
            return;
        };

        let current = if idx == 0 {
            inner.state.paddle1_position
        } else {
            inner.state.paddle2_position
        };
        let clamped = Vec2::new(clamp_paddle_x(position.x), current.y);
        let travelled = current.distance(clamped);

        if idx == 0 {
            inner.stats.paddle1_distance_travelled += travelled;
            inner.state.paddle1_position = clamped;
        } else {
            inner.stats.paddle2_distance_travelled += travelled;
            inner.state.paddle2_position = clamped;
        }
    }

    /// Echo a seated player's cosmetic change to the rest of the room
    pub fn notify_skin_update(&self, player: &Arc<Player>) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let Some(idx) = Self::seat_index_locked(inner, player) else {
            return;
        };

        let skin_id = player.skin_id();
        if idx == 0 {
            inner.replay.p1_skin = skin_id.clone();
        } else {
            inner.replay.p2_skin = skin_id.clone();
        }

        let msg = ServerEnvelope::game(GameServerMessage::SkinId {
            id: idx as u8 + 1,
            skin_id,
        });
        Self::broadcast_locked(inner, &msg, &[player.id]);
    }

    /// Re-send room context to a player that reconnected mid-match: both
    /// cosmetics, and the final result if the match already ended.
    pub fn notify_reconnection(&self, player: &Arc<Player>) {
        let inner = self.inner.lock();
        let Some(idx) = Self::seat_index_locked(&inner, player) else {
            return;
        };

        let other_skin_id = inner.seats[1 - idx]
            .as_ref()
            .map(|s| s.player.skin_id())
            .unwrap_or_default();
        player.send(ServerEnvelope::game(GameServerMessage::Reconnection {
            id: idx as u8 + 1,
            self_skin_id: player.skin_id(),
            other_skin_id,
        }));

        if inner.ended {
            player.send(ServerEnvelope::game(Self::result_message_locked(&inner)));
        }
    }

    /// Launch the match: validate both seats, reset state, notify both
    /// players of their paddle slot, and spawn the tick task.
    pub fn start_game(self: &Arc<Self>, state: &AppState) -> Result<(), RoomError> {
        let (p1, p2) = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            if inner.ended {
                return Err(RoomError::GameEnded);
            }
            if inner.launched {
                return Err(RoomError::AlreadyLaunched);
            }
            let (p1, p2) = match (&inner.seats[0], &inner.seats[1]) {
                (Some(a), Some(b)) => (a.player.clone(), b.player.clone()),
                _ => return Err(RoomError::NotFull),
            };
            if !p1.is_alive() {
                return Err(RoomError::SeatDisconnected(1));
            }
            if !p2.is_alive() {
                return Err(RoomError::SeatDisconnected(2));
            }

            inner.launched = true;
            inner.state = GameState::new();
            sim::reset_ball(&mut inner.state.ball, &mut inner.rng);
            inner.stats = GameStats {
                game_start_time: unix_millis(),
                ..GameStats::default()
            };
            inner.replay = ReplayData::new();
            inner.replay.p1_skin = p1.skin_id();
            inner.replay.p2_skin = p2.skin_id();
            inner.replay.snapshot(0, &inner.state);

            p1.send(ServerEnvelope::game(GameServerMessage::GameStarted { id: 1 }));
            p2.send(ServerEnvelope::game(GameServerMessage::GameStarted { id: 2 }));
            (p1, p2)
        };

        tokio::spawn(Room::run(Arc::clone(self), state.clone()));

        info!(
            room_id = %self.id,
            room_type = ?self.room_type,
            p1 = %p1.name(),
            p2 = %p2.name(),
            "Game started"
        );
        Ok(())
    }

    /// The authoritative tick loop, one task per launched room
    async fn run(room: Arc<Room>, state: AppState) {
        let mut ticker = interval(TICK_DURATION);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut previous = Instant::now();
        let mut grace_deadlines: [Option<Instant>; 2] = [None, None];

        loop {
            ticker.tick().await;
            let now = Instant::now();
            let dt = now.duration_since(previous).as_secs_f64();
            previous = now;

            let mut forfeit: Option<usize> = None;
            let mut score_reached = false;
            {
                let mut guard = room.inner.lock();
                let inner = &mut *guard;
                if inner.ended {
                    return;
                }

                for idx in 0..2 {
                    let Some(seat) = &inner.seats[idx] else {
                        continue;
                    };
                    if seat.left || !seat.player.is_alive() {
                        let deadline =
                            *grace_deadlines[idx].get_or_insert(now + DISCONNECT_GRACE);
                        if seat.left || now > deadline {
                            forfeit = Some(idx);
                            break;
                        }
                    } else {
                        grace_deadlines[idx] = None;
                    }
                }

                if forfeit.is_none() {
                    for idx in 0..2 {
                        let is_bot = inner.seats[idx]
                            .as_ref()
                            .is_some_and(|s| s.player.is_bot);
                        if is_bot {
                            let ball_x = inner.state.ball.position.x;
                            let paddle = if idx == 0 {
                                &mut inner.state.paddle1_position
                            } else {
                                &mut inner.state.paddle2_position
                            };
                            drive_bot_paddle(paddle, ball_x, dt);
                        }
                    }

                    sim::advance(&mut inner.state, &mut inner.stats, &mut inner.rng, dt);

                    let msg = ServerEnvelope::game(GameServerMessage::GameData {
                        data: inner.state.clone(),
                    });
                    Self::broadcast_locked(inner, &msg, &[]);

                    let elapsed = unix_millis().saturating_sub(inner.stats.game_start_time);
                    inner.replay.snapshot(elapsed, &inner.state);

                    score_reached = inner.state.p1_score >= inner.score_to_win
                        || inner.state.p2_score >= inner.score_to_win;
                }
            }

            if let Some(idx) = forfeit {
                room.end_game(&state, Some(idx));
                return;
            }
            if score_reached {
                room.end_game(&state, None);
                return;
            }
        }
    }

    /// Terminate the match: decide the winner (disconnect forfeit takes
    /// priority over score), broadcast the result, report to the completion
    /// callback, persist, and dispose the room.
    fn end_game(&self, state: &AppState, disconnected: Option<usize>) {
        let persisted = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            if !inner.launched || inner.ended {
                warn!(room_id = %self.id, "Ignoring end of a game that is not running");
                return;
            }
            inner.ended = true;
            inner.stats.game_end_time = unix_millis();
            inner.replay.game_duration = inner
                .stats
                .game_end_time
                .saturating_sub(inner.stats.game_start_time);

            if let Some(idx) = disconnected {
                let seat_name = inner.seats[idx]
                    .as_ref()
                    .map(|s| s.player.name())
                    .unwrap_or_default();
                info!(
                    room_id = %self.id,
                    seat = idx + 1,
                    player = %seat_name,
                    "Seat forfeited after disconnection"
                );
                let msg = ServerEnvelope::game(GameServerMessage::Disconnection {
                    id: idx as u8 + 1,
                });
                Self::broadcast_locked(inner, &msg, &[]);
            }

            inner.winner = decide_winner(
                disconnected,
                inner.state.p1_score,
                inner.state.p2_score,
            );

            let result = Self::result_message_locked(inner);
            Self::broadcast_locked(inner, &ServerEnvelope::game(result), &[]);

            let seat_id = |idx: usize| -> Option<Uuid> {
                inner.seats[idx].as_ref().map(|s| s.player.id)
            };
            if seat_id(0).is_none() || seat_id(1).is_none() {
                warn!(room_id = %self.id, "A seat is missing at end of game");
            }

            let outcome = MatchOutcome {
                p1_score: inner.state.p1_score,
                p2_score: inner.state.p2_score,
                winner_id: inner.winner.and_then(seat_id),
            };
            let record = MatchRecord {
                match_id: Uuid::new_v4(),
                player_a: seat_id(0),
                player_b: seat_id(1),
                score_a: inner.state.p1_score,
                score_b: inner.state.p2_score,
                winner: match inner.winner {
                    Some(0) => WinnerMark::A,
                    Some(_) => WinnerMark::B,
                    None => WinnerMark::Draw,
                },
                mode: self.room_type,
                recorded_at: chrono::Utc::now(),
            };

            (outcome, record, inner.replay.clone(), inner.completion.take())
        };
        let (outcome, record, replay, completion) = persisted;

        if let Some(tx) = completion {
            let _ = tx.send(outcome);
        }

        // Fire-and-forget persistence; failures are logged, not retried
        let matches = state.matches.clone();
        let replays = state.replays.clone();
        tokio::spawn(async move {
            if let Err(err) = matches.record(&record).await {
                warn!(match_id = %record.match_id, error = %err, "Failed to persist match result");
            }
            if let Err(err) = replays.save(record.match_id, &replay).await {
                warn!(match_id = %record.match_id, error = %err, "Failed to persist replay");
            }
        });

        self.dispose(&state.rooms);
    }

    /// Clear all back-references and drop the room from the registry
    pub fn dispose(&self, rooms: &RoomRegistry) {
        {
            let mut inner = self.inner.lock();
            for seat in inner.seats.iter().flatten() {
                seat.player.clear_room_if(self.id);
            }
            inner.seats = [None, None];
            for spectator in inner.spectators.drain(..) {
                spectator.clear_spectating_if(self.id);
            }
            inner.completion = None;
        }
        rooms.remove(&self.id);
    }

    fn result_message_locked(inner: &RoomInner) -> GameServerMessage {
        let (winner_uuid, winner_name) = match inner
            .winner
            .and_then(|idx| inner.seats[idx].as_ref())
        {
            Some(seat) => (seat.player.id.to_string(), seat.player.name()),
            None => (String::new(), String::new()),
        };

        GameServerMessage::GameResult {
            p1_score: inner.state.p1_score,
            p2_score: inner.state.p2_score,
            winner_uuid,
            winner: winner_name,
            game_stats: inner.stats.clone(),
        }
    }

    /// Deliver a message to both live seats and every live spectator.
    /// Seats that already left are skipped.
    fn broadcast_locked(inner: &RoomInner, msg: &ServerEnvelope, exclude: &[Uuid]) {
        for seat in inner.seats.iter().flatten() {
            if !seat.left && seat.player.is_alive() && !exclude.contains(&seat.player.id) {
                seat.player.send(msg.clone());
            }
        }
        for spectator in &inner.spectators {
            if spectator.is_alive() && !exclude.contains(&spectator.id) {
                spectator.send(msg.clone());
            }
        }
    }
}

/// Disconnect forfeit beats score; equal scores draw
fn decide_winner(disconnected: Option<usize>, p1_score: u32, p2_score: u32) -> Option<usize> {
    match disconnected {
        Some(0) => Some(1),
        Some(_) => Some(0),
        None => match p1_score.cmp(&p2_score) {
            Ordering::Greater => Some(0),
            Ordering::Less => Some(1),
            Ordering::Equal => None,
        },
    }
}

/// Registry of all live rooms; owns them until disposal
pub struct RoomRegistry {
    rooms: DashMap<Uuid, Arc<Room>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    pub fn create(&self, room_type: RoomType) -> Arc<Room> {
        let room = Arc::new(Room::new(room_type));
        self.rooms.insert(room.id, room.clone());
        room
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<Room>> {
        self.rooms.get(id).map(|r| r.value().clone())
    }

    pub fn remove(&self, id: &Uuid) -> Option<Arc<Room>> {
        self.rooms.remove(id).map(|(_, room)| room)
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Seat the player in an open matchmaking room, creating one when none
/// is joinable; the join that fills a room launches its game.
pub fn join_matchmaking(state: &AppState, player: &Arc<Player>) {
    if player.room().is_some() || player.spectating().is_some() {
        return;
    }

    let candidates: Vec<Arc<Room>> = state
        .rooms
        .rooms
        .iter()
        .filter(|entry| entry.value().room_type() == RoomType::Matchmaking)
        .map(|entry| entry.value().clone())
        .collect();

    for room in candidates {
        if !room.is_joinable() {
            continue;
        }
        match room.add_player(player, &state.rooms) {
            Ok(true) => {
                start_room(state, &room);
                return;
            }
            Ok(false) => return,
            Err(_) => continue,
        }
    }

    let room = state.rooms.create(RoomType::Matchmaking);
    if let Err(err) = room.add_player(player, &state.rooms) {
        warn!(room_id = %room.id, error = %err, "Matchmaking join failed");
        room.dispose(&state.rooms);
    }
}

/// Launch a full room, disposing it when the launch fails so no dangling
/// room is left behind
pub fn start_room(state: &AppState, room: &Arc<Room>) {
    if let Err(err) = room.start_game(state) {
        error!(room_id = %room.id, error = %err, "Error starting game");
        room.dispose(&state.rooms);
    }
}
