//! Session registry: connected players and reconnection windows
//!
//! Tracks one live `Player` per verified identity and keeps disconnected
//! players around for a short window so a dropped client can resume its
//! match. A 1 Hz sweep evicts expired entries and forcibly removes them
//! from any room they still occupy.

pub mod player;

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;
use uuid::Uuid;

use crate::room::RoomRegistry;

pub use player::{OutboundSender, Player};

/// How long a disconnected player may still reclaim its session
pub const RECONNECT_WINDOW: Duration = Duration::from_secs(30);
/// Period of the eviction sweep
const SWEEP_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Already connected")]
    AlreadyConnected,
}

struct DisconnectedPlayer {
    disconnected_at: Instant,
    player: Arc<Player>,
}

/// Registry of live and recently-disconnected players
pub struct SessionRegistry {
    players: DashMap<Uuid, Arc<Player>>,
    recently_disconnected: DashMap<Uuid, DisconnectedPlayer>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            players: DashMap::new(),
            recently_disconnected: DashMap::new(),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<Player>> {
        self.players.get(id).map(|p| p.value().clone())
    }

    pub fn connected_count(&self) -> usize {
        self.players.len()
    }

    /// Register a verified identity on a fresh connection.
    ///
    /// A player still inside the reconnection window gets its existing
    /// object back with the new transport attached, keeping room and
    /// spectating references; its current room is told about the return.
    pub fn connect(
        &self,
        id: Uuid,
        name: String,
        conn: OutboundSender,
        rooms: &RoomRegistry,
    ) -> Result<Arc<Player>, SessionError> {
        if self.players.contains_key(&id) {
            return Err(SessionError::AlreadyConnected);
        }

        let player = match self.recently_disconnected.remove(&id) {
            Some((_, entry)) => {
                let player = entry.player;
                player.attach(conn, name);
                info!(player_id = %id, name = %player.name(), "Player reconnected");

                if let Some(room_id) = player.room() {
                    if let Some(room) = rooms.get(&room_id) {
                        room.notify_reconnection(&player);
                    }
                }
                player
            }
            None => {
                let player = Arc::new(Player::new_human(id, name, conn));
                info!(player_id = %id, name = %player.name(), "New player connected");
                player
            }
        };

        self.players.insert(id, player.clone());
        Ok(player)
    }

    /// Handle a transport close: detach, pull the player from unlaunched
    /// rooms (launched rooms run their own grace period), and open the
    /// reconnection window.
    pub fn disconnect(&self, player: &Arc<Player>, rooms: &RoomRegistry) {
        player.detach();

        if let Some(room_id) = player.room() {
            if let Some(room) = rooms.get(&room_id) {
                if !room.is_launched() {
                    room.remove_player(player);
                }
            }
        }
        if let Some(room_id) = player.spectating() {
            if let Some(room) = rooms.get(&room_id) {
                room.remove_spectator(player);
            }
        }

        self.players.remove(&player.id);
        self.recently_disconnected.insert(
            player.id,
            DisconnectedPlayer {
                disconnected_at: Instant::now(),
                player: player.clone(),
            },
        );
        info!(player_id = %player.id, "Player disconnected");
    }

    /// Evict reconnection entries older than `max_age`, forfeiting any
    /// match they still hold a seat in.
    pub fn sweep_expired(&self, max_age: Duration, rooms: &RoomRegistry) {
        let now = Instant::now();
        let expired: Vec<Uuid> = self
            .recently_disconnected
            .iter()
            .filter(|entry| now.duration_since(entry.disconnected_at) > max_age)
            .map(|entry| *entry.key())
            .collect();

        for id in expired {
            if let Some((_, entry)) = self.recently_disconnected.remove(&id) {
                if let Some(room_id) = entry.player.room() {
                    if let Some(room) = rooms.get(&room_id) {
                        room.remove_player(&entry.player);
                    }
                }
                info!(player_id = %id, "Reconnection window expired");
            }
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn the background disconnect sweep
pub fn spawn_sweeper(sessions: Arc<SessionRegistry>, rooms: Arc<RoomRegistry>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_PERIOD);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            sessions.sweep_expired(RECONNECT_WINDOW, &rooms);
        }
    });
}
