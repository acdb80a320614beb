//! Tournament registry: creation, membership, and closing rules

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::session::Player;
use crate::store::skins::SkinCatalog;
use crate::ws::protocol::{NotifLevel, ServerEnvelope, TournamentSettings};

use super::bracket::Bracket;

/// Fewest real players a tournament can start with; the rest of the draw
/// is padded with bots
const MIN_PLAYERS_TO_CLOSE: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum TournamentError {
    #[error("Invalid tournament name")]
    InvalidName,

    #[error("Invalid tournament settings")]
    InvalidSettings,

    #[error("Already owner of a tournament")]
    AlreadyOwner,

    #[error("The tournament has not been found")]
    NotFound,

    #[error("The tournament is closed")]
    Closed,

    #[error("The tournament is full")]
    Full,

    #[error("Player is already in the tournament")]
    AlreadyJoined,

    #[error("The username is already used by someone else")]
    AliasTaken,

    #[error("Player is not in the tournament")]
    NotJoined,

    #[error("You are not the owner of this tournament")]
    NotOwner,

    #[error("Not enough players to close the tournament")]
    NotEnoughPlayers,
}

pub(crate) struct TournamentInner {
    pub players: Vec<Arc<Player>>,
    /// Per-tournament display alias, unique within the tournament
    pub aliases: HashMap<Uuid, String>,
    pub closed: bool,
    pub ended: bool,
    pub bracket: Bracket,
}

pub struct Tournament {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    pub settings: TournamentSettings,
    pub(crate) inner: Mutex<TournamentInner>,
}

impl Tournament {
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn is_ended(&self) -> bool {
        self.inner.lock().ended
    }

    pub fn player_count(&self) -> usize {
        self.inner.lock().players.len()
    }

    pub fn alias_of(&self, player_id: &Uuid) -> Option<String> {
        self.inner.lock().aliases.get(player_id).cloned()
    }
}

/// Registry of all tournaments; entries stay after ending, only their
/// owner slot frees up for a new one
pub struct TournamentRegistry {
    tournaments: DashMap<Uuid, Arc<Tournament>>,
    skins: Arc<SkinCatalog>,
}

impl TournamentRegistry {
    pub fn new(skins: Arc<SkinCatalog>) -> Self {
        Self {
            tournaments: DashMap::new(),
            skins,
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<Tournament>> {
        self.tournaments.get(id).map(|t| t.value().clone())
    }

    pub fn open_tournaments(&self) -> usize {
        self.tournaments
            .iter()
            .filter(|entry| !entry.value().is_ended())
            .count()
    }

    pub fn create(
        &self,
        name: &str,
        owner: &Arc<Player>,
        settings: TournamentSettings,
    ) -> Result<Arc<Tournament>, TournamentError> {
        if name.trim().is_empty() {
            return Err(TournamentError::InvalidName);
        }
        if !settings.is_valid() {
            return Err(TournamentError::InvalidSettings);
        }
        // One running tournament per owner
        if self
            .tournaments
            .iter()
            .any(|entry| entry.value().owner_id == owner.id && !entry.value().is_ended())
        {
            return Err(TournamentError::AlreadyOwner);
        }

        let tournament = Arc::new(Tournament {
            id: Uuid::new_v4(),
            name: name.to_string(),
            owner_id: owner.id,
            settings,
            inner: Mutex::new(TournamentInner {
                players: Vec::new(),
                aliases: HashMap::new(),
                closed: false,
                ended: false,
                bracket: Bracket::new(),
            }),
        });
        self.tournaments.insert(tournament.id, tournament.clone());

        info!(
            tournament_id = %tournament.id,
            name = %tournament.name,
            owner = %owner.name(),
            "Tournament created"
        );
        Ok(tournament)
    }

    /// Register a player under an alias. When the join reaches capacity the
    /// tournament closes itself; the returned handle (if any) is ready for
    /// bracket execution.
    pub fn add_player(
        &self,
        tournament_id: Uuid,
        player: &Arc<Player>,
        alias: Option<String>,
    ) -> Result<Option<Arc<Tournament>>, TournamentError> {
        let tournament = self.get(&tournament_id).ok_or(TournamentError::NotFound)?;

        let now_full = {
            let mut inner = tournament.inner.lock();
            if inner.closed {
                return Err(TournamentError::Closed);
            }
            if inner.players.len() >= tournament.settings.max_player_count as usize {
                return Err(TournamentError::Full);
            }
            if inner.players.iter().any(|p| p.id == player.id) {
                return Err(TournamentError::AlreadyJoined);
            }

            let alias = alias.unwrap_or_else(|| player.name());
            if inner.aliases.values().any(|a| *a == alias) {
                return Err(TournamentError::AliasTaken);
            }

            inner.players.push(player.clone());
            inner.aliases.insert(player.id, alias);
            inner.players.len() >= tournament.settings.max_player_count as usize
        };

        if now_full {
            return Ok(self.close_internal(&tournament).then_some(tournament));
        }
        Ok(None)
    }

    pub fn remove_player(
        &self,
        tournament_id: Uuid,
        player: &Arc<Player>,
    ) -> Result<(), TournamentError> {
        let tournament = self.get(&tournament_id).ok_or(TournamentError::NotFound)?;

        let mut inner = tournament.inner.lock();
        if inner.closed {
            return Err(TournamentError::Closed);
        }
        let Some(idx) = inner.players.iter().position(|p| p.id == player.id) else {
            return Err(TournamentError::NotJoined);
        };
        inner.players.remove(idx);
        inner.aliases.remove(&player.id);
        Ok(())
    }

    /// Owner-requested close. On success the roster is padded, the bracket
    /// generated, and the returned handle (if any) is ready for execution.
    pub fn close(
        &self,
        tournament_id: Uuid,
        requester: &Arc<Player>,
    ) -> Result<Option<Arc<Tournament>>, TournamentError> {
        let tournament = self.get(&tournament_id).ok_or(TournamentError::NotFound)?;

        {
            let inner = tournament.inner.lock();
            if inner.closed {
                return Err(TournamentError::Closed);
            }
            if tournament.owner_id != requester.id {
                return Err(TournamentError::NotOwner);
            }
            if inner.players.len() < MIN_PLAYERS_TO_CLOSE {
                return Err(TournamentError::NotEnoughPlayers);
            }
        }

        Ok(self.close_internal(&tournament).then_some(tournament))
    }

    /// Close the roster: pad with bots, generate the bracket, and tell the
    /// human players. Returns false when the tournament was already closed
    /// or bracket generation failed (the tournament then stays closed with
    /// no bracket, a terminal degraded state).
    fn close_internal(&self, tournament: &Arc<Tournament>) -> bool {
        let roster = {
            let mut inner = tournament.inner.lock();
            if inner.closed {
                return false;
            }
            inner.closed = true;

            pad_with_bots(
                &mut inner,
                tournament.settings.max_player_count as usize,
                &self.skins,
            );

            let roster = inner.players.clone();
            if let Err(err) = inner.bracket.generate(&roster, &mut rand::thread_rng()) {
                error!(
                    tournament_id = %tournament.id,
                    name = %tournament.name,
                    error = %err,
                    "Failed to generate the bracket"
                );
                return false;
            }
            roster
        };

        let notice = ServerEnvelope::notif(
            NotifLevel::Info,
            format!("Tournament {} is starting", tournament.name),
        );
        for player in &roster {
            if !player.is_bot && player.is_alive() {
                player.send(notice.clone());
            }
        }

        info!(
            tournament_id = %tournament.id,
            name = %tournament.name,
            players = roster.len(),
            "Tournament closed, bracket generated"
        );
        true
    }
}

/// Fill the roster up to capacity with simulated players. Bot names are
/// "Bot N", skipping numbers that collide with a registered alias.
fn pad_with_bots(inner: &mut TournamentInner, capacity: usize, skins: &SkinCatalog) {
    let mut next_number = 1;
    while inner.players.len() < capacity {
        let name = loop {
            let candidate = format!("Bot {next_number}");
            next_number += 1;
            if !inner.aliases.values().any(|a| *a == candidate) {
                break candidate;
            }
        };

        let bot = Arc::new(Player::new_bot(name.clone(), skins.random_id()));
        inner.aliases.insert(bot.id, name);
        inner.players.push(bot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TournamentRegistry {
        TournamentRegistry::new(Arc::new(SkinCatalog::new()))
    }

    fn player(name: &str) -> Arc<Player> {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        Arc::new(Player::new_human(Uuid::new_v4(), name.into(), tx))
    }

    fn settings(max: u32, score: u32) -> TournamentSettings {
        TournamentSettings {
            max_player_count: max,
            score_to_win: score,
        }
    }

    #[test]
    fn create_validates_name_settings_and_ownership() {
        let registry = registry();
        let owner = player("alice");

        assert!(matches!(
            registry.create("   ", &owner, settings(8, 5)),
            Err(TournamentError::InvalidName)
        ));
        assert!(matches!(
            registry.create("cup", &owner, settings(6, 5)),
            Err(TournamentError::InvalidSettings)
        ));
        assert!(matches!(
            registry.create("cup", &owner, settings(8, 0)),
            Err(TournamentError::InvalidSettings)
        ));

        registry.create("cup", &owner, settings(8, 5)).unwrap();
        assert!(matches!(
            registry.create("second cup", &owner, settings(4, 3)),
            Err(TournamentError::AlreadyOwner)
        ));

        // A different owner is free to run their own
        assert!(registry.create("other cup", &player("bob"), settings(4, 3)).is_ok());
    }

    #[test]
    fn joins_enforce_alias_uniqueness_and_membership() {
        let registry = registry();
        let owner = player("alice");
        let t = registry.create("cup", &owner, settings(8, 5)).unwrap();

        registry.add_player(t.id, &owner, Some("ace".into())).unwrap();
        assert!(matches!(
            registry.add_player(t.id, &owner, Some("again".into())),
            Err(TournamentError::AlreadyJoined)
        ));

        let bob = player("bob");
        assert!(matches!(
            registry.add_player(t.id, &bob, Some("ace".into())),
            Err(TournamentError::AliasTaken)
        ));
        registry.add_player(t.id, &bob, None).unwrap();
        assert_eq!(t.alias_of(&bob.id).as_deref(), Some("bob"));

        registry.remove_player(t.id, &bob).unwrap();
        assert!(matches!(
            registry.remove_player(t.id, &bob),
            Err(TournamentError::NotJoined)
        ));
        assert_eq!(t.player_count(), 1);

        assert!(matches!(
            registry.add_player(Uuid::new_v4(), &bob, None),
            Err(TournamentError::NotFound)
        ));
    }

    #[test]
    fn close_pads_the_roster_and_seeds_humans_before_bots() {
        let registry = registry();
        let owner = player("alice");
        let t = registry.create("cup", &owner, settings(8, 5)).unwrap();

        let entrants = [owner.clone(), player("bob"), player("carol")];
        for (i, p) in entrants.iter().enumerate() {
            registry
                .add_player(t.id, p, Some(format!("alias-{i}")))
                .unwrap();
        }

        // Only the owner may close
        assert!(matches!(
            registry.close(t.id, &player("mallory")),
            Err(TournamentError::NotOwner)
        ));

        let closed = registry.close(t.id, &owner).unwrap();
        assert!(closed.is_some());
        assert!(t.is_closed());

        let inner = t.inner.lock();
        assert_eq!(inner.players.len(), 8);
        assert_eq!(inner.players.iter().filter(|p| p.is_bot).count(), 5);
        assert!(inner.bracket.is_generated());

        let leaves = inner.bracket.leaves();
        assert_eq!(leaves.len(), 8);
        assert!(leaves[..3].iter().all(|p| !p.is_bot));
        assert!(leaves[3..].iter().all(|p| p.is_bot));
        drop(inner);

        // Closing twice is a conflict
        assert!(matches!(
            registry.close(t.id, &owner),
            Err(TournamentError::Closed)
        ));
    }

    #[test]
    fn close_needs_three_players() {
        let registry = registry();
        let owner = player("alice");
        let t = registry.create("cup", &owner, settings(4, 5)).unwrap();
        registry.add_player(t.id, &owner, None).unwrap();
        registry.add_player(t.id, &player("bob"), None).unwrap();

        assert!(matches!(
            registry.close(t.id, &owner),
            Err(TournamentError::NotEnoughPlayers)
        ));
    }

    #[test]
    fn reaching_capacity_closes_the_tournament() {
        let registry = registry();
        let owner = player("alice");
        let t = registry.create("cup", &owner, settings(4, 5)).unwrap();

        registry.add_player(t.id, &owner, None).unwrap();
        for name in ["bob", "carol"] {
            assert!(registry.add_player(t.id, &player(name), None).unwrap().is_none());
        }
        let closed = registry.add_player(t.id, &player("dave"), None).unwrap();
        assert!(closed.is_some());
        assert!(t.is_closed());
        assert_eq!(t.player_count(), 4);

        assert!(matches!(
            registry.add_player(t.id, &player("late"), None),
            Err(TournamentError::Closed)
        ));
    }

    #[test]
    fn bot_names_skip_colliding_aliases() {
        let registry = registry();
        let owner = player("alice");
        let t = registry.create("cup", &owner, settings(4, 5)).unwrap();

        registry.add_player(t.id, &owner, Some("Bot 1".into())).unwrap();
        registry.add_player(t.id, &player("bob"), None).unwrap();
        registry.add_player(t.id, &player("carol"), None).unwrap();
        registry.close(t.id, &owner).unwrap();

        let inner = t.inner.lock();
        let bot_names: Vec<String> = inner
            .players
            .iter()
            .filter(|p| p.is_bot)
            .map(|p| p.name())
            .collect();
        assert_eq!(bot_names, ["Bot 2"]);
    }
}
