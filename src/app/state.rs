//! Application state shared across handlers and background tasks
//!
//! Registries are constructed here and injected everywhere else, so tests
//! can build an isolated state per case instead of reaching for globals.

use std::sync::Arc;

use crate::config::Config;
use crate::room::RoomRegistry;
use crate::session::SessionRegistry;
use crate::store::{MatchStore, ReplayStore, SkinCatalog};
use crate::tournament::TournamentRegistry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionRegistry>,
    pub rooms: Arc<RoomRegistry>,
    pub tournaments: Arc<TournamentRegistry>,
    pub matches: MatchStore,
    pub replays: ReplayStore,
    pub skins: Arc<SkinCatalog>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        let matches = MatchStore::new(&config);
        let replays = ReplayStore::new(&config);
        let skins = Arc::new(SkinCatalog::new());

        let sessions = Arc::new(SessionRegistry::new());
        let rooms = Arc::new(RoomRegistry::new());
        let tournaments = Arc::new(TournamentRegistry::new(skins.clone()));

        Self {
            config,
            sessions,
            rooms,
            tournaments,
            matches,
            replays,
            skins,
        }
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self::new(Config::for_tests())
    }
}
