//! External collaborator clients: persistence and cosmetics

pub mod matches;
pub mod replays;
pub mod skins;

pub use matches::MatchStore;
pub use replays::ReplayStore;
pub use skins::SkinCatalog;

/// Errors from the persistence collaborators. All persistence is
/// fire-and-forget: callers log these, they never propagate.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Persistence API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Replay file error: {0}")]
    Io(#[from] std::io::Error),
}
