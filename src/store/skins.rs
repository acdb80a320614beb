//! Paddle cosmetic catalog
//!
//! The core only stamps cosmetic ids onto players and paddles; asset
//! existence is the client's concern. Bots get a random catalog entry,
//! humans keep whatever their client selected.

use rand::seq::SliceRandom;

/// Built-in paddle model ids mirrored by the client asset bundle
const PADDLE_MODELS: &[&str] = &[
    "paddle_classic",
    "paddle_carbon",
    "paddle_neon",
    "paddle_wooden",
    "paddle_chrome",
];

pub struct SkinCatalog {
    models: Vec<String>,
}

impl SkinCatalog {
    pub fn new() -> Self {
        Self {
            models: PADDLE_MODELS.iter().map(|m| m.to_string()).collect(),
        }
    }

    /// A random catalog entry, used for bot paddles
    pub fn random_id(&self) -> String {
        self.models
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_default()
    }

    /// Keep a known id, fall back to a random one otherwise
    pub fn resolve_or_random(&self, id: &str) -> String {
        if self.models.iter().any(|m| m == id) {
            id.to_string()
        } else {
            self.random_id()
        }
    }
}

impl Default for SkinCatalog {
    fn default() -> Self {
        Self::new()
    }
}
