//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Allowed client origin for CORS
    pub client_origin: String,

    /// Base URL of the persistence service; match records are dropped
    /// when unset
    pub persistence_url: Option<String>,
    /// Bearer key for the persistence service
    pub persistence_service_key: Option<String>,

    /// Directory replay files are written to
    pub replay_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            client_origin: env::var("CLIENT_ORIGIN")
                .map_err(|_| ConfigError::Missing("CLIENT_ORIGIN"))?,

            persistence_url: env::var("PERSISTENCE_URL").ok(),
            persistence_service_key: env::var("PERSISTENCE_SERVICE_KEY").ok(),

            replay_dir: env::var("REPLAY_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/replays")),
        })
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            server_addr: "127.0.0.1:0".parse().expect("static test address"),
            log_level: "debug".to_string(),
            client_origin: "http://localhost:5173".to_string(),
            persistence_url: None,
            persistence_service_key: None,
            replay_dir: std::env::temp_dir().join("paddle-arena-test-replays"),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
