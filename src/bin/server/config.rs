//! Server configuration.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chess_rooms::constants::{
    DEFAULT_FRIEND_LIST_LIMIT, DEFAULT_MAX_MESSAGE_LEN, DEFAULT_MAX_ROOMS, DEFAULT_PORT,
};
use chess_rooms::session::SessionSettings;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Port to listen on
    pub port: u16,

    /// Number of rooms that can exist at once
    pub max_rooms: usize,

    /// Longest accepted message line in bytes
    pub max_message_len: usize,

    /// Maximum number of friends returned by GET_FRIENDS
    pub friend_list_limit: usize,

    /// SQLite file holding accounts and friendships
    pub database_path: String,

    /// Disconnect clients that stay silent this long (seconds)
    pub idle_timeout_secs: Option<u64>,

    /// Cap on concurrently running sessions; unbounded when unset
    pub max_sessions: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_rooms: DEFAULT_MAX_ROOMS,
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
            friend_list_limit: DEFAULT_FRIEND_LIST_LIMIT,
            database_path: "chess.db".to_string(),
            idle_timeout_secs: None,
            max_sessions: None,
        }
    }
}

impl Config {
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("failed to parse {}", path.display()))?
        } else {
            Config::default()
        };

        if let Ok(port) = std::env::var("CHESS_PORT") {
            config.port = port
                .parse()
                .with_context(|| format!("invalid CHESS_PORT '{}'", port))?;
        }

        Ok(config)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            max_message_len: self.max_message_len,
            idle_timeout: self.idle_timeout_secs.map(Duration::from_secs),
            friend_list_limit: self.friend_list_limit,
        }
    }
}
