//! Error types for the chess-rooms library.

use std::io;

/// Result type alias for chess-rooms operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while serving a connection.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Message too long: {len} bytes, limit is {max}")]
    MessageTooLong { len: usize, max: usize },

    #[error("Invalid square: {0}")]
    InvalidSquare(String),

    #[error("Room registry full ({capacity} rooms)")]
    RegistryFull { capacity: usize },

    #[error("Room full: {room}")]
    RoomFull { room: String },

    #[error("Connection idle for too long")]
    IdleTimeout,
}

impl Error {
    /// Whether the error came from the transport rather than from the payload.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::IdleTimeout | Error::MessageTooLong { .. }
        )
    }
}
