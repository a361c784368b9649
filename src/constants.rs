//! Protocol constants and enumerations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default TCP port the server listens on.
pub const DEFAULT_PORT: u16 = 6000;

/// Default host used by the debug client.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Number of rooms a registry holds by default.
pub const DEFAULT_MAX_ROOMS: usize = 8;

/// Player slots per room.
pub const ROOM_CAPACITY: usize = 2;

/// Longest accepted frame, excluding the line terminator.
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 4096;

/// Maximum number of friends returned by a GET_FRIENDS request.
pub const DEFAULT_FRIEND_LIST_LIMIT: usize = 100;

/// Side of the board. The first player to join a room plays white.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn as_str(&self) -> &'static str {
        match self {
            Color::White => "white",
            Color::Black => "black",
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    /// Color given to the next joiner of a room whose occupants hold `taken`.
    ///
    /// A lone occupant's opposite color is handed out rather than always black,
    /// so a newcomer facing a remaining black player plays white.
    pub fn for_join_order(taken: &[Color]) -> Self {
        match taken {
            [] => Color::White,
            [only] => only.opposite(),
            _ => Color::Black,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a finished game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    White,
    Black,
    Draw,
}

impl From<Color> for Winner {
    fn from(color: Color) -> Self {
        match color {
            Color::White => Winner::White,
            Color::Black => Winner::Black,
        }
    }
}

/// Why a game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameEndReason {
    Checkmate,
    Stalemate,
}
