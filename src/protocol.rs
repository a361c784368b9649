//! Wire protocol for chess-rooms.
//!
//! Every message is one JSON object on a single line. Requests and responses
//! are tagged by their `"type"` field.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Deserializer, Serialize};

use crate::board::Move;
use crate::constants::{Color, GameEndReason, Winner};
use crate::{Error, Result};

/// A decoded client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Login { username: String, password: String },
    Register { username: String, password: String },
    GetFriends { user_id: String },
    MakeFriend { friend_a: String, friend_b: String },
    JoinRoom { room_name: String },
    Move(Move),
}

impl Request {
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Login { .. } => "LOGIN",
            Request::Register { .. } => "REGISTER",
            Request::GetFriends { .. } => "GET_FRIENDS",
            Request::MakeFriend { .. } => "MAKE_FRIEND",
            Request::JoinRoom { .. } => "join",
            Request::Move(_) => "move",
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum WireRequest {
    #[serde(rename = "LOGIN")]
    Login { username: String, password: String },
    #[serde(rename = "REGISTER")]
    Register { username: String, password: String },
    #[serde(rename = "GET_FRIENDS")]
    GetFriends {
        #[serde(deserialize_with = "string_or_number")]
        user_id: String,
    },
    #[serde(rename = "MAKE_FRIEND")]
    MakeFriend { friend_a: String, friend_b: String },
    #[serde(rename = "join")]
    Join {
        #[serde(deserialize_with = "string_or_number")]
        room: String,
    },
    #[serde(rename = "move")]
    Move {
        #[serde(rename = "move")]
        notation: String,
    },
}

/// Clients send ids and room names either as JSON strings or as numbers.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

/// Decode one frame (without its line terminator) into a request.
pub fn read_request(frame: &[u8]) -> Result<Request> {
    let wire: WireRequest =
        serde_json::from_slice(frame).map_err(|e| Error::MalformedMessage(e.to_string()))?;

    let request = match wire {
        WireRequest::Login { username, password } => Request::Login { username, password },
        WireRequest::Register { username, password } => Request::Register { username, password },
        WireRequest::GetFriends { user_id } => Request::GetFriends { user_id },
        WireRequest::MakeFriend { friend_a, friend_b } => Request::MakeFriend { friend_a, friend_b },
        WireRequest::Join { room } => {
            if room.is_empty() {
                return Err(Error::MalformedMessage("empty room name".to_string()));
            }
            Request::JoinRoom { room_name: room }
        }
        WireRequest::Move { notation } => {
            let mv = notation.parse::<Move>().map_err(|e| match e {
                Error::InvalidSquare(sq) => {
                    Error::MalformedMessage(format!("invalid square '{}' in move", sq))
                }
                other => other,
            })?;
            Request::Move(mv)
        }
    };

    Ok(request)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FriendEntry {
    pub username: String,
}

/// A server response or notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum Response {
    #[serde(rename = "LOGIN")]
    Login {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
    },
    #[serde(rename = "REGISTER")]
    Register {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
    },
    #[serde(rename = "GET_FRIENDS")]
    GetFriends { friends: Vec<FriendEntry> },
    #[serde(rename = "MAKE_FRIEND")]
    MakeFriend { success: bool },
    #[serde(rename = "assignColor")]
    AssignColor { color: Color },
    #[serde(rename = "state")]
    BoardState { fen: String, turn: Color },
    #[serde(rename = "gameOver")]
    GameOver {
        winner: Winner,
        reason: GameEndReason,
    },
}

impl Response {
    pub fn friends<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Response::GetFriends {
            friends: names
                .into_iter()
                .map(|name| FriendEntry {
                    username: name.into(),
                })
                .collect(),
        }
    }
}

/// Trait for writing complete, line-terminated messages.
pub trait MessageWrite {
    /// Write the message followed by `\n`.
    fn write_message<B: BufMut>(&self, buf: &mut B);

    fn to_frame(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.write_message(&mut buf);
        buf.freeze()
    }
}

impl MessageWrite for Response {
    fn write_message<B: BufMut>(&self, buf: &mut B) {
        if let Err(e) = serde_json::to_writer((&mut *buf).writer(), self) {
            tracing::error!(error = %e, "Failed to encode response");
        }
        buf.put_u8(b'\n');
    }
}

/// Split the next newline-terminated frame off the front of `buf`.
///
/// The returned frame has its `\n` (and a preceding `\r`) removed. Returns
/// `Ok(None)` when no complete frame is buffered yet.
/// `max_len` bounds the payload; the terminator does not count against it.
pub fn split_frame(buf: &mut BytesMut, max_len: usize) -> Result<Option<BytesMut>> {
    let newline = buf.iter().position(|b| *b == b'\n');
    let end = newline.unwrap_or(buf.len());
    let len = if end > 0 && buf[end - 1] == b'\r' {
        end - 1
    } else {
        end
    };

    if len > max_len {
        return Err(Error::MessageTooLong { len, max: max_len });
    }

    match newline {
        Some(pos) => {
            let mut frame = buf.split_to(pos + 1);
            frame.truncate(len);
            Ok(Some(frame))
        }
        None => Ok(None),
    }
}
