//! # chess-rooms
//!
//! A two-player chess room server. Clients connect over TCP, join a named room,
//! and exchange moves as line-delimited JSON. The first two joiners of a room
//! play white and black; every move is broadcast to both.
//!
//! The library holds the whole server core so it can be driven in-process:
//! [`server::serve`] accepts connections, [`session::run_session`] runs one
//! client, [`registry::RoomRegistry`] and [`room::Room`] hold the shared state.

pub mod board;
pub mod connection;
pub mod constants;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod room;
pub mod server;
pub mod session;
pub mod store;

pub use error::{Error, Result};
pub use protocol::{MessageWrite, Request, Response};
