//! Room state, join assignment and broadcast.
//!
//! A room holds the board, the side to move and up to two player slots. All of
//! it lives behind one async mutex per room, so moves, joins and disconnects in
//! one room are serialized while other rooms proceed independently.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{Mutex, MutexGuard, mpsc};

use crate::board::{Move, MoveOutcome, RuleEngine, StandardRules};
use crate::connection::ConnectionId;
use crate::constants::{Color, ROOM_CAPACITY};
use crate::protocol::{MessageWrite, Response};
use crate::{Error, Result};

/// Sending half of a connection's outbound queue.
pub type Outbound = mpsc::UnboundedSender<Bytes>;

/// A player's seat in a room.
#[derive(Debug)]
pub struct PlayerSlot {
    pub connection: ConnectionId,
    pub color: Color,
    tx: Outbound,
}

impl PlayerSlot {
    pub fn send(&self, frame: Bytes) -> bool {
        self.tx.send(frame).is_ok()
    }
}

/// Mutable state of a room. Only reachable through [`Room::lock`].
pub struct RoomState<E: RuleEngine = StandardRules> {
    name: String,
    engine: Arc<E>,
    board: E::State,
    slots: Vec<PlayerSlot>,
}

impl<E: RuleEngine> RoomState<E> {
    pub(crate) fn new(name: String, engine: Arc<E>) -> Self {
        let board = engine.init_board();
        Self {
            name,
            engine,
            board,
            slots: Vec::with_capacity(ROOM_CAPACITY),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slots(&self) -> &[PlayerSlot] {
        &self.slots
    }

    pub fn board(&self) -> &E::State {
        &self.board
    }

    pub fn turn(&self) -> Color {
        self.engine.turn(&self.board)
    }

    pub fn color_of(&self, connection: ConnectionId) -> Option<Color> {
        self.slots
            .iter()
            .find(|slot| slot.connection == connection)
            .map(|slot| slot.color)
    }

    /// Seat a connection. The first occupant plays white, the second black.
    pub fn assign_slot(&mut self, connection: ConnectionId, tx: Outbound) -> Result<Color> {
        if self.slots.len() >= ROOM_CAPACITY {
            return Err(Error::RoomFull {
                room: self.name.clone(),
            });
        }

        let taken: Vec<Color> = self.slots.iter().map(|slot| slot.color).collect();
        let color = Color::for_join_order(&taken);
        self.slots.push(PlayerSlot {
            connection,
            color,
            tx,
        });
        Ok(color)
    }

    /// Remove a connection's slot, keeping the remaining slots in order.
    pub fn remove_slot(&mut self, connection: ConnectionId) -> Option<Color> {
        let pos = self
            .slots
            .iter()
            .position(|slot| slot.connection == connection)?;
        Some(self.slots.remove(pos).color)
    }

    /// Hand the move to the rule engine and report the resulting game status.
    pub fn apply_move(&mut self, mv: &Move) -> MoveOutcome {
        if !self.engine.apply_move(&mut self.board, mv) {
            tracing::debug!(room = %self.name, %mv, "Move rejected by rule engine");
        }
        self.engine.check_outcome(&self.board)
    }

    /// Apply a move and tell both players about it.
    ///
    /// A finished game is announced and the board reset before returning, so
    /// the room is immediately ready for another game.
    pub fn play_move(&mut self, mv: &Move) -> MoveOutcome {
        let outcome = self.apply_move(mv);
        match outcome {
            MoveOutcome::Continued => {
                self.broadcast(&self.board_notice());
            }
            MoveOutcome::Ended { winner, reason } => {
                tracing::info!(room = %self.name, ?winner, ?reason, "Game over");
                self.broadcast(&Response::GameOver { winner, reason });
                self.reset();
            }
        }
        outcome
    }

    pub fn reset(&mut self) {
        self.board = self.engine.init_board();
    }

    pub fn board_notice(&self) -> Response {
        Response::BoardState {
            fen: self.engine.serialize_board(&self.board),
            turn: self.turn(),
        }
    }

    /// Queue a message for a single occupant.
    pub fn send_to(&self, connection: ConnectionId, message: &Response) -> bool {
        self.slots
            .iter()
            .find(|slot| slot.connection == connection)
            .is_some_and(|slot| slot.send(message.to_frame()))
    }

    /// Queue a message for every occupant in slot order. Returns how many
    /// slots accepted it; a dead slot is skipped, not removed.
    pub fn broadcast(&self, message: &Response) -> usize {
        let frame = message.to_frame();
        let mut delivered = 0;
        for slot in &self.slots {
            if slot.send(frame.clone()) {
                delivered += 1;
            } else {
                tracing::warn!(
                    room = %self.name,
                    conn = %slot.connection,
                    color = %slot.color,
                    "Broadcast to closed connection"
                );
            }
        }
        delivered
    }
}

/// A named room shared by the sessions seated in it.
pub struct Room<E: RuleEngine = StandardRules> {
    name: String,
    state: Mutex<RoomState<E>>,
}

/// Shared handle to a room.
pub type RoomHandle<E = StandardRules> = Arc<Room<E>>;

impl<E: RuleEngine> Room<E> {
    pub fn new(name: impl Into<String>, engine: Arc<E>) -> Self {
        let name = name.into();
        Self {
            state: Mutex::new(RoomState::new(name.clone(), engine)),
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Exclusive access to the room's state.
    pub async fn lock(&self) -> MutexGuard<'_, RoomState<E>> {
        self.state.lock().await
    }
}
