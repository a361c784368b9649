//! Per-connection session state machine.
//!
//! ```text
//! AwaitingFirstMessage ──(LOGIN/REGISTER/GET_FRIENDS/MAKE_FRIEND)──▶ Terminated
//!        │
//!        └──(join)──▶ JoiningRoom ──▶ InGame ──(EOF/error)──▶ Terminated
//! ```

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::board::{RuleEngine, StandardRules};
use crate::connection::Connection;
use crate::constants::{DEFAULT_FRIEND_LIST_LIMIT, DEFAULT_MAX_MESSAGE_LEN};
use crate::protocol::{Request, Response, read_request};
use crate::registry::RoomRegistry;
use crate::room::RoomHandle;
use crate::store::{AccountStore, Database, FriendStore};
use crate::{Error, Result};

/// Limits applied to every session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub max_message_len: usize,
    /// Drop a peer that sends nothing for this long. `None` waits forever.
    pub idle_timeout: Option<Duration>,
    pub friend_list_limit: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
            idle_timeout: None,
            friend_list_limit: DEFAULT_FRIEND_LIST_LIMIT,
        }
    }
}

/// Everything a session needs, shared by all sessions of one server.
pub struct ServerContext<E: RuleEngine = StandardRules> {
    pub registry: RoomRegistry<E>,
    pub accounts: Arc<dyn AccountStore>,
    pub friends: Arc<dyn FriendStore>,
    pub settings: SessionSettings,
}

impl<E: RuleEngine> ServerContext<E> {
    pub fn new(
        registry: RoomRegistry<E>,
        accounts: Arc<dyn AccountStore>,
        friends: Arc<dyn FriendStore>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            registry,
            accounts,
            friends,
            settings,
        }
    }

    /// Use one database for both accounts and friends.
    pub fn with_database(
        registry: RoomRegistry<E>,
        db: Arc<Database>,
        settings: SessionSettings,
    ) -> Self {
        Self::new(registry, db.clone(), db, settings)
    }
}

enum SessionState<E: RuleEngine> {
    AwaitingFirstMessage,
    JoiningRoom { room_name: String },
    InGame { room: RoomHandle<E> },
    Terminated,
}

struct Session<S, E: RuleEngine> {
    conn: Connection<S>,
    ctx: Arc<ServerContext<E>>,
}

/// Serve one connection until it terminates. The stream is closed on return.
pub async fn run_session<S, E>(stream: S, ctx: Arc<ServerContext<E>>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    E: RuleEngine,
{
    let conn = Connection::new(
        stream,
        ctx.settings.max_message_len,
        ctx.settings.idle_timeout,
    );
    let mut session = Session { conn, ctx };
    let mut state = SessionState::AwaitingFirstMessage;
    let mut result = Ok(());

    loop {
        let step = match state {
            SessionState::AwaitingFirstMessage => session.await_first_message().await,
            SessionState::JoiningRoom { room_name } => session.join_room(room_name).await,
            SessionState::InGame { room } => session.play(room).await,
            SessionState::Terminated => break,
        };
        state = match step {
            Ok(next) => next,
            Err(e) => {
                result = Err(e);
                SessionState::Terminated
            }
        };
    }

    tracing::debug!(conn = %session.conn.id(), "Session terminated");
    session.conn.close().await;
    result
}

/// Run a store call on the blocking pool.
async fn blocking<T, F>(call: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| Error::Io(io::Error::other(e)))?
}

impl<S, E> Session<S, E>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    E: RuleEngine,
{
    async fn await_first_message(&mut self) -> Result<SessionState<E>> {
        let Some(frame) = self.conn.next_frame().await? else {
            tracing::debug!(conn = %self.conn.id(), "Closed before first message");
            return Ok(SessionState::Terminated);
        };
        let request = read_request(&frame)?;
        tracing::debug!(conn = %self.conn.id(), kind = request.kind(), "First message");

        match request {
            Request::Login { username, password } => {
                let accounts = self.ctx.accounts.clone();
                let name = username.clone();
                let lookup = blocking(move || accounts.check_login(&name, &password)).await;
                let user_id = match lookup {
                    Ok(id) => id,
                    Err(e) => {
                        tracing::error!(user = %username, error = %e, "Login lookup failed");
                        None
                    }
                };
                match &user_id {
                    Some(id) => tracing::info!(user = %username, id = %id, "Login OK"),
                    None => tracing::info!(user = %username, "Login failed"),
                }
                self.conn.send(&Response::Login {
                    success: user_id.is_some(),
                    user_id,
                });
            }

            Request::Register { username, password } => {
                let accounts = self.ctx.accounts.clone();
                let name = username.clone();
                let created = blocking(move || accounts.register_user(&name, &password)).await;
                let user_id = match created {
                    Ok(id) => id,
                    Err(e) => {
                        tracing::error!(user = %username, error = %e, "Registration failed");
                        None
                    }
                };
                match &user_id {
                    Some(id) => tracing::info!(user = %username, id = %id, "Registered"),
                    None => tracing::info!(user = %username, "Registration refused"),
                }
                self.conn.send(&Response::Register {
                    success: user_id.is_some(),
                    user_id,
                });
            }

            Request::GetFriends { user_id } => {
                let friends_store = self.ctx.friends.clone();
                let limit = self.ctx.settings.friend_list_limit;
                let id = user_id.clone();
                let friends = blocking(move || friends_store.get_friends(&id, limit))
                    .await
                    .unwrap_or_else(|e| {
                        tracing::warn!(user_id = %user_id, error = %e, "Friend lookup failed");
                        Vec::new()
                    });
                tracing::info!(user_id = %user_id, count = friends.len(), "Sent friends list");
                self.conn.send(&Response::friends(friends));
            }

            Request::MakeFriend { friend_a, friend_b } => {
                let friends_store = self.ctx.friends.clone();
                let (a, b) = (friend_a.clone(), friend_b.clone());
                match blocking(move || friends_store.make_friend(&a, &b)).await {
                    Ok(()) => tracing::info!(a = %friend_a, b = %friend_b, "Saved friendship"),
                    Err(e) => tracing::warn!(a = %friend_a, b = %friend_b, error = %e, "Failed to save friendship"),
                }
                self.conn.send(&Response::MakeFriend { success: true });
            }

            Request::JoinRoom { room_name } => {
                return Ok(SessionState::JoiningRoom { room_name });
            }

            Request::Move(mv) => {
                tracing::debug!(conn = %self.conn.id(), %mv, "Move before joining a room");
            }
        }

        Ok(SessionState::Terminated)
    }

    async fn join_room(&mut self, room_name: String) -> Result<SessionState<E>> {
        let room = self.ctx.registry.get_or_create(&room_name).await?;
        let id = self.conn.id();

        {
            let mut state = room.lock().await;
            let color = state.assign_slot(id, self.conn.outbound())?;
            tracing::info!(room = %room_name, conn = %id, %color, "Player joined room");

            state.send_to(id, &Response::AssignColor { color });
            state.send_to(id, &state.board_notice());
        }

        Ok(SessionState::InGame { room })
    }

    async fn play(&mut self, room: RoomHandle<E>) -> Result<SessionState<E>> {
        let id = self.conn.id();

        let exit = loop {
            let frame = match self.conn.next_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            };

            match read_request(&frame) {
                Ok(Request::Move(mv)) => {
                    let mut state = room.lock().await;
                    tracing::debug!(room = %room.name(), conn = %id, %mv, "Move received");
                    state.play_move(&mv);
                }
                Ok(other) => {
                    tracing::debug!(conn = %id, kind = other.kind(), "Ignoring request while in game");
                }
                Err(e) => {
                    tracing::debug!(conn = %id, error = %e, "Ignoring undecodable frame");
                }
            }
        };

        let color = room.lock().await.remove_slot(id);
        tracing::info!(room = %room.name(), conn = %id, ?color, "Player left room");

        exit.map(|()| SessionState::Terminated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, duplex};

    fn context() -> Arc<ServerContext> {
        context_with(SessionSettings::default())
    }

    fn context_with(settings: SessionSettings) -> Arc<ServerContext> {
        let db = Arc::new(Database::open_in_memory().unwrap());
        Arc::new(ServerContext::with_database(
            RoomRegistry::default(),
            db,
            settings,
        ))
    }

    async fn exchange(ctx: Arc<ServerContext>, request: &str) -> Vec<String> {
        let (client, server) = duplex(4096);
        let session = tokio::spawn(run_session(server, ctx));

        let (read, mut write) = tokio::io::split(client);
        write.write_all(request.as_bytes()).await.unwrap();

        let mut lines = BufReader::new(read).lines();
        let mut out = Vec::new();
        while let Some(line) = lines.next_line().await.unwrap() {
            out.push(line);
        }
        let _ = session.await.unwrap();
        out
    }

    #[tokio::test]
    async fn test_login_with_mock_stream() {
        let ctx = context();
        let id = ctx.accounts.register_user("alice", "pw").unwrap().unwrap();
        let reply = format!("{{\"type\":\"LOGIN\",\"success\":true,\"user_id\":\"{}\"}}\n", id);

        let stream = tokio_test::io::Builder::new()
            .read(b"{\"type\":\"LOGIN\",\"username\":\"alice\",\"password\":\"pw\"}\n")
            .write(reply.as_bytes())
            .build();

        run_session(stream, ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_register_then_duplicate() {
        let ctx = context();
        let first = exchange(
            ctx.clone(),
            "{\"type\":\"REGISTER\",\"username\":\"bob\",\"password\":\"pw\"}\n",
        )
        .await;
        assert_eq!(first.len(), 1);
        assert!(first[0].starts_with("{\"type\":\"REGISTER\",\"success\":true,\"user_id\":"));

        let second = exchange(
            ctx,
            "{\"type\":\"REGISTER\",\"username\":\"bob\",\"password\":\"pw\"}\n",
        )
        .await;
        assert_eq!(second, ["{\"type\":\"REGISTER\",\"success\":false}"]);
    }

    #[tokio::test]
    async fn test_failed_login() {
        let out = exchange(
            context(),
            "{\"type\":\"LOGIN\",\"username\":\"ghost\",\"password\":\"pw\"}\n",
        )
        .await;
        assert_eq!(out, ["{\"type\":\"LOGIN\",\"success\":false}"]);
    }

    #[tokio::test]
    async fn test_get_friends_unknown_user() {
        let out = exchange(context(), "{\"type\":\"GET_FRIENDS\",\"user_id\":\"42\"}\n").await;
        assert_eq!(out, ["{\"type\":\"GET_FRIENDS\",\"friends\":[]}"]);
    }

    #[tokio::test]
    async fn test_unrecognized_first_message_closes() {
        let (client, server) = duplex(1024);
        let session = tokio::spawn(run_session(server, context()));
        let (read, mut write) = tokio::io::split(client);
        write.write_all(b"{\"type\":\"chat\",\"text\":\"hi\"}\n").await.unwrap();

        let mut lines = BufReader::new(read).lines();
        assert!(lines.next_line().await.unwrap().is_none());
        assert!(session.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_join_sends_color_then_board() {
        let ctx = context();
        let (client, server) = duplex(4096);
        let session = tokio::spawn(run_session(server, ctx.clone()));
        let (read, mut write) = tokio::io::split(client);
        write.write_all(b"{\"type\":\"join\",\"room\":\"r1\"}\n").await.unwrap();

        let mut lines = BufReader::new(read).lines();
        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            "{\"type\":\"assignColor\",\"color\":\"white\"}"
        );
        let board = lines.next_line().await.unwrap().unwrap();
        assert!(board.starts_with("{\"type\":\"state\",\"fen\":\"rnbqkbnr/"));

        // Non-move payloads are ignored while in game.
        write.write_all(b"{\"type\":\"chat\"}\nnot json\n").await.unwrap();
        write.shutdown().await.unwrap();
        assert!(lines.next_line().await.unwrap().is_none());
        session.await.unwrap().unwrap();

        let room = ctx.registry.get_or_create("r1").await.unwrap();
        assert!(room.lock().await.slots().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_player_loses_seat() {
        let ctx = context_with(SessionSettings {
            idle_timeout: Some(Duration::from_secs(5)),
            ..SessionSettings::default()
        });
        let (client, server) = duplex(4096);
        let session = tokio::spawn(run_session(server, ctx.clone()));
        let (read, mut write) = tokio::io::split(client);
        write.write_all(b"{\"type\":\"join\",\"room\":\"r1\"}\n").await.unwrap();

        let mut lines = BufReader::new(read).lines();
        assert!(lines.next_line().await.unwrap().unwrap().contains("assignColor"));
        assert!(lines.next_line().await.unwrap().unwrap().contains("state"));

        // Stay connected but silent.
        let result = session.await.unwrap();
        assert!(matches!(result, Err(Error::IdleTimeout)));
        assert!(lines.next_line().await.unwrap().is_none());

        let room = ctx.registry.get_or_create("r1").await.unwrap();
        assert!(room.lock().await.slots().is_empty());
        drop(write);
    }

    #[tokio::test]
    async fn test_oversized_frame_in_game_frees_seat() {
        let ctx = context_with(SessionSettings {
            max_message_len: 64,
            ..SessionSettings::default()
        });
        let (client, server) = duplex(4096);
        let session = tokio::spawn(run_session(server, ctx.clone()));
        let (read, mut write) = tokio::io::split(client);
        write.write_all(b"{\"type\":\"join\",\"room\":\"r1\"}\n").await.unwrap();

        let mut lines = BufReader::new(read).lines();
        lines.next_line().await.unwrap().unwrap();
        lines.next_line().await.unwrap().unwrap();

        let mut oversized = vec![b'x'; 100];
        oversized.push(b'\n');
        write.write_all(&oversized).await.unwrap();

        let result = session.await.unwrap();
        assert!(matches!(
            result,
            Err(Error::MessageTooLong { max: 64, .. })
        ));
        assert!(lines.next_line().await.unwrap().is_none());

        let room = ctx.registry.get_or_create("r1").await.unwrap();
        assert!(room.lock().await.slots().is_empty());
    }
}
