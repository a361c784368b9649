//! Account and friend storage.
//!
//! The session handler only sees the [`AccountStore`] and [`FriendStore`]
//! traits. [`Database`] implements both on top of SQLite.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, params};

use crate::Result;

/// Opaque printable user identifier.
pub type UserId = String;

pub trait AccountStore: Send + Sync {
    /// Id of the account if the credentials match.
    fn check_login(&self, username: &str, password: &str) -> Result<Option<UserId>>;

    /// Create an account. Returns `None` if the name is taken or a field is empty.
    fn register_user(&self, username: &str, password: &str) -> Result<Option<UserId>>;
}

pub trait FriendStore: Send + Sync {
    /// Usernames related to `user_id`, oldest relation first, at most `max`.
    fn get_friends(&self, user_id: &str, max: usize) -> Result<Vec<String>>;

    /// Append a relation. Neither name is checked against the accounts.
    fn make_friend(&self, friend_a: &str, friend_b: &str) -> Result<()>;
}

pub fn password_hash(password: &str) -> String {
    format!("{:x}", md5::compute(password))
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::init(Connection::open(path.as_ref())?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS friends (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                friend_a TEXT NOT NULL,
                friend_b TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_friends_a ON friends(friend_a);
            CREATE INDEX IF NOT EXISTS idx_friends_b ON friends(friend_b);
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn username_for(&self, user_id: &str) -> Result<Option<String>> {
        let Some(id) = parse_user_id(user_id) else {
            return Ok(None);
        };
        let name = self
            .conn()
            .query_row(
                "SELECT username FROM accounts WHERE id = ?",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name)
    }
}

/// Ids are positive integers; anything else names no account.
fn parse_user_id(user_id: &str) -> Option<i64> {
    user_id.trim().parse::<i64>().ok().filter(|id| *id > 0)
}

impl AccountStore for Database {
    fn check_login(&self, username: &str, password: &str) -> Result<Option<UserId>> {
        let row: Option<(i64, String)> = self
            .conn()
            .query_row(
                "SELECT id, password_hash FROM accounts WHERE username = ?",
                params![username],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        Ok(row
            .filter(|(_, hash)| *hash == password_hash(password))
            .map(|(id, _)| id.to_string()))
    }

    fn register_user(&self, username: &str, password: &str) -> Result<Option<UserId>> {
        if username.is_empty() || password.is_empty() {
            return Ok(None);
        }

        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT INTO accounts (username, password_hash) VALUES (?, ?)
             ON CONFLICT(username) DO NOTHING",
            params![username, password_hash(password)],
        )?;
        if inserted == 0 {
            return Ok(None);
        }
        Ok(Some(conn.last_insert_rowid().to_string()))
    }
}

impl FriendStore for Database {
    fn get_friends(&self, user_id: &str, max: usize) -> Result<Vec<String>> {
        let Some(username) = self.username_for(user_id)? else {
            return Ok(Vec::new());
        };

        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT CASE WHEN friend_a = ?1 THEN friend_b ELSE friend_a END
             FROM friends
             WHERE friend_a = ?1 OR friend_b = ?1
             ORDER BY id
             LIMIT ?2",
        )?;
        let friends = stmt
            .query_map(params![username, max as i64], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(friends)
    }

    fn make_friend(&self, friend_a: &str, friend_b: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO friends (friend_a, friend_b) VALUES (?, ?)",
            params![friend_a, friend_b],
        )?;
        Ok(())
    }
}
