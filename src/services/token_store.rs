//! Token store - durable holder for the current access token.
//!
//! Storage failures never reach callers: a store that cannot read reports no
//! credential, and a failed write is logged.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

const ACCESS_TOKEN_KEY: &str = "access_token";

/// Key/value credential store backed by SQLite.
pub struct TokenStore {
    conn: Option<Mutex<Connection>>,
}

impl TokenStore {
    /// Open the store at `path`, falling back to an in-memory database and
    /// finally to no backing at all.
    pub fn open(path: &Path) -> Self {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!("Cannot create {}: {}", parent.display(), e);
            }
        }

        match Connection::open(path).and_then(init_schema) {
            Ok(conn) => {
                tracing::debug!("Token store opened at {}", path.display());
                Self::with_connection(conn)
            }
            Err(e) => {
                tracing::warn!(
                    "Token store at {} unavailable ({}), credentials will not survive restart",
                    path.display(),
                    e
                );
                Self::in_memory()
            }
        }
    }

    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        match Connection::open_in_memory().and_then(init_schema) {
            Ok(conn) => Self::with_connection(conn),
            Err(e) => {
                tracing::warn!("In-memory token store unavailable: {}", e);
                Self::unbacked()
            }
        }
    }

    /// A store with no backing; `get` always reports absent.
    pub fn unbacked() -> Self {
        Self { conn: None }
    }

    fn with_connection(conn: Connection) -> Self {
        Self {
            conn: Some(Mutex::new(conn)),
        }
    }

    /// Current credential, if any.
    pub fn get(&self) -> Option<String> {
        let conn = self.conn.as_ref()?;
        let conn = conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.query_row(
            "SELECT value FROM kv WHERE key = ?1",
            params![ACCESS_TOKEN_KEY],
            |row| row.get(0),
        )
        .optional()
        .unwrap_or_else(|e| {
            tracing::warn!("Failed to read credential: {}", e);
            None
        })
    }

    /// Replace the current credential.
    pub fn set(&self, token: &str) {
        let Some(conn) = self.conn.as_ref() else {
            tracing::warn!("No token storage available, credential dropped");
            return;
        };
        let conn = conn.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![ACCESS_TOKEN_KEY, token],
        ) {
            tracing::warn!("Failed to store credential: {}", e);
        }
    }

    /// Forget the current credential.
    pub fn clear(&self) {
        let Some(conn) = self.conn.as_ref() else {
            return;
        };
        let conn = conn.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = conn.execute("DELETE FROM kv WHERE key = ?1", params![ACCESS_TOKEN_KEY]) {
            tracing::warn!("Failed to clear credential: {}", e);
        }
    }
}

fn init_schema(conn: Connection) -> rusqlite::Result<Connection> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS kv (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;
    Ok(conn)
}
