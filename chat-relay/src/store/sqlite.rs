use std::{
    path::Path,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, Result as SqlResult, Row, params};

use super::{MessageStore, StoreError};
use crate::message::{ChatMessage, NewMessage};

/// SQLite-backed message store.
///
/// `seq` is an autoincrement key that records creation order; `id` is the
/// opaque identifier handed to clients. The connection is serialized behind a
/// mutex and every query runs on the blocking pool.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run<F, T>(&self, query: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> SqlResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::Unavailable("sqlite connection poisoned".to_string()))?;
            query(&guard).map_err(StoreError::from)
        })
        .await
        .map_err(|err| StoreError::Unavailable(format!("store task failed: {err}")))?
    }
}

fn init_schema(conn: &Connection) -> SqlResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS messages (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            text TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            color TEXT,
            sender_key TEXT
        )",
        [],
    )?;
    Ok(())
}

fn read_message(row: &Row<'_>) -> SqlResult<ChatMessage> {
    Ok(ChatMessage {
        id: row.get(0)?,
        name: row.get(1)?,
        text: row.get(2)?,
        timestamp: row.get(3)?,
        color: row.get(4)?,
        sender_key: row.get(5)?,
    })
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn create(&self, message: NewMessage) -> Result<ChatMessage, StoreError> {
        let stored = message.with_id(nanoid::nanoid!());
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO messages (id, name, text, timestamp, color, sender_key)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    stored.id,
                    stored.name,
                    stored.text,
                    stored.timestamp,
                    stored.color,
                    stored.sender_key
                ],
            )?;
            Ok(stored)
        })
        .await
    }

    async fn oldest_first(&self, limit: usize) -> Result<Vec<ChatMessage>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, text, timestamp, color, sender_key
                 FROM messages
                 ORDER BY seq ASC
                 LIMIT ?1",
            )?;
            let messages = stmt
                .query_map(params![limit], read_message)?
                .collect::<SqlResult<Vec<_>>>()?;
            Ok(messages)
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<Option<ChatMessage>, StoreError> {
        let id = id.to_string();
        self.run(move |conn| {
            conn.query_row(
                "SELECT id, name, text, timestamp, color, sender_key
                 FROM messages
                 WHERE id = ?1",
                params![id],
                read_message,
            )
            .optional()
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let id = id.to_string();
        self.run(move |conn| {
            let removed = conn.execute("DELETE FROM messages WHERE id = ?1", params![id])?;
            Ok(removed > 0)
        })
        .await
    }
}
