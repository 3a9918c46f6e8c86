//! Persistence for chat messages.
//!
//! The relay only talks to the [`MessageStore`] trait. Three implementations
//! ship with the crate:
//!
//! - [`SqliteStore`]: the durable store, one SQLite file per deployment
//! - [`MemoryStore`]: process-local, used by tests and `--database-url memory`
//! - [`UnavailableStore`]: stands in when the database could not be opened so
//!   the relay keeps accepting connections while every data operation fails

mod memory;
mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, info};

use crate::message::{ChatMessage, NewMessage};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("message store unavailable: {0}")]
    Unavailable(String),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persists a message and returns it with its newly assigned id.
    async fn create(&self, message: NewMessage) -> Result<ChatMessage, StoreError>;

    /// Sorts all messages by creation order, oldest first, then keeps the
    /// first `limit`. Once the store holds more than `limit` messages this
    /// returns the oldest ones, not the most recent.
    async fn oldest_first(&self, limit: usize) -> Result<Vec<ChatMessage>, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<ChatMessage>, StoreError>;

    /// Removes a message. Returns `false` when no message had this id.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;
}

/// Opens the store named by a database URL.
///
/// Accepted forms: `memory` for a [`MemoryStore`], `:memory:` for a private
/// SQLite database, and either a filesystem path or `sqlite://<path>` for a
/// SQLite file.
pub fn open_store(database_url: &str) -> Result<Arc<dyn MessageStore>, StoreError> {
    let url = database_url.trim();
    if url.is_empty() {
        return Err(StoreError::Unavailable("database url is empty".to_string()));
    }

    if url == "memory" {
        return Ok(Arc::new(MemoryStore::new()));
    }

    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);

    if path == ":memory:" {
        return Ok(Arc::new(SqliteStore::open_in_memory()?));
    }

    Ok(Arc::new(SqliteStore::open(path)?))
}

/// Opens the store, falling back to an [`UnavailableStore`] on failure.
///
/// A broken database never stops the relay from starting.
pub fn open_or_degrade(database_url: &str) -> Arc<dyn MessageStore> {
    match open_store(database_url) {
        Ok(store) => {
            info!(database_url, "message store connected");
            store
        }
        Err(err) => {
            error!(database_url, error = %err, "failed to open message store; data operations will fail");
            Arc::new(UnavailableStore::new(err.to_string()))
        }
    }
}

/// A store whose every operation fails.
#[derive(Debug, Clone)]
pub struct UnavailableStore {
    reason: String,
}

impl UnavailableStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn error(&self) -> StoreError {
        StoreError::Unavailable(self.reason.clone())
    }
}

#[async_trait]
impl MessageStore for UnavailableStore {
    async fn create(&self, _message: NewMessage) -> Result<ChatMessage, StoreError> {
        Err(self.error())
    }

    async fn oldest_first(&self, _limit: usize) -> Result<Vec<ChatMessage>, StoreError> {
        Err(self.error())
    }

    async fn get(&self, _id: &str) -> Result<Option<ChatMessage>, StoreError> {
        Err(self.error())
    }

    async fn delete(&self, _id: &str) -> Result<bool, StoreError> {
        Err(self.error())
    }
}
