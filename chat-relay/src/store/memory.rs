use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{MessageStore, StoreError};
use crate::message::{ChatMessage, NewMessage};

/// Process-local message store.
///
/// Messages are kept in a `Vec` in insertion order, which doubles as the
/// creation order used by history queries.
#[derive(Default)]
pub struct MemoryStore {
    messages: Mutex<Vec<ChatMessage>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.messages.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.lock().await.is_empty()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn create(&self, message: NewMessage) -> Result<ChatMessage, StoreError> {
        let stored = message.with_id(nanoid::nanoid!());
        self.messages.lock().await.push(stored.clone());
        Ok(stored)
    }

    async fn oldest_first(&self, limit: usize) -> Result<Vec<ChatMessage>, StoreError> {
        let messages = self.messages.lock().await;
        Ok(messages.iter().take(limit).cloned().collect())
    }

    async fn get(&self, id: &str) -> Result<Option<ChatMessage>, StoreError> {
        let messages = self.messages.lock().await;
        Ok(messages.iter().find(|message| message.id == id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut messages = self.messages.lock().await;
        let before = messages.len();
        messages.retain(|message| message.id != id);
        Ok(messages.len() != before)
    }
}
