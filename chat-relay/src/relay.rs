//! Event handlers for the chat relay.
//!
//! [`RelayService`] owns no connection state of its own. It reads and writes
//! through the injected [`MessageStore`] and addresses clients through the
//! injected [`ConnectionRegistry`], so the whole contract can be exercised
//! without a socket:
//!
//! - connect and `request history`/`ready` push history to one connection
//! - `chat message` is persisted first and only then broadcast
//! - `delete message` removes by id and broadcasts the removal

use std::{sync::Arc, time::Duration};

use tracing::{debug, error, info, warn};

use crate::{
    config::{DEFAULT_HISTORY_LIMIT, DeletePolicy},
    message::{ChatMessage, DeleteRequest, MessageSubmission},
    protocol::{ClientEvent, ProtocolError, ServerEvent},
    registry::{ConnectionId, ConnectionRegistry},
    store::{MessageStore, StoreError},
};

/// Result of handling a `delete message` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The message existed and was removed; removal was broadcast.
    Removed,
    /// Nothing had this id; removal was broadcast anyway.
    NotFound,
    /// The delete policy refused the request; nothing was broadcast.
    Rejected,
    /// The store failed; nothing was broadcast.
    Failed,
}

pub struct RelayService {
    store: Arc<dyn MessageStore>,
    registry: Arc<dyn ConnectionRegistry>,
    history_limit: usize,
    delete_policy: DeletePolicy,
}

impl RelayService {
    pub fn new(store: Arc<dyn MessageStore>, registry: Arc<dyn ConnectionRegistry>) -> Self {
        Self {
            store,
            registry,
            history_limit: DEFAULT_HISTORY_LIMIT,
            delete_policy: DeletePolicy::default(),
        }
    }

    pub fn with_history_limit(mut self, history_limit: usize) -> Self {
        self.history_limit = history_limit;
        self
    }

    pub fn with_delete_policy(mut self, delete_policy: DeletePolicy) -> Self {
        self.delete_policy = delete_policy;
        self
    }

    /// The one history query shared by every call site: oldest first, capped
    /// at the configured limit.
    pub async fn history(&self) -> Result<Vec<ChatMessage>, StoreError> {
        self.store.oldest_first(self.history_limit).await
    }

    pub async fn on_connect(&self, connection: ConnectionId) {
        info!(connection, "client connected");
        self.send_history(connection).await;
    }

    pub fn on_disconnect(&self, connection: ConnectionId) {
        info!(connection, "client disconnected");
    }

    /// Sends `chat history` to one connection. Returns `false` when the
    /// history could not be loaded or delivered.
    pub async fn send_history(&self, connection: ConnectionId) -> bool {
        match self.history().await {
            Ok(messages) => {
                debug!(connection, count = messages.len(), "sending history");
                self.registry
                    .send_to(connection, &ServerEvent::ChatHistory(messages))
            }
            Err(err) => {
                error!(connection, error = %err, "failed to load history");
                self.notify(connection, "failed to load history");
                false
            }
        }
    }

    /// Pushes history again after `delay`, for clients that attach their
    /// listeners late. Skipped if the connection closed in the meantime.
    pub fn replay_history_after(self: &Arc<Self>, connection: ConnectionId, delay: Duration) {
        let relay = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            debug!(connection, "replaying history");
            relay.send_history(connection).await;
        });
    }

    pub async fn handle_event(&self, connection: ConnectionId, event: ClientEvent) {
        match event {
            ClientEvent::ChatMessage(submission) => {
                self.submit(connection, submission).await;
            }
            ClientEvent::DeleteMessage(request) => {
                self.delete(connection, request).await;
            }
            ClientEvent::RequestHistory | ClientEvent::Ready => {
                self.send_history(connection).await;
            }
        }
    }

    /// Persists a submission and broadcasts the stored record. Nothing is
    /// broadcast unless the store assigned an id.
    pub async fn submit(
        &self,
        connection: ConnectionId,
        submission: MessageSubmission,
    ) -> Option<ChatMessage> {
        match self.store.create(submission.into_new_message()).await {
            Ok(message) => {
                debug!(connection, id = %message.id, "message stored");
                self.registry
                    .broadcast(&ServerEvent::ChatMessage(message.clone()));
                Some(message)
            }
            Err(err) => {
                error!(connection, error = %err, "failed to store message");
                self.notify(connection, "message could not be saved");
                None
            }
        }
    }

    pub async fn delete(&self, connection: ConnectionId, request: DeleteRequest) -> DeleteOutcome {
        let id = request.id().to_string();

        if self.delete_policy == DeletePolicy::SenderKey {
            match self.store.get(&id).await {
                Ok(Some(existing)) if !sender_matches(&existing, request.sender_key()) => {
                    warn!(connection, id = %id, "delete rejected: sender key mismatch");
                    self.notify(connection, "not allowed to delete this message");
                    return DeleteOutcome::Rejected;
                }
                Ok(_) => {}
                Err(err) => {
                    error!(connection, id = %id, error = %err, "failed to look up message");
                    self.notify(connection, "message could not be deleted");
                    return DeleteOutcome::Failed;
                }
            }
        }

        match self.store.delete(&id).await {
            Ok(removed) => {
                info!(connection, id = %id, removed, "message deleted");
                self.registry.broadcast(&ServerEvent::RemoveMessage(id));
                if removed {
                    DeleteOutcome::Removed
                } else {
                    DeleteOutcome::NotFound
                }
            }
            Err(err) => {
                error!(connection, id = %id, error = %err, "failed to delete message");
                self.notify(connection, "message could not be deleted");
                DeleteOutcome::Failed
            }
        }
    }

    /// Drops an undecodable frame and tells the sender why.
    pub fn reject_malformed(&self, connection: ConnectionId, err: &ProtocolError) {
        warn!(connection, error = %err, "rejecting malformed event");
        self.notify(connection, err.to_string());
    }

    fn notify(&self, connection: ConnectionId, message: impl Into<String>) {
        self.registry
            .send_to(connection, &ServerEvent::error(message));
    }
}

fn sender_matches(message: &ChatMessage, sender_key: Option<&str>) -> bool {
    match (message.sender_key.as_deref(), sender_key) {
        (Some(stored), Some(given)) => stored == given,
        _ => false,
    }
}
