use serde::{Deserialize, Serialize};

/// A persisted chat message as stored and broadcast.
///
/// `color` and `sender_key` always serialize, as `null` when unset, so
/// clients can tell "never set" apart from a missing field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub name: String,
    pub text: String,
    pub timestamp: String,
    pub color: Option<String>,
    pub sender_key: Option<String>,
}

/// A validated message that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub name: String,
    pub text: String,
    pub timestamp: String,
    pub color: Option<String>,
    pub sender_key: Option<String>,
}

impl NewMessage {
    /// Attaches the store-assigned id.
    pub fn with_id(self, id: String) -> ChatMessage {
        ChatMessage {
            id,
            name: self.name,
            text: self.text,
            timestamp: self.timestamp,
            color: self.color,
            sender_key: self.sender_key,
        }
    }
}

/// Payload of an inbound `chat message` event.
///
/// Only these fields are read; anything else a client sends is dropped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageSubmission {
    #[serde(default)]
    pub name: Option<String>,
    pub text: String,
    pub timestamp: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub sender_key: Option<String>,
}

impl MessageSubmission {
    pub fn new(
        name: impl Into<String>,
        text: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            name: Some(name.into()),
            text: text.into(),
            timestamp: timestamp.into(),
            color: None,
            sender_key: None,
        }
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn sender_key(mut self, sender_key: impl Into<String>) -> Self {
        self.sender_key = Some(sender_key.into());
        self
    }

    /// Normalizes the submission for persistence. Empty optional labels are
    /// treated the same as absent ones.
    pub fn into_new_message(self) -> NewMessage {
        NewMessage {
            name: self.name.unwrap_or_default(),
            text: self.text,
            timestamp: self.timestamp,
            color: non_empty(self.color),
            sender_key: non_empty(self.sender_key),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}

/// Payload of an inbound `delete message` event.
///
/// Clients usually send the bare id. The keyed form carries the sender key
/// checked by [`crate::config::DeletePolicy::SenderKey`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum DeleteRequest {
    Id(String),
    Keyed {
        id: String,
        #[serde(rename = "senderKey", default)]
        sender_key: Option<String>,
    },
}

impl DeleteRequest {
    pub fn id(&self) -> &str {
        match self {
            DeleteRequest::Id(id) | DeleteRequest::Keyed { id, .. } => id,
        }
    }

    pub fn sender_key(&self) -> Option<&str> {
        match self {
            DeleteRequest::Id(_) => None,
            DeleteRequest::Keyed { sender_key, .. } => sender_key.as_deref(),
        }
    }
}

impl From<&str> for DeleteRequest {
    fn from(id: &str) -> Self {
        DeleteRequest::Id(id.to_string())
    }
}
