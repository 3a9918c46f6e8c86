//! Wire events exchanged over the WebSocket.
//!
//! Every frame is a JSON text frame of the form `{"event": <name>, "data": <payload>}`.
//! Event names are kept verbatim so existing browser clients interoperate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::{ChatMessage, DeleteRequest, MessageSubmission};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "chat message")]
    ChatMessage(MessageSubmission),
    #[serde(rename = "delete message")]
    DeleteMessage(DeleteRequest),
    #[serde(rename = "request history")]
    RequestHistory,
    /// Sent once the client's listeners are attached; answered with history.
    #[serde(rename = "ready")]
    Ready,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "chat history")]
    ChatHistory(Vec<ChatMessage>),
    #[serde(rename = "chat message")]
    ChatMessage(ChatMessage),
    #[serde(rename = "remove message")]
    RemoveMessage(String),
    /// Delivered to the originating connection only.
    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::ChatHistory(_) => "chat history",
            ServerEvent::ChatMessage(_) => "chat message",
            ServerEvent::RemoveMessage(_) => "remove message",
            ServerEvent::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed client event: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("failed to encode server event: {0}")]
    Encode(#[source] serde_json::Error),
}

pub fn decode_client_event(text: &str) -> Result<ClientEvent, ProtocolError> {
    serde_json::from_str(text).map_err(ProtocolError::Malformed)
}

pub fn encode_server_event(event: &ServerEvent) -> Result<String, ProtocolError> {
    serde_json::to_string(event).map_err(ProtocolError::Encode)
}
