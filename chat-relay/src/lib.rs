//! Realtime chat relay backed by a persistent message store.
//!
//! Browser clients connect over a WebSocket, receive the stored history, and
//! exchange chat events that the relay persists before fanning them out to
//! every open connection. Each module focuses on a concrete responsibility:
//!
//! - [`message`] defines the chat record and the validated submission types.
//! - [`protocol`] maps the named wire events onto JSON text frames.
//! - [`store`] persists messages behind the [`store::MessageStore`] trait
//!   (SQLite, in-memory, or a degraded store when the database is down).
//! - [`registry`] tracks open connections and addresses one or all of them.
//! - [`relay`] holds the event handlers: history, ingest, and deletion.
//! - [`server`] exposes the relay over axum, one task per WebSocket.
//! - [`config`] and [`cli`] turn flags and environment into a [`config::RelayConfig`].
//!
//! Integration tests drive [`relay::RelayService`] with an in-process
//! registry so the relay contract is checked without a network.

pub mod cli;
pub mod config;
pub mod message;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod server;
pub mod store;
