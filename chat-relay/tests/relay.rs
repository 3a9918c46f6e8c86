use std::{sync::Arc, time::Duration};

use chat_relay::{
    config::DeletePolicy,
    message::{ChatMessage, DeleteRequest, MessageSubmission},
    protocol::{ClientEvent, ServerEvent, decode_client_event, encode_server_event},
    registry::ChannelRegistry,
    relay::{DeleteOutcome, RelayService},
    store::{MemoryStore, MessageStore, UnavailableStore},
};
use tokio::{sync::mpsc::Receiver, time::timeout};

const RECV_TIMEOUT: Duration = Duration::from_secs(1);

struct Harness {
    relay: Arc<RelayService>,
    registry: Arc<ChannelRegistry>,
    store: Arc<MemoryStore>,
}

fn harness() -> Harness {
    harness_with(|relay| relay)
}

fn harness_with(configure: impl FnOnce(RelayService) -> RelayService) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(ChannelRegistry::new());
    let relay = configure(RelayService::new(store.clone(), registry.clone()));
    Harness {
        relay: Arc::new(relay),
        registry,
        store,
    }
}

async fn recv(rx: &mut Receiver<ServerEvent>) -> ServerEvent {
    timeout(RECV_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("outbox closed")
}

async fn recv_history(rx: &mut Receiver<ServerEvent>) -> Vec<ChatMessage> {
    match recv(rx).await {
        ServerEvent::ChatHistory(messages) => messages,
        other => panic!("expected chat history, got {other:?}"),
    }
}

async fn recv_chat(rx: &mut Receiver<ServerEvent>) -> ChatMessage {
    match recv(rx).await {
        ServerEvent::ChatMessage(message) => message,
        other => panic!("expected chat message, got {other:?}"),
    }
}

#[tokio::test]
async fn connect_chat_delete_scenario() {
    let Harness {
        relay, registry, ..
    } = harness();

    let (alice, mut alice_rx) = registry.register();
    relay.on_connect(alice).await;
    assert!(recv_history(&mut alice_rx).await.is_empty());

    let (bob, mut bob_rx) = registry.register();
    relay.on_connect(bob).await;
    assert!(recv_history(&mut bob_rx).await.is_empty());

    relay
        .handle_event(
            alice,
            ClientEvent::ChatMessage(MessageSubmission::new("Bob", "hi", "t1")),
        )
        .await;

    let to_alice = recv_chat(&mut alice_rx).await;
    let to_bob = recv_chat(&mut bob_rx).await;
    assert!(!to_alice.id.is_empty());
    assert_eq!(to_alice.text, "hi");
    assert_eq!(to_alice, to_bob);

    relay
        .handle_event(
            bob,
            ClientEvent::DeleteMessage(DeleteRequest::from(to_bob.id.as_str())),
        )
        .await;

    assert_eq!(
        recv(&mut alice_rx).await,
        ServerEvent::RemoveMessage(to_alice.id.clone())
    );
    assert_eq!(
        recv(&mut bob_rx).await,
        ServerEvent::RemoveMessage(to_alice.id.clone())
    );

    relay.handle_event(alice, ClientEvent::RequestHistory).await;
    assert!(recv_history(&mut alice_rx).await.is_empty());
    assert!(bob_rx.try_recv().is_err(), "history is never broadcast");
}

#[tokio::test]
async fn history_returns_the_oldest_hundred() {
    let Harness {
        relay, registry, store,
    } = harness();

    for index in 0..150 {
        store
            .create(MessageSubmission::new("alice", format!("message {index}"), "t").into_new_message())
            .await
            .expect("seed message");
    }

    let (alice, mut alice_rx) = registry.register();
    relay.on_connect(alice).await;
    let history = recv_history(&mut alice_rx).await;

    assert_eq!(history.len(), 100);
    assert_eq!(history[0].text, "message 0");
    assert_eq!(history[99].text, "message 99");
}

#[tokio::test]
async fn history_limit_is_configurable() {
    let Harness { relay, store, .. } = harness_with(|relay| relay.with_history_limit(3));

    for index in 0..5 {
        store
            .create(MessageSubmission::new("alice", format!("m{index}"), "t").into_new_message())
            .await
            .expect("seed message");
    }

    assert_eq!(relay.history().await.expect("history").len(), 3);
}

#[tokio::test]
async fn consecutive_history_requests_are_identical() {
    let Harness {
        relay, registry, ..
    } = harness();
    let (alice, mut alice_rx) = registry.register();

    for text in ["one", "two", "three"] {
        relay
            .submit(alice, MessageSubmission::new("alice", text, "t"))
            .await
            .expect("stored");
        recv_chat(&mut alice_rx).await;
    }

    relay.handle_event(alice, ClientEvent::RequestHistory).await;
    let first = recv_history(&mut alice_rx).await;
    relay.handle_event(alice, ClientEvent::Ready).await;
    let second = recv_history(&mut alice_rx).await;

    assert_eq!(first.len(), 3);
    assert_eq!(first, second);
}

#[tokio::test]
async fn failed_persistence_is_never_broadcast() {
    let registry = Arc::new(ChannelRegistry::new());
    let relay = RelayService::new(
        Arc::new(UnavailableStore::new("database down")),
        registry.clone(),
    );

    let (alice, mut alice_rx) = registry.register();
    let (_bob, mut bob_rx) = registry.register();

    let stored = relay
        .submit(alice, MessageSubmission::new("alice", "hello", "t1"))
        .await;
    assert!(stored.is_none());

    assert!(matches!(recv(&mut alice_rx).await, ServerEvent::Error { .. }));
    assert!(alice_rx.try_recv().is_err());
    assert!(bob_rx.try_recv().is_err());
}

#[tokio::test]
async fn history_failure_sends_an_error_instead() {
    let registry = Arc::new(ChannelRegistry::new());
    let relay = RelayService::new(Arc::new(UnavailableStore::new("database down")), registry.clone());

    let (alice, mut alice_rx) = registry.register();
    relay.on_connect(alice).await;

    assert!(matches!(recv(&mut alice_rx).await, ServerEvent::Error { .. }));
    assert!(!relay.send_history(alice).await);
}

#[tokio::test]
async fn deleting_twice_broadcasts_twice() {
    let Harness {
        relay, registry, ..
    } = harness();
    let (alice, mut alice_rx) = registry.register();
    let (_bob, mut bob_rx) = registry.register();

    let message = relay
        .submit(alice, MessageSubmission::new("alice", "oops", "t1"))
        .await
        .expect("stored");
    recv_chat(&mut alice_rx).await;
    recv_chat(&mut bob_rx).await;

    let first = relay.delete(alice, DeleteRequest::from(message.id.as_str())).await;
    let second = relay.delete(alice, DeleteRequest::from(message.id.as_str())).await;
    assert_eq!(first, DeleteOutcome::Removed);
    assert_eq!(second, DeleteOutcome::NotFound);

    for _ in 0..2 {
        assert_eq!(
            recv(&mut bob_rx).await,
            ServerEvent::RemoveMessage(message.id.clone())
        );
    }
}

#[tokio::test]
async fn absent_labels_are_explicit_nulls() {
    let Harness {
        relay, registry, store,
    } = harness();
    let (alice, mut alice_rx) = registry.register();

    relay
        .submit(alice, MessageSubmission::new("Bob", "hi", "t1"))
        .await
        .expect("stored");

    let broadcast = recv(&mut alice_rx).await;
    let encoded = encode_server_event(&broadcast).expect("encode");
    let value: serde_json::Value = serde_json::from_str(&encoded).expect("json");
    let data = value["data"].as_object().expect("message object");
    assert_eq!(data.get("color"), Some(&serde_json::Value::Null));
    assert_eq!(data.get("senderKey"), Some(&serde_json::Value::Null));

    let stored = store.oldest_first(1).await.expect("history");
    assert_eq!(stored[0].color, None);
    assert_eq!(stored[0].sender_key, None);
}

#[tokio::test]
async fn sender_key_policy_guards_deletion() {
    let Harness {
        relay, registry, ..
    } = harness_with(|relay| relay.with_delete_policy(DeletePolicy::SenderKey));
    let (alice, mut alice_rx) = registry.register();
    let (bob, mut bob_rx) = registry.register();

    let message = relay
        .submit(
            alice,
            MessageSubmission::new("alice", "mine", "t1").sender_key("alice-key"),
        )
        .await
        .expect("stored");
    recv_chat(&mut alice_rx).await;
    recv_chat(&mut bob_rx).await;

    let bare = relay.delete(bob, DeleteRequest::from(message.id.as_str())).await;
    assert_eq!(bare, DeleteOutcome::Rejected);
    assert!(matches!(recv(&mut bob_rx).await, ServerEvent::Error { .. }));

    let wrong = relay
        .delete(
            bob,
            DeleteRequest::Keyed {
                id: message.id.clone(),
                sender_key: Some("bob-key".into()),
            },
        )
        .await;
    assert_eq!(wrong, DeleteOutcome::Rejected);
    assert!(matches!(recv(&mut bob_rx).await, ServerEvent::Error { .. }));
    assert!(alice_rx.try_recv().is_err());

    let owner = relay
        .delete(
            alice,
            DeleteRequest::Keyed {
                id: message.id.clone(),
                sender_key: Some("alice-key".into()),
            },
        )
        .await;
    assert_eq!(owner, DeleteOutcome::Removed);
    assert_eq!(
        recv(&mut bob_rx).await,
        ServerEvent::RemoveMessage(message.id.clone())
    );
}

#[tokio::test]
async fn malformed_events_are_rejected_without_persisting() {
    let Harness {
        relay, registry, store,
    } = harness();
    let (alice, mut alice_rx) = registry.register();
    let (_bob, mut bob_rx) = registry.register();

    let err = decode_client_event(r#"{"event":"chat message","data":{"name":"alice"}}"#)
        .expect_err("missing text must be rejected");
    relay.reject_malformed(alice, &err);

    assert!(matches!(recv(&mut alice_rx).await, ServerEvent::Error { .. }));
    assert!(bob_rx.try_recv().is_err());
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn delayed_replay_pushes_history_again() {
    let Harness {
        relay, registry, ..
    } = harness();
    let (alice, mut alice_rx) = registry.register();

    relay.on_connect(alice).await;
    let first = recv_history(&mut alice_rx).await;

    relay.replay_history_after(alice, Duration::from_millis(20));
    let second = recv_history(&mut alice_rx).await;

    assert_eq!(first, second);
}
