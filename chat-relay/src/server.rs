use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::{HeaderValue, Method},
    response::Response,
    routing::get,
};
use futures::{SinkExt, StreamExt, stream::SplitSink};
use serde::Serialize;
use tokio::{
    net::TcpListener,
    select,
    sync::watch,
    time::{Instant, interval_at},
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info, warn};

use crate::{
    config::{KeepAlive, RelayConfig},
    protocol::{ServerEvent, decode_client_event, encode_server_event},
    registry::{ChannelRegistry, ConnectionId, ConnectionRegistry},
    relay::RelayService,
    store::MessageStore,
};

/// State shared by every request handler and WebSocket session.
#[derive(Clone)]
pub struct AppState {
    relay: Arc<RelayService>,
    registry: Arc<ChannelRegistry>,
    keep_alive: KeepAlive,
    history_replay_delay: Option<Duration>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl AppState {
    pub fn new(store: Arc<dyn MessageStore>, config: &RelayConfig) -> Self {
        let registry = Arc::new(ChannelRegistry::new());
        let relay = RelayService::new(store, Arc::clone(&registry) as Arc<dyn ConnectionRegistry>)
            .with_history_limit(config.history_limit)
            .with_delete_policy(config.delete_policy);
        let (shutdown, _) = watch::channel(false);

        Self {
            relay: Arc::new(relay),
            registry,
            keep_alive: config.keep_alive,
            history_replay_delay: config.history_replay_delay,
            shutdown: Arc::new(shutdown),
        }
    }

    pub fn relay(&self) -> &Arc<RelayService> {
        &self.relay
    }

    pub fn client_count(&self) -> usize {
        self.registry.len()
    }

    /// Asks every open session to close.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}

pub fn router(state: AppState, cors_allow_origin: Option<&str>) -> Result<Router> {
    let mut router = Router::new()
        .route("/ws", get(ws_upgrade))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if let Some(origin) = cors_allow_origin {
        router = router.layer(cors_layer(origin)?);
    }

    Ok(router)
}

/// Builds the CORS layer for `*` or a comma-separated origin list. Only GET
/// and POST are allowed.
pub fn cors_layer(origin: &str) -> Result<CorsLayer> {
    let layer = CorsLayer::new().allow_methods([Method::GET, Method::POST]);
    if origin.trim() == "*" {
        return Ok(layer.allow_origin(Any));
    }

    let origins = origin
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .with_context(|| format!("invalid CORS origin '{origin}'"))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(layer.allow_origin(AllowOrigin::list(origins)))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| run_session(socket, state))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    clients: usize,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        clients: state.client_count(),
    })
}

async fn run_session(socket: WebSocket, state: AppState) {
    let mut shutdown = state.shutdown.subscribe();
    if *shutdown.borrow_and_update() {
        debug!("relay is shutting down, dropping new session");
        return;
    }

    let (connection, mut outbox) = state.registry.register();
    let (mut sink, mut stream) = socket.split();

    state.relay.on_connect(connection).await;
    if let Some(delay) = state.history_replay_delay {
        state.relay.replay_history_after(connection, delay);
    }

    let keep_alive = state.keep_alive;
    let mut ping = interval_at(
        Instant::now() + keep_alive.ping_period(),
        keep_alive.ping_period(),
    );
    let mut last_seen = Instant::now();

    loop {
        select! {
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(frame)) => {
                        last_seen = Instant::now();
                        if !handle_frame(&state, connection, frame).await {
                            break;
                        }
                    }
                    Some(Err(err)) => {
                        debug!(connection, error = ?err, "websocket read failed");
                        break;
                    }
                    None => break,
                }
            }
            outbound = outbox.recv() => {
                match outbound {
                    Some(event) => {
                        if !deliver(&mut sink, connection, &event).await {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = ping.tick() => {
                if last_seen.elapsed() >= keep_alive.idle_limit() {
                    info!(connection, "keep-alive timed out");
                    break;
                }
                if sink.send(Message::Ping(Default::default())).await.is_err() {
                    break;
                }
            }
            _ = shutdown.changed() => break,
        }
    }

    state.registry.unregister(connection);
    if let Err(err) = sink.close().await {
        debug!(connection, error = ?err, "failed to close websocket");
    }
    state.relay.on_disconnect(connection);
}

/// Returns `false` once the client has closed its side.
async fn handle_frame(state: &AppState, connection: ConnectionId, frame: Message) -> bool {
    match frame {
        Message::Text(text) => {
            match decode_client_event(text.as_str()) {
                Ok(event) => state.relay.handle_event(connection, event).await,
                Err(err) => state.relay.reject_malformed(connection, &err),
            }
            true
        }
        Message::Binary(_) => {
            debug!(connection, "ignoring binary frame");
            true
        }
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => false,
    }
}

async fn deliver(
    sink: &mut SplitSink<WebSocket, Message>,
    connection: ConnectionId,
    event: &ServerEvent,
) -> bool {
    let encoded = match encode_server_event(event) {
        Ok(encoded) => encoded,
        Err(err) => {
            warn!(connection, error = %err, "dropping unencodable event");
            return true;
        }
    };

    if let Err(err) = sink.send(Message::Text(encoded.into())).await {
        debug!(connection, error = ?err, "failed to deliver event");
        return false;
    }
    true
}

pub struct RelayServer {
    listener: TcpListener,
    state: AppState,
    router: Router,
}

impl RelayServer {
    pub fn new(
        listener: TcpListener,
        store: Arc<dyn MessageStore>,
        config: &RelayConfig,
    ) -> Result<Self> {
        let state = AppState::new(store, config);
        let router = router(state.clone(), config.cors_allow_origin.as_deref())?;
        Ok(Self {
            listener,
            state,
            router,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let RelayServer {
            listener,
            state,
            router,
        } = self;

        let signal = async move {
            shutdown.await;
            info!("relay shutting down");
            state.shutdown();
        };

        axum::serve(listener, router)
            .with_graceful_shutdown(signal)
            .await
            .context("relay server failed")?;

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}
