use std::{
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use clap::Parser;

use crate::config::{
    DEFAULT_DATABASE_URL, DEFAULT_HISTORY_LIMIT, DEFAULT_PORT, DeletePolicy, KeepAlive,
    RelayConfig,
};

/// Realtime chat relay with persistent history.
///
/// Every flag can also be set through the environment (or a `.env` file).
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Interface to bind.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Message store location: a SQLite path, `sqlite://<path>`, `:memory:`, or `memory`.
    #[arg(long, env = "DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
    pub database_url: String,

    /// Maximum number of messages in a history response.
    #[arg(long, env = "HISTORY_LIMIT", default_value_t = DEFAULT_HISTORY_LIMIT)]
    pub history_limit: usize,

    /// Push history a second time this many milliseconds after connect.
    #[arg(long, env = "HISTORY_REPLAY_DELAY_MS")]
    pub history_replay_delay_ms: Option<u64>,

    /// Allowed CORS origin(s): `*` or a comma-separated list.
    #[arg(long, env = "CORS_ALLOW_ORIGIN")]
    pub cors_allow_origin: Option<String>,

    /// Interval between server pings, in milliseconds.
    #[arg(long, env = "PING_INTERVAL_MS", default_value_t = 25_000)]
    pub ping_interval_ms: u64,

    /// Extra silence tolerated after a ping before the connection is dropped, in milliseconds.
    #[arg(long, env = "PING_TIMEOUT_MS", default_value_t = 60_000)]
    pub ping_timeout_ms: u64,

    /// Who may delete messages.
    #[arg(long, env = "DELETE_POLICY", value_enum, default_value_t = DeletePolicy::Anyone)]
    pub delete_policy: DeletePolicy,
}

impl Cli {
    pub fn into_config(self) -> RelayConfig {
        RelayConfig {
            listen: SocketAddr::new(self.host, self.port),
            database_url: self.database_url,
            history_limit: self.history_limit,
            history_replay_delay: self
                .history_replay_delay_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
            cors_allow_origin: self.cors_allow_origin.filter(|origin| !origin.trim().is_empty()),
            keep_alive: KeepAlive {
                ping_interval: Duration::from_millis(self.ping_interval_ms),
                ping_timeout: Duration::from_millis(self.ping_timeout_ms),
            },
            delete_policy: self.delete_policy,
        }
    }
}
