use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use clap::ValueEnum;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_HISTORY_LIMIT: usize = 100;
pub const DEFAULT_DATABASE_URL: &str = "chat.db";
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_millis(25_000);
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_millis(60_000);
const MIN_PING_INTERVAL: Duration = Duration::from_millis(1);

/// Who may delete a message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum DeletePolicy {
    /// Any connected client may delete any message.
    #[default]
    Anyone,
    /// The delete request must carry the sender key stored with the message.
    SenderKey,
}

/// WebSocket keep-alive tuning.
///
/// The server pings every `ping_interval` and drops a connection once it has
/// been silent for `ping_interval + ping_timeout`. A zero interval is treated
/// as one millisecond.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAlive {
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
}

impl Default for KeepAlive {
    fn default() -> Self {
        Self {
            ping_interval: DEFAULT_PING_INTERVAL,
            ping_timeout: DEFAULT_PING_TIMEOUT,
        }
    }
}

impl KeepAlive {
    /// Period of the session ping timer. Never zero.
    pub fn ping_period(&self) -> Duration {
        self.ping_interval.max(MIN_PING_INTERVAL)
    }

    pub fn idle_limit(&self) -> Duration {
        self.ping_period() + self.ping_timeout
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub listen: SocketAddr,
    pub database_url: String,
    pub history_limit: usize,
    /// Repeats the connect-time history push after this delay. Off by default;
    /// clients that send `ready` do not need it.
    pub history_replay_delay: Option<Duration>,
    /// `*` or a comma-separated list of origins. `None` disables CORS headers.
    pub cors_allow_origin: Option<String>,
    pub keep_alive: KeepAlive,
    pub delete_policy: DeletePolicy,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            database_url: DEFAULT_DATABASE_URL.to_string(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            history_replay_delay: None,
            cors_allow_origin: None,
            keep_alive: KeepAlive::default(),
            delete_policy: DeletePolicy::default(),
        }
    }
}
