//! Transport configuration.

use std::time::Duration;

use crate::backoff::ReconnectPolicy;

/// Broker and topic settings for the transport channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Broker host name.
    pub broker: String,
    /// Plain websocket port.
    pub port: u16,
    /// TLS websocket port.
    pub secure_port: u16,
    /// Use the secure scheme and port.
    pub use_ssl: bool,
    /// Prefix for generated client ids.
    pub client_id_prefix: String,
    /// Reconnect period advertised to the broker.
    pub reconnect_period: Duration,
    /// Bound on a single connect attempt.
    pub connect_timeout: Duration,
    /// Keep-alive interval.
    pub keep_alive: Duration,
    /// Start every session clean.
    pub clean_session: bool,
    /// Topic carrying commands to the presenter.
    pub subscribe_topic: String,
    /// Topic carrying presenter notifications.
    pub publish_topic: String,
    /// Backoff schedule after a lost connection.
    pub reconnect: ReconnectPolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            broker: "broker.emqx.io".to_owned(),
            port: 8083,
            secure_port: 8084,
            use_ssl: false,
            client_id_prefix: "CatStory_Presenter".to_owned(),
            reconnect_period: Duration::from_millis(3000),
            connect_timeout: Duration::from_millis(15_000),
            keep_alive: Duration::from_secs(30),
            clean_session: true,
            subscribe_topic: "catstory/orchestrator/to/presenter".to_owned(),
            publish_topic: "catstory/presenter/to/orchestrator".to_owned(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl TransportConfig {
    /// Websocket URL of the broker.
    #[must_use]
    pub fn broker_url(&self) -> String {
        let (scheme, port) = if self.use_ssl {
            ("wss", self.secure_port)
        } else {
            ("ws", self.port)
        };
        format!("{scheme}://{}:{port}/mqtt", self.broker)
    }
}
