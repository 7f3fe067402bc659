//! Broker abstraction: the infrastructure seam behind the transport channel.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;
use whiskers_core::error::TransportError;

/// Session parameters handed to the broker on connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Unique client identifier.
    pub client_id: String,
    /// Keep-alive interval.
    pub keep_alive: Duration,
    /// Whether the broker should discard prior session state.
    pub clean_session: bool,
    /// Reconnect period advertised to the broker.
    pub reconnect_period: Duration,
}

/// A frame delivered by a live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerFrame {
    /// A message arrived on a subscribed topic.
    Message {
        /// Topic the message was published on.
        topic: String,
        /// Raw payload.
        payload: Vec<u8>,
    },
    /// The broker closed the session.
    Closed {
        /// Why the session ended.
        reason: String,
    },
}

/// An established broker connection: the session handle plus its inbound
/// frame stream.
pub struct BrokerConnection {
    /// Handle used to subscribe, publish and close.
    pub session: Box<dyn BrokerSession>,
    /// Frames delivered by the broker, in arrival order.
    pub frames: UnboundedReceiver<BrokerFrame>,
}

impl std::fmt::Debug for BrokerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConnection").finish_non_exhaustive()
    }
}

/// Connects to a publish/subscribe broker.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Opens a new session.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Connection` if the broker refuses or cannot
    /// be reached.
    async fn connect(
        &self,
        url: &str,
        options: &ConnectOptions,
    ) -> Result<BrokerConnection, TransportError>;
}

/// A live broker session.
#[async_trait]
pub trait BrokerSession: Send {
    /// Subscribes to a topic.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Connection` if the session is gone.
    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    /// Publishes a payload on a topic.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Publish` if the payload could not be handed
    /// to the broker.
    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Closes the session. Closing twice is a no-op.
    async fn close(&mut self);
}
