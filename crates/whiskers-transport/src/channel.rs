//! The transport channel: one broker session at a time, a FIFO queue for
//! messages published while disconnected, and a single pending reconnect.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;
use whiskers_core::clock::Clock;
use whiskers_core::envelope::Envelope;
use whiskers_core::error::TransportError;

use crate::broker::{Broker, BrokerFrame, BrokerSession, ConnectOptions};
use crate::config::TransportConfig;

/// Something the presenter loop has to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// A validated inbound message.
    Message(Envelope),
    /// The session ended; the channel is now disconnected.
    ConnectionLost(String),
    /// The scheduled reconnect delay elapsed.
    ReconnectDue,
}

/// Snapshot of the channel for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStats {
    /// Whether a session is open.
    pub connected: bool,
    /// Client id used for every session of this channel.
    pub client_id: String,
    /// Reconnect attempts since the last successful connect.
    pub reconnect_attempts: u32,
    /// Messages waiting for a connection.
    pub queued_messages: usize,
    /// Broker URL.
    pub broker_url: String,
}

/// Publish/subscribe channel to the orchestrator.
pub struct TransportChannel {
    config: TransportConfig,
    broker: Arc<dyn Broker>,
    clock: Arc<dyn Clock>,
    client_id: String,
    session: Option<Box<dyn BrokerSession>>,
    frames: Option<UnboundedReceiver<BrokerFrame>>,
    queue: VecDeque<Envelope>,
    reconnect_attempts: u32,
    reconnect_at: Option<Instant>,
}

impl std::fmt::Debug for TransportChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportChannel")
            .field("client_id", &self.client_id)
            .field("connected", &self.is_connected())
            .field("queued", &self.queue.len())
            .field("reconnect_attempts", &self.reconnect_attempts)
            .finish_non_exhaustive()
    }
}

impl TransportChannel {
    /// Creates a disconnected channel with a fresh client id.
    #[must_use]
    pub fn new(config: TransportConfig, broker: Arc<dyn Broker>, clock: Arc<dyn Clock>) -> Self {
        let client_id = format!("{}_{}", config.client_id_prefix, Uuid::new_v4().simple());
        Self {
            config,
            broker,
            clock,
            client_id,
            session: None,
            frames: None,
            queue: VecDeque::new(),
            reconnect_attempts: 0,
            reconnect_at: None,
        }
    }

    /// Connects to the broker, replacing any existing session.
    ///
    /// On success the channel subscribes to the subscribe topic, resets the
    /// reconnect counter and flushes queued messages in submission order.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::ConnectionTimeout` if the broker does not
    /// answer within the connect timeout, `TransportError::Connection` if it
    /// refuses, and `TransportError::Publish` if flushing the queue fails (the
    /// unsent messages stay queued and the session is dropped).
    #[instrument(skip(self), fields(client_id = %self.client_id))]
    pub async fn connect(&mut self) -> Result<(), TransportError> {
        self.teardown().await;

        let url = self.config.broker_url();
        let options = ConnectOptions {
            client_id: self.client_id.clone(),
            keep_alive: self.config.keep_alive,
            clean_session: self.config.clean_session,
            reconnect_period: self.config.reconnect_period,
        };
        info!(url = %url, "connecting to broker");

        let timeout = self.config.connect_timeout;
        let connection = tokio::time::timeout(timeout, self.broker.connect(&url, &options))
            .await
            .map_err(|_| TransportError::ConnectionTimeout {
                timeout_ms: millis(timeout),
            })??;

        let mut session = connection.session;
        if let Err(e) = session.subscribe(&self.config.subscribe_topic).await {
            session.close().await;
            return Err(e);
        }
        info!(topic = %self.config.subscribe_topic, "connected and subscribed");

        self.session = Some(session);
        self.frames = Some(connection.frames);
        self.reconnect_attempts = 0;
        self.reconnect_at = None;

        self.flush_queue().await
    }

    async fn flush_queue(&mut self) -> Result<(), TransportError> {
        if self.queue.is_empty() {
            return Ok(());
        }
        info!(count = self.queue.len(), "sending queued messages");
        while let Some(envelope) = self.queue.pop_front() {
            let Some(session) = self.session.as_mut() else {
                self.queue.push_front(envelope);
                break;
            };
            if let Err(e) = session
                .publish(&self.config.publish_topic, envelope.encode())
                .await
            {
                warn!(error = %e, remaining = self.queue.len() + 1, "flush interrupted");
                self.queue.push_front(envelope);
                self.teardown().await;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Publishes a message, or queues it while disconnected.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Publish` if the broker rejects the message.
    pub async fn publish(&mut self, mut envelope: Envelope) -> Result<(), TransportError> {
        envelope.stamp(self.clock.as_ref());
        let Some(session) = self.session.as_mut() else {
            debug!(message_type = %envelope.message_type, queued = self.queue.len() + 1, "not connected, queueing message");
            self.queue.push_back(envelope);
            return Ok(());
        };
        debug!(message_type = %envelope.message_type, "publishing");
        session
            .publish(&self.config.publish_topic, envelope.encode())
            .await
    }

    /// Waits for the next inbound message, a lost session or a due
    /// reconnect. Malformed messages are logged and skipped.
    ///
    /// Pends forever while disconnected with no reconnect scheduled.
    pub async fn next_event(&mut self) -> ChannelEvent {
        loop {
            let woke = tokio::select! {
                frame = next_frame(self.frames.as_mut()) => Wake::Frame(frame),
                () = wait_until(self.reconnect_at) => Wake::Reconnect,
            };

            match woke {
                Wake::Reconnect => {
                    self.reconnect_at = None;
                    return ChannelEvent::ReconnectDue;
                }
                Wake::Frame(Some(BrokerFrame::Message { topic, payload })) => {
                    match Envelope::decode(&payload) {
                        Ok(envelope) => {
                            debug!(topic = %topic, message_type = %envelope.message_type, "message received");
                            return ChannelEvent::Message(envelope);
                        }
                        Err(e) => {
                            warn!(topic = %topic, error = %e, "dropping invalid message");
                        }
                    }
                }
                Wake::Frame(Some(BrokerFrame::Closed { reason })) => {
                    warn!(reason = %reason, "connection lost");
                    self.teardown().await;
                    return ChannelEvent::ConnectionLost(reason);
                }
                Wake::Frame(None) => {
                    warn!("broker stream ended");
                    self.teardown().await;
                    return ChannelEvent::ConnectionLost("stream ended".to_owned());
                }
            }
        }
    }

    /// Schedules the next reconnect attempt with exponential backoff.
    ///
    /// Returns the delay, or `None` if a reconnect is already pending.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::MaxReconnect` once the attempt budget is
    /// spent. Nothing is scheduled in that case.
    pub fn schedule_reconnect(&mut self) -> Result<Option<Duration>, TransportError> {
        if self.reconnect_at.is_some() {
            return Ok(None);
        }
        let policy = self.config.reconnect;
        if !policy.allows(self.reconnect_attempts) {
            error!(attempts = self.reconnect_attempts, "max reconnection attempts reached");
            return Err(TransportError::MaxReconnect {
                attempts: self.reconnect_attempts,
            });
        }
        let delay = policy.delay_for(self.reconnect_attempts);
        info!(
            delay_ms = millis(delay),
            attempt = self.reconnect_attempts + 1,
            "scheduling reconnection"
        );
        self.reconnect_at = Some(Instant::now() + delay);
        Ok(Some(delay))
    }

    /// Performs a scheduled reconnect attempt.
    ///
    /// # Errors
    ///
    /// Same as [`TransportChannel::connect`].
    pub async fn reconnect(&mut self) -> Result<(), TransportError> {
        self.reconnect_at = None;
        self.reconnect_attempts += 1;
        self.connect().await
    }

    /// Cancels any pending reconnect and closes the session. Queued messages
    /// are kept.
    pub async fn disconnect(&mut self) {
        self.reconnect_at = None;
        self.teardown().await;
        info!(client_id = %self.client_id, "disconnected");
    }

    async fn teardown(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close().await;
        }
        self.frames = None;
    }

    /// Whether a session is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Whether a reconnect is pending.
    #[must_use]
    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_at.is_some()
    }

    /// Client id of this channel.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Number of queued messages.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Diagnostics snapshot.
    #[must_use]
    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            connected: self.is_connected(),
            client_id: self.client_id.clone(),
            reconnect_attempts: self.reconnect_attempts,
            queued_messages: self.queue.len(),
            broker_url: self.config.broker_url(),
        }
    }
}

enum Wake {
    Frame(Option<BrokerFrame>),
    Reconnect,
}

async fn next_frame(frames: Option<&mut UnboundedReceiver<BrokerFrame>>) -> Option<BrokerFrame> {
    match frames {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
