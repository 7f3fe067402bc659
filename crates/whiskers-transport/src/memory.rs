//! In-process broker.
//!
//! Routes publishes to every open session subscribed to the topic and records
//! the most recent publishes, so a development run (or a test) can play the
//! orchestrator's side of the conversation without a network broker.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::debug;
use whiskers_core::error::TransportError;

use crate::broker::{Broker, BrokerConnection, BrokerFrame, BrokerSession, ConnectOptions};

/// Publishes kept in the log; older entries are discarded.
pub const PUBLISH_LOG_LIMIT: usize = 1_000;

#[derive(Debug)]
struct Subscriber {
    id: u64,
    client_id: String,
    topics: Vec<String>,
    sender: UnboundedSender<BrokerFrame>,
    open: bool,
}

#[derive(Debug)]
struct Inner {
    online: bool,
    sessions: Vec<Subscriber>,
    opened: usize,
    published: VecDeque<(String, Vec<u8>)>,
}

impl Inner {
    fn session_mut(&mut self, id: u64) -> Option<&mut Subscriber> {
        self.sessions.iter_mut().find(|s| s.id == id)
    }

    fn prune_closed(&mut self) {
        self.sessions.retain(|s| s.open);
    }

    fn record(&mut self, topic: &str, payload: Vec<u8>) {
        if self.published.len() == PUBLISH_LOG_LIMIT {
            self.published.pop_front();
        }
        self.published.push_back((topic.to_owned(), payload));
    }

    fn deliver(&mut self, topic: &str, payload: &[u8]) -> usize {
        let mut delivered = 0;
        for session in self
            .sessions
            .iter()
            .filter(|s| s.open && s.topics.iter().any(|t| t == topic))
        {
            let frame = BrokerFrame::Message {
                topic: topic.to_owned(),
                payload: payload.to_vec(),
            };
            if session.sender.send(frame).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}

/// Shared in-process broker. Clones share the same routing table.
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    /// Creates an online broker with no sessions.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                online: true,
                sessions: Vec::new(),
                opened: 0,
                published: VecDeque::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes the broker on- or offline. An offline broker refuses new
    /// connections; existing sessions are unaffected.
    pub fn set_online(&self, online: bool) {
        self.lock().online = online;
    }

    /// Delivers a payload to every open session subscribed to `topic`, as if
    /// another client had published it. Returns the number of recipients.
    pub fn inject(&self, topic: &str, payload: impl Into<Vec<u8>>) -> usize {
        let payload = payload.into();
        self.lock().deliver(topic, &payload)
    }

    /// Serializes `message` and injects it on `topic`.
    pub fn inject_json(&self, topic: &str, message: &Value) -> usize {
        self.inject(topic, message.to_string())
    }

    /// Closes every open session with `reason`, as a broker restart would.
    pub fn drop_connections(&self, reason: &str) {
        let mut inner = self.lock();
        for session in inner.sessions.iter_mut().filter(|s| s.open) {
            session.open = false;
            let _ = session.sender.send(BrokerFrame::Closed {
                reason: reason.to_owned(),
            });
        }
        inner.prune_closed();
    }

    /// The most recent publishes through any session, oldest first. At most
    /// [`PUBLISH_LOG_LIMIT`] entries are kept.
    #[must_use]
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.lock().published.iter().cloned().collect()
    }

    /// Payloads published on `topic`, parsed as JSON. Payloads that are not
    /// valid JSON are skipped.
    #[must_use]
    pub fn published_json(&self, topic: &str) -> Vec<Value> {
        self.lock()
            .published
            .iter()
            .filter(|(t, _)| t == topic)
            .filter_map(|(_, payload)| serde_json::from_slice(payload).ok())
            .collect()
    }

    /// Forgets the publish log.
    pub fn clear_published(&self) {
        self.lock().published.clear();
    }

    /// Number of sessions ever opened.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.lock().opened
    }

    /// Number of sessions currently open.
    #[must_use]
    pub fn open_sessions(&self) -> usize {
        self.lock().sessions.iter().filter(|s| s.open).count()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn connect(
        &self,
        url: &str,
        options: &ConnectOptions,
    ) -> Result<BrokerConnection, TransportError> {
        let mut inner = self.lock();
        if !inner.online {
            return Err(TransportError::Connection(format!("{url} is unreachable")));
        }
        inner.prune_closed();
        let (sender, frames) = mpsc::unbounded_channel();
        let id = u64::try_from(inner.opened).unwrap_or(u64::MAX);
        inner.opened += 1;
        inner.sessions.push(Subscriber {
            id,
            client_id: options.client_id.clone(),
            topics: Vec::new(),
            sender,
            open: true,
        });
        debug!(client_id = %options.client_id, session = id, "memory broker session opened");
        Ok(BrokerConnection {
            session: Box::new(MemorySession {
                id,
                broker: self.clone(),
            }),
            frames,
        })
    }
}

#[derive(Debug)]
struct MemorySession {
    id: u64,
    broker: MemoryBroker,
}

#[async_trait]
impl BrokerSession for MemorySession {
    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        let mut inner = self.broker.lock();
        match inner.session_mut(self.id) {
            Some(session) if session.open => {
                session.topics.push(topic.to_owned());
                Ok(())
            }
            _ => Err(TransportError::Connection("session closed".to_owned())),
        }
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        let mut inner = self.broker.lock();
        let open = inner.session_mut(self.id).is_some_and(|s| s.open);
        if !open {
            return Err(TransportError::Publish("session closed".to_owned()));
        }
        inner.deliver(topic, &payload);
        inner.record(topic, payload);
        Ok(())
    }

    async fn close(&mut self) {
        let mut inner = self.broker.lock();
        if let Some(session) = inner.session_mut(self.id) {
            debug!(client_id = %session.client_id, "memory broker session closed");
            session.open = false;
        }
        inner.prune_closed();
    }
}
