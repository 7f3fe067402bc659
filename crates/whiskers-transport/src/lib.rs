//! Transport channel to the remote orchestrator.
//!
//! The channel owns the broker session, the outbound queue used while
//! disconnected and the reconnect backoff. The broker itself sits behind the
//! [`broker::Broker`] trait; [`memory::MemoryBroker`] is the in-process
//! implementation used for development runs and tests.

pub mod backoff;
pub mod broker;
pub mod channel;
pub mod config;
pub mod memory;

pub use backoff::ReconnectPolicy;
pub use broker::{Broker, BrokerConnection, BrokerFrame, BrokerSession, ConnectOptions};
pub use channel::{ChannelEvent, ConnectionStats, TransportChannel};
pub use config::TransportConfig;
pub use memory::MemoryBroker;
