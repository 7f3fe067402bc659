//! Test brokers: `Broker` implementations for failure paths.

use async_trait::async_trait;
use whiskers_core::error::TransportError;
use whiskers_transport::broker::{Broker, BrokerConnection, ConnectOptions};

/// A broker that refuses every connection.
#[derive(Debug)]
pub struct FailingBroker;

#[async_trait]
impl Broker for FailingBroker {
    async fn connect(
        &self,
        _url: &str,
        _options: &ConnectOptions,
    ) -> Result<BrokerConnection, TransportError> {
        Err(TransportError::Connection("connection refused".into()))
    }
}

/// A broker that never answers a connect request. Pair with paused tokio time
/// to exercise the connect timeout.
#[derive(Debug)]
pub struct SilentBroker;

#[async_trait]
impl Broker for SilentBroker {
    async fn connect(
        &self,
        _url: &str,
        _options: &ConnectOptions,
    ) -> Result<BrokerConnection, TransportError> {
        std::future::pending().await
    }
}
