//! Transport seam for the broker link
//!
//! A [`Connector`] prepares the transport library and allocates a [`Link`];
//! the session drives the link through connect, poll, reconnect and
//! disconnect. The MQTT implementation lives in [`mqtt`]; tests use the
//! mocks in [`crate::testing`].

use crate::config::SessionConfig;
use crate::error::LinkError;
use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::v5::mqttbytes::QoS;
use std::time::Duration;

pub mod mqtt;
pub mod topic;

/// Event produced by one poll of the link
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// Broker acknowledged the connection
    Connected,
    /// Application message received on a subscribed topic
    Message { topic: String, payload: Bytes },
    /// Broker completed delivery of an outbound message
    PublishAcked { packet_id: u16 },
    /// Broker answered a subscription request
    SubscribeAcked { packet_id: u16, rejected: usize },
    /// Broker sent DISCONNECT
    Disconnected,
    /// Keep-alive and other protocol traffic
    Other(String),
}

/// Factory for link handles
pub trait Connector {
    type Link: Link;

    /// Human-readable transport library version for the log
    fn library_version(&self) -> String;

    /// Prepare the transport library for use
    fn init(&self) -> Result<(), LinkError>;

    /// Allocate a link handle; no network activity yet
    fn open(&self, config: &SessionConfig) -> Result<Self::Link, LinkError>;
}

/// Single outbound link to a broker
///
/// Implementations must be safe to move between threads; the session never
/// uses a link concurrently.
#[async_trait]
pub trait Link: Send {
    /// Issue a non-blocking connect; the outcome arrives through `poll`
    fn connect(&mut self, host: &str, port: u16, keep_alive: Duration) -> Result<(), LinkError>;

    /// Drive one read/write/keep-alive cycle, waiting at most `timeout`
    ///
    /// `Ok(None)` means the cycle completed without an event.
    async fn poll(&mut self, timeout: Duration) -> Result<Option<LinkEvent>, LinkError>;

    /// Re-issue the connect to the last endpoint
    fn reconnect(&mut self) -> Result<(), LinkError>;

    fn publish(
        &mut self,
        topic: &str,
        payload: Bytes,
        qos: QoS,
        retain: bool,
    ) -> Result<(), LinkError>;

    fn subscribe(&mut self, filter: &str, qos: QoS) -> Result<(), LinkError>;

    /// Graceful disconnect from the broker
    async fn disconnect(&mut self) -> Result<(), LinkError>;
}
