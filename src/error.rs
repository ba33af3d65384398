//! Error types for the broker link session
//!
//! Startup failures are fatal and returned from `initialize`. Steady-state
//! I/O failures are recovered by the servicer and only reported. Publish and
//! subscribe failures are per call; the caller decides whether to retry.

use crate::config::ConfigError;
use crate::session::state::ConnectionState;
use crate::transport::topic::TopicError;
use thiserror::Error;

/// Boxed error returned by external collaborators such as the reload action
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Transport-level failure reported by a [`Link`](crate::transport::Link)
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LinkError {
    #[error("transport library unavailable: {0}")]
    LibraryUnavailable(String),
    #[error("invalid endpoint {host}:{port}")]
    InvalidEndpoint { host: String, port: u16 },
    #[error("no connection to broker")]
    NoConnection,
    #[error("request queue full")]
    QueueFull,
    #[error("connection refused by broker: {0}")]
    Refused(String),
    #[error("broker closed the connection")]
    ClosedByBroker,
    #[error("I/O failure: {0}")]
    Io(String),
    #[error("protocol violation: {0}")]
    Protocol(String),
}

/// Session startup errors
#[derive(Debug, Error)]
pub enum InitError {
    #[error("Invalid session configuration")]
    Config(#[from] ConfigError),
    #[error("Failed to initialize transport library")]
    LibraryInit(#[source] LinkError),
    #[error("Failed to create link handle")]
    HandleCreation(#[source] LinkError),
    #[error("Connect to {host}:{port} rejected")]
    ConnectRejected {
        host: String,
        port: u16,
        #[source]
        source: LinkError,
    },
}

/// Failure of a single service cycle
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Link handle has been destroyed")]
    NoHandle,
    #[error("Loop error: {source}")]
    Io {
        #[source]
        source: LinkError,
        /// Whether the follow-up reconnect request was accepted by the transport
        reconnect_issued: bool,
    },
}

impl ServiceError {
    /// Underlying transport failure, if any
    pub fn link_error(&self) -> Option<&LinkError> {
        match self {
            ServiceError::NoHandle => None,
            ServiceError::Io { source, .. } => Some(source),
        }
    }
}

/// Publish rejections
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Invalid topic name {topic:?}")]
    InvalidTopic {
        topic: String,
        #[source]
        reason: TopicError,
    },
    #[error("Link handle has been destroyed")]
    NoHandle,
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: ConnectionState },
    #[error("In-flight limit reached ({limit} unacknowledged)")]
    InFlightLimit { limit: u16 },
    #[error("Transport rejected publish")]
    TransportRejected(#[source] LinkError),
}

/// Subscribe rejections
#[derive(Debug, Error)]
pub enum SubscribeError {
    #[error("No link handle exists")]
    NotConnected,
    #[error("Invalid topic filter {filter:?}")]
    InvalidFilter {
        filter: String,
        #[source]
        reason: TopicError,
    },
    #[error("Transport rejected subscription")]
    TransportRejected(#[source] LinkError),
}

/// Failure raised while dispatching an inbound message
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Reload action failed")]
    Reload(#[source] BoxError),
}
