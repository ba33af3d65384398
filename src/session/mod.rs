//! Managed broker session
//!
//! A [`Session`] owns one link handle for its whole life. The host drives it
//! by calling [`Session::service`] in a loop, publishes and subscribes
//! through it, and tears it down with [`Session::shutdown`].

pub mod backoff;
pub mod dispatcher;
pub mod handle;
pub mod publisher;
pub mod servicer;
pub mod state;
pub mod stats;

use crate::config::SessionConfig;
use crate::error::{InitError, PublishError, SubscribeError};
use crate::session_span;
use crate::transport::{Connector, Link};
use backoff::ReconnectPolicy;
use bytes::Bytes;
use dispatcher::Dispatcher;
use handle::LinkHandle;
use state::{ConnectionEvent, ConnectionState};
use stats::SessionStats;
use tracing::{debug, info, warn};

pub use dispatcher::{CommandQueue, DispatchOutcome, InboundCommand, ReloadAction};

/// Connection lifecycle callbacks
///
/// Both run on the servicing path with the session mutably borrowed, so they
/// may publish or subscribe through the handle but never re-enter `service`.
pub trait SessionHandler<L: Link>: Send {
    /// Broker acknowledged a connection
    fn on_connect(&mut self, _link: &mut LinkHandle<L>) {}

    /// An established connection was lost
    fn on_disconnect(&mut self, _link: &mut LinkHandle<L>) {}
}

impl<L: Link> SessionHandler<L> for () {}

/// A single managed link to a broker
pub struct Session<L: Link> {
    handle: LinkHandle<L>,
    handler: Box<dyn SessionHandler<L>>,
    dispatcher: Dispatcher,
    policy: ReconnectPolicy,
    consecutive_failures: u32,
}

impl<L: Link> Session<L> {
    /// Create the link handle and issue a non-blocking connect
    ///
    /// On success the session is `Connecting`; the outcome of the connect is
    /// observed by `service`.
    pub fn initialize<C>(
        config: &SessionConfig,
        connector: &C,
        handler: impl SessionHandler<L> + 'static,
        dispatcher: Dispatcher,
    ) -> Result<Self, InitError>
    where
        C: Connector<Link = L>,
    {
        let host = config.broker.host.as_str();
        let port = config.broker.port;
        let _span = session_span!(host, port).entered();

        config.validate()?;
        let qos = config.qos()?;

        info!(version = %connector.library_version(), "Transport library version");
        connector.init().map_err(InitError::LibraryInit)?;

        let mut link = connector.open(config).map_err(InitError::HandleCreation)?;
        link.connect(host, port, config.keep_alive())
            .map_err(|source| InitError::ConnectRejected {
                host: host.to_string(),
                port,
                source,
            })?;

        let mut handle = LinkHandle::new(link, qos, config.max_inflight());
        handle.apply(ConnectionEvent::ConnectIssued);
        info!(?qos, max_inflight = config.max_inflight(), "Connecting to broker");

        Ok(Self {
            handle,
            handler: Box::new(handler),
            dispatcher,
            policy: ReconnectPolicy::from_config(config),
            consecutive_failures: 0,
        })
    }

    /// Disconnect gracefully and destroy the link handle
    ///
    /// Safe to call more than once. Does not fire `on_disconnect`.
    pub async fn shutdown(&mut self) {
        let Some(mut link) = self.handle.take_link() else {
            debug!("Shutdown requested with no link handle");
            return;
        };

        match link.disconnect().await {
            Ok(()) => info!("MQTT disconnected from broker"),
            Err(e) => info!(error = %e, "MQTT invalid structure"),
        }
        drop(link);

        self.handle.apply(ConnectionEvent::Shutdown);
    }

    pub fn publish(&mut self, topic: &str, payload: impl Into<Bytes>) -> Result<(), PublishError> {
        self.handle.publish(topic, payload)
    }

    pub fn subscribe(&mut self, filter: &str) -> Result<(), SubscribeError> {
        self.handle.subscribe(filter)
    }

    pub fn state(&self) -> ConnectionState {
        self.handle.state()
    }

    pub fn stats(&self) -> &SessionStats {
        self.handle.stats()
    }

    pub fn handle(&self) -> &LinkHandle<L> {
        &self.handle
    }

    pub fn handle_mut(&mut self) -> &mut LinkHandle<L> {
        &mut self.handle
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Replace the pause policy taken from the config at initialize
    pub fn set_reconnect_policy(&mut self, policy: ReconnectPolicy) {
        self.policy = policy;
    }

    /// Failed service cycles since the last successful connect
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

impl<L: Link> Drop for Session<L> {
    fn drop(&mut self) {
        if self.handle.is_open() {
            warn!("Session dropped without shutdown; closing link without DISCONNECT");
        }
    }
}
