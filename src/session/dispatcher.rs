//! Subscriptions and inbound message dispatch
//!
//! Every inbound message goes to the command queue. A payload of exactly
//! `reload` also triggers the reload action, with the error-log limit lifted
//! for the duration of the action.

use super::handle::LinkHandle;
use crate::error::{BoxError, DispatchError, SubscribeError};
use crate::observability::log_limit::ErrorLogLimiter;
use crate::transport::topic::{is_reload_command, validate_topic_filter};
use crate::transport::Link;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

impl<L: Link> LinkHandle<L> {
    /// Subscribe to `filter` at the session QoS and enable inbound routing
    pub fn subscribe(&mut self, filter: &str) -> Result<(), SubscribeError> {
        match self.register(filter) {
            Ok(()) => {
                info!(topic = filter, "Subscribed to topic");
                Ok(())
            }
            Err(e) => {
                error!(topic = filter, error = %e, "Failed to subscribe");
                Err(e)
            }
        }
    }

    fn register(&mut self, filter: &str) -> Result<(), SubscribeError> {
        if !self.is_open() {
            return Err(SubscribeError::NotConnected);
        }

        validate_topic_filter(filter).map_err(|reason| SubscribeError::InvalidFilter {
            filter: filter.to_string(),
            reason,
        })?;

        // Routing is on before the broker can deliver anything for this filter
        self.routing_enabled = true;

        let qos = self.qos;
        let link = self.link_mut().ok_or(SubscribeError::NotConnected)?;
        link.subscribe(filter, qos)
            .map_err(SubscribeError::TransportRejected)?;

        self.subscriptions.push(filter.to_string());
        self.pending_subscriptions.push_back(filter.to_string());
        Ok(())
    }
}

/// Message handed to the command queue
#[derive(Debug, Clone, PartialEq)]
pub struct InboundCommand {
    pub topic: String,
    pub payload: Bytes,
}

impl InboundCommand {
    pub fn is_reload(&self) -> bool {
        is_reload_command(&self.payload)
    }
}

/// Receiver of every inbound message
pub trait CommandQueue: Send {
    fn enqueue(&mut self, command: InboundCommand);
}

impl CommandQueue for mpsc::Sender<InboundCommand> {
    fn enqueue(&mut self, command: InboundCommand) {
        if let Err(e) = self.try_send(command) {
            let topic = match &e {
                mpsc::error::TrySendError::Full(c) | mpsc::error::TrySendError::Closed(c) => {
                    c.topic.clone()
                }
            };
            warn!(topic = %topic, error = %e, "Command queue rejected message");
        }
    }
}

impl CommandQueue for mpsc::UnboundedSender<InboundCommand> {
    fn enqueue(&mut self, command: InboundCommand) {
        if let Err(e) = self.send(command) {
            warn!(topic = %e.0.topic, "Command queue closed");
        }
    }
}

/// Action run when a `reload` command arrives
pub trait ReloadAction: Send {
    fn reload(&mut self) -> Result<(), BoxError>;
}

impl<F> ReloadAction for F
where
    F: FnMut() -> Result<(), BoxError> + Send,
{
    fn reload(&mut self) -> Result<(), BoxError> {
        self()
    }
}

/// What a dispatch did with the message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Queued,
    Reloaded,
}

/// Routes inbound messages to the command queue and the reload action
pub struct Dispatcher {
    queue: Box<dyn CommandQueue>,
    reload: Box<dyn ReloadAction>,
    log_limiter: Arc<ErrorLogLimiter>,
}

impl Dispatcher {
    pub fn new(queue: impl CommandQueue + 'static, reload: impl ReloadAction + 'static) -> Self {
        Self {
            queue: Box::new(queue),
            reload: Box::new(reload),
            log_limiter: Arc::new(ErrorLogLimiter::default()),
        }
    }

    /// Share an existing limiter, typically the one used by the servicer
    pub fn with_log_limiter(mut self, limiter: Arc<ErrorLogLimiter>) -> Self {
        self.log_limiter = limiter;
        self
    }

    pub fn log_limiter(&self) -> &Arc<ErrorLogLimiter> {
        &self.log_limiter
    }

    /// Forward one inbound message
    pub fn dispatch(&mut self, topic: &str, payload: Bytes) -> Result<DispatchOutcome, DispatchError> {
        debug!(
            topic,
            bytes = payload.len(),
            payload = %String::from_utf8_lossy(&payload),
            "MQTT received message"
        );

        let reload = is_reload_command(&payload);
        self.queue.enqueue(InboundCommand {
            topic: topic.to_string(),
            payload,
        });

        if !reload {
            return Ok(DispatchOutcome::Queued);
        }

        let _scope = self.log_limiter.unlimited();
        info!(topic, "Reloading health configuration");
        self.reload.reload().map_err(DispatchError::Reload)?;
        Ok(DispatchOutcome::Reloaded)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("log_limiter", &self.log_limiter)
            .finish_non_exhaustive()
    }
}
