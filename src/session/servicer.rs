//! One read/write/keep-alive cycle per call
//!
//! Failures never escape as a stopped session: each failed cycle issues one
//! reconnect and reports the failure. Repeated failures pause for the
//! reconnect delay before returning so the driving loop cannot spin.

use super::dispatcher::DispatchOutcome;
use super::state::{can_dispatch, ConnectionEvent, Notify};
use super::Session;
use crate::error::{LinkError, ServiceError};
use crate::transport::{Link, LinkEvent};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

impl<L: Link> Session<L> {
    /// Service the link for at most `timeout`
    pub async fn service(&mut self, timeout: Duration) -> Result<(), ServiceError> {
        let polled = match self.handle.link_mut() {
            Some(link) => link.poll(timeout).await,
            None => return Err(ServiceError::NoHandle),
        };

        match polled {
            Ok(None) => Ok(()),
            Ok(Some(LinkEvent::Disconnected)) => self.recover(LinkError::ClosedByBroker).await,
            Ok(Some(event)) => {
                self.on_event(event);
                Ok(())
            }
            Err(e) => self.recover(e).await,
        }
    }

    fn on_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Connected => {
                let transition = self.handle.apply(ConnectionEvent::ConnAckReceived);
                if transition.notify == Some(Notify::Connected) {
                    self.consecutive_failures = 0;
                    info!("MQTT connected to broker");
                    self.handler.on_connect(&mut self.handle);
                }
            }
            LinkEvent::Message { topic, payload } => self.route_message(&topic, payload),
            LinkEvent::PublishAcked { packet_id } => {
                trace!(packet_id, "Publish acknowledged");
                self.handle.acknowledge(packet_id);
            }
            LinkEvent::SubscribeAcked { packet_id, rejected } => {
                let settled = self.handle.settle_subscription(rejected);
                let filter = settled.as_deref().unwrap_or("unknown");
                if rejected > 0 {
                    error!(packet_id, rejected, filter, "Broker rejected subscription");
                } else {
                    debug!(packet_id, filter, "Subscription acknowledged");
                }
            }
            LinkEvent::Other(kind) => trace!(event = %kind, "Protocol traffic"),
            // Handled by `service` as a failed cycle
            LinkEvent::Disconnected => {}
        }
    }

    fn route_message(&mut self, topic: &str, payload: Bytes) {
        self.handle.stats.messages_received += 1;

        let state = self.handle.state();
        if !can_dispatch(state) {
            warn!(topic, ?state, "Dropping message received while not connected");
            return;
        }
        if !self.handle.routing_enabled() {
            debug!(topic, "Dropping message, no subscription made yet");
            return;
        }

        let outcome = self.dispatcher.dispatch(topic, payload);
        self.handle.stats.messages_dispatched += 1;

        match outcome {
            Ok(DispatchOutcome::Queued) => {}
            Ok(DispatchOutcome::Reloaded) => self.handle.stats.reloads += 1,
            Err(e) => {
                self.handle.stats.reloads += 1;
                error!(topic, error = %e, "Reload failed");
            }
        }
    }

    async fn recover(&mut self, source: LinkError) -> Result<(), ServiceError> {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.handle.stats.service_failures += 1;

        let limiter = Arc::clone(self.dispatcher.log_limiter());
        if limiter.should_log() {
            error!(error = %source, failures = self.consecutive_failures, "Loop error");
        }

        let transition = self.handle.apply(ConnectionEvent::IoFailure);
        if transition.notify == Some(Notify::Disconnected) {
            warn!("MQTT connection lost");
            self.handler.on_disconnect(&mut self.handle);
        }

        self.handle.stats.reconnect_attempts += 1;
        let reconnect = match self.handle.link_mut() {
            Some(link) => link.reconnect(),
            None => Err(LinkError::NoConnection),
        };

        let reconnect_issued = match reconnect {
            Ok(()) => {
                self.handle.apply(ConnectionEvent::ReconnectIssued);
                true
            }
            Err(e) => {
                if limiter.should_log() {
                    error!(error = %e, "Reconnect loop error");
                }
                self.handle.stats.reconnect_failures += 1;
                self.handle.apply(ConnectionEvent::ReconnectFailed);
                false
            }
        };

        if !reconnect_issued || self.consecutive_failures > 1 {
            let delay = self.policy.delay_for(self.consecutive_failures);
            debug!(
                delay_ms = delay.as_millis() as u64,
                failures = self.consecutive_failures,
                "Pausing before next service cycle"
            );
            tokio::time::sleep(delay).await;
        }

        Err(ServiceError::Io {
            source,
            reconnect_issued,
        })
    }
}
