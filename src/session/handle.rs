//! Link handle owned by the session
//!
//! Wraps the transport link together with the state the publisher,
//! subscriber and callbacks need. The link is `None` once the session has
//! been shut down; every operation checks for that and fails with a typed
//! error.

use super::state::{log_state_transition, next_state, ConnectionEvent, ConnectionState, Transition};
use super::stats::SessionStats;
use crate::transport::Link;
use rumqttc::v5::mqttbytes::QoS;
use std::collections::VecDeque;
use tracing::debug;

/// Borrowed by callbacks, the publisher and the subscriber for one operation
pub struct LinkHandle<L: Link> {
    link: Option<L>,
    state: ConnectionState,
    pub(crate) qos: QoS,
    pub(crate) max_inflight: u16,
    pub(crate) in_flight: u16,
    pub(crate) routing_enabled: bool,
    pub(crate) subscriptions: Vec<String>,
    /// Filters awaiting a SubAck, oldest first
    pub(crate) pending_subscriptions: VecDeque<String>,
    pub(crate) stats: SessionStats,
}

impl<L: Link> LinkHandle<L> {
    pub(crate) fn new(link: L, qos: QoS, max_inflight: u16) -> Self {
        Self {
            link: Some(link),
            state: ConnectionState::Disconnected,
            qos,
            max_inflight,
            in_flight: 0,
            routing_enabled: false,
            subscriptions: Vec::new(),
            pending_subscriptions: VecDeque::new(),
            stats: SessionStats::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether the underlying link still exists
    pub fn is_open(&self) -> bool {
        self.link.is_some()
    }

    pub fn qos(&self) -> QoS {
        self.qos
    }

    /// Outbound messages awaiting acknowledgment
    pub fn in_flight(&self) -> u16 {
        self.in_flight
    }

    /// Filters subscribed during the current connection, in call order
    pub fn subscriptions(&self) -> &[String] {
        &self.subscriptions
    }

    /// Whether inbound messages are routed to the dispatcher
    pub fn routing_enabled(&self) -> bool {
        self.routing_enabled
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub(crate) fn link_mut(&mut self) -> Option<&mut L> {
        self.link.as_mut()
    }

    pub(crate) fn take_link(&mut self) -> Option<L> {
        self.link.take()
    }

    /// Apply a state machine event and record its bookkeeping
    pub(crate) fn apply(&mut self, event: ConnectionEvent) -> Transition {
        let transition = next_state(self.state, event);
        log_state_transition(&transition);
        self.state = transition.to;

        if transition.changed() {
            match transition.to {
                ConnectionState::Connected => {
                    self.stats.connects += 1;
                    self.stats.connected_since = Some(chrono::Utc::now());
                }
                ConnectionState::Reconnecting | ConnectionState::Disconnected => {
                    if transition.from == ConnectionState::Connected {
                        if transition.to == ConnectionState::Reconnecting {
                            self.stats.disconnects += 1;
                        }
                        self.stats.connected_since = None;
                        // Broker session is clean on the next connect
                        self.subscriptions.clear();
                        self.pending_subscriptions.clear();
                    }
                    self.in_flight = 0;
                }
                ConnectionState::Connecting => {}
            }
        }

        transition
    }

    /// Match a SubAck to the oldest outstanding subscription
    ///
    /// A rejected filter is dropped from the active subscriptions. Returns
    /// the filter, or `None` when no subscription was outstanding.
    pub(crate) fn settle_subscription(&mut self, rejected: usize) -> Option<String> {
        let filter = self.pending_subscriptions.pop_front()?;
        if rejected > 0 {
            if let Some(index) = self.subscriptions.iter().position(|f| *f == filter) {
                self.subscriptions.remove(index);
            }
        }
        Some(filter)
    }

    /// Record a broker acknowledgment for an outbound message
    pub(crate) fn acknowledge(&mut self, packet_id: u16) {
        if self.in_flight == 0 {
            debug!(packet_id, "Acknowledgment with nothing in flight");
            return;
        }
        self.in_flight -= 1;
    }
}
