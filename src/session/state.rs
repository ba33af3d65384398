//! Pure connection state machine
//!
//! `Disconnected -> Connecting -> Connected -> Reconnecting -> Connecting`,
//! with `Shutdown` reachable from every state. Each transition names the
//! callback it must fire so the servicer can run it exactly once.

use tracing::{debug, info, warn};

/// Connection state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Inputs that move the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Link handle created, connect issued
    ConnectIssued,
    /// Broker acknowledged the connection
    ConnAckReceived,
    /// Service cycle failed or broker dropped the session
    IoFailure,
    /// Reconnect request accepted by the transport
    ReconnectIssued,
    /// Reconnect request rejected by the transport
    ReconnectFailed,
    /// Controlled teardown
    Shutdown,
}

/// Callback owed by a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notify {
    Connected,
    Disconnected,
}

/// Result of applying an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ConnectionState,
    pub to: ConnectionState,
    pub notify: Option<Notify>,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Determine the next state for `event` (pure function)
pub fn next_state(current: ConnectionState, event: ConnectionEvent) -> Transition {
    use ConnectionEvent as E;
    use ConnectionState as S;

    let (to, notify) = match (current, event) {
        (_, E::Shutdown) => (S::Disconnected, None),
        (S::Disconnected, E::ConnectIssued) => (S::Connecting, None),
        (S::Connecting | S::Reconnecting, E::ConnAckReceived) => {
            (S::Connected, Some(Notify::Connected))
        }
        (S::Connected, E::IoFailure) => (S::Reconnecting, Some(Notify::Disconnected)),
        (S::Connecting | S::Reconnecting, E::IoFailure) => (S::Reconnecting, None),
        (S::Reconnecting, E::ReconnectIssued) => (S::Connecting, None),
        (S::Reconnecting, E::ReconnectFailed) => (S::Reconnecting, None),
        (state, ignored) => {
            debug!(?state, event = ?ignored, "Ignoring event in current state");
            (state, None)
        }
    };

    Transition {
        from: current,
        to,
        notify,
    }
}

/// Whether outbound publishes are accepted in `state`
pub fn can_publish(state: ConnectionState) -> bool {
    matches!(state, ConnectionState::Connected)
}

/// Whether inbound messages may be dispatched in `state`
pub fn can_dispatch(state: ConnectionState) -> bool {
    matches!(state, ConnectionState::Connected)
}

/// Log a state change
pub fn log_state_transition(transition: &Transition) {
    if !transition.changed() {
        return;
    }
    match (transition.from, transition.to) {
        (ConnectionState::Disconnected, ConnectionState::Connecting) => {
            info!("Establishing link to broker");
        }
        (_, ConnectionState::Connected) => {
            info!("Connection to broker established");
        }
        (ConnectionState::Connected, ConnectionState::Reconnecting) => {
            warn!("Connection to broker lost");
        }
        (_, ConnectionState::Disconnected) => {
            info!("Link to broker closed");
        }
        (from, to) => {
            debug!(?from, ?to, "Link state change");
        }
    }
}
