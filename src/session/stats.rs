//! Per-session counters

use chrono::{DateTime, Utc};

/// Counters describing a session's lifetime
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStats {
    /// Transitions into `Connected`
    pub connects: u64,
    /// Failure transitions out of `Connected`
    pub disconnects: u64,
    pub reconnect_attempts: u64,
    pub reconnect_failures: u64,
    pub service_failures: u64,
    pub published: u64,
    pub publish_rejected: u64,
    pub messages_received: u64,
    pub messages_dispatched: u64,
    pub reloads: u64,
    /// Start of the current connection
    pub connected_since: Option<DateTime<Utc>>,
}

impl SessionStats {
    /// Time connected as of `now`, if connected
    pub fn uptime(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.connected_since.map(|since| now - since)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uptime() {
        let mut stats = SessionStats::default();
        let now = Utc::now();
        assert_eq!(stats.uptime(now), None);

        stats.connected_since = Some(now - chrono::Duration::seconds(42));
        assert_eq!(stats.uptime(now), Some(chrono::Duration::seconds(42)));
    }
}
