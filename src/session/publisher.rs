//! Outbound publishing with a single unacknowledged message in flight

use super::handle::LinkHandle;
use super::state::can_publish;
use crate::error::PublishError;
use crate::transport::topic::validate_topic_name;
use crate::transport::Link;
use bytes::Bytes;
use rumqttc::v5::mqttbytes::QoS;
use tracing::{debug, warn};

impl<L: Link> LinkHandle<L> {
    /// Publish `payload` to `topic` at the session QoS, not retained
    ///
    /// Returns as soon as the transport accepted the request; the
    /// acknowledgment is observed later by the servicer.
    pub fn publish(&mut self, topic: &str, payload: impl Into<Bytes>) -> Result<(), PublishError> {
        let payload = payload.into();
        let len = payload.len();

        match self.submit(topic, payload) {
            Ok(()) => {
                self.stats.published += 1;
                debug!(topic, bytes = len, in_flight = self.in_flight, "Published message");
                Ok(())
            }
            Err(e) => {
                self.stats.publish_rejected += 1;
                warn!(topic, error = %e, "MQTT message failed");
                Err(e)
            }
        }
    }

    fn submit(&mut self, topic: &str, payload: Bytes) -> Result<(), PublishError> {
        validate_topic_name(topic).map_err(|reason| PublishError::InvalidTopic {
            topic: topic.to_string(),
            reason,
        })?;

        let state = self.state();
        let qos = self.qos;
        let tracked = qos != QoS::AtMostOnce;
        let (in_flight, limit) = (self.in_flight, self.max_inflight);

        let link = self.link_mut().ok_or(PublishError::NoHandle)?;

        if !can_publish(state) {
            return Err(PublishError::NotConnected { state });
        }
        if tracked && in_flight >= limit {
            return Err(PublishError::InFlightLimit { limit });
        }

        link.publish(topic, payload, qos, false)
            .map_err(PublishError::TransportRejected)?;

        if tracked {
            self.in_flight += 1;
        }
        Ok(())
    }
}
