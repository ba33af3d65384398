//! Pure mapping of rumqttc events and errors onto link events

use crate::error::LinkError;
use crate::transport::LinkEvent;
use rumqttc::v5::mqttbytes::v5::{Packet, SubscribeReasonCode};
use rumqttc::v5::{ClientError, ConnectionError, Event};

/// Route an MQTT v5 event to the matching link event
pub fn route_mqtt_event(event: &Event) -> LinkEvent {
    match event {
        Event::Incoming(incoming) => match incoming {
            // rumqttc turns refused ConnAcks into errors, so this one succeeded
            Packet::ConnAck(_) => LinkEvent::Connected,
            Packet::Publish(publish) => LinkEvent::Message {
                topic: String::from_utf8_lossy(&publish.topic).to_string(),
                payload: publish.payload.clone(),
            },
            Packet::PubAck(puback) => LinkEvent::PublishAcked {
                packet_id: puback.pkid,
            },
            Packet::PubComp(pubcomp) => LinkEvent::PublishAcked {
                packet_id: pubcomp.pkid,
            },
            Packet::SubAck(suback) => LinkEvent::SubscribeAcked {
                packet_id: suback.pkid,
                rejected: suback
                    .return_codes
                    .iter()
                    .filter(|code| !matches!(code, SubscribeReasonCode::Success(_)))
                    .count(),
            },
            Packet::Disconnect(_) => LinkEvent::Disconnected,
            other => LinkEvent::Other(format!("{other:?}")),
        },
        Event::Outgoing(outgoing) => LinkEvent::Other(format!("{outgoing:?}")),
    }
}

/// Map an event loop failure onto a link error
pub fn map_connection_error(error: ConnectionError) -> LinkError {
    match error {
        ConnectionError::ConnectionRefused(code) => LinkError::Refused(format!("{code:?}")),
        ConnectionError::Io(e) => LinkError::Io(e.to_string()),
        ConnectionError::MqttState(e) => LinkError::Protocol(e.to_string()),
        other => LinkError::Io(other.to_string()),
    }
}

/// Map a request-channel failure onto a link error
pub fn map_client_error(_error: ClientError) -> LinkError {
    // try_* requests only fail when the bounded request channel cannot take more
    LinkError::QueueFull
}
