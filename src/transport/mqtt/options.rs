//! Pure construction of rumqttc options from the session configuration

use crate::config::SessionConfig;
use crate::error::LinkError;
use rumqttc::v5::MqttOptions;
use rumqttc::Transport as RumqttcTransport;
use std::time::Duration;

/// Largest packet accepted in either direction
pub const MAX_PACKET_SIZE: u32 = 256 * 1024;

/// Reject endpoints the transport could never dial
pub fn validate_endpoint(host: &str, port: u16) -> Result<(), LinkError> {
    let malformed =
        host.is_empty() || host.chars().any(char::is_whitespace) || host.contains('/');
    if malformed || port == 0 {
        return Err(LinkError::InvalidEndpoint {
            host: host.to_string(),
            port,
        });
    }
    Ok(())
}

/// Build MQTT v5 options for one connect attempt
pub fn configure_mqtt_options(
    client_id: &str,
    config: &SessionConfig,
    host: &str,
    port: u16,
    keep_alive: Duration,
) -> Result<MqttOptions, LinkError> {
    validate_endpoint(host, port)?;

    let mut mqtt_options = MqttOptions::new(client_id, host, port);
    mqtt_options.set_keep_alive(keep_alive);
    // Subscriptions are re-established by the on-connect handler
    mqtt_options.set_clean_start(true);
    mqtt_options.set_max_packet_size(Some(MAX_PACKET_SIZE));
    mqtt_options.set_outgoing_inflight_upper_limit(config.max_inflight());

    if config.broker.tls {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    if let Some(username) = config.username() {
        let password = config.password().unwrap_or_default();
        mqtt_options.set_credentials(username, password);
    }

    Ok(mqtt_options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_endpoint() {
        assert!(validate_endpoint("localhost", 1883).is_ok());
        assert!(validate_endpoint("10.0.0.7", 8883).is_ok());

        assert!(validate_endpoint("", 1883).is_err());
        assert!(validate_endpoint("local host", 1883).is_err());
        assert!(validate_endpoint("mqtt://localhost", 1883).is_err());
        assert!(validate_endpoint("localhost", 0).is_err());
    }

    #[test]
    fn test_configure_mqtt_options() {
        let config = SessionConfig::new("localhost", 1883);
        let options = configure_mqtt_options(
            "node-1",
            &config,
            "localhost",
            1883,
            Duration::from_secs(60),
        )
        .unwrap();

        assert_eq!(options.client_id(), "node-1");
        assert_eq!(options.broker_address(), ("localhost".to_string(), 1883));
        assert_eq!(options.keep_alive(), Duration::from_secs(60));
        assert_eq!(options.get_outgoing_inflight_upper_limit(), Some(1));
    }

    #[test]
    fn test_configure_rejects_bad_endpoint() {
        let config = SessionConfig::new("", 1883);
        let result =
            configure_mqtt_options("node-1", &config, "", 1883, Duration::from_secs(60));
        assert!(matches!(result, Err(LinkError::InvalidEndpoint { .. })));
    }
}
