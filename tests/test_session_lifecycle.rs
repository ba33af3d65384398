//! Session lifecycle tests
//!
//! Initialize, connect acknowledgment and shutdown against a mock wire.


use brokerlink::error::{InitError, LinkError, PublishError, ServiceError, SubscribeError};
use brokerlink::session::dispatcher::Dispatcher;
use brokerlink::testing::mocks::{mock_config, MockConnector, MockWire, RecordingQueue, WireOp};
use brokerlink::transport::mqtt::MqttConnector;
use brokerlink::{BoxError, ConnectionState, LinkEvent, Session, SessionConfig};
use std::time::Duration;
use test_helpers::{connected_harness, harness, TICK};

fn noop_dispatcher() -> Dispatcher {
    Dispatcher::new(RecordingQueue::default(), || -> Result<(), BoxError> { Ok(()) })
}

#[tokio::test]
async fn test_initialize_then_shutdown_twice() {
    let mut h = harness().build();
    assert_eq!(h.session.state(), ConnectionState::Connecting);

    h.session.shutdown().await;
    assert_eq!(h.session.state(), ConnectionState::Disconnected);
    assert!(!h.session.handle().is_open());

    h.session.shutdown().await;
    assert_eq!(h.session.state(), ConnectionState::Disconnected);

    assert_eq!(h.wire.disconnects(), 1);
    assert_eq!(h.handler.disconnects(), 0);
}

#[tokio::test]
async fn test_initialize_issues_connect_with_keep_alive() {
    let h = harness().build();

    assert_eq!(
        h.wire.traffic(),
        vec![WireOp::Connect {
            host: "localhost".to_string(),
            port: 1883,
            keep_alive: Duration::from_secs(60),
        }]
    );
    assert_eq!(h.session.handle().in_flight(), 0);
    assert!(!h.session.handle().routing_enabled());
}

#[tokio::test]
async fn test_connack_fires_on_connect_once() {
    let mut h = connected_harness(harness()).await;
    assert_eq!(h.session.state(), ConnectionState::Connected);
    assert_eq!(h.handler.connects(), 1);
    assert!(h.session.stats().connected_since.is_some());

    // A duplicate ConnAck in Connected is ignored
    h.wire.push_event(LinkEvent::Connected);
    h.session.service(TICK).await.unwrap();
    assert_eq!(h.handler.connects(), 1);
    assert_eq!(h.session.stats().connects, 1);
}

#[tokio::test]
async fn test_shutdown_from_connected_does_not_fire_on_disconnect() {
    let mut h = connected_harness(harness()).await;

    h.session.shutdown().await;

    assert_eq!(h.session.state(), ConnectionState::Disconnected);
    assert_eq!(h.handler.disconnects(), 0);
    assert_eq!(h.session.stats().disconnects, 0);
    assert!(h.session.stats().connected_since.is_none());
}

#[tokio::test]
async fn test_shutdown_destroys_handle_even_when_disconnect_fails() {
    let mut h = connected_harness(harness()).await;
    h.wire.fail_disconnect();

    h.session.shutdown().await;

    assert!(!h.session.handle().is_open());
    assert_eq!(h.session.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_operations_after_shutdown_fail_typed() {
    let mut h = connected_harness(harness()).await;
    h.session.shutdown().await;
    let before = h.wire.ops().len();

    assert!(matches!(
        h.session.service(TICK).await,
        Err(ServiceError::NoHandle)
    ));
    assert!(matches!(
        h.session.publish("a/b", "x"),
        Err(PublishError::NoHandle)
    ));
    assert!(matches!(
        h.session.subscribe("a/#"),
        Err(SubscribeError::NotConnected)
    ));
    assert_eq!(h.wire.ops().len(), before);
}

#[test]
fn test_initialize_library_failure() {
    let connector = MockConnector {
        fail_init: true,
        ..MockConnector::new(MockWire::new())
    };

    let result = Session::initialize(&mock_config(), &connector, (), noop_dispatcher());
    assert!(matches!(result, Err(InitError::LibraryInit(_))));
}

#[test]
fn test_initialize_handle_creation_failure() {
    let connector = MockConnector {
        fail_open: true,
        ..MockConnector::new(MockWire::new())
    };

    let result = Session::initialize(&mock_config(), &connector, (), noop_dispatcher());
    assert!(matches!(result, Err(InitError::HandleCreation(_))));
}

#[test]
fn test_initialize_connect_rejected() {
    let wire = MockWire::new();
    wire.reject_connect(LinkError::InvalidEndpoint {
        host: "localhost".to_string(),
        port: 1883,
    });

    let result = Session::initialize(
        &mock_config(),
        &MockConnector::new(wire.clone()),
        (),
        noop_dispatcher(),
    );

    match result {
        Err(InitError::ConnectRejected { host, port, .. }) => {
            assert_eq!(host, "localhost");
            assert_eq!(port, 1883);
        }
        _ => panic!("expected ConnectRejected"),
    }
    assert!(wire.traffic().is_empty());
}

#[test]
fn test_initialize_rejects_invalid_config() {
    let mut config = mock_config();
    config.session.qos = 3;

    let result = Session::initialize(
        &config,
        &MockConnector::new(MockWire::new()),
        (),
        noop_dispatcher(),
    );
    assert!(matches!(result, Err(InitError::Config(_))));
}

#[test]
fn test_mqtt_connector_needs_runtime() {
    let result = Session::initialize(
        &SessionConfig::new("localhost", 1883),
        &MqttConnector::new(),
        (),
        noop_dispatcher(),
    );
    assert!(matches!(result, Err(InitError::LibraryInit(_))));
}

#[tokio::test]
async fn test_mqtt_session_rejects_malformed_endpoint() {
    let result = Session::initialize(
        &SessionConfig::new("broker host", 1883),
        &MqttConnector::new(),
        (),
        noop_dispatcher(),
    );
    assert!(matches!(
        result,
        Err(InitError::ConnectRejected {
            source: LinkError::InvalidEndpoint { .. },
            ..
        })
    ));
}

#[tokio::test]
async fn test_mqtt_session_initialize_and_shutdown_without_service() {
    let mut session = Session::initialize(
        &SessionConfig::new("localhost", 1883),
        &MqttConnector::new(),
        (),
        noop_dispatcher(),
    )
    .expect("connect is only issued, not performed");

    assert_eq!(session.state(), ConnectionState::Connecting);
    session.shutdown().await;
    session.shutdown().await;
    assert_eq!(session.state(), ConnectionState::Disconnected);
}
