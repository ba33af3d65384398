//! Subscription and inbound dispatch tests
//!
//! Every routed message reaches the command queue exactly once; only the
//! exact `reload` payload runs the reload action.


use brokerlink::error::{LinkError, SubscribeError};
use brokerlink::transport::topic::TopicError;
use brokerlink::{ConnectionState, LinkEvent};
use bytes::Bytes;
use proptest::prelude::*;
use test_helpers::{connected_harness, harness, COMMAND_TOPIC, TICK};

#[tokio::test]
async fn test_reload_runs_once_inside_unlimited_scope() {
    let mut h = connected_harness(harness().subscribing(&[COMMAND_TOPIC])).await;
    h.wire.push_message(COMMAND_TOPIC, b"reload");

    h.session.service(TICK).await.unwrap();

    assert_eq!(h.reload.calls(), 1);
    assert_eq!(h.reload.calls_unlimited(), 1);
    assert!(!h.limiter.is_unlimited());

    let commands = h.queue.commands();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].topic, COMMAND_TOPIC);
    assert!(commands[0].is_reload());
    assert_eq!(h.session.stats().reloads, 1);
}

#[tokio::test]
async fn test_failing_reload_releases_scope_and_keeps_servicing() {
    let mut h = connected_harness(harness().subscribing(&[COMMAND_TOPIC]).failing_reload()).await;
    h.wire.push_message(COMMAND_TOPIC, b"reload");
    h.wire.push_message(COMMAND_TOPIC, b"status");

    assert!(h.session.service(TICK).await.is_ok());
    assert!(h.session.service(TICK).await.is_ok());

    assert_eq!(h.reload.calls(), 1);
    assert!(!h.limiter.is_unlimited());
    assert_eq!(h.queue.commands().len(), 2);
    assert_eq!(h.session.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_messages_dropped_until_first_subscription() {
    let mut h = connected_harness(harness()).await;
    h.wire.push_message(COMMAND_TOPIC, b"status");

    h.session.service(TICK).await.unwrap();
    assert!(h.queue.commands().is_empty());

    h.session.subscribe(COMMAND_TOPIC).unwrap();
    h.wire.push_message(COMMAND_TOPIC, b"status");
    h.session.service(TICK).await.unwrap();

    assert_eq!(h.queue.commands().len(), 1);
    assert_eq!(h.session.stats().messages_received, 2);
    assert_eq!(h.session.stats().messages_dispatched, 1);
}

#[tokio::test]
async fn test_subscribe_records_filter() {
    let mut h = connected_harness(harness()).await;

    h.session.subscribe("agents/+/cmd").unwrap();
    h.session.subscribe("health/#").unwrap();

    assert_eq!(h.wire.subscriptions(), vec!["agents/+/cmd", "health/#"]);
    assert_eq!(
        h.session.handle().subscriptions(),
        ["agents/+/cmd".to_string(), "health/#".to_string()]
    );
    assert!(h.session.handle().routing_enabled());
}

#[tokio::test]
async fn test_suback_rejection_drops_filter() {
    let mut h = connected_harness(harness()).await;
    h.session.subscribe("agents/+/cmd").unwrap();
    h.session.subscribe("health/#").unwrap();

    h.wire.push_event(LinkEvent::SubscribeAcked {
        packet_id: 1,
        rejected: 1,
    });
    h.wire.push_event(LinkEvent::SubscribeAcked {
        packet_id: 2,
        rejected: 0,
    });
    h.session.service(TICK).await.unwrap();
    h.session.service(TICK).await.unwrap();

    assert_eq!(h.session.handle().subscriptions(), ["health/#".to_string()]);
    assert_eq!(h.session.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_suback_without_outstanding_subscription() {
    let mut h = connected_harness(harness().subscribing(&[COMMAND_TOPIC])).await;
    h.wire.push_event(LinkEvent::SubscribeAcked {
        packet_id: 1,
        rejected: 0,
    });
    h.wire.push_event(LinkEvent::SubscribeAcked {
        packet_id: 2,
        rejected: 1,
    });

    h.session.service(TICK).await.unwrap();
    h.session.service(TICK).await.unwrap();

    assert_eq!(h.session.handle().subscriptions(), [COMMAND_TOPIC.to_string()]);
}

#[tokio::test]
async fn test_subscribe_allowed_while_connecting() {
    let mut h = harness().build();

    assert!(h.session.subscribe(COMMAND_TOPIC).is_ok());
    assert_eq!(h.wire.subscriptions(), vec![COMMAND_TOPIC]);
}

#[tokio::test]
async fn test_invalid_filter_rejected_without_wire_io() {
    let mut h = connected_harness(harness()).await;
    let before = h.wire.traffic();

    for (filter, reason) in [
        ("health/#/more", TopicError::MisplacedMultiLevel),
        ("health/ab#", TopicError::PartialLevelWildcard('#')),
        ("agents/a+/cmd", TopicError::PartialLevelWildcard('+')),
        ("", TopicError::Empty),
    ] {
        match h.session.subscribe(filter) {
            Err(SubscribeError::InvalidFilter { filter: f, reason: r }) => {
                assert_eq!(f, filter);
                assert_eq!(r, reason);
            }
            other => panic!("expected InvalidFilter for {filter:?}, got {other:?}"),
        }
    }

    assert_eq!(h.wire.traffic(), before);
    assert!(!h.session.handle().routing_enabled());
}

#[tokio::test]
async fn test_transport_rejected_subscription_still_enables_routing() {
    let mut h = connected_harness(harness()).await;
    h.wire.reject_next_subscribes(1);

    let result = h.session.subscribe(COMMAND_TOPIC);

    assert!(matches!(
        result,
        Err(SubscribeError::TransportRejected(LinkError::QueueFull))
    ));
    assert!(h.session.handle().routing_enabled());
    assert!(h.session.handle().subscriptions().is_empty());
}

#[tokio::test]
async fn test_subscribe_after_shutdown() {
    let mut h = connected_harness(harness()).await;
    h.session.shutdown().await;

    assert!(matches!(
        h.session.subscribe(COMMAND_TOPIC),
        Err(SubscribeError::NotConnected)
    ));
    assert!(h.wire.subscriptions().is_empty());
}

#[tokio::test]
async fn test_empty_payload_is_forwarded() {
    let mut h = connected_harness(harness().subscribing(&[COMMAND_TOPIC])).await;
    h.wire.push_event(LinkEvent::Message {
        topic: COMMAND_TOPIC.to_string(),
        payload: Bytes::new(),
    });

    h.session.service(TICK).await.unwrap();

    let commands = h.queue.commands();
    assert_eq!(commands.len(), 1);
    assert!(commands[0].payload.is_empty());
    assert_eq!(h.reload.calls(), 0);
}

proptest! {
    #[test]
    fn test_other_payloads_forwarded_once_without_reload(
        payload in prop::collection::vec(any::<u8>(), 0..32)
            .prop_filter("not the reload command", |p| p.as_slice() != b"reload")
    ) {
        let mut h = tokio_test::block_on(connected_harness(harness().subscribing(&[COMMAND_TOPIC])));
        h.wire.push_event(LinkEvent::Message {
            topic: COMMAND_TOPIC.to_string(),
            payload: Bytes::from(payload.clone()),
        });

        let result = tokio_test::block_on(h.session.service(TICK));

        prop_assert!(result.is_ok());
        prop_assert_eq!(h.reload.calls(), 0);
        let commands = h.queue.commands();
        prop_assert_eq!(commands.len(), 1);
        prop_assert_eq!(commands[0].payload.as_ref(), payload.as_slice());
    }
}
