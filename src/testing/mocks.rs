//! Mock implementations for testing
//!
//! [`MockConnector`] hands out [`MockLink`]s that share one [`MockWire`]:
//! a scripted sequence of poll results plus a log of every operation the
//! session performed. Handlers, queues and reload actions record into a
//! shared [`Timeline`] so tests can check callback ordering.

use crate::config::SessionConfig;
use crate::error::{BoxError, LinkError};
use crate::observability::ErrorLogLimiter;
use crate::session::handle::LinkHandle;
use crate::session::{CommandQueue, InboundCommand, ReloadAction, SessionHandler};
use crate::transport::{Connector, Link, LinkEvent};
use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::v5::mqttbytes::QoS;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Config pointing at `localhost:1883` with a fixed client id
pub fn mock_config() -> SessionConfig {
    let mut config = SessionConfig::new("localhost", 1883);
    config.broker.client_id = Some("mock-client".to_string());
    config
}

/// Ordered record of callbacks and dispatches, shared between mocks
#[derive(Debug, Clone, Default)]
pub struct Timeline(Arc<Mutex<Vec<String>>>);

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        lock(&self.0).push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        lock(&self.0).clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        lock(&self.0).iter().filter(|e| *e == entry).count()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        lock(&self.0).iter().position(|e| e == entry)
    }
}

/// Operation performed on a mock link
#[derive(Debug, Clone, PartialEq)]
pub enum WireOp {
    Connect {
        host: String,
        port: u16,
        keep_alive: Duration,
    },
    Poll,
    Reconnect,
    Publish {
        topic: String,
        payload: Bytes,
        qos: QoS,
        retain: bool,
    },
    Subscribe {
        filter: String,
        qos: QoS,
    },
    Disconnect,
}

#[derive(Debug, Default)]
struct WireState {
    script: VecDeque<Result<Option<LinkEvent>, LinkError>>,
    ops: Vec<WireOp>,
    reject_connect: Option<LinkError>,
    failing_reconnects: usize,
    rejected_publishes: usize,
    rejected_subscribes: usize,
    fail_disconnect: bool,
}

/// Scripted broker shared by every link a [`MockConnector`] opens
#[derive(Debug, Clone, Default)]
pub struct MockWire {
    state: Arc<Mutex<WireState>>,
    timeline: Timeline,
}

impl MockWire {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record reconnects into `timeline` as `"reconnect"`
    pub fn with_timeline(timeline: Timeline) -> Self {
        Self {
            state: Arc::default(),
            timeline,
        }
    }

    /// Next poll yields `event`
    pub fn push_event(&self, event: LinkEvent) -> &Self {
        lock(&self.state).script.push_back(Ok(Some(event)));
        self
    }

    /// Next poll fails with `error`
    pub fn push_error(&self, error: LinkError) -> &Self {
        lock(&self.state).script.push_back(Err(error));
        self
    }

    /// Next poll completes with no event
    pub fn push_idle(&self) -> &Self {
        lock(&self.state).script.push_back(Ok(None));
        self
    }

    pub fn push_message(&self, topic: &str, payload: &'static [u8]) -> &Self {
        self.push_event(LinkEvent::Message {
            topic: topic.to_string(),
            payload: Bytes::from_static(payload),
        })
    }

    pub fn reject_connect(&self, error: LinkError) {
        lock(&self.state).reject_connect = Some(error);
    }

    pub fn fail_next_reconnects(&self, count: usize) {
        lock(&self.state).failing_reconnects = count;
    }

    pub fn reject_next_publishes(&self, count: usize) {
        lock(&self.state).rejected_publishes = count;
    }

    pub fn reject_next_subscribes(&self, count: usize) {
        lock(&self.state).rejected_subscribes = count;
    }

    pub fn fail_disconnect(&self) {
        lock(&self.state).fail_disconnect = true;
    }

    pub fn ops(&self) -> Vec<WireOp> {
        lock(&self.state).ops.clone()
    }

    /// Operations other than polling; empty means nothing reached the broker
    pub fn traffic(&self) -> Vec<WireOp> {
        self.ops()
            .into_iter()
            .filter(|op| *op != WireOp::Poll)
            .collect()
    }

    pub fn reconnects(&self) -> usize {
        self.count(|op| matches!(op, WireOp::Reconnect))
    }

    pub fn disconnects(&self) -> usize {
        self.count(|op| matches!(op, WireOp::Disconnect))
    }

    pub fn publishes(&self) -> Vec<(String, Bytes)> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                WireOp::Publish { topic, payload, .. } => Some((topic, payload)),
                _ => None,
            })
            .collect()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                WireOp::Subscribe { filter, .. } => Some(filter),
                _ => None,
            })
            .collect()
    }

    fn count(&self, predicate: impl Fn(&WireOp) -> bool) -> usize {
        lock(&self.state).ops.iter().filter(|op| predicate(op)).count()
    }

    fn log(&self, op: WireOp) {
        lock(&self.state).ops.push(op);
    }
}

/// Link backed by a [`MockWire`]
#[derive(Debug)]
pub struct MockLink {
    wire: MockWire,
    client_id: String,
}

impl MockLink {
    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

#[async_trait]
impl Link for MockLink {
    fn connect(&mut self, host: &str, port: u16, keep_alive: Duration) -> Result<(), LinkError> {
        let rejection = lock(&self.wire.state).reject_connect.clone();
        if let Some(error) = rejection {
            return Err(error);
        }
        self.wire.log(WireOp::Connect {
            host: host.to_string(),
            port,
            keep_alive,
        });
        Ok(())
    }

    async fn poll(&mut self, _timeout: Duration) -> Result<Option<LinkEvent>, LinkError> {
        let mut state = lock(&self.wire.state);
        state.ops.push(WireOp::Poll);
        state.script.pop_front().unwrap_or(Ok(None))
    }

    fn reconnect(&mut self) -> Result<(), LinkError> {
        self.wire.log(WireOp::Reconnect);
        self.wire.timeline.record("reconnect");

        let mut state = lock(&self.wire.state);
        if state.failing_reconnects > 0 {
            state.failing_reconnects -= 1;
            return Err(LinkError::Io("connection refused".to_string()));
        }
        Ok(())
    }

    fn publish(
        &mut self,
        topic: &str,
        payload: Bytes,
        qos: QoS,
        retain: bool,
    ) -> Result<(), LinkError> {
        let mut state = lock(&self.wire.state);
        if state.rejected_publishes > 0 {
            state.rejected_publishes -= 1;
            return Err(LinkError::QueueFull);
        }
        state.ops.push(WireOp::Publish {
            topic: topic.to_string(),
            payload,
            qos,
            retain,
        });
        Ok(())
    }

    fn subscribe(&mut self, filter: &str, qos: QoS) -> Result<(), LinkError> {
        let mut state = lock(&self.wire.state);
        if state.rejected_subscribes > 0 {
            state.rejected_subscribes -= 1;
            return Err(LinkError::QueueFull);
        }
        state.ops.push(WireOp::Subscribe {
            filter: filter.to_string(),
            qos,
        });
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), LinkError> {
        let mut state = lock(&self.wire.state);
        state.ops.push(WireOp::Disconnect);
        if state.fail_disconnect {
            return Err(LinkError::NoConnection);
        }
        Ok(())
    }
}

/// Connector producing [`MockLink`]s on a shared wire
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    pub wire: MockWire,
    pub fail_init: bool,
    pub fail_open: bool,
}

impl MockConnector {
    pub fn new(wire: MockWire) -> Self {
        Self {
            wire,
            ..Default::default()
        }
    }
}

impl Connector for MockConnector {
    type Link = MockLink;

    fn library_version(&self) -> String {
        "mock 1.0".to_string()
    }

    fn init(&self) -> Result<(), LinkError> {
        if self.fail_init {
            return Err(LinkError::LibraryUnavailable("mock init failure".to_string()));
        }
        Ok(())
    }

    fn open(&self, config: &SessionConfig) -> Result<MockLink, LinkError> {
        if self.fail_open {
            return Err(LinkError::Io("mock handle allocation failure".to_string()));
        }
        Ok(MockLink {
            wire: self.wire.clone(),
            client_id: config.client_id(),
        })
    }
}

/// Handler that counts callbacks and optionally subscribes on connect
#[derive(Debug, Clone, Default)]
pub struct RecordingHandler {
    timeline: Timeline,
    connects: Arc<AtomicUsize>,
    disconnects: Arc<AtomicUsize>,
    subscribe_on_connect: Vec<String>,
}

impl RecordingHandler {
    pub fn new(timeline: Timeline) -> Self {
        Self {
            timeline,
            ..Default::default()
        }
    }

    pub fn subscribing(mut self, topics: &[&str]) -> Self {
        self.subscribe_on_connect = topics.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

impl<L: Link> SessionHandler<L> for RecordingHandler {
    fn on_connect(&mut self, link: &mut LinkHandle<L>) {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.timeline.record("on_connect");
        for topic in &self.subscribe_on_connect {
            // Failures are visible through the wire log
            let _ = link.subscribe(topic);
        }
    }

    fn on_disconnect(&mut self, _link: &mut LinkHandle<L>) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.timeline.record("on_disconnect");
    }
}

/// Command queue that keeps every command it receives
#[derive(Debug, Clone, Default)]
pub struct RecordingQueue {
    timeline: Timeline,
    commands: Arc<Mutex<Vec<InboundCommand>>>,
}

impl RecordingQueue {
    pub fn new(timeline: Timeline) -> Self {
        Self {
            timeline,
            commands: Arc::default(),
        }
    }

    pub fn commands(&self) -> Vec<InboundCommand> {
        lock(&self.commands).clone()
    }
}

impl CommandQueue for RecordingQueue {
    fn enqueue(&mut self, command: InboundCommand) {
        self.timeline.record(format!("dispatch:{}", command.topic));
        lock(&self.commands).push(command);
    }
}

/// Reload action that counts calls and can be told to fail
#[derive(Debug, Clone, Default)]
pub struct CountingReload {
    calls: Arc<AtomicUsize>,
    fail: bool,
    limiter: Option<Arc<ErrorLogLimiter>>,
    lifted_during_call: Arc<AtomicUsize>,
}

impl CountingReload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// Record whether `limiter` was lifted while the action ran
    pub fn observing(mut self, limiter: Arc<ErrorLogLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls that ran with the log limit lifted
    pub fn calls_unlimited(&self) -> usize {
        self.lifted_during_call.load(Ordering::SeqCst)
    }
}

impl ReloadAction for CountingReload {
    fn reload(&mut self) -> Result<(), BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.limiter.as_ref().is_some_and(|l| l.is_unlimited()) {
            self.lifted_during_call.fetch_add(1, Ordering::SeqCst);
        }
        if self.fail {
            return Err("health configuration could not be read".into());
        }
        Ok(())
    }
}
