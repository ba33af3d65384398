//! rumqttc-backed link handle
//!
//! `connect` and `reconnect` build a fresh client and spawn its event loop
//! onto the runtime. The loop forwards every event into a channel, so a
//! `poll` timeout only stops waiting and never aborts a handshake in
//! progress. The rumqttc client is internally synchronized, so the link can
//! be moved to any servicing thread.

use super::events::{map_client_error, map_connection_error, route_mqtt_event};
use super::options::configure_mqtt_options;
use crate::config::SessionConfig;
use crate::error::LinkError;
use crate::transport::{Connector, Link, LinkEvent};
use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{AsyncClient, ConnectionError, Event, EventLoop};
use rumqttc::Outgoing;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Capacity of the rumqttc request channel
const REQUEST_CAPACITY: usize = 10;

/// Events buffered between the event-loop task and `poll`
const EVENT_CAPACITY: usize = 32;

/// Upper bound for flushing DISCONNECT during shutdown
const DISCONNECT_FLUSH: Duration = Duration::from_secs(1);

type Polled = Result<Event, ConnectionError>;

/// Connector producing [`MqttLink`]s
#[derive(Debug, Default, Clone)]
pub struct MqttConnector;

impl MqttConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for MqttConnector {
    type Link = MqttLink;

    fn library_version(&self) -> String {
        "rumqttc 0.24 (MQTT v5)".to_string()
    }

    fn init(&self) -> Result<(), LinkError> {
        // The event loop needs a tokio reactor to dial and time out
        tokio::runtime::Handle::try_current()
            .map(|_| ())
            .map_err(|e| LinkError::LibraryUnavailable(e.to_string()))
    }

    fn open(&self, config: &SessionConfig) -> Result<MqttLink, LinkError> {
        let client_id = config.client_id();
        if client_id.is_empty() {
            return Err(LinkError::Protocol("client id must not be empty".to_string()));
        }
        Ok(MqttLink::new(client_id, config.clone()))
    }
}

#[derive(Debug, Clone)]
struct Endpoint {
    host: String,
    port: u16,
    keep_alive: Duration,
}

/// Spawned event loop and the receiving end of its event channel
struct EventLoopTask {
    events: mpsc::Receiver<Polled>,
    task: JoinHandle<()>,
}

impl Drop for EventLoopTask {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Forward event-loop results until the receiver goes away or one fails
async fn drive_event_loop(mut event_loop: EventLoop, events: mpsc::Sender<Polled>) {
    loop {
        let polled = event_loop.poll().await;
        let failed = polled.is_err();
        if events.send(polled).await.is_err() {
            break;
        }
        if failed {
            // rumqttc redials on the next poll; stay idle until reconnect replaces this task
            std::future::pending::<()>().await;
        }
    }
}

/// Link handle over a rumqttc v5 client and its event-loop task
pub struct MqttLink {
    client_id: String,
    config: SessionConfig,
    endpoint: Option<Endpoint>,
    client: Option<AsyncClient>,
    event_loop: Option<EventLoopTask>,
    connected: bool,
}

impl MqttLink {
    fn new(client_id: String, config: SessionConfig) -> Self {
        Self {
            client_id,
            config,
            endpoint: None,
            client: None,
            event_loop: None,
            connected: false,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Replace client and event-loop task with fresh ones for `endpoint`
    fn create_connection(&mut self, endpoint: &Endpoint) -> Result<(), LinkError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| LinkError::LibraryUnavailable(e.to_string()))?;
        let options = configure_mqtt_options(
            &self.client_id,
            &self.config,
            &endpoint.host,
            endpoint.port,
            endpoint.keep_alive,
        )?;

        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);
        let task = runtime.spawn(drive_event_loop(event_loop, events_tx));

        // Dropping the previous task aborts it
        self.event_loop = Some(EventLoopTask {
            events: events_rx,
            task,
        });
        self.client = Some(client);
        self.connected = false;
        Ok(())
    }

    fn client(&self) -> Result<&AsyncClient, LinkError> {
        self.client.as_ref().ok_or(LinkError::NoConnection)
    }
}

#[async_trait]
impl Link for MqttLink {
    fn connect(&mut self, host: &str, port: u16, keep_alive: Duration) -> Result<(), LinkError> {
        let endpoint = Endpoint {
            host: host.to_string(),
            port,
            keep_alive,
        };
        self.create_connection(&endpoint)?;
        self.endpoint = Some(endpoint);
        Ok(())
    }

    async fn poll(&mut self, timeout: Duration) -> Result<Option<LinkEvent>, LinkError> {
        let event_loop = self.event_loop.as_mut().ok_or(LinkError::NoConnection)?;

        match tokio::time::timeout(timeout, event_loop.events.recv()).await {
            Err(_elapsed) => Ok(None),
            Ok(Some(Ok(event))) => {
                let routed = route_mqtt_event(&event);
                if routed == LinkEvent::Connected {
                    self.connected = true;
                }
                Ok(Some(routed))
            }
            Ok(Some(Err(e))) => {
                self.connected = false;
                Err(map_connection_error(e))
            }
            Ok(None) => {
                warn!("MQTT event loop task stopped");
                self.connected = false;
                Err(LinkError::Io("event loop task stopped".to_string()))
            }
        }
    }

    fn reconnect(&mut self) -> Result<(), LinkError> {
        let endpoint = self.endpoint.clone().ok_or(LinkError::NoConnection)?;
        self.create_connection(&endpoint)?;
        debug!(host = %endpoint.host, port = endpoint.port, "Created new connection for reconnect");
        Ok(())
    }

    fn publish(
        &mut self,
        topic: &str,
        payload: Bytes,
        qos: QoS,
        retain: bool,
    ) -> Result<(), LinkError> {
        self.client()?
            .try_publish(topic, qos, retain, payload)
            .map_err(map_client_error)
    }

    fn subscribe(&mut self, filter: &str, qos: QoS) -> Result<(), LinkError> {
        self.client()?
            .try_subscribe(filter, qos)
            .map_err(map_client_error)
    }

    async fn disconnect(&mut self) -> Result<(), LinkError> {
        if !self.connected {
            return Err(LinkError::NoConnection);
        }
        self.client()?.try_disconnect().map_err(map_client_error)?;

        let event_loop = self.event_loop.as_mut().ok_or(LinkError::NoConnection)?;
        let deadline = Instant::now() + DISCONNECT_FLUSH;
        loop {
            match tokio::time::timeout_at(deadline, event_loop.events.recv()).await {
                Ok(Some(Ok(Event::Outgoing(Outgoing::Disconnect)))) => break,
                Ok(Some(Ok(_))) => continue,
                Ok(Some(Err(e))) => {
                    self.event_loop = None;
                    self.connected = false;
                    return Err(map_connection_error(e));
                }
                Ok(None) => break,
                Err(_elapsed) => {
                    info!("DISCONNECT not flushed before deadline");
                    break;
                }
            }
        }

        self.event_loop = None;
        self.connected = false;
        Ok(())
    }
}
