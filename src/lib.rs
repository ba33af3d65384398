//! brokerlink - managed MQTT client session
//!
//! One outbound link to a broker, kept alive across failures. The host
//! application creates a [`Session`], drives it by calling
//! [`Session::service`] in a loop and tears it down with
//! [`Session::shutdown`].
//!
//! # Quick Start
//!
//! ```no_run
//! use brokerlink::session::dispatcher::Dispatcher;
//! use brokerlink::transport::mqtt::MqttConnector;
//! use brokerlink::{BoxError, Session, SessionConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SessionConfig::new("localhost", 1883);
//! let (commands, _rx) = tokio::sync::mpsc::unbounded_channel();
//! let dispatcher = Dispatcher::new(commands, || -> Result<(), BoxError> { Ok(()) });
//!
//! let mut session = Session::initialize(&config, &MqttConnector::new(), (), dispatcher)?;
//! for _ in 0..10 {
//!     let _ = session.service(config.service_timeout()).await;
//! }
//! session.publish("agents/1/status", "online")?;
//! session.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod observability;
pub mod session;
pub mod testing;
pub mod transport;

pub use config::{ConfigError, SessionConfig, MAX_INFLIGHT};
pub use error::{
    BoxError, DispatchError, InitError, LinkError, PublishError, ServiceError, SubscribeError,
};
pub use session::handle::LinkHandle;
pub use session::state::ConnectionState;
pub use session::{Session, SessionHandler};
pub use transport::{Connector, Link, LinkEvent};
