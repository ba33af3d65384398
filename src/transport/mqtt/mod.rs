//! MQTT v5 transport built on rumqttc
//!
//! - [`options`] - pure option construction and endpoint checks
//! - [`events`] - pure routing of rumqttc events and errors
//! - [`link`] - the impure link handle and its connector

pub mod events;
pub mod link;
pub mod options;

pub use link::{MqttConnector, MqttLink};
