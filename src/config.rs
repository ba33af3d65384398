//! Session configuration
//!
//! Loaded from a TOML file or built in code. The configuration is immutable
//! once a session has been initialized from it.

use rumqttc::v5::mqttbytes::QoS;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Maximum number of unacknowledged outbound messages per session
pub const MAX_INFLIGHT: u16 = 1;

/// Complete session configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    pub broker: BrokerSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub commands: CommandsSection,
}

/// Broker endpoint and credentials
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    /// Broker host name or address
    pub host: String,
    /// Broker port
    pub port: u16,
    /// Use TLS (rustls with native roots)
    #[serde(default)]
    pub tls: bool,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
    /// Fixed client identifier; a random one is generated when absent
    pub client_id: Option<String>,
}

/// Keep-alive, reconnect and delivery settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionSection {
    pub keep_alive_secs: u64,
    pub reconnect_delay_min_secs: u64,
    pub reconnect_delay_max_secs: u64,
    pub reconnect_exponential: bool,
    /// Delivery-assurance level (0, 1 or 2)
    pub qos: u8,
    /// Timeout handed to each service call by the driving loop
    pub service_timeout_ms: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            keep_alive_secs: 60,
            reconnect_delay_min_secs: 10,
            reconnect_delay_max_secs: 120,
            reconnect_exponential: true,
            qos: 1,
            service_timeout_ms: 1000,
        }
    }
}

/// Topics the host application subscribes to once connected
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CommandsSection {
    #[serde(default)]
    pub topics: Vec<String>,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SessionConfig {
    /// Configuration for `host:port` with default session settings
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            broker: BrokerSection {
                host: host.into(),
                port,
                tls: false,
                username_env: None,
                password_env: None,
                client_id: None,
            },
            session: SessionSection::default(),
            commands: CommandsSection::default(),
        }
    }

    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges; endpoint syntax is left to the transport
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.keep_alive_secs < 5 {
            return Err(ConfigError::InvalidConfig(format!(
                "keep_alive_secs must be at least 5, got {}",
                self.session.keep_alive_secs
            )));
        }

        if self.session.reconnect_delay_min_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "reconnect_delay_min_secs must be greater than 0".to_string(),
            ));
        }

        if self.session.reconnect_delay_max_secs < self.session.reconnect_delay_min_secs {
            return Err(ConfigError::InvalidConfig(format!(
                "reconnect_delay_max_secs ({}) is below reconnect_delay_min_secs ({})",
                self.session.reconnect_delay_max_secs, self.session.reconnect_delay_min_secs
            )));
        }

        self.qos()?;

        if self.session.service_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "service_timeout_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Delivery-assurance level as a transport QoS
    pub fn qos(&self) -> Result<QoS, ConfigError> {
        match self.session.qos {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(ConfigError::InvalidConfig(format!(
                "qos must be 0, 1 or 2, got {other}"
            ))),
        }
    }

    pub fn max_inflight(&self) -> u16 {
        MAX_INFLIGHT
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.session.keep_alive_secs)
    }

    pub fn service_timeout(&self) -> Duration {
        Duration::from_millis(self.session.service_timeout_ms)
    }

    /// Client identifier, generated once per call when not configured
    pub fn client_id(&self) -> String {
        match &self.broker.client_id {
            Some(id) => id.clone(),
            None => format!("brokerlink-{}", uuid::Uuid::new_v4().simple()),
        }
    }

    /// Broker username from the configured environment variable
    pub fn username(&self) -> Option<String> {
        Self::get_env_var_optional(self.broker.username_env.as_ref())
    }

    /// Broker password from the configured environment variable
    pub fn password(&self) -> Option<String> {
        Self::get_env_var_optional(self.broker.password_env.as_ref())
    }

    fn get_env_var_optional(env_var_name: Option<&String>) -> Option<String> {
        env_var_name.and_then(|name| std::env::var(name).ok())
    }
}
