//! Client configuration
//!
//! Two layers feed a session:
//!
//! - [`ClientConfig`] - optional TOML defaults (gateway address, timeouts,
//!   retry policy, client id prefix)
//! - [`PublishOptions`] - what the user asked for on the command line
//!
//! [`SessionConfig::resolve`] validates the combination and produces the
//! immutable configuration the session runs with. Nothing here touches the
//! network.

use crate::protocol::packets::{
    MAX_PAYLOAD_LENGTH, MAX_TOPIC_NAME_LENGTH, MAX_WILL_PAYLOAD_LENGTH, MAX_WILL_TOPIC_LENGTH,
};
use crate::protocol::topics::is_short_topic;
use crate::protocol::types::{Qos, MAX_CLIENT_ID_LENGTH};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// File looked up in the working directory when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "mqtt-sn-pub.toml";

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("a message payload must be given with -m or -n")]
    MissingPayload,
    #[error("a topic must be given with -t or -T")]
    MissingTopic,
    #[error("please provide either a topic id or a topic name, not both")]
    ConflictingTopic,
    #[error("only QoS level 1, 0 or -1 is supported, got {0}")]
    UnsupportedQos(i8),
    #[error("either a pre-defined topic id or a short topic name must be given for QoS -1")]
    TopicNeedsRegistration,
    #[error("topic id 0x{0:04x} is reserved")]
    ReservedTopicId(u16),
    #[error("QoS 1 requires both a will topic (-w) and a will message (-W)")]
    MissingWill,
    #[error("a will topic and message are only sent at QoS 1")]
    UnexpectedWill,
    #[error("{field} is too long: {length} bytes, limit is {limit}")]
    TooLong {
        field: &'static str,
        length: usize,
        limit: usize,
    },
}

/// Defaults file, every section optional
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ClientConfig {
    #[serde(default)]
    pub gateway: GatewaySection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub retry: RetrySection,
}

/// Gateway address and receive behaviour
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewaySection {
    pub host: String,
    pub port: u16,
    /// Seconds a single receive waits before reporting "no packet"
    pub receive_timeout_secs: u64,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1883,
            receive_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionSection {
    pub keep_alive_secs: u16,
    /// Generated client ids are `<prefix>-<pid>`
    pub client_id_prefix: String,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            keep_alive_secs: 1,
            client_id_prefix: "mqtt-sn-pub".to_string(),
        }
    }
}

/// QoS 1 publish retry policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrySection {
    /// Resends after the first attempt
    pub max_retries: u32,
    pub interval_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: 10,
            interval_ms: 1000,
        }
    }
}

impl ClientConfig {
    /// Load the defaults file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else [`DEFAULT_CONFIG_FILE`] if it exists, else built-in defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::load_from_file(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway.host.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "gateway.host must not be empty".to_string(),
            ));
        }
        if self.gateway.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "gateway.port must be non-zero".to_string(),
            ));
        }
        if self.gateway.receive_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "gateway.receive_timeout_secs must be non-zero".to_string(),
            ));
        }
        if self.session.client_id_prefix.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "session.client_id_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway.receive_timeout_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry.interval_ms)
    }
}

/// Raw publish request as given on the command line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishOptions {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub client_id: Option<String>,
    /// `Some("")` is an explicit zero-length message
    pub message: Option<String>,
    pub qos: i8,
    pub retain: bool,
    pub topic_name: Option<String>,
    pub topic_id: Option<u16>,
    pub will_topic: Option<String>,
    pub will_message: Option<String>,
}

/// Topic as configured, before resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicSpec {
    /// A name; two-character names are sent as short topics
    Named(String),
    Predefined(u16),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WillConfig {
    pub topic: String,
    pub payload: Bytes,
}

/// Immutable configuration for one publish session
///
/// Only [`SessionConfig::resolve`] builds one, so a QoS 1 configuration
/// always carries a will.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    host: String,
    port: u16,
    client_id: Option<String>,
    topic: TopicSpec,
    payload: Bytes,
    qos: Qos,
    retain: bool,
    will: Option<WillConfig>,
    keep_alive_secs: u16,
}

impl SessionConfig {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `None` lets the transport layer generate one
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    pub fn topic(&self) -> &TopicSpec {
        &self.topic
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn qos(&self) -> Qos {
        self.qos
    }

    pub fn retain(&self) -> bool {
        self.retain
    }

    /// Present exactly when the QoS is 1
    pub fn will(&self) -> Option<&WillConfig> {
        self.will.as_ref()
    }

    pub fn keep_alive_secs(&self) -> u16 {
        self.keep_alive_secs
    }

    /// Validate user input against the defaults and build the session configuration
    pub fn resolve(options: PublishOptions, defaults: &ClientConfig) -> Result<Self, ConfigError> {
        let payload = options.message.ok_or(ConfigError::MissingPayload)?;
        check_length("message", payload.len(), MAX_PAYLOAD_LENGTH)?;

        let qos = Qos::from_level(options.qos).ok_or(ConfigError::UnsupportedQos(options.qos))?;

        let topic = match (options.topic_name, options.topic_id) {
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingTopic),
            (None, None) => return Err(ConfigError::MissingTopic),
            (Some(name), None) => {
                if name.is_empty() {
                    return Err(ConfigError::MissingTopic);
                }
                check_length("topic name", name.len(), MAX_TOPIC_NAME_LENGTH)?;
                TopicSpec::Named(name)
            }
            (None, Some(id)) => {
                if id == 0x0000 || id == 0xFFFF {
                    return Err(ConfigError::ReservedTopicId(id));
                }
                TopicSpec::Predefined(id)
            }
        };

        if qos == Qos::FireAndForget {
            if let TopicSpec::Named(name) = &topic {
                if !is_short_topic(name) {
                    return Err(ConfigError::TopicNeedsRegistration);
                }
            }
        }

        let will = match (options.will_topic, options.will_message) {
            (Some(topic), Some(message)) if qos == Qos::AtLeastOnce => {
                check_length("will topic", topic.len(), MAX_WILL_TOPIC_LENGTH)?;
                check_length("will message", message.len(), MAX_WILL_PAYLOAD_LENGTH)?;
                Some(WillConfig {
                    topic,
                    payload: Bytes::from(message),
                })
            }
            (None, None) if qos != Qos::AtLeastOnce => None,
            _ if qos == Qos::AtLeastOnce => return Err(ConfigError::MissingWill),
            _ => return Err(ConfigError::UnexpectedWill),
        };

        let client_id = options.client_id.filter(|id| !id.is_empty());
        if let Some(id) = &client_id {
            check_length("client id", id.len(), MAX_CLIENT_ID_LENGTH)?;
        }

        let port = options.port.unwrap_or(defaults.gateway.port);
        if port == 0 {
            return Err(ConfigError::InvalidConfig(
                "port must be non-zero".to_string(),
            ));
        }

        Ok(Self {
            host: options.host.unwrap_or_else(|| defaults.gateway.host.clone()),
            port,
            client_id,
            topic,
            payload: Bytes::from(payload),
            qos,
            retain: options.retain,
            will,
            keep_alive_secs: defaults.session.keep_alive_secs,
        })
    }
}

fn check_length(field: &'static str, length: usize, limit: usize) -> Result<(), ConfigError> {
    if length > limit {
        return Err(ConfigError::TooLong {
            field,
            length,
            limit,
        });
    }
    Ok(())
}
