//! MQTT-SN protocol definitions
//!
//! - [`types`] - packet type codes, flags, QoS, return codes
//! - [`packets`] - packet codec
//! - [`topics`] - resolved topic ids and short-topic packing

pub mod packets;
pub mod topics;
pub mod types;

pub use packets::{CodecError, Packet};
pub use topics::{short_topic_id, ResolvedTopic};
pub use types::{Flags, PacketType, Qos, ReturnCode, TopicIdKind};
