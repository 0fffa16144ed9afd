//! MQTT-SN wire vocabulary
//!
//! Packet type codes, flag bits, QoS levels, return codes and topic id kinds
//! as they appear on the wire.

use std::fmt;

/// Protocol identifier carried in every CONNECT
pub const PROTOCOL_ID: u8 = 0x01;

/// Largest packet this client sends or accepts (single-byte length header)
pub const MAX_PACKET_LENGTH: usize = 255;

/// Longest client identifier allowed by the protocol
pub const MAX_CLIENT_ID_LENGTH: usize = 23;

/// MQTT-SN message types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Advertise = 0x00,
    SearchGw = 0x01,
    GwInfo = 0x02,
    Connect = 0x04,
    ConnAck = 0x05,
    WillTopicReq = 0x06,
    WillTopic = 0x07,
    WillMsgReq = 0x08,
    WillMsg = 0x09,
    Register = 0x0A,
    RegAck = 0x0B,
    Publish = 0x0C,
    PubAck = 0x0D,
    PubComp = 0x0E,
    PubRec = 0x0F,
    PubRel = 0x10,
    Subscribe = 0x12,
    SubAck = 0x13,
    Unsubscribe = 0x14,
    UnsubAck = 0x15,
    PingReq = 0x16,
    PingResp = 0x17,
    Disconnect = 0x18,
    WillTopicUpd = 0x1A,
    WillTopicResp = 0x1B,
    WillMsgUpd = 0x1C,
    WillMsgResp = 0x1D,
}

impl PacketType {
    pub fn from_u8(value: u8) -> Option<Self> {
        let packet_type = match value {
            0x00 => Self::Advertise,
            0x01 => Self::SearchGw,
            0x02 => Self::GwInfo,
            0x04 => Self::Connect,
            0x05 => Self::ConnAck,
            0x06 => Self::WillTopicReq,
            0x07 => Self::WillTopic,
            0x08 => Self::WillMsgReq,
            0x09 => Self::WillMsg,
            0x0A => Self::Register,
            0x0B => Self::RegAck,
            0x0C => Self::Publish,
            0x0D => Self::PubAck,
            0x0E => Self::PubComp,
            0x0F => Self::PubRec,
            0x10 => Self::PubRel,
            0x12 => Self::Subscribe,
            0x13 => Self::SubAck,
            0x14 => Self::Unsubscribe,
            0x15 => Self::UnsubAck,
            0x16 => Self::PingReq,
            0x17 => Self::PingResp,
            0x18 => Self::Disconnect,
            0x1A => Self::WillTopicUpd,
            0x1B => Self::WillTopicResp,
            0x1C => Self::WillMsgUpd,
            0x1D => Self::WillMsgResp,
            _ => return None,
        };
        Some(packet_type)
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Advertise => "ADVERTISE",
            Self::SearchGw => "SEARCHGW",
            Self::GwInfo => "GWINFO",
            Self::Connect => "CONNECT",
            Self::ConnAck => "CONNACK",
            Self::WillTopicReq => "WILLTOPICREQ",
            Self::WillTopic => "WILLTOPIC",
            Self::WillMsgReq => "WILLMSGREQ",
            Self::WillMsg => "WILLMSG",
            Self::Register => "REGISTER",
            Self::RegAck => "REGACK",
            Self::Publish => "PUBLISH",
            Self::PubAck => "PUBACK",
            Self::PubComp => "PUBCOMP",
            Self::PubRec => "PUBREC",
            Self::PubRel => "PUBREL",
            Self::Subscribe => "SUBSCRIBE",
            Self::SubAck => "SUBACK",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::UnsubAck => "UNSUBACK",
            Self::PingReq => "PINGREQ",
            Self::PingResp => "PINGRESP",
            Self::Disconnect => "DISCONNECT",
            Self::WillTopicUpd => "WILLTOPICUPD",
            Self::WillTopicResp => "WILLTOPICRESP",
            Self::WillMsgUpd => "WILLMSGUPD",
            Self::WillMsgResp => "WILLMSGRESP",
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Flags byte shared by CONNECT, WILLTOPIC and PUBLISH
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(u8);

impl Flags {
    pub const DUP: u8 = 0x80;
    pub const QOS_MASK: u8 = 0x60;
    pub const RETAIN: u8 = 0x10;
    pub const WILL: u8 = 0x08;
    pub const CLEAN_SESSION: u8 = 0x04;
    pub const TOPIC_ID_TYPE_MASK: u8 = 0x03;

    pub fn empty() -> Self {
        Self(0)
    }

    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn clean_session(self) -> Self {
        Self(self.0 | Self::CLEAN_SESSION)
    }

    pub fn will(self) -> Self {
        Self(self.0 | Self::WILL)
    }

    pub fn retain(self, retain: bool) -> Self {
        if retain {
            Self(self.0 | Self::RETAIN)
        } else {
            Self(self.0 & !Self::RETAIN)
        }
    }

    pub fn qos(self, qos: Qos) -> Self {
        Self((self.0 & !Self::QOS_MASK) | qos.flag_bits())
    }

    pub fn topic_id_kind(self, kind: TopicIdKind) -> Self {
        Self((self.0 & !Self::TOPIC_ID_TYPE_MASK) | kind.flag_bits())
    }

    pub fn contains(self, bit: u8) -> bool {
        self.0 & bit == bit
    }

    pub fn qos_level(self) -> Qos {
        Qos::from_flag_bits(self.0)
    }

    pub fn topic_kind(self) -> Option<TopicIdKind> {
        TopicIdKind::from_flag_bits(self.0)
    }
}

/// Publish quality of service supported by this client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Qos {
    /// QoS -1: no session, predefined or short topics only
    FireAndForget,
    /// QoS 0: at most once
    AtMostOnce,
    /// QoS 1: at least once, acknowledged with PUBACK
    AtLeastOnce,
}

impl Qos {
    pub fn from_level(level: i8) -> Option<Self> {
        match level {
            -1 => Some(Self::FireAndForget),
            0 => Some(Self::AtMostOnce),
            1 => Some(Self::AtLeastOnce),
            _ => None,
        }
    }

    pub fn level(self) -> i8 {
        match self {
            Self::FireAndForget => -1,
            Self::AtMostOnce => 0,
            Self::AtLeastOnce => 1,
        }
    }

    /// Whether this level runs a CONNECT/DISCONNECT session with the gateway
    pub fn needs_session(self) -> bool {
        !matches!(self, Self::FireAndForget)
    }

    pub fn expects_ack(self) -> bool {
        matches!(self, Self::AtLeastOnce)
    }

    fn flag_bits(self) -> u8 {
        match self {
            Self::AtMostOnce => 0x00,
            Self::AtLeastOnce => 0x20,
            Self::FireAndForget => 0x60,
        }
    }

    // 0x40 (QoS 2) is never produced by this client and decodes as at-most-once.
    fn from_flag_bits(bits: u8) -> Self {
        match bits & Flags::QOS_MASK {
            0x20 => Self::AtLeastOnce,
            0x60 => Self::FireAndForget,
            _ => Self::AtMostOnce,
        }
    }
}

impl fmt::Display for Qos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.level())
    }
}

/// How the 16-bit topic id in a PUBLISH is to be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicIdKind {
    /// Id assigned by the gateway in a REGACK
    Normal,
    /// Id agreed with the gateway out of band
    Predefined,
    /// Two-character topic name packed into the id
    Short,
}

impl TopicIdKind {
    fn flag_bits(self) -> u8 {
        match self {
            Self::Normal => 0x00,
            Self::Predefined => 0x01,
            Self::Short => 0x02,
        }
    }

    fn from_flag_bits(bits: u8) -> Option<Self> {
        match bits & Flags::TOPIC_ID_TYPE_MASK {
            0x00 => Some(Self::Normal),
            0x01 => Some(Self::Predefined),
            0x02 => Some(Self::Short),
            _ => None,
        }
    }
}

impl fmt::Display for TopicIdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Normal => "normal",
            Self::Predefined => "predefined",
            Self::Short => "short",
        };
        f.write_str(name)
    }
}

/// Return code carried by CONNACK, REGACK and PUBACK
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnCode {
    Accepted,
    Congestion,
    InvalidTopicId,
    NotSupported,
    Unknown(u8),
}

impl ReturnCode {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => Self::Accepted,
            0x01 => Self::Congestion,
            0x02 => Self::InvalidTopicId,
            0x03 => Self::NotSupported,
            other => Self::Unknown(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Accepted => 0x00,
            Self::Congestion => 0x01,
            Self::InvalidTopicId => 0x02,
            Self::NotSupported => 0x03,
            Self::Unknown(code) => code,
        }
    }

    pub fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted)
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Accepted => "Accepted",
            Self::Congestion => "Rejected: congestion",
            Self::InvalidTopicId => "Rejected: invalid topic ID",
            Self::NotSupported => "Rejected: not supported",
            Self::Unknown(_) => "Rejected: unknown reason",
        };
        f.write_str(text)
    }
}
