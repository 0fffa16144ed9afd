//! MQTT-SN packet codec
//!
//! Encodes the packets this client sends and decodes the ones a gateway
//! sends back. Only the single-byte length header form is supported.

use super::types::{Flags, PacketType, ReturnCode, MAX_PACKET_LENGTH, PROTOCOL_ID};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Largest topic name a REGISTER can carry
pub const MAX_TOPIC_NAME_LENGTH: usize = MAX_PACKET_LENGTH - 6;
/// Largest payload a PUBLISH can carry
pub const MAX_PAYLOAD_LENGTH: usize = MAX_PACKET_LENGTH - 7;
/// Largest will topic a WILLTOPIC can carry
pub const MAX_WILL_TOPIC_LENGTH: usize = MAX_PACKET_LENGTH - 3;
/// Largest will payload a WILLMSG can carry
pub const MAX_WILL_PAYLOAD_LENGTH: usize = MAX_PACKET_LENGTH - 2;

#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    #[error("packet length header is not valid")]
    ZeroLength,
    #[error("packet received is longer than this tool can handle")]
    ExtendedLength,
    #[error("read {actual} bytes but packet length is {declared} bytes")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("{packet} packet too short: {length} bytes")]
    Truncated { packet: PacketType, length: usize },
    #[error("{packet} packet would be {length} bytes, limit is {MAX_PACKET_LENGTH}")]
    TooLong { packet: &'static str, length: usize },
    #[error("{field} is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },
}

/// A decoded or to-be-encoded MQTT-SN packet
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Connect {
        flags: Flags,
        duration: u16,
        client_id: String,
    },
    ConnAck {
        return_code: ReturnCode,
    },
    WillTopicReq,
    WillTopic {
        flags: Flags,
        topic: String,
    },
    WillMsgReq,
    WillMsg {
        payload: Bytes,
    },
    Register {
        topic_id: u16,
        msg_id: u16,
        topic_name: String,
    },
    RegAck {
        topic_id: u16,
        msg_id: u16,
        return_code: ReturnCode,
    },
    Publish {
        flags: Flags,
        topic_id: u16,
        msg_id: u16,
        payload: Bytes,
    },
    PubAck {
        topic_id: u16,
        msg_id: u16,
        return_code: ReturnCode,
    },
    PingReq,
    PingResp,
    Disconnect {
        duration: Option<u16>,
    },
    /// Any packet this client does not interpret; `code` is the raw type byte
    Other {
        code: u8,
        body: Bytes,
    },
}

impl Packet {
    /// Message type of this packet, `None` for unassigned type codes
    pub fn packet_type(&self) -> Option<PacketType> {
        let packet_type = match self {
            Packet::Connect { .. } => PacketType::Connect,
            Packet::ConnAck { .. } => PacketType::ConnAck,
            Packet::WillTopicReq => PacketType::WillTopicReq,
            Packet::WillTopic { .. } => PacketType::WillTopic,
            Packet::WillMsgReq => PacketType::WillMsgReq,
            Packet::WillMsg { .. } => PacketType::WillMsg,
            Packet::Register { .. } => PacketType::Register,
            Packet::RegAck { .. } => PacketType::RegAck,
            Packet::Publish { .. } => PacketType::Publish,
            Packet::PubAck { .. } => PacketType::PubAck,
            Packet::PingReq => PacketType::PingReq,
            Packet::PingResp => PacketType::PingResp,
            Packet::Disconnect { .. } => PacketType::Disconnect,
            Packet::Other { code, .. } => return PacketType::from_u8(*code),
        };
        Some(packet_type)
    }

    /// Human-readable type name used in logs and errors
    pub fn type_name(&self) -> &'static str {
        self.packet_type().map(PacketType::name).unwrap_or("UNKNOWN")
    }

    pub fn encode(&self) -> Result<Bytes, CodecError> {
        let mut body = BytesMut::new();
        let code = match self {
            Packet::Connect {
                flags,
                duration,
                client_id,
            } => {
                body.put_u8(flags.bits());
                body.put_u8(PROTOCOL_ID);
                body.put_u16(*duration);
                body.put_slice(client_id.as_bytes());
                PacketType::Connect.as_u8()
            }
            Packet::ConnAck { return_code } => {
                body.put_u8(return_code.as_u8());
                PacketType::ConnAck.as_u8()
            }
            Packet::WillTopicReq => PacketType::WillTopicReq.as_u8(),
            Packet::WillTopic { flags, topic } => {
                body.put_u8(flags.bits());
                body.put_slice(topic.as_bytes());
                PacketType::WillTopic.as_u8()
            }
            Packet::WillMsgReq => PacketType::WillMsgReq.as_u8(),
            Packet::WillMsg { payload } => {
                body.put_slice(payload);
                PacketType::WillMsg.as_u8()
            }
            Packet::Register {
                topic_id,
                msg_id,
                topic_name,
            } => {
                body.put_u16(*topic_id);
                body.put_u16(*msg_id);
                body.put_slice(topic_name.as_bytes());
                PacketType::Register.as_u8()
            }
            Packet::RegAck {
                topic_id,
                msg_id,
                return_code,
            } => {
                body.put_u16(*topic_id);
                body.put_u16(*msg_id);
                body.put_u8(return_code.as_u8());
                PacketType::RegAck.as_u8()
            }
            Packet::Publish {
                flags,
                topic_id,
                msg_id,
                payload,
            } => {
                body.put_u8(flags.bits());
                body.put_u16(*topic_id);
                body.put_u16(*msg_id);
                body.put_slice(payload);
                PacketType::Publish.as_u8()
            }
            Packet::PubAck {
                topic_id,
                msg_id,
                return_code,
            } => {
                body.put_u16(*topic_id);
                body.put_u16(*msg_id);
                body.put_u8(return_code.as_u8());
                PacketType::PubAck.as_u8()
            }
            Packet::PingReq => PacketType::PingReq.as_u8(),
            Packet::PingResp => PacketType::PingResp.as_u8(),
            Packet::Disconnect { duration } => {
                if let Some(duration) = duration {
                    body.put_u16(*duration);
                }
                PacketType::Disconnect.as_u8()
            }
            Packet::Other { code, body: raw } => {
                body.put_slice(raw);
                *code
            }
        };

        let length = body.len() + 2;
        if length > MAX_PACKET_LENGTH {
            return Err(CodecError::TooLong {
                packet: self.type_name(),
                length,
            });
        }

        let mut frame = BytesMut::with_capacity(length);
        frame.put_u8(length as u8);
        frame.put_u8(code);
        frame.put_slice(&body);
        Ok(frame.freeze())
    }

    pub fn decode(datagram: &[u8]) -> Result<Self, CodecError> {
        let declared = match datagram.first() {
            None | Some(0x00) => return Err(CodecError::ZeroLength),
            Some(0x01) => return Err(CodecError::ExtendedLength),
            Some(length) => *length as usize,
        };
        if declared != datagram.len() {
            return Err(CodecError::LengthMismatch {
                declared,
                actual: datagram.len(),
            });
        }

        let code = datagram[1];
        let mut body = Bytes::copy_from_slice(&datagram[2..]);
        let Some(packet_type) = PacketType::from_u8(code) else {
            return Ok(Packet::Other { code, body });
        };

        let need = |min: usize| -> Result<(), CodecError> {
            if datagram.len() < min {
                Err(CodecError::Truncated {
                    packet: packet_type,
                    length: datagram.len(),
                })
            } else {
                Ok(())
            }
        };

        let packet = match packet_type {
            PacketType::Connect => {
                need(6)?;
                let flags = Flags::from_bits(body.get_u8());
                let _protocol_id = body.get_u8();
                let duration = body.get_u16();
                Packet::Connect {
                    flags,
                    duration,
                    client_id: utf8(body, "client id")?,
                }
            }
            PacketType::ConnAck => {
                need(3)?;
                Packet::ConnAck {
                    return_code: ReturnCode::from_u8(body.get_u8()),
                }
            }
            PacketType::WillTopicReq => Packet::WillTopicReq,
            PacketType::WillTopic => {
                need(3)?;
                let flags = Flags::from_bits(body.get_u8());
                Packet::WillTopic {
                    flags,
                    topic: utf8(body, "will topic")?,
                }
            }
            PacketType::WillMsgReq => Packet::WillMsgReq,
            PacketType::WillMsg => Packet::WillMsg { payload: body },
            PacketType::Register => {
                need(6)?;
                let topic_id = body.get_u16();
                let msg_id = body.get_u16();
                Packet::Register {
                    topic_id,
                    msg_id,
                    topic_name: utf8(body, "topic name")?,
                }
            }
            PacketType::RegAck => {
                need(7)?;
                Packet::RegAck {
                    topic_id: body.get_u16(),
                    msg_id: body.get_u16(),
                    return_code: ReturnCode::from_u8(body.get_u8()),
                }
            }
            PacketType::Publish => {
                need(7)?;
                let flags = Flags::from_bits(body.get_u8());
                let topic_id = body.get_u16();
                let msg_id = body.get_u16();
                Packet::Publish {
                    flags,
                    topic_id,
                    msg_id,
                    payload: body,
                }
            }
            PacketType::PubAck => {
                need(7)?;
                Packet::PubAck {
                    topic_id: body.get_u16(),
                    msg_id: body.get_u16(),
                    return_code: ReturnCode::from_u8(body.get_u8()),
                }
            }
            PacketType::PingReq => Packet::PingReq,
            PacketType::PingResp => Packet::PingResp,
            PacketType::Disconnect => Packet::Disconnect {
                duration: (body.remaining() >= 2).then(|| body.get_u16()),
            },
            _ => Packet::Other { code, body },
        };
        Ok(packet)
    }
}

fn utf8(body: Bytes, field: &'static str) -> Result<String, CodecError> {
    String::from_utf8(body.to_vec()).map_err(|_| CodecError::InvalidUtf8 { field })
}

/// Hex dump used by the debug datagram trace
pub fn hex_dump(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}
