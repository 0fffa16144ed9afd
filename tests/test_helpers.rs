//! Test helpers and utilities for integration tests

use mqtt_sn_pub::config::{ClientConfig, PublishOptions, SessionConfig, TopicSpec};
use mqtt_sn_pub::protocol::{Packet, Qos, ReturnCode};

/// Command-line style options; QoS 1 gets the mandatory will attached
#[allow(dead_code)]
pub fn publish_options(topic: TopicSpec, qos: Qos) -> PublishOptions {
    let (topic_name, topic_id) = match topic {
        TopicSpec::Named(name) => (Some(name), None),
        TopicSpec::Predefined(id) => (None, Some(id)),
    };
    let with_will = qos == Qos::AtLeastOnce;
    PublishOptions {
        client_id: Some("integration".to_string()),
        message: Some("payload".to_string()),
        qos: qos.level(),
        topic_name,
        topic_id,
        will_topic: with_will.then(|| "clients/integration".to_string()),
        will_message: with_will.then(|| "offline".to_string()),
        ..Default::default()
    }
}

/// Session configuration pointing at a gateway that is never dialled
#[allow(dead_code)]
pub fn session_config(topic: TopicSpec, qos: Qos) -> SessionConfig {
    SessionConfig::resolve(publish_options(topic, qos), &ClientConfig::default()).unwrap()
}

#[allow(dead_code)]
pub fn qos1_config(topic: TopicSpec) -> SessionConfig {
    session_config(topic, Qos::AtLeastOnce)
}

#[allow(dead_code)]
pub fn connack() -> Packet {
    Packet::ConnAck {
        return_code: ReturnCode::Accepted,
    }
}

#[allow(dead_code)]
pub fn puback(topic_id: u16, msg_id: u16) -> Packet {
    Packet::PubAck {
        topic_id,
        msg_id,
        return_code: ReturnCode::Accepted,
    }
}

#[allow(dead_code)]
pub fn disconnect() -> Packet {
    Packet::Disconnect { duration: None }
}

/// Short names of the packets a transport was asked to send
#[allow(dead_code)]
pub fn packet_names(packets: &[Packet]) -> Vec<&'static str> {
    packets.iter().map(Packet::type_name).collect()
}
