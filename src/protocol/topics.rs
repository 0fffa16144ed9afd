//! Topic identifiers
//!
//! A PUBLISH never carries a topic name, only a 16-bit id plus the kind of
//! id it is. This module holds the resolved form and the short-name packing.

use super::types::TopicIdKind;
use std::fmt;

/// Length a topic name must have to be sent as a short topic
pub const SHORT_TOPIC_LENGTH: usize = 2;

/// Topic id a PUBLISH will be sent to, produced by topic resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTopic {
    pub id: u16,
    pub kind: TopicIdKind,
}

impl ResolvedTopic {
    pub fn predefined(id: u16) -> Self {
        Self {
            id,
            kind: TopicIdKind::Predefined,
        }
    }

    pub fn registered(id: u16) -> Self {
        Self {
            id,
            kind: TopicIdKind::Normal,
        }
    }

    /// Resolve a two-character name without a gateway round-trip
    pub fn short(name: &str) -> Option<Self> {
        short_topic_id(name).map(|id| Self {
            id,
            kind: TopicIdKind::Short,
        })
    }
}

impl fmt::Display for ResolvedTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x} ({})", self.id, self.kind)
    }
}

/// Whether `name` can be published as a short topic
pub fn is_short_topic(name: &str) -> bool {
    name.len() == SHORT_TOPIC_LENGTH
}

/// Pack a two-byte topic name into an id: first byte high, second byte low
pub fn short_topic_id(name: &str) -> Option<u16> {
    match name.as_bytes() {
        [high, low] => Some(u16::from_be_bytes([*high, *low])),
        _ => None,
    }
}
