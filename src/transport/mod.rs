//! Transport layer for gateway communication
//!
//! The session orchestrator only talks to a gateway through the
//! [`Transport`] trait, so the whole control flow can be driven by a scripted
//! transport in tests. [`udp::UdpTransport`] is the real implementation.

use crate::protocol::types::MAX_CLIENT_ID_LENGTH;
use crate::protocol::{CodecError, Packet};
use thiserror::Error;

pub mod udp;

pub use udp::UdpTransport;

/// Transport-level failures. A receive timeout is not an error; it is `Ok(None)`.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("could not resolve gateway address {address}")]
    AddressResolution {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not connect to remote host {address}")]
    ConnectFailed { address: String },
    #[error("failed to encode packet: {0}")]
    Encode(#[from] CodecError),
    #[error("send failed")]
    Send(#[source] std::io::Error),
    #[error("only sent {sent} of {expected} bytes")]
    ShortSend { sent: usize, expected: usize },
    #[error("receive failed")]
    Receive(#[source] std::io::Error),
    #[error("transport is closed")]
    Closed,
}

/// Packet-level connection to one gateway
#[async_trait::async_trait]
pub trait Transport: Send {
    /// Encode and send one packet
    async fn send(&mut self, packet: &Packet) -> Result<(), TransportError>;

    /// Wait for the next packet. `Ok(None)` when the receive timeout elapses
    /// or the datagram was not a valid packet.
    async fn receive(&mut self) -> Result<Option<Packet>, TransportError>;

    /// Release the connection. Further sends and receives fail with [`TransportError::Closed`].
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Client id used when none is configured, cut to the protocol limit
pub fn default_client_id(prefix: &str) -> String {
    format!("{prefix}-{}", std::process::id())
        .chars()
        .take(MAX_CLIENT_ID_LENGTH)
        .collect()
}
