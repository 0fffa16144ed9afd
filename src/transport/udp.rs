//! UDP transport to an MQTT-SN gateway
//!
//! One connected datagram socket per session. Every datagram is exactly one
//! packet; receives are bounded by a per-call timeout.

use super::{Transport, TransportError};
use crate::protocol::packets::hex_dump;
use crate::protocol::types::MAX_PACKET_LENGTH;
use crate::protocol::Packet;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{lookup_host, UdpSocket};
use tracing::{debug, warn};

pub struct UdpTransport {
    socket: Option<UdpSocket>,
    peer: SocketAddr,
    receive_timeout: Duration,
}

impl UdpTransport {
    /// Resolve `host:port` and connect a UDP socket to the first address that accepts it
    pub async fn connect(
        host: &str,
        port: u16,
        receive_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let address = format!("{host}:{port}");
        let candidates = lookup_host(address.as_str()).await.map_err(|source| {
            TransportError::AddressResolution {
                address: address.clone(),
                source,
            }
        })?;

        for peer in candidates {
            match Self::connect_to(peer).await {
                Ok(socket) => {
                    debug!(%peer, "UDP socket connected to gateway");
                    return Ok(Self {
                        socket: Some(socket),
                        peer,
                        receive_timeout,
                    });
                }
                Err(e) => debug!(%peer, error = %e, "Gateway address unusable, trying next"),
            }
        }

        Err(TransportError::ConnectFailed { address })
    }

    async fn connect_to(peer: SocketAddr) -> std::io::Result<UdpSocket> {
        let local: SocketAddr = if peer.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(peer).await?;
        Ok(socket)
    }

    fn socket(&self) -> Result<&UdpSocket, TransportError> {
        self.socket.as_ref().ok_or(TransportError::Closed)
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&mut self, packet: &Packet) -> Result<(), TransportError> {
        let frame = packet.encode()?;
        debug!(
            packet = packet.type_name(),
            length = frame.len(),
            bytes = %hex_dump(&frame),
            "Sending packet"
        );

        let sent = self
            .socket()?
            .send(&frame)
            .await
            .map_err(TransportError::Send)?;
        if sent != frame.len() {
            return Err(TransportError::ShortSend {
                sent,
                expected: frame.len(),
            });
        }
        Ok(())
    }

    async fn receive(&mut self) -> Result<Option<Packet>, TransportError> {
        let mut buffer = [0u8; MAX_PACKET_LENGTH + 1];
        debug!("Waiting for packet");

        let received = tokio::time::timeout(self.receive_timeout, self.socket()?.recv(&mut buffer))
            .await;
        let length = match received {
            Err(_) => {
                debug!(timeout = ?self.receive_timeout, "Timed out waiting for packet");
                return Ok(None);
            }
            Ok(result) => result.map_err(TransportError::Receive)?,
        };

        let datagram = &buffer[..length];
        match Packet::decode(datagram) {
            Ok(packet) => {
                debug!(
                    packet = packet.type_name(),
                    length,
                    bytes = %hex_dump(datagram),
                    "Received packet"
                );
                Ok(Some(packet))
            }
            Err(e) => {
                warn!(error = %e, bytes = %hex_dump(datagram), "Dropping invalid datagram");
                Ok(None)
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.socket.take().is_some() {
            debug!(peer = %self.peer, "UDP socket closed");
        }
        Ok(())
    }
}
