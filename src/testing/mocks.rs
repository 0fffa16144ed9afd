//! Mock implementations for testing
//!
//! A scripted [`Transport`] that records every packet it is asked to send,
//! and a [`Sleeper`] that records waits instead of waiting.

use crate::protocol::Packet;
use crate::session::Sleeper;
use crate::transport::{Transport, TransportError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Mock transport replaying a fixed script of gateway replies
///
/// Each `receive` pops the next scripted entry; `None` entries (and an
/// exhausted script) read as a receive timeout.
#[derive(Debug, Default)]
pub struct MockTransport {
    script: VecDeque<Option<Packet>>,
    pub sent_packets: Arc<Mutex<Vec<Packet>>>,
    pub close_count: Arc<Mutex<u32>>,
    pub should_fail: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every send fails as if the socket were gone
    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    /// Queue a packet the gateway answers with
    pub fn reply(mut self, packet: Packet) -> Self {
        self.script.push_back(Some(packet));
        self
    }

    /// Queue one receive that times out
    pub fn silence(mut self) -> Self {
        self.script.push_back(None);
        self
    }

    pub fn silences(mut self, count: usize) -> Self {
        self.script.extend(std::iter::repeat(None).take(count));
        self
    }

    pub fn sent_handle(&self) -> Arc<Mutex<Vec<Packet>>> {
        Arc::clone(&self.sent_packets)
    }

    pub fn closed_handle(&self) -> Arc<Mutex<u32>> {
        Arc::clone(&self.close_count)
    }

    pub async fn get_sent_packets(&self) -> Vec<Packet> {
        self.sent_packets.lock().await.clone()
    }

    pub fn remaining_replies(&self) -> usize {
        self.script.len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, packet: &Packet) -> Result<(), TransportError> {
        if self.should_fail {
            return Err(TransportError::Send(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "Mock send failure",
            )));
        }
        // Encoding catches packets the real transport would refuse
        packet.encode()?;
        self.sent_packets.lock().await.push(packet.clone());
        Ok(())
    }

    async fn receive(&mut self) -> Result<Option<Packet>, TransportError> {
        Ok(self.script.pop_front().flatten())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        *self.close_count.lock().await += 1;
        Ok(())
    }
}

/// Sleeper that only records the requested durations
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    pub slept: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slept_handle(&self) -> Arc<Mutex<Vec<Duration>>> {
        Arc::clone(&self.slept)
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().await.push(duration);
    }
}
