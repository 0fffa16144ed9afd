//! Publish session with an MQTT-SN gateway
//!
//! - [`state`] - pure transition rules
//! - [`retry`] - QoS 1 retry policy and injectable sleep
//! - [`orchestrator`] - drives a [`Transport`](crate::transport::Transport) through the states

pub mod orchestrator;
pub mod retry;
pub mod state;

pub use orchestrator::{Session, SessionReport};
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
pub use state::{SessionEvent, SessionFlow, SessionState, SessionWarning, Transition};

use crate::protocol::{PacketType, ReturnCode};
use crate::transport::TransportError;
use thiserror::Error;

/// Fatal session failures
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("did not get expected {expected} packet (received {})", .received.unwrap_or("nothing"))]
    UnexpectedPacket {
        expected: PacketType,
        received: Option<&'static str>,
    },
    #[error("{packet} error: {code}")]
    Rejected { packet: PacketType, code: ReturnCode },
    #[error("QoS 1 and send not acked after {attempts} tries")]
    PublishNotAcked { attempts: u32 },
    #[error("invalid session transition: {event} in state {state:?}")]
    InvalidTransition {
        state: SessionState,
        event: &'static str,
    },
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}
