//! Top-level error type and the process exit status it maps to

use crate::config::ConfigError;
use crate::session::SessionError;
use crate::transport::TransportError;
use thiserror::Error;

/// Exit status for invalid command-line or config file input
pub const EXIT_CONFIG: i32 = 2;

/// Exit status for every other fatal error
pub const EXIT_FAILURE: i32 = 1;

/// Main error type for a publishing run
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Session(#[from] SessionError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl ClientError {
    /// Process exit status; a gateway rejection exits with the gateway's return code
    pub fn exit_code(&self) -> i32 {
        match self {
            ClientError::Config(_) => EXIT_CONFIG,
            ClientError::Session(SessionError::Rejected { code, .. }) if !code.is_accepted() => {
                i32::from(code.as_u8())
            }
            ClientError::Session(_) | ClientError::Transport(_) => EXIT_FAILURE,
        }
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
