//! Observability: structured logging to stderr

pub mod logging;

pub use logging::{effective_level, init_default_logging, init_logging, parse_level, LogFormat};

// Span macros for structured logging
pub use logging::session_span;
