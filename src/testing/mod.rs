//! Testing utilities and mock implementations
//!
//! Lets sessions run against a scripted gateway without opening a socket.

pub mod mocks;

pub use mocks::*;
