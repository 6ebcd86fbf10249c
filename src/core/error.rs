use std::io;
use thiserror::Error;

use crate::protocol::MessageType;

/// Custom error types for the drone link
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serial error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("Payload too large: {len} bytes, maximum is {max}")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Undefined subtype {code} for message type {message_type:?}")]
    UndefinedSubtype { message_type: MessageType, code: u8 },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new invalid payload error
    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Error::InvalidPayload(msg.into())
    }

    /// Creates a new protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    /// Creates a new store error
    pub fn store(msg: impl Into<String>) -> Self {
        Error::Store(msg.into())
    }

    /// Creates a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Creates a new invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::protocol("test error");
        assert!(matches!(err, Error::Protocol(_)));
        assert_eq!(err.to_string(), "Protocol error: test error");
    }

    #[test]
    fn test_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::Other, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_payload_too_large_display() {
        let err = Error::PayloadTooLarge { len: 16, max: 15 };
        assert_eq!(err.to_string(), "Payload too large: 16 bytes, maximum is 15");
    }

    #[test]
    fn test_undefined_subtype_display() {
        let err = Error::UndefinedSubtype {
            message_type: MessageType::Waypoint,
            code: 3,
        };
        assert_eq!(
            err.to_string(),
            "Undefined subtype 3 for message type Waypoint"
        );
    }
}
