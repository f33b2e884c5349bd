//! Communication Link Error Types
//!
//! Core error types shared by the frame layer, the protocol codecs and the
//! datagram transport.

use thiserror::Error;

/// Result type for fission-comlink operations
pub type Result<T> = std::result::Result<T, ComLinkError>;

/// Communication link errors
#[derive(Debug, Error, Clone)]
pub enum ComLinkError {
    /// Malformed frame or payload
    #[error("Decode error: {0}")]
    Decode(String),

    /// HMAC mismatch, missing MAC, or stale timestamp
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Sequence number regressed beyond the replay window
    #[error("Replay: seq {got} behind window (last {last})")]
    Replay { got: u32, last: u32 },

    /// Valid frame, but the content violates the protocol
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// Unknown protocol tag on the wire
    #[error("Unknown protocol tag: {0}")]
    UnknownProtocol(u8),

    /// Transport-level failures
    #[error("Transport error: {0}")]
    Transport(String),

    /// Channel is not open on this transport
    #[error("Channel not open: {0}")]
    ChannelNotOpen(u16),

    /// Modbus specific errors
    #[error("Modbus error: {0}")]
    Modbus(String),
}

impl From<serde_json::Error> for ComLinkError {
    fn from(err: serde_json::Error) -> Self {
        ComLinkError::Decode(format!("JSON error: {}", err))
    }
}

// Helper methods for creating errors
impl ComLinkError {
    pub fn decode(msg: impl Into<String>) -> Self {
        ComLinkError::Decode(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        ComLinkError::Auth(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        ComLinkError::Protocol(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        ComLinkError::Transport(msg.into())
    }

    pub fn modbus(msg: impl Into<String>) -> Self {
        ComLinkError::Modbus(msg.into())
    }

    /// Errors that only warrant a dropped datagram, never a session teardown
    pub fn is_droppable(&self) -> bool {
        matches!(
            self,
            ComLinkError::Decode(_)
                | ComLinkError::Auth(_)
                | ComLinkError::Replay { .. }
                | ComLinkError::UnknownProtocol(_)
        )
    }
}
