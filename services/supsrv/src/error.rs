//! Supervisor error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Domain errors raised inside the supervisor.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Configuration invalid: {0}")]
    ConfigInvalid(String),

    #[error("Session collision: {0}")]
    SessionCollision(String),

    #[error("Version mismatch: peer {peer}, ours {ours}")]
    VersionMismatch { peer: u16, ours: u16 },

    #[error("Unknown session: {0}")]
    UnknownSession(u32),

    #[error("Unknown unit: {0}")]
    UnknownUnit(u8),

    #[error("Device fault: {0}")]
    DeviceFault(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error(transparent)]
    ComLink(#[from] fission_comlink::ComLinkError),

    #[error(transparent)]
    Config(#[from] fission_config::ConfigError),
}

impl SupervisorError {
    pub fn invalid_command(msg: impl Into<String>) -> Self {
        SupervisorError::InvalidCommand(msg.into())
    }
}
