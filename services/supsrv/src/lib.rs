//! FissionSCADA Supervisor
//!
//! The central authority of the facility SCADA system: owns sessions to
//! every reactor PLC, RTU gateway, coordinator and pocket console; runs
//! facility-wide automatic process control, the auto-SCRAM safety
//! supervisor, the facility tank topology solver and alarm tone mixing.
//!
//! # Architecture
//!
//! ```text
//! transport -> frame layer -> session registry -> session state
//!                                   |
//!                             supervisor core  <- 2 Hz tick
//!                                   |
//!                           facility (single owner)
//!                                   |
//!                  command frames / status push -> transport
//! ```

pub mod comms;
pub mod error;
pub mod facility;
pub mod i18n;
pub mod modbus_server;
pub mod scheduler;
pub mod session;
pub mod supervisor;

pub use error::{Result, SupervisorError};
pub use supervisor::{OutboundFrame, PeripheralEvent, SupervisorCore};

/// Supervisor release version (shown on the front panel).
pub const SUPERVISOR_VERSION: &str = env!("CARGO_PKG_VERSION");
