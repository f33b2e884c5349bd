//! FissionSCADA Supervisor Configuration
//!
//! Typed settings for the supervisor with layered loading
//! (defaults < environment < YAML), validators gating startup, and a
//! 1:1 import from the legacy flat key/value settings blob.

pub mod legacy;
pub mod loader;
pub mod validation;

use serde::{Deserialize, Serialize};

pub use loader::{ConfigError, ConfigLoader};
pub use validation::{ValidationLevel, ValidationResult};

/// Default listen/reply channels.
pub mod channels {
    /// Supervisor device listen channel
    pub const SVR: u16 = 16240;
    /// Reactor PLC reply channel
    pub const PLC: u16 = 16241;
    /// RTU gateway reply channel
    pub const RTU: u16 = 16242;
    /// Coordinator channel (supervisor coord listen)
    pub const CRD: u16 = 16243;
    /// Pocket console reply channel
    pub const PKT: u16 = 16244;
}

/// Default session watchdog timeouts, seconds.
pub mod timeouts {
    pub const PLC_TIMEOUT_S: f64 = 5.0;
    pub const RTU_TIMEOUT_S: f64 = 5.0;
    pub const CRD_TIMEOUT_S: f64 = 5.0;
    pub const PKT_TIMEOUT_S: f64 = 5.0;
    /// Smallest accepted watchdog timeout
    pub const MIN_TIMEOUT_S: f64 = 2.0;
}

/// Coolant fluid for a facility tank slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TankFluidType {
    #[default]
    Water,
    Sodium,
}

/// Per-unit cooling build: how many boilers and turbines serve the reactor,
/// and whether its dynamic tank is unit-local or shared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitCoolingConfig {
    #[serde(default)]
    pub boiler_count: u8,
    #[serde(default = "default_turbine_count")]
    pub turbine_count: u8,
    /// 0 = no tank, 1 = unit-local, 2 = facility
    #[serde(default)]
    pub tank_connection: u8,
}

fn default_turbine_count() -> u8 {
    1
}

impl Default for UnitCoolingConfig {
    fn default() -> Self {
        Self {
            boiler_count: 0,
            turbine_count: default_turbine_count(),
            tank_connection: 1,
        }
    }
}

/// Facility build description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilityConfig {
    #[serde(default = "default_unit_count")]
    pub unit_count: u8,
    /// One entry per reactor unit
    #[serde(default)]
    pub cooling: Vec<UnitCoolingConfig>,
    /// 0 = per-unit tanks, 1..7 = shared facility tank groupings
    #[serde(default)]
    pub tank_mode: u8,
    /// Per-unit tank definition: 0 = none, 1 = unit-local, 2 = facility
    #[serde(default)]
    pub tank_defs: Vec<u8>,
    #[serde(default)]
    pub tank_fluid_types: Vec<TankFluidType>,
    /// Per-unit auxiliary coolant injection flag
    #[serde(default)]
    pub auxiliary_coolant: Vec<bool>,
    /// Damp the charge controller while external imports exceed exports
    #[serde(default)]
    pub ext_charge_idling: bool,
}

fn default_unit_count() -> u8 {
    1
}

impl Default for FacilityConfig {
    fn default() -> Self {
        Self {
            unit_count: default_unit_count(),
            cooling: vec![UnitCoolingConfig::default()],
            tank_mode: 0,
            tank_defs: vec![1],
            tank_fluid_types: vec![TankFluidType::Water],
            auxiliary_coolant: vec![false],
            ext_charge_idling: false,
        }
    }
}

/// Channels, watchdog timeouts and frame authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommsConfig {
    #[serde(default = "default_svr_channel")]
    pub svr_channel: u16,
    #[serde(default = "default_plc_channel")]
    pub plc_channel: u16,
    #[serde(default = "default_rtu_channel")]
    pub rtu_channel: u16,
    #[serde(default = "default_crd_channel")]
    pub crd_channel: u16,
    #[serde(default = "default_pkt_channel")]
    pub pkt_channel: u16,
    #[serde(default = "default_plc_timeout")]
    pub plc_timeout_s: f64,
    #[serde(default = "default_rtu_timeout")]
    pub rtu_timeout_s: f64,
    #[serde(default = "default_crd_timeout")]
    pub crd_timeout_s: f64,
    #[serde(default = "default_pkt_timeout")]
    pub pkt_timeout_s: f64,
    /// Maximum accepted datagram distance, 0 = unlimited
    #[serde(default)]
    pub trusted_range: f64,
    /// Shared frame authentication key; empty disables HMAC
    #[serde(default)]
    pub auth_key: String,
}

fn default_svr_channel() -> u16 {
    channels::SVR
}
fn default_plc_channel() -> u16 {
    channels::PLC
}
fn default_rtu_channel() -> u16 {
    channels::RTU
}
fn default_crd_channel() -> u16 {
    channels::CRD
}
fn default_pkt_channel() -> u16 {
    channels::PKT
}
fn default_plc_timeout() -> f64 {
    timeouts::PLC_TIMEOUT_S
}
fn default_rtu_timeout() -> f64 {
    timeouts::RTU_TIMEOUT_S
}
fn default_crd_timeout() -> f64 {
    timeouts::CRD_TIMEOUT_S
}
fn default_pkt_timeout() -> f64 {
    timeouts::PKT_TIMEOUT_S
}

impl Default for CommsConfig {
    fn default() -> Self {
        Self {
            svr_channel: channels::SVR,
            plc_channel: channels::PLC,
            rtu_channel: channels::RTU,
            crd_channel: channels::CRD,
            pkt_channel: channels::PKT,
            plc_timeout_s: timeouts::PLC_TIMEOUT_S,
            rtu_timeout_s: timeouts::RTU_TIMEOUT_S,
            crd_timeout_s: timeouts::CRD_TIMEOUT_S,
            pkt_timeout_s: timeouts::PKT_TIMEOUT_S,
            trusted_range: 0.0,
            auth_key: String::new(),
        }
    }
}

impl CommsConfig {
    pub fn auth_enabled(&self) -> bool {
        !self.auth_key.is_empty()
    }

    pub fn timeout_for_plc(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.plc_timeout_s)
    }

    pub fn timeout_for_rtu(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.rtu_timeout_s)
    }

    pub fn timeout_for_crd(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.crd_timeout_s)
    }

    pub fn timeout_for_pkt(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.pkt_timeout_s)
    }
}

/// Log output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// "append" or "replace"
    #[serde(default = "default_log_mode")]
    pub mode: String,
    #[serde(default = "default_log_path")]
    pub path: String,
    #[serde(default)]
    pub debug: bool,
}

fn default_log_mode() -> String {
    "append".to_string()
}

fn default_log_path() -> String {
    "log/supervisor.log".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            mode: default_log_mode(),
            path: default_log_path(),
            debug: false,
        }
    }
}

/// Front panel presentation settings (consumed by the UI layer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    #[serde(default = "default_theme")]
    pub front_panel_theme: String,
    /// Color-accessibility mode identifier
    #[serde(default)]
    pub color_mode: u8,
}

fn default_theme() -> String {
    "sandstone".to_string()
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            front_panel_theme: default_theme(),
            color_mode: 0,
        }
    }
}

/// Complete supervisor configuration tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default)]
    pub facility: FacilityConfig,
    #[serde(default)]
    pub comms: CommsConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

impl SupervisorConfig {
    /// Boiler count for a 1-based unit id.
    pub fn boiler_count(&self, unit_id: u8) -> u8 {
        self.facility
            .cooling
            .get(unit_id as usize - 1)
            .map(|c| c.boiler_count)
            .unwrap_or(0)
    }

    /// Turbine count for a 1-based unit id.
    pub fn turbine_count(&self, unit_id: u8) -> u8 {
        self.facility
            .cooling
            .get(unit_id as usize - 1)
            .map(|c| c.turbine_count)
            .unwrap_or(0)
    }
}
