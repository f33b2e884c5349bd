//! Shared wire vocabulary
//!
//! Enumerations that appear in more than one protocol family. These are the
//! canonical definitions; the supervisor and its peers exchange them inside
//! RPLC, SCADA_MGMT and COORD_DATA payloads.

use serde::{Deserialize, Serialize};

/// Handshake outcome for any link request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkResult {
    Allow,
    Deny,
    Collision,
    BadVersion,
}

/// Facility process control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ProcessMode {
    #[default]
    Inactive,
    Monitored,
    BurnRate,
    Charge,
    GenRate,
    GenRateFaultIdle,
}

impl ProcessMode {
    /// Modes an operator may request through `auto_start`.
    pub fn is_requestable(&self) -> bool {
        matches!(
            self,
            ProcessMode::Monitored | ProcessMode::BurnRate | ProcessMode::Charge | ProcessMode::GenRate
        )
    }
}

impl std::fmt::Display for ProcessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessMode::Inactive => write!(f, "INACTIVE"),
            ProcessMode::Monitored => write!(f, "MONITORED"),
            ProcessMode::BurnRate => write!(f, "BURN_RATE"),
            ProcessMode::Charge => write!(f, "CHARGE"),
            ProcessMode::GenRate => write!(f, "GEN_RATE"),
            ProcessMode::GenRateFaultIdle => write!(f, "GEN_RATE_FAULT_IDLE"),
        }
    }
}

/// Automatic SCRAM causes, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AscramReason {
    /// Induction matrix disconnected while auto control active
    MatrixDisconnect,
    /// Matrix charge at or above 99 %
    MatrixFill,
    /// A critical alarm is active on some unit
    CritAlarm,
    /// An environment detector reads above the radiation threshold
    Radiation,
    /// Generation setpoint unreachable in GEN_RATE mode
    GenFault,
}

/// Reactor waste processing route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WasteMode {
    /// Facility decides (plutonium fallback / SPS gating applies)
    #[default]
    Auto,
    Plutonium,
    Polonium,
    AntiMatter,
}

/// Device kinds an RTU gateway can expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RtuDeviceKind {
    BoilerValve,
    TurbineValve,
    DynamicValve,
    InductionMatrix,
    Sps,
    Sna,
    EnvDetector,
    Redstone,
    /// Placeholder after a device detach; must be re-typed on reconnect
    Virtual,
}

impl RtuDeviceKind {
    /// Multiblock devices start UNFORMED and are polled for formation.
    pub fn is_multiblock(&self) -> bool {
        matches!(
            self,
            RtuDeviceKind::BoilerValve
                | RtuDeviceKind::TurbineValve
                | RtuDeviceKind::DynamicValve
                | RtuDeviceKind::InductionMatrix
                | RtuDeviceKind::Sps
        )
    }

    /// Kinds bound to a specific reactor unit (reactor id must be valid).
    pub fn is_unit_scoped(&self) -> bool {
        matches!(
            self,
            RtuDeviceKind::BoilerValve | RtuDeviceKind::TurbineValve | RtuDeviceKind::DynamicValve
        )
    }
}

/// The 12 unit annunciator alarms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(usize)]
pub enum Alarm {
    ContainmentBreach = 0,
    ContainmentRadiation = 1,
    ReactorLost = 2,
    CriticalDamage = 3,
    ReactorDamage = 4,
    ReactorOverTemp = 5,
    ReactorHighTemp = 6,
    ReactorWasteLeak = 7,
    ReactorHighWaste = 8,
    RpsTransient = 9,
    RcsTransient = 10,
    TurbineTrip = 11,
}

/// Number of annunciator channels per unit.
pub const ALARM_COUNT: usize = 12;

/// Number of tone slots fed to the audio renderer.
pub const TONE_COUNT: usize = 8;

impl Alarm {
    pub const ALL: [Alarm; ALARM_COUNT] = [
        Alarm::ContainmentBreach,
        Alarm::ContainmentRadiation,
        Alarm::ReactorLost,
        Alarm::CriticalDamage,
        Alarm::ReactorDamage,
        Alarm::ReactorOverTemp,
        Alarm::ReactorHighTemp,
        Alarm::ReactorWasteLeak,
        Alarm::ReactorHighWaste,
        Alarm::RpsTransient,
        Alarm::RcsTransient,
        Alarm::TurbineTrip,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn from_index(i: usize) -> Option<Alarm> {
        Alarm::ALL.get(i).copied()
    }

    /// Alarms that participate in the CRIT_ALARM auto-SCRAM check. A lost
    /// reactor is urgent but not critical: it must not mask later safety
    /// causes such as a generation fault.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Alarm::ContainmentBreach | Alarm::ContainmentRadiation | Alarm::CriticalDamage
        )
    }

    /// Tone slot (0..8) this alarm sounds on.
    pub fn tone_slot(&self) -> usize {
        match self {
            Alarm::ContainmentBreach => 7,
            Alarm::ContainmentRadiation => 6,
            Alarm::ReactorLost => 5,
            Alarm::CriticalDamage => 7,
            Alarm::ReactorDamage => 4,
            Alarm::ReactorOverTemp => 3,
            Alarm::ReactorHighTemp => 2,
            Alarm::ReactorWasteLeak => 6,
            Alarm::ReactorHighWaste => 1,
            Alarm::RpsTransient => 0,
            Alarm::RcsTransient => 0,
            Alarm::TurbineTrip => 5,
        }
    }
}

/// Annunciator latch states, standard alarm discipline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AlarmState {
    #[default]
    Inactive,
    Tripped,
    Acked,
    RingBack,
}

impl AlarmState {
    /// States that drive the tone mixer.
    pub fn is_audible(&self) -> bool {
        matches!(self, AlarmState::Tripped | AlarmState::RingBack)
    }
}
