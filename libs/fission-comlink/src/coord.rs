//! COORD_DATA protocol: operator requests and telemetry push
//!
//! Carried in `ProtocolId::CoordData` frames between the supervisor and the
//! coordinator (read-write) or a pocket console (read-only).

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocols::{
    Alarm, AlarmState, AscramReason, ProcessMode, WasteMode, ALARM_COUNT, TONE_COUNT,
};
use crate::rplc::{ReactorStatus, RpsTrips};

/// Operator configuration handed to `auto_start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoControlConfig {
    pub mode: ProcessMode,
    /// Total burn target (mB/t) for BURN_RATE mode
    pub burn_target: f64,
    /// Induction matrix charge setpoint (fraction 0..1) for CHARGE mode
    pub charge_setpoint: f64,
    /// Generation rate setpoint (kFE/t) for GEN_RATE mode
    pub gen_rate_setpoint: f64,
    /// Per-unit burn limits (mB/t), one entry per reactor unit
    pub limits: Vec<f64>,
}

/// Facility-level operator commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum FacCommand {
    AutoStart { config: AutoControlConfig },
    AutoStop,
    /// Acknowledge an auto-SCRAM so auto control can be re-armed
    Ack,
    SetGroup { unit: u8, group: u8 },
    SetWaste { mode: WasteMode },
    SetPuFallback { enabled: bool },
    SetSpsLowPower { enabled: bool },
}

/// Unit-level operator commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum UnitCommand {
    Scram,
    ResetRps,
    AckAlarm { alarm: Alarm },
    AckAllAlarms,
    SetBurnRate { rate: f64 },
    SetWaste { mode: WasteMode },
    SetGroup { group: u8 },
}

/// Per-cause auto-SCRAM latch states pushed in the facility status frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AscramStatus {
    pub matrix_dc: bool,
    pub matrix_fill: bool,
    pub crit_alarm: bool,
    pub radiation: bool,
    pub gen_fault: bool,
}

/// Static build info for one unit (sent once after establish).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitBuild {
    pub id: u8,
    pub boilers: u8,
    pub turbines: u8,
    pub tank_connection: u8,
}

/// Facility status frame pushed once per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacStatus {
    pub mode: ProcessMode,
    pub mode_set: ProcessMode,
    pub units_ready: bool,
    pub status_text: [String; 2],
    pub ascram: bool,
    pub ascram_reason: Option<AscramReason>,
    pub ascram_status: AscramStatus,
    pub tones: [bool; TONE_COUNT],
    pub charge_setpoint: f64,
    pub gen_rate_setpoint: f64,
    pub burn_target: f64,
    pub avg_charge: f64,
    pub avg_inflow: f64,
    pub avg_outflow: f64,
    pub avg_net: f64,
    pub pu_fallback: bool,
    pub sps_low_power: bool,
}

/// Unit status frame pushed once per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitStatus {
    pub id: u8,
    pub plc_linked: bool,
    pub ready: bool,
    pub group: u8,
    pub burn_limit: f64,
    pub burn_target: f64,
    pub waste_mode: WasteMode,
    pub telemetry: ReactorStatus,
    pub rps_tripped: bool,
    pub rps_trips: RpsTrips,
    pub alarm_states: [AlarmState; ALARM_COUNT],
}

/// COORD_DATA packet body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoordPacket {
    FacBuilds { units: Vec<UnitBuild> },
    FacStatus { status: Box<FacStatus> },
    FacCmd { command: FacCommand },
    UnitBuilds { units: Vec<UnitBuild> },
    UnitStatus { status: Box<UnitStatus> },
    UnitCmd { unit: u8, command: UnitCommand },
    /// Supervisor reply to an operator command
    CmdAck { ok: bool, detail: String },
}

impl CoordPacket {
    pub fn encode(&self) -> Bytes {
        Bytes::from(serde_json::to_vec(self).expect("COORD packet serialization"))
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_start_roundtrip() {
        let pkt = CoordPacket::FacCmd {
            command: FacCommand::AutoStart {
                config: AutoControlConfig {
                    mode: ProcessMode::BurnRate,
                    burn_target: 5.0,
                    charge_setpoint: 0.0,
                    gen_rate_setpoint: 0.0,
                    limits: vec![10.0],
                },
            },
        };
        assert_eq!(CoordPacket::decode(&pkt.encode()).unwrap(), pkt);
    }

    #[test]
    fn test_unit_cmd_roundtrip() {
        let pkt = CoordPacket::UnitCmd {
            unit: 2,
            command: UnitCommand::AckAlarm { alarm: Alarm::TurbineTrip },
        };
        assert_eq!(CoordPacket::decode(&pkt.encode()).unwrap(), pkt);
    }

    #[test]
    fn test_fac_status_roundtrip() {
        let pkt = CoordPacket::FacStatus {
            status: Box::new(FacStatus {
                mode: ProcessMode::Charge,
                mode_set: ProcessMode::Charge,
                units_ready: true,
                status_text: ["CHARGE".into(), "stable".into()],
                ascram: false,
                ascram_reason: None,
                ascram_status: AscramStatus::default(),
                tones: [false; TONE_COUNT],
                charge_setpoint: 0.8,
                gen_rate_setpoint: 0.0,
                burn_target: 0.0,
                avg_charge: 0.75,
                avg_inflow: 120.0,
                avg_outflow: 80.0,
                avg_net: 40.0,
                pu_fallback: false,
                sps_low_power: false,
            }),
        };
        assert_eq!(CoordPacket::decode(&pkt.encode()).unwrap(), pkt);
    }
}
