//! RPLC protocol: reactor PLC link, status and commands
//!
//! Carried in `ProtocolId::Rplc` frames. Payload bodies are JSON so that
//! telemetry fields can be added without a wire break; the frame header
//! stays binary.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocols::{LinkResult, WasteMode};

/// Full reactor telemetry snapshot streamed by a linked PLC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ReactorStatus {
    pub formed: bool,
    pub active: bool,
    /// mB/t of fissile fuel currently burning
    pub burn_rate: f64,
    /// Kelvin
    pub temperature: f64,
    /// 0.0 .. 1.0
    pub damage: f64,
    /// 0.0 .. 1.0
    pub fuel_fill: f64,
    /// 0.0 .. 1.0
    pub waste_fill: f64,
    /// 0.0 .. 1.0
    pub coolant_fill: f64,
    /// 0.0 .. 1.0
    pub heated_coolant_fill: f64,
    /// Heating rate in mB/t
    pub heating_rate: f64,
}

/// Reactor protection system trip flags mirrored to the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RpsTrips {
    pub high_damage: bool,
    pub high_temp: bool,
    pub low_coolant: bool,
    pub excess_waste: bool,
    pub excess_heated_coolant: bool,
    pub no_fuel: bool,
    pub fault: bool,
    pub timeout: bool,
    pub manual: bool,
    pub automatic: bool,
    pub sys_fail: bool,
    pub force_disabled: bool,
}

impl RpsTrips {
    pub fn any(&self) -> bool {
        self.high_damage
            || self.high_temp
            || self.low_coolant
            || self.excess_waste
            || self.excess_heated_coolant
            || self.no_fuel
            || self.fault
            || self.timeout
            || self.manual
            || self.automatic
            || self.sys_fail
            || self.force_disabled
    }
}

/// Commands the supervisor pushes to a PLC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum PlcCommand {
    SetBurnRate { rate: f64 },
    Scram,
    ResetRps,
    SetWaste { mode: WasteMode },
}

/// RPLC packet body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RplcPacket {
    LinkReq {
        version: u16,
        reactor_id: u8,
    },
    LinkAck {
        result: LinkResult,
    },
    Status {
        status: ReactorStatus,
    },
    RpsStatus {
        tripped: bool,
        trips: RpsTrips,
    },
    RpsAlarm {
        trips: RpsTrips,
    },
    Command {
        command: PlcCommand,
    },
    /// Sparse telemetry update: only fields that changed since the last
    /// `Status`, keyed by `ReactorStatus` field name.
    TelemetryDelta {
        fields: serde_json::Map<String, serde_json::Value>,
    },
}

impl RplcPacket {
    pub fn encode(&self) -> Bytes {
        // Serializing a tagged enum of plain fields cannot fail
        Bytes::from(serde_json::to_vec(self).expect("RPLC packet serialization"))
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_req_roundtrip() {
        let pkt = RplcPacket::LinkReq { version: 3, reactor_id: 2 };
        assert_eq!(RplcPacket::decode(&pkt.encode()).unwrap(), pkt);
    }

    #[test]
    fn test_command_roundtrip() {
        let pkt = RplcPacket::Command {
            command: PlcCommand::SetBurnRate { rate: 12.5 },
        };
        assert_eq!(RplcPacket::decode(&pkt.encode()).unwrap(), pkt);
    }

    #[test]
    fn test_status_tolerates_added_fields() {
        // A newer PLC may stream extra telemetry; the decoder must ignore it
        let json = br#"{"type":"status","status":{
            "formed":true,"active":true,"burn_rate":5.0,"temperature":540.2,
            "damage":0.0,"fuel_fill":0.9,"waste_fill":0.1,"coolant_fill":1.0,
            "heated_coolant_fill":0.05,"heating_rate":200.0,
            "future_field":123}}"#;
        let pkt = RplcPacket::decode(json).unwrap();
        match pkt {
            RplcPacket::Status { status } => {
                assert!(status.formed);
                assert_eq!(status.burn_rate, 5.0);
            }
            other => panic!("wrong packet: {:?}", other),
        }
    }

    #[test]
    fn test_rps_trips_any() {
        let mut trips = RpsTrips::default();
        assert!(!trips.any());
        trips.high_temp = true;
        assert!(trips.any());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(RplcPacket::decode(b"not json").is_err());
        assert!(RplcPacket::decode(br#"{"type":"warp_drive"}"#).is_err());
    }
}
