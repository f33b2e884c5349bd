//! SCADA_MGMT protocol: session establishment, keepalive and diagnostics
//!
//! Carried in `ProtocolId::ScadaMgmt` frames. PLCs establish through RPLC
//! `LinkReq`; RTU gateways establish through `RtuAdvert`; coordinators and
//! pocket consoles establish through `Establish`.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocols::{Alarm, LinkResult, RtuDeviceKind, TONE_COUNT};

/// Endpoint kinds that establish over SCADA_MGMT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MgmtEndpoint {
    Coordinator,
    Pocket,
}

/// One advertised RTU device unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RtuAdvertUnit {
    pub kind: RtuDeviceKind,
    pub name: String,
    /// Device index within its kind (boiler 1..B, turbine 1..T); 0 for
    /// facility-wide devices
    pub index: u8,
    /// Owning reactor unit, 0 for facility-wide devices
    pub reactor: u8,
}

/// Why an advertised unit was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RtuRejectReason {
    DuplicateImatrix,
    DuplicateSps,
    BadReactor,
    BadIndex,
    BadKind,
}

/// SCADA_MGMT packet body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MgmtPacket {
    Establish {
        version: u16,
        endpoint: MgmtEndpoint,
    },
    EstablishAck {
        result: LinkResult,
    },
    KeepAlive {
        sent_ms: u64,
        reply: bool,
    },
    Close,
    /// A multiblock device re-formed and its server was re-bound
    Remounted {
        uid: u8,
    },
    DiagToneTest {
        states: [bool; TONE_COUNT],
    },
    DiagAlarmTest {
        alarm: Alarm,
        active: bool,
    },
    RtuAdvert {
        version: u16,
        units: Vec<RtuAdvertUnit>,
    },
    RtuAdvertAck {
        /// Assigned uid per accepted advert entry, in advert order
        accepted: Vec<(u8, u8)>,
        /// (advert index, reason) per rejected entry
        rejected: Vec<(u8, RtuRejectReason)>,
    },
}

impl MgmtPacket {
    pub fn encode(&self) -> Bytes {
        Bytes::from(serde_json::to_vec(self).expect("MGMT packet serialization"))
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}
