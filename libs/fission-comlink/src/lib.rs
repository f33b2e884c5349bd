//! FissionSCADA Communication Link Library
//!
//! Wire layer shared by the supervisor and its peers:
//! - **Frame layer**: binary header, per-session sequencing, optional
//!   truncated-HMAC authentication with freshness enforcement
//! - **Protocol codecs**: the four packet families (MODBUS, RPLC,
//!   SCADA_MGMT, COORD_DATA)
//! - **Transport**: serial-capable datagram transport trait plus an
//!   in-process hub for tests and simulation

pub mod auth;
pub mod coord;
pub mod error;
pub mod frame;
pub mod mgmt;
pub mod modbus;
pub mod protocols;
pub mod rplc;
pub mod transport;

// Re-export core types
pub use auth::FrameAuthenticator;
pub use error::{ComLinkError, Result};
pub use frame::{Frame, ProtocolId, SeqCounter, SeqWindow};
pub use protocols::{
    Alarm, AlarmState, AscramReason, LinkResult, ProcessMode, RtuDeviceKind, WasteMode,
    ALARM_COUNT, TONE_COUNT,
};
pub use transport::{Datagram, DatagramTransport, MemoryHub, MemoryTransport};

/// One decoded packet of any family.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Modbus(modbus::ModbusRequest),
    ModbusReply(modbus::ModbusReply),
    Rplc(rplc::RplcPacket),
    Mgmt(mgmt::MgmtPacket),
    Coord(coord::CoordPacket),
}

/// Decode a frame payload according to its protocol tag.
///
/// MODBUS payloads arriving at the supervisor are requests; replies travel
/// the other way and are decoded by the RTU side with
/// [`modbus::ModbusReply::decode`].
pub fn decode_packet(protocol: ProtocolId, payload: &[u8]) -> Result<Packet> {
    match protocol {
        ProtocolId::Modbus => Ok(Packet::Modbus(modbus::ModbusRequest::decode(payload)?)),
        ProtocolId::Rplc => Ok(Packet::Rplc(rplc::RplcPacket::decode(payload)?)),
        ProtocolId::ScadaMgmt => Ok(Packet::Mgmt(mgmt::MgmtPacket::decode(payload)?)),
        ProtocolId::CoordData => Ok(Packet::Coord(coord::CoordPacket::decode(payload)?)),
    }
}
