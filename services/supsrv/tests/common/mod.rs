//! Shared harness for supervisor integration tests
//!
//! Simulated peers build real wire frames and feed them straight into the
//! supervisor core; replies are drained from the outbound queue and
//! decoded back into packets.

// Each test binary uses a subset of these helpers
#![allow(dead_code)]

use bytes::Bytes;
use fission_comlink::frame::{Frame, SeqCounter};
use fission_comlink::mgmt::{MgmtPacket, RtuAdvertUnit};
use fission_comlink::modbus::{FunctionCode, ModbusRequest, RequestBody};
use fission_comlink::protocols::{LinkResult, RtuDeviceKind};
use fission_comlink::rplc::RplcPacket;
use fission_comlink::transport::Datagram;
use fission_comlink::{decode_packet, Packet, ProtocolId};
use fission_config::{SupervisorConfig, UnitCoolingConfig};
use supsrv::session::SUPERVISOR_COMMS_VERSION;
use supsrv::SupervisorCore;

/// Supervisor device listen channel under test.
pub const SVR: u16 = 16240;
/// Supervisor coordinator listen channel under test.
pub const CRD: u16 = 16243;

pub fn test_config(units: u8, boilers: u8, turbines: u8) -> SupervisorConfig {
    let mut cfg = SupervisorConfig::default();
    cfg.facility.unit_count = units;
    cfg.facility.cooling = (0..units)
        .map(|_| UnitCoolingConfig {
            boiler_count: boilers,
            turbine_count: turbines,
            tank_connection: 1,
        })
        .collect();
    cfg.facility.tank_defs = vec![1; units as usize];
    cfg
}

/// A simulated remote node with its own reply channel and tx sequence.
pub struct Peer {
    pub addr: u16,
    seq: SeqCounter,
}

impl Peer {
    pub fn new(addr: u16) -> Self {
        Self { addr, seq: SeqCounter::new() }
    }

    pub fn datagram(
        &mut self,
        dst: u16,
        protocol: ProtocolId,
        payload: Bytes,
        now_ms: u64,
    ) -> Datagram {
        let frame = Frame::new(protocol, self.seq.next(), now_ms, payload);
        Datagram {
            src: self.addr,
            dst,
            payload: frame.encode(None).expect("test frame encode"),
            distance: 0.0,
        }
    }

    pub fn link_req(&mut self, reactor_id: u8, now_ms: u64) -> Datagram {
        self.link_req_versioned(SUPERVISOR_COMMS_VERSION, reactor_id, now_ms)
    }

    pub fn link_req_versioned(&mut self, version: u16, reactor_id: u8, now_ms: u64) -> Datagram {
        self.datagram(
            SVR,
            ProtocolId::Rplc,
            RplcPacket::LinkReq { version, reactor_id }.encode(),
            now_ms,
        )
    }

    pub fn advert(&mut self, units: Vec<RtuAdvertUnit>, now_ms: u64) -> Datagram {
        self.datagram(
            SVR,
            ProtocolId::ScadaMgmt,
            MgmtPacket::RtuAdvert { version: SUPERVISOR_COMMS_VERSION, units }.encode(),
            now_ms,
        )
    }

    /// MODBUS single-coil write to one of this gateway's entries.
    pub fn write_coil(&mut self, uid: u8, addr: u16, value: bool, now_ms: u64) -> Datagram {
        let req = ModbusRequest {
            txn_id: 1,
            unit_id: uid,
            func: FunctionCode::WriteSingleCoil,
            body: RequestBody::WriteSingleCoil { addr, value },
        };
        self.datagram(SVR, ProtocolId::Modbus, req.encode(), now_ms)
    }

    /// MODBUS multi-register write to one of this gateway's entries.
    pub fn write_regs(&mut self, uid: u8, addr: u16, values: Vec<u16>, now_ms: u64) -> Datagram {
        let req = ModbusRequest {
            txn_id: 2,
            unit_id: uid,
            func: FunctionCode::WriteMultipleRegisters,
            body: RequestBody::WriteMultipleRegisters { addr, values },
        };
        self.datagram(SVR, ProtocolId::Modbus, req.encode(), now_ms)
    }
}

pub fn advert_unit(kind: RtuDeviceKind, name: &str, index: u8, reactor: u8) -> RtuAdvertUnit {
    RtuAdvertUnit { kind, name: name.into(), index, reactor }
}

/// Drain and decode every queued outbound frame as `(dst, protocol, packet)`.
pub fn replies(core: &mut SupervisorCore) -> Vec<(u16, ProtocolId, Packet)> {
    core.drain_outbound()
        .into_iter()
        .map(|frame| {
            let decoded = Frame::decode(&frame.bytes, None, 0).expect("outbound frame decodes");
            let packet =
                decode_packet(decoded.protocol, &decoded.payload).expect("outbound packet decodes");
            (frame.dst, decoded.protocol, packet)
        })
        .collect()
}

/// The link result sent to `addr`, if any reply carried one.
pub fn link_result_for(replies: &[(u16, ProtocolId, Packet)], addr: u16) -> Option<LinkResult> {
    replies.iter().find_map(|(dst, _, packet)| {
        if *dst != addr {
            return None;
        }
        match packet {
            Packet::Rplc(RplcPacket::LinkAck { result }) => Some(*result),
            Packet::Mgmt(MgmtPacket::EstablishAck { result }) => Some(*result),
            _ => None,
        }
    })
}
