//! RTU gateway flows: advertising, MODBUS servicing, formed-state
//! remounts and device readings feeding the facility.

mod common;

use common::*;
use fission_comlink::mgmt::{MgmtEndpoint, MgmtPacket, RtuRejectReason};
use fission_comlink::modbus::ReplyBody;
use fission_comlink::protocols::RtuDeviceKind;
use fission_comlink::{Packet, ProtocolId};
use supsrv::modbus_server::layout;
use supsrv::session::SUPERVISOR_COMMS_VERSION;
use supsrv::SupervisorCore;

#[test]
fn test_duplicate_imatrix_rejected_in_one_advert() {
    // Scenario S4: two matrices in one advert, first wins
    let mut core = SupervisorCore::new(test_config(1, 0, 1));
    let mut rtu = Peer::new(19000);

    let advert = rtu.advert(
        vec![
            advert_unit(RtuDeviceKind::InductionMatrix, "ind1", 1, 0),
            advert_unit(RtuDeviceKind::InductionMatrix, "ind2", 1, 0),
        ],
        0,
    );
    core.handle_datagram(&advert, 0);

    let out = replies(&mut core);
    let ack = out
        .iter()
        .find_map(|(dst, _, p)| match p {
            Packet::Mgmt(MgmtPacket::RtuAdvertAck { accepted, rejected }) if *dst == rtu.addr => {
                Some((accepted.clone(), rejected.clone()))
            }
            _ => None,
        })
        .expect("advert ack");

    assert_eq!(ack.0.len(), 1);
    assert_eq!(ack.1, vec![(1, RtuRejectReason::DuplicateImatrix)]);
}

#[test]
fn test_imatrix_unique_across_gateways() {
    let mut core = SupervisorCore::new(test_config(1, 0, 1));

    let mut first = Peer::new(19001);
    core.handle_datagram(
        &first.advert(vec![advert_unit(RtuDeviceKind::InductionMatrix, "ind1", 1, 0)], 0),
        0,
    );
    replies(&mut core);

    let mut second = Peer::new(19002);
    core.handle_datagram(
        &second.advert(vec![advert_unit(RtuDeviceKind::InductionMatrix, "ind2", 1, 0)], 10),
        10,
    );
    let out = replies(&mut core);
    let rejected = out
        .iter()
        .find_map(|(_, _, p)| match p {
            Packet::Mgmt(MgmtPacket::RtuAdvertAck { rejected, .. }) => Some(rejected.clone()),
            _ => None,
        })
        .expect("advert ack");
    assert_eq!(rejected, vec![(0, RtuRejectReason::DuplicateImatrix)]);
}

#[test]
fn test_modbus_write_read_cycle() {
    let mut core = SupervisorCore::new(test_config(1, 0, 1));
    let mut rtu = Peer::new(19003);

    core.handle_datagram(
        &rtu.advert(vec![advert_unit(RtuDeviceKind::EnvDetector, "envd", 0, 0)], 0),
        0,
    );
    let out = replies(&mut core);
    let uid = out
        .iter()
        .find_map(|(_, _, p)| match p {
            Packet::Mgmt(MgmtPacket::RtuAdvertAck { accepted, .. }) => {
                accepted.first().map(|(_, uid)| *uid)
            }
            _ => None,
        })
        .expect("accepted uid");

    // Gateway pushes a radiation level of 2500 uSv/h
    core.handle_datagram(
        &rtu.write_regs(uid, layout::ENVD_RADIATION, vec![0, 2_500], 100),
        100,
    );
    let out = replies(&mut core);
    assert!(out.iter().any(|(dst, proto, p)| {
        *dst == rtu.addr
            && *proto == ProtocolId::Modbus
            && matches!(p, Packet::ModbusReply(r) if matches!(r.body, ReplyBody::WriteMultiAck { count: 2, .. }))
    }));
}

#[test]
fn test_unknown_uid_gets_exception() {
    let mut core = SupervisorCore::new(test_config(1, 0, 1));
    let mut rtu = Peer::new(19004);

    core.handle_datagram(
        &rtu.advert(vec![advert_unit(RtuDeviceKind::Redstone, "rs", 0, 0)], 0),
        0,
    );
    replies(&mut core);

    core.handle_datagram(&rtu.write_coil(99, 0, true, 100), 100);
    let out = replies(&mut core);
    assert!(out.iter().any(|(_, _, p)| matches!(
        p,
        Packet::ModbusReply(r) if matches!(r.body, ReplyBody::Exception(_))
    )));
}

#[test]
fn test_remount_notifies_coordinator() {
    let mut core = SupervisorCore::new(test_config(1, 1, 1));

    // A coordinator is linked and will receive the remount notice
    let mut coord = Peer::new(19500);
    let establish = coord.datagram(
        CRD,
        ProtocolId::ScadaMgmt,
        MgmtPacket::Establish {
            version: SUPERVISOR_COMMS_VERSION,
            endpoint: MgmtEndpoint::Coordinator,
        }
        .encode(),
        0,
    );
    core.handle_datagram(&establish, 0);
    replies(&mut core);

    let mut rtu = Peer::new(19005);
    core.handle_datagram(
        &rtu.advert(vec![advert_unit(RtuDeviceKind::BoilerValve, "boiler", 1, 1)], 10),
        10,
    );
    let out = replies(&mut core);
    let uid = out
        .iter()
        .find_map(|(_, _, p)| match p {
            Packet::Mgmt(MgmtPacket::RtuAdvertAck { accepted, .. }) => {
                accepted.first().map(|(_, uid)| *uid)
            }
            _ => None,
        })
        .expect("accepted uid");

    // Gateway reports the boiler multiblock formed; the 250 ms poll picks
    // it up on the next tick
    core.handle_datagram(&rtu.write_coil(uid, layout::COIL_FORMED, true, 200), 200);
    replies(&mut core);
    core.tick(500);

    let out = replies(&mut core);
    assert!(
        out.iter().any(|(dst, _, p)| *dst == coord.addr
            && matches!(p, Packet::Mgmt(MgmtPacket::Remounted { uid: u }) if *u == uid)),
        "coordinator not notified: {:?}",
        out
    );
}

#[test]
fn test_matrix_readings_reach_facility() {
    let mut core = SupervisorCore::new(test_config(1, 0, 1));
    let mut rtu = Peer::new(19006);

    core.handle_datagram(
        &rtu.advert(vec![advert_unit(RtuDeviceKind::InductionMatrix, "imatrix", 1, 0)], 0),
        0,
    );
    replies(&mut core);

    // Form the matrix first: the remount re-binds the server, so state
    // pushed before formation would be discarded
    let uid = 1;
    core.handle_datagram(&rtu.write_coil(uid, layout::COIL_FORMED, true, 50), 50);
    core.tick(500);
    replies(&mut core);

    // The gateway streams 75 % charge; the rolling average converges on it
    for t in (1_000..=10_000).step_by(500) {
        core.handle_datagram(
            &rtu.write_regs(uid, layout::IMATRIX_CHARGE, vec![7_500], t - 100),
            t - 100,
        );
        core.tick(t);
        replies(&mut core);
    }

    let status = core.facility().fac_status();
    assert!(status.avg_charge > 0.7, "avg {}", status.avg_charge);
}
