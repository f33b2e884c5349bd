//! Session lifecycle over the wire: link handshakes, collisions,
//! watchdog teardown and orphan handling.

mod common;

use common::*;
use fission_comlink::frame::Frame;
use fission_comlink::protocols::LinkResult;
use fission_comlink::rplc::{ReactorStatus, RplcPacket};
use fission_comlink::transport::Datagram;
use fission_comlink::{FrameAuthenticator, Packet, ProtocolId};
use supsrv::SupervisorCore;

#[test]
fn test_one_session_per_reactor() {
    let mut core = SupervisorCore::new(test_config(4, 0, 1));

    // Distinct reactors from distinct peers: one session each
    for reactor in 1..=4u8 {
        let mut plc = Peer::new(17000 + u16::from(reactor));
        core.handle_datagram(&plc.link_req(reactor, 0), 0);
        let out = replies(&mut core);
        assert_eq!(link_result_for(&out, plc.addr), Some(LinkResult::Allow));
    }
    assert_eq!(core.registry().len(), 4);

    // A second link for reactor 2 collides and replaces nothing
    let mut intruder = Peer::new(18000);
    core.handle_datagram(&intruder.link_req(2, 1_000), 1_000);
    let out = replies(&mut core);
    assert_eq!(link_result_for(&out, intruder.addr), Some(LinkResult::Collision));
    assert_eq!(core.registry().len(), 4);
    assert!(core.facility().unit(2).unwrap().plc_linked());
}

#[test]
fn test_version_mismatch_rejected() {
    let mut core = SupervisorCore::new(test_config(1, 0, 1));
    let mut plc = Peer::new(17001);

    core.handle_datagram(&plc.link_req_versioned(99, 1, 0), 0);
    let out = replies(&mut core);
    assert_eq!(link_result_for(&out, plc.addr), Some(LinkResult::BadVersion));
    assert!(core.registry().is_empty());
}

#[test]
fn test_unknown_reactor_denied() {
    let mut core = SupervisorCore::new(test_config(2, 0, 1));
    let mut plc = Peer::new(17002);

    core.handle_datagram(&plc.link_req(3, 0), 0);
    let out = replies(&mut core);
    assert_eq!(link_result_for(&out, plc.addr), Some(LinkResult::Deny));
}

#[test]
fn test_orphan_packet_draws_deny_hint() {
    let mut core = SupervisorCore::new(test_config(1, 0, 1));
    let mut plc = Peer::new(17003);

    // Status without a preceding link
    let status = plc.datagram(
        SVR,
        ProtocolId::Rplc,
        RplcPacket::Status { status: ReactorStatus::default() }.encode(),
        0,
    );
    core.handle_datagram(&status, 0);

    let out = replies(&mut core);
    assert_eq!(link_result_for(&out, plc.addr), Some(LinkResult::Deny));
    assert!(core.registry().is_empty());
}

#[test]
fn test_watchdog_closes_session_and_relink_succeeds() {
    // Scenario S6: silence a PLC past its timeout, then link again
    let mut core = SupervisorCore::new(test_config(1, 0, 1));
    let mut plc = Peer::new(17004);

    core.handle_datagram(&plc.link_req(1, 0), 0);
    replies(&mut core);
    assert!(core.facility().unit(1).unwrap().plc_linked());

    // Keep it alive across a few ticks with telemetry
    let status = plc.datagram(
        SVR,
        ProtocolId::Rplc,
        RplcPacket::Status { status: ReactorStatus::default() }.encode(),
        2_000,
    );
    core.handle_datagram(&status, 2_000);
    core.tick(2_500);
    assert_eq!(core.registry().len(), 1);

    // Then drop all inbound traffic: default PLC timeout is 5 s from the
    // last valid packet, so the session dies at the next tick boundary
    core.tick(6_500);
    replies(&mut core);
    core.tick(7_000);
    assert!(core.registry().is_empty());
    assert!(!core.facility().unit(1).unwrap().plc_linked());

    // The same address re-links cleanly
    core.handle_datagram(&plc.link_req(1, 8_000), 8_000);
    let out = replies(&mut core);
    assert_eq!(link_result_for(&out, plc.addr), Some(LinkResult::Allow));
    assert!(core.facility().unit(1).unwrap().plc_linked());
}

#[test]
fn test_telemetry_reaches_unit_on_tick() {
    let mut core = SupervisorCore::new(test_config(1, 0, 1));
    let mut plc = Peer::new(17005);
    core.handle_datagram(&plc.link_req(1, 0), 0);
    replies(&mut core);

    let mut status = ReactorStatus::default();
    status.formed = true;
    status.burn_rate = 3.5;
    status.temperature = 612.0;
    let dg = plc.datagram(
        SVR,
        ProtocolId::Rplc,
        RplcPacket::Status { status }.encode(),
        100,
    );
    core.handle_datagram(&dg, 100);
    core.tick(500);

    let unit = core.facility().unit(1).unwrap();
    assert_eq!(unit.db.burn_rate, 3.5);
    assert_eq!(unit.db.temperature, 612.0);
}

#[test]
fn test_replayed_sequence_dropped() {
    let mut core = SupervisorCore::new(test_config(1, 0, 1));
    let mut plc = Peer::new(17006);
    core.handle_datagram(&plc.link_req(1, 0), 0);
    replies(&mut core);

    // Advance the peer sequence far ahead
    let mut dg = None;
    for t in 1..40u64 {
        let mut status = ReactorStatus::default();
        status.burn_rate = t as f64;
        let d = plc.datagram(
            SVR,
            ProtocolId::Rplc,
            RplcPacket::Status { status }.encode(),
            t,
        );
        if t == 1 {
            dg = Some(d.clone());
        }
        core.handle_datagram(&d, t);
    }

    // Replay the early frame: sequence regressed beyond the window
    core.handle_datagram(&dg.unwrap(), 50);
    core.tick(500);
    // The replayed burn_rate=1.0 must not overwrite the latest value
    assert_eq!(core.facility().unit(1).unwrap().db.burn_rate, 39.0);
}

#[test]
fn test_authenticated_link_roundtrip() {
    let mut cfg = test_config(1, 0, 1);
    cfg.comms.auth_key = "orchard-lane-west".into();
    let mut core = SupervisorCore::new(cfg);

    let auth = FrameAuthenticator::new(b"orchard-lane-west");
    let payload = RplcPacket::LinkReq {
        version: supsrv::session::SUPERVISOR_COMMS_VERSION,
        reactor_id: 1,
    }
    .encode();
    let frame = Frame::new(ProtocolId::Rplc, 0, 1_000, payload);
    let dg = Datagram {
        src: 17007,
        dst: SVR,
        payload: frame.encode(Some(&auth)).unwrap(),
        distance: 0.0,
    };
    core.handle_datagram(&dg, 1_000);

    // Reply must decode under the same key and carry ALLOW
    let out = core.drain_outbound();
    assert_eq!(out.len(), 1);
    let reply = Frame::decode(&out[0].bytes, Some(&auth), 1_000).unwrap();
    match fission_comlink::decode_packet(reply.protocol, &reply.payload).unwrap() {
        Packet::Rplc(RplcPacket::LinkAck { result }) => assert_eq!(result, LinkResult::Allow),
        other => panic!("wrong reply: {:?}", other),
    }
}

#[test]
fn test_unauthenticated_frame_dropped_when_keyed() {
    let mut cfg = test_config(1, 0, 1);
    cfg.comms.auth_key = "orchard-lane-west".into();
    let mut core = SupervisorCore::new(cfg);

    let mut plc = Peer::new(17008);
    core.handle_datagram(&plc.link_req(1, 0), 0);
    assert!(core.drain_outbound().is_empty());
    assert!(core.registry().is_empty());
}

#[test]
fn test_distance_beyond_trusted_range_dropped() {
    let mut cfg = test_config(1, 0, 1);
    cfg.comms.trusted_range = 100.0;
    let mut core = SupervisorCore::new(cfg);

    let mut plc = Peer::new(17009);
    let mut dg = plc.link_req(1, 0);
    dg.distance = 250.0;
    core.handle_datagram(&dg, 0);
    assert!(core.drain_outbound().is_empty());

    let mut near = plc.link_req(1, 10);
    near.distance = 50.0;
    core.handle_datagram(&near, 10);
    let out = replies(&mut core);
    assert_eq!(link_result_for(&out, plc.addr), Some(LinkResult::Allow));
}
