//! Facility auto-control end to end: engagement over the wire, burn
//! distribution invariants, and the generation-fault safety path.

mod common;

use common::*;
use fission_comlink::coord::{AutoControlConfig, CoordPacket, FacCommand};
use fission_comlink::protocols::{AscramReason, ProcessMode, RtuDeviceKind, WasteMode};
use fission_comlink::rplc::{PlcCommand, RplcPacket};
use fission_comlink::{Packet, ProtocolId};
use fission_config::SupervisorConfig;
use supsrv::facility::unit::DeviceLink;
use supsrv::facility::{DeviceReadings, Facility, MatrixReading};
use supsrv::modbus_server::layout;
use supsrv::session::rtu::HwState;
use supsrv::session::SUPERVISOR_COMMS_VERSION;
use supsrv::SupervisorCore;

fn burn_start(target: f64, limits: Vec<f64>) -> FacCommand {
    FacCommand::AutoStart {
        config: AutoControlConfig {
            mode: ProcessMode::BurnRate,
            burn_target: target,
            charge_setpoint: 0.0,
            gen_rate_setpoint: 0.0,
            limits,
        },
    }
}

/// Scenario S1: single-unit facility, burn-rate mode, command on the wire.
#[test]
fn test_s1_single_unit_burn_rate() {
    let mut core = SupervisorCore::new(test_config(1, 0, 1));

    // Tank solver: mode 0 with one unit-local tank
    assert_eq!(core.facility().tank_list(), &[1]);

    // PLC links with a matching version
    let mut plc = Peer::new(21001);
    core.handle_datagram(&plc.link_req(1, 0), 0);
    let out = replies(&mut core);
    assert_eq!(
        link_result_for(&out, plc.addr),
        Some(fission_comlink::LinkResult::Allow)
    );

    // The turbine serving unit 1 comes up through an RTU gateway
    let mut rtu = Peer::new(21002);
    core.handle_datagram(
        &rtu.advert(vec![advert_unit(RtuDeviceKind::TurbineValve, "turbine", 1, 1)], 10),
        10,
    );
    replies(&mut core);
    core.handle_datagram(&rtu.write_coil(1, layout::COIL_FORMED, true, 50), 50);
    core.tick(500);
    replies(&mut core);

    // Coordinator links, groups unit 1 and starts burn-rate control
    let mut coord = Peer::new(21003);
    core.handle_datagram(
        &coord.datagram(
            CRD,
            ProtocolId::ScadaMgmt,
            fission_comlink::mgmt::MgmtPacket::Establish {
                version: SUPERVISOR_COMMS_VERSION,
                endpoint: fission_comlink::mgmt::MgmtEndpoint::Coordinator,
            }
            .encode(),
            600,
        ),
        600,
    );
    replies(&mut core);

    let group = coord.datagram(
        CRD,
        ProtocolId::CoordData,
        CoordPacket::FacCmd { command: FacCommand::SetGroup { unit: 1, group: 1 } }.encode(),
        700,
    );
    core.handle_datagram(&group, 700);
    replies(&mut core);

    let start = coord.datagram(
        CRD,
        ProtocolId::CoordData,
        CoordPacket::FacCmd { command: burn_start(5.0, vec![10.0]) }.encode(),
        800,
    );
    core.handle_datagram(&start, 800);
    let out = replies(&mut core);
    assert!(out.iter().any(|(dst, _, p)| *dst == coord.addr
        && matches!(p, Packet::Coord(CoordPacket::CmdAck { ok: true, .. }))));
    assert_eq!(core.facility().mode(), ProcessMode::BurnRate);

    // Next tick commands 5.0 mB/t to reactor 1
    core.tick(1_000);
    let out = replies(&mut core);
    let burn_cmd = out.iter().find_map(|(dst, _, p)| match p {
        Packet::Rplc(RplcPacket::Command { command: PlcCommand::SetBurnRate { rate } })
            if *dst == plc.addr =>
        {
            Some(*rate)
        }
        _ => None,
    });
    assert_eq!(burn_cmd, Some(5.0));
    assert_eq!(core.facility().unit(1).unwrap().burn_target, 5.0);
}

fn ready_facility(units: u8, limits: &[f64]) -> Facility {
    let mut cfg = SupervisorConfig::default();
    cfg.facility.unit_count = units;
    cfg.facility.cooling = (0..units)
        .map(|_| fission_config::UnitCoolingConfig {
            boiler_count: 0,
            turbine_count: 1,
            tank_connection: 1,
        })
        .collect();
    cfg.facility.tank_defs = vec![1; units as usize];

    let mut fac = Facility::new(&cfg);
    for i in 1..=units {
        let unit = fac.unit_mut(i).unwrap();
        unit.attach_plc(u32::from(i));
        unit.set_turbine_link(1, DeviceLink { hw_state: HwState::Ok, trip: false });
        unit.group = 1;
        unit.burn_limit = limits[i as usize - 1];
    }
    fac
}

fn readings(charge: f64, inflow: f64) -> DeviceReadings {
    DeviceReadings {
        matrix: Some(MatrixReading { charge, inflow, outflow: 0.0 }),
        sps_online: false,
        max_radiation_msv_h: 0.0,
    }
}

/// Property 2: in every active mode the commanded total equals the sum of
/// per-unit commands and never exceeds the sum of limits.
#[test]
fn test_commanded_burn_bounded_by_limits() {
    let configs = [
        (ProcessMode::BurnRate, 30.0, 0.0, 0.0),
        (ProcessMode::Charge, 0.0, 0.9, 0.0),
        (ProcessMode::GenRate, 0.0, 0.0, 500.0),
    ];

    for (mode, burn, charge, gen) in configs {
        let mut fac = ready_facility(3, &[4.0, 6.0, 2.0]);
        fac.handle_fac_command(&FacCommand::AutoStart {
            config: AutoControlConfig {
                mode,
                burn_target: burn,
                charge_setpoint: charge,
                gen_rate_setpoint: gen,
                limits: vec![4.0, 6.0, 2.0],
            },
        });
        assert_eq!(fac.mode(), mode, "mode {} engaged", mode);

        let mut now = 500;
        for _ in 0..20 {
            let out = fac.update(now, &readings(0.3, 0.0));
            let total: f64 = out.burn_allocations.iter().map(|a| a.burn).sum();
            let unit_sum: f64 = out
                .burn_allocations
                .iter()
                .map(|a| fac.unit(a.id).unwrap().burn_target)
                .sum();

            assert!((total - unit_sum).abs() < 1e-9);
            assert!(total <= 12.0 + 1e-9, "{} total {} over limit sum", mode, total);
            now += 500;
        }
    }
}

/// Scenario S5: generation setpoint unreachable with no producing reactor
/// saturates the integrator and latches GEN_FAULT.
#[test]
fn test_s5_gen_fault_on_unreachable_setpoint() {
    let mut fac = ready_facility(1, &[1.0]);
    fac.handle_fac_command(&FacCommand::AutoStart {
        config: AutoControlConfig {
            mode: ProcessMode::GenRate,
            burn_target: 0.0,
            charge_setpoint: 0.0,
            gen_rate_setpoint: 1_000.0,
            limits: vec![1.0],
        },
    });
    assert_eq!(fac.mode(), ProcessMode::GenRate);

    // The reactor drops off: no unit can produce power
    fac.unit_mut(1).unwrap().detach_plc(1);

    let mut now = 500;
    let mut tripped = None;
    for _ in 0..40 {
        fac.update(now, &readings(0.2, 0.0));
        now += 500;
        if let Some(reason) = fac.ascram_tripped() {
            tripped = Some(reason);
            break;
        }
    }

    assert_eq!(tripped, Some(AscramReason::GenFault));
    assert_eq!(fac.mode(), ProcessMode::Inactive);
}

/// Auto-stop returns burn targets to zero and the next start re-engages.
#[test]
fn test_stop_and_restart_cycle() {
    let mut fac = ready_facility(2, &[10.0, 10.0]);
    fac.handle_fac_command(&burn_start(8.0, vec![10.0, 10.0]));
    fac.update(500, &readings(0.5, 100.0));
    assert!(fac.unit(1).unwrap().burn_target > 0.0);

    fac.handle_fac_command(&FacCommand::AutoStop);
    assert_eq!(fac.mode(), ProcessMode::Inactive);
    assert_eq!(fac.unit(1).unwrap().burn_target, 0.0);
    assert_eq!(fac.unit(2).unwrap().burn_target, 0.0);

    fac.handle_fac_command(&burn_start(4.0, vec![10.0, 10.0]));
    assert_eq!(fac.mode(), ProcessMode::BurnRate);
}

/// Waste command goes to the PLC when the facility route changes.
#[test]
fn test_waste_command_pushed_on_change() {
    let mut core = SupervisorCore::new(test_config(1, 0, 1));
    let mut plc = Peer::new(21010);
    core.handle_datagram(&plc.link_req(1, 0), 0);
    replies(&mut core);

    core.tick(500);
    let out = replies(&mut core);
    // First tick pushes the initial route (facility default: polonium)
    assert!(out.iter().any(|(_, _, p)| matches!(
        p,
        Packet::Rplc(RplcPacket::Command { command: PlcCommand::SetWaste { mode: WasteMode::Polonium } })
    )));

    // No change: no repeat
    core.tick(1_000);
    let out = replies(&mut core);
    assert!(!out.iter().any(|(_, _, p)| matches!(
        p,
        Packet::Rplc(RplcPacket::Command { command: PlcCommand::SetWaste { .. } })
    )));

    core.facility_mut()
        .handle_fac_command(&FacCommand::SetPuFallback { enabled: true });
    core.tick(1_500);
    let out = replies(&mut core);
    assert!(out.iter().any(|(_, _, p)| matches!(
        p,
        Packet::Rplc(RplcPacket::Command { command: PlcCommand::SetWaste { mode: WasteMode::Plutonium } })
    )));
}
