//! Supervisor core
//!
//! Single-owner state machine behind the comms pump: every inbound
//! datagram, peripheral event and clock tick funnels through here, and
//! every outbound frame leaves through the outbound queue. Nothing else
//! touches the registry or the facility, so no task ever observes a
//! partially updated snapshot.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use fission_comlink::coord::{CoordPacket, UnitBuild};
use fission_comlink::frame::Frame;
use fission_comlink::mgmt::{MgmtEndpoint, MgmtPacket};
use fission_comlink::modbus::{ExceptionCode, ModbusReply, ModbusRequest};
use fission_comlink::protocols::{LinkResult, RtuDeviceKind};
use fission_comlink::rplc::{PlcCommand, RplcPacket};
use fission_comlink::transport::Datagram;
use fission_comlink::{decode_packet, FrameAuthenticator, Packet, ProtocolId};
use fission_config::SupervisorConfig;
use tracing::{debug, info, warn};

use crate::facility::unit::DeviceLink;
use crate::facility::{DeviceReadings, Facility, MatrixReading};
use crate::scheduler::{TimerId, TimerTable};
use crate::session::rtu::{AdvertContext, FORMED_POLL_MS};
use crate::session::{SessionDetail, SessionKind, SessionRegistry};

/// Keep-alive probe period per session.
const KEEPALIVE_PERIOD_MS: u64 = 2_000;

/// One frame ready for the transport.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    pub dst: u16,
    pub src: u16,
    pub bytes: Bytes,
}

/// Out-of-band peripheral manager events (consumed interface).
#[derive(Debug, Clone)]
pub enum PeripheralEvent {
    Attach { name: String, kind: RtuDeviceKind },
    Detach { name: String },
}

/// The supervisor state machine.
pub struct SupervisorCore {
    config: SupervisorConfig,
    auth: Option<FrameAuthenticator>,
    registry: SessionRegistry,
    facility: Facility,
    timers: TimerTable,
    outbound: VecDeque<OutboundFrame>,
}

impl SupervisorCore {
    pub fn new(config: SupervisorConfig) -> Self {
        let auth = if config.comms.auth_enabled() {
            Some(FrameAuthenticator::new(config.comms.auth_key.as_bytes()))
        } else {
            None
        };
        let facility = Facility::new(&config);
        Self {
            config,
            auth,
            registry: SessionRegistry::new(),
            facility,
            timers: TimerTable::new(),
            outbound: VecDeque::new(),
        }
    }

    pub fn facility(&self) -> &Facility {
        &self.facility
    }

    pub fn facility_mut(&mut self) -> &mut Facility {
        &mut self.facility
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Channels the supervisor listens on: device side and coordinator side.
    pub fn listen_channels(&self) -> (u16, u16) {
        (self.config.comms.svr_channel, self.config.comms.crd_channel)
    }

    pub fn drain_outbound(&mut self) -> Vec<OutboundFrame> {
        self.outbound.drain(..).collect()
    }

    // ---- Inbound ----

    /// Process one datagram from the transport.
    pub fn handle_datagram(&mut self, dg: &Datagram, now_ms: u64) {
        let trusted_range = self.config.comms.trusted_range;
        if trusted_range > 0.0 && dg.distance > trusted_range {
            warn!(
                "dropping datagram from {}: distance {:.1} beyond trusted range {:.1}",
                dg.src, dg.distance, trusted_range
            );
            return;
        }

        let (dev_listen, coord_listen) = self.listen_channels();
        if dg.dst != dev_listen && dg.dst != coord_listen {
            debug!("dropping datagram for channel {} (not listening)", dg.dst);
            return;
        }

        let frame = match Frame::decode(&dg.payload, self.auth.as_ref(), now_ms) {
            Ok(frame) => frame,
            Err(e) if matches!(e, fission_comlink::ComLinkError::Auth(_)) => {
                warn!("dropping datagram from {}: {}", dg.src, e);
                return;
            }
            Err(e) => {
                debug!("dropping datagram from {}: {}", dg.src, e);
                return;
            }
        };

        let packet = match decode_packet(frame.protocol, &frame.payload) {
            Ok(packet) => packet,
            Err(e) => {
                debug!("dropping {} packet from {}: {}", frame.protocol, dg.src, e);
                return;
            }
        };

        self.route(dg.src, frame.seq, packet, now_ms);
    }

    /// Session lookup and inbox dispatch. Orphan link requests start a
    /// handshake; every other orphan packet draws a DENY hint so the peer
    /// re-links.
    fn route(&mut self, src: u16, seq: u32, packet: Packet, now_ms: u64) {
        let kind = match &packet {
            Packet::Modbus(_) | Packet::ModbusReply(_) => Some(SessionKind::Rtu),
            Packet::Rplc(_) => Some(SessionKind::Plc),
            // Mgmt and coord traffic resolves through the address index
            Packet::Mgmt(_) | Packet::Coord(_) => self.find_kind(src),
        };

        let session_id = kind.and_then(|k| self.registry.find(k, src).map(|s| s.id));

        match session_id {
            Some(id) => {
                // Replay window check before anything touches the session
                let session = match self.registry.get_mut(id) {
                    Some(s) => s,
                    None => return,
                };
                if let Err(e) = session.seq_rx.accept(seq) {
                    warn!("session {}: {}", id, e);
                    return;
                }
                session.touch(now_ms);
                self.dispatch(id, packet, now_ms);
            }
            None => self.handle_orphan(src, packet, now_ms),
        }
    }

    fn find_kind(&self, src: u16) -> Option<SessionKind> {
        for kind in [
            SessionKind::Plc,
            SessionKind::Rtu,
            SessionKind::Coordinator,
            SessionKind::Pocket,
        ] {
            if self.registry.find(kind, src).is_some() {
                return Some(kind);
            }
        }
        None
    }

    fn handle_orphan(&mut self, src: u16, packet: Packet, now_ms: u64) {
        match packet {
            Packet::Rplc(RplcPacket::LinkReq { version, reactor_id }) => {
                self.handshake_plc(src, version, reactor_id, now_ms);
            }
            Packet::Mgmt(MgmtPacket::RtuAdvert { version, units }) => {
                self.handshake_rtu(src, version, &units, now_ms);
            }
            Packet::Mgmt(MgmtPacket::Establish { version, endpoint }) => {
                self.handshake_coord(src, version, endpoint, now_ms);
            }
            other => {
                debug!("orphan {} packet from {}, sending deny hint", kind_name(&other), src);
                match other {
                    Packet::Rplc(_) => self.send_unsessioned(
                        src,
                        self.config.comms.svr_channel,
                        ProtocolId::Rplc,
                        RplcPacket::LinkAck { result: LinkResult::Deny }.encode(),
                        now_ms,
                    ),
                    Packet::Coord(_) => self.send_unsessioned(
                        src,
                        self.config.comms.crd_channel,
                        ProtocolId::ScadaMgmt,
                        MgmtPacket::Close.encode(),
                        now_ms,
                    ),
                    _ => self.send_unsessioned(
                        src,
                        self.config.comms.svr_channel,
                        ProtocolId::ScadaMgmt,
                        MgmtPacket::Close.encode(),
                        now_ms,
                    ),
                }
            }
        }
    }

    // ---- Handshakes ----

    fn handshake_plc(&mut self, src: u16, version: u16, reactor_id: u8, now_ms: u64) {
        let outcome = self.registry.establish_plc(
            src,
            version,
            reactor_id,
            self.config.facility.unit_count,
            now_ms,
            self.config.comms.timeout_for_plc(),
        );

        if let Some(id) = outcome.session_id {
            if let Some(unit) = self.facility.unit_mut(reactor_id) {
                unit.attach_plc(id);
            }
            self.timers
                .arm_periodic(TimerId::KeepAlive(id), now_ms, Duration::from_millis(KEEPALIVE_PERIOD_MS));
            self.send_to_session(
                id,
                ProtocolId::Rplc,
                RplcPacket::LinkAck { result: LinkResult::Allow }.encode(),
                now_ms,
            );
        } else {
            self.send_unsessioned(
                src,
                self.config.comms.svr_channel,
                ProtocolId::Rplc,
                RplcPacket::LinkAck { result: outcome.result }.encode(),
                now_ms,
            );
        }
    }

    fn handshake_rtu(
        &mut self,
        src: u16,
        version: u16,
        units: &[fission_comlink::mgmt::RtuAdvertUnit],
        now_ms: u64,
    ) {
        let outcome =
            self.registry
                .establish_rtu(src, version, now_ms, self.config.comms.timeout_for_rtu());

        let Some(id) = outcome.session_id else {
            self.send_unsessioned(
                src,
                self.config.comms.svr_channel,
                ProtocolId::ScadaMgmt,
                MgmtPacket::EstablishAck { result: outcome.result }.encode(),
                now_ms,
            );
            return;
        };

        // Validate the advert against the facility build
        let ctx = AdvertContext {
            unit_count: self.config.facility.unit_count,
            boilers: self
                .config
                .facility
                .cooling
                .iter()
                .map(|c| c.boiler_count)
                .collect(),
            turbines: self
                .config
                .facility
                .cooling
                .iter()
                .map(|c| c.turbine_count)
                .collect(),
            imatrix_present: self.rtu_kind_attached(RtuDeviceKind::InductionMatrix, id),
            sps_present: self.rtu_kind_attached(RtuDeviceKind::Sps, id),
        };

        let (accepted, rejected) = match self
            .registry
            .get_mut(id)
            .and_then(|s| s.rtu_mut())
        {
            Some(rtu) => rtu.accept_advert(&ctx, units),
            None => return,
        };

        // Arm formed polling for accepted multiblock entries
        let poll_uids: Vec<u8> = {
            let session = self.registry.get(id);
            session
                .and_then(|s| s.rtu())
                .map(|rtu| {
                    rtu.entries
                        .iter()
                        .filter(|e| e.kind.is_multiblock())
                        .map(|e| e.uid)
                        .collect()
                })
                .unwrap_or_default()
        };
        for uid in poll_uids {
            self.timers.arm_periodic(
                TimerId::FormedPoll(id, uid),
                now_ms,
                Duration::from_millis(FORMED_POLL_MS),
            );
        }
        self.timers
            .arm_periodic(TimerId::KeepAlive(id), now_ms, Duration::from_millis(KEEPALIVE_PERIOD_MS));

        info!(
            "RTU session {}: {} units accepted, {} rejected",
            id,
            accepted.len(),
            rejected.len()
        );
        self.send_to_session(
            id,
            ProtocolId::ScadaMgmt,
            MgmtPacket::RtuAdvertAck { accepted, rejected }.encode(),
            now_ms,
        );
    }

    fn handshake_coord(&mut self, src: u16, version: u16, endpoint: MgmtEndpoint, now_ms: u64) {
        let timeout = match endpoint {
            MgmtEndpoint::Coordinator => self.config.comms.timeout_for_crd(),
            MgmtEndpoint::Pocket => self.config.comms.timeout_for_pkt(),
        };
        let outcome = self
            .registry
            .establish_coord(src, version, endpoint, now_ms, timeout);

        match outcome.session_id {
            Some(id) => {
                self.timers.arm_periodic(
                    TimerId::KeepAlive(id),
                    now_ms,
                    Duration::from_millis(KEEPALIVE_PERIOD_MS),
                );
                self.send_to_session(
                    id,
                    ProtocolId::ScadaMgmt,
                    MgmtPacket::EstablishAck { result: LinkResult::Allow }.encode(),
                    now_ms,
                );
                self.push_builds(id, now_ms);
            }
            None => self.send_unsessioned(
                src,
                self.config.comms.crd_channel,
                ProtocolId::ScadaMgmt,
                MgmtPacket::EstablishAck { result: outcome.result }.encode(),
                now_ms,
            ),
        }
    }

    fn rtu_kind_attached(&self, kind: RtuDeviceKind, exclude_session: u32) -> bool {
        self.registry
            .iter()
            .filter(|s| s.id != exclude_session)
            .filter_map(|s| s.rtu())
            .any(|rtu| rtu.has_kind(kind))
    }

    // ---- Established-session dispatch ----

    fn dispatch(&mut self, id: u32, packet: Packet, now_ms: u64) {
        match packet {
            Packet::Rplc(rplc) => self.dispatch_plc(id, rplc, now_ms),
            Packet::Modbus(req) => self.dispatch_modbus(id, req, now_ms),
            Packet::ModbusReply(_) => {
                debug!("session {}: unexpected MODBUS reply at supervisor, dropped", id);
            }
            Packet::Mgmt(mgmt) => self.dispatch_mgmt(id, mgmt, now_ms),
            Packet::Coord(coord) => self.dispatch_coord(id, coord, now_ms),
        }
    }

    fn dispatch_plc(&mut self, id: u32, packet: RplcPacket, now_ms: u64) {
        let Some(session) = self.registry.get_mut(id) else { return };
        let Some(plc) = session.plc_mut() else {
            warn!("session {}: RPLC packet on non-PLC session", id);
            return;
        };

        match packet {
            RplcPacket::Status { status } => {
                plc.status = status;
                plc.has_status = true;
            }
            RplcPacket::RpsStatus { tripped, trips } => {
                plc.rps_tripped = tripped;
                plc.rps_trips = trips;
            }
            RplcPacket::RpsAlarm { trips } => {
                plc.rps_tripped = true;
                plc.rps_trips = trips;
            }
            RplcPacket::TelemetryDelta { fields } => {
                let reactor_id = plc.reactor_id;
                if let Some(unit) = self.facility.unit_mut(reactor_id) {
                    unit.ingest_delta(&fields);
                    // Keep the session copy coherent with the merged snapshot
                    if let Some(plc) = self.registry.get_mut(id).and_then(|s| s.plc_mut()) {
                        if let Some(u) = self.facility.unit(reactor_id) {
                            plc.status = u.db.clone();
                        }
                    }
                }
            }
            RplcPacket::LinkReq { .. } => {
                // Re-link on a live session: peer restarted; collide
                self.send_to_session(
                    id,
                    ProtocolId::Rplc,
                    RplcPacket::LinkAck { result: LinkResult::Collision }.encode(),
                    now_ms,
                );
            }
            RplcPacket::LinkAck { .. } | RplcPacket::Command { .. } => {
                debug!("session {}: unexpected RPLC packet direction, dropped", id);
            }
        }
    }

    fn dispatch_modbus(&mut self, id: u32, req: ModbusRequest, now_ms: u64) {
        let reply = {
            let Some(rtu) = self.registry.get_mut(id).and_then(|s| s.rtu_mut()) else {
                warn!("session {}: MODBUS request on non-RTU session", id);
                return;
            };
            match rtu.entry_mut(req.unit_id) {
                Some(entry) => entry.handle_request(&req),
                None => {
                    debug!("session {}: MODBUS request for unknown uid {}", id, req.unit_id);
                    ModbusReply::exception(&req, ExceptionCode::ServerDeviceFailure)
                }
            }
        };
        self.send_to_session(id, ProtocolId::Modbus, reply.encode(), now_ms);
    }

    fn dispatch_mgmt(&mut self, id: u32, packet: MgmtPacket, now_ms: u64) {
        match packet {
            MgmtPacket::KeepAlive { sent_ms, reply } => {
                if reply {
                    if let Some(coord) = self.registry.get_mut(id).and_then(|s| s.coord_mut()) {
                        coord.record_keepalive(sent_ms, now_ms);
                    }
                } else {
                    self.send_to_session(
                        id,
                        ProtocolId::ScadaMgmt,
                        MgmtPacket::KeepAlive { sent_ms, reply: true }.encode(),
                        now_ms,
                    );
                }
            }
            MgmtPacket::Close => {
                info!("session {}: peer closed", id);
                self.close_session(id);
            }
            MgmtPacket::DiagToneTest { states } => {
                if self.session_can_command(id) {
                    self.facility.mixer_mut().set_tone_test(states);
                }
            }
            MgmtPacket::DiagAlarmTest { alarm, active } => {
                if self.session_can_command(id) {
                    self.facility.mixer_mut().set_alarm_test(alarm, active);
                }
            }
            MgmtPacket::RtuAdvert { version, units } => {
                // Re-advert over a live session rebuilds it
                let addr = match self.registry.get(id) {
                    Some(s) => s.remote_addr,
                    None => return,
                };
                self.close_session(id);
                self.handshake_rtu(addr, version, &units, now_ms);
            }
            MgmtPacket::Establish { .. }
            | MgmtPacket::EstablishAck { .. }
            | MgmtPacket::RtuAdvertAck { .. }
            | MgmtPacket::Remounted { .. } => {
                debug!("session {}: unexpected MGMT packet direction, dropped", id);
            }
        }
    }

    fn session_can_command(&self, id: u32) -> bool {
        self.registry
            .get(id)
            .and_then(|s| s.coord())
            .map(|c| c.can_command())
            .unwrap_or(false)
    }

    fn dispatch_coord(&mut self, id: u32, packet: CoordPacket, now_ms: u64) {
        if !self.session_can_command(id) {
            match packet {
                CoordPacket::FacCmd { .. } | CoordPacket::UnitCmd { .. } => {
                    warn!("session {}: command from read-only endpoint refused", id);
                    self.send_to_session(
                        id,
                        ProtocolId::CoordData,
                        CoordPacket::CmdAck { ok: false, detail: "read-only endpoint".into() }
                            .encode(),
                        now_ms,
                    );
                    return;
                }
                _ => {}
            }
        }

        match packet {
            CoordPacket::FacCmd { command } => {
                let outcome = self.facility.handle_fac_command(&command);
                self.send_to_session(
                    id,
                    ProtocolId::CoordData,
                    CoordPacket::CmdAck { ok: outcome.ok, detail: outcome.detail }.encode(),
                    now_ms,
                );
            }
            CoordPacket::UnitCmd { unit, command } => {
                let (outcome, plc_cmd) = self.facility.handle_unit_command(unit, &command);
                if let Some(cmd) = plc_cmd {
                    self.send_plc_command(unit, cmd, now_ms);
                }
                self.send_to_session(
                    id,
                    ProtocolId::CoordData,
                    CoordPacket::CmdAck { ok: outcome.ok, detail: outcome.detail }.encode(),
                    now_ms,
                );
            }
            other => {
                debug!("session {}: unexpected COORD packet dropped: {:?}", id, other);
            }
        }
    }

    // ---- Peripheral manager events ----

    /// Out-of-band device attach/detach from the peripheral manager.
    pub fn handle_peripheral_event(&mut self, event: PeripheralEvent) {
        match event {
            PeripheralEvent::Detach { name } => {
                for session in self.registry.iter_mut() {
                    if let SessionDetail::Rtu(rtu) = &mut session.detail {
                        if let Some(entry) = rtu.entry_by_name_mut(&name) {
                            entry.detach();
                            return;
                        }
                    }
                }
                debug!("detach event for unknown device '{}'", name);
            }
            PeripheralEvent::Attach { name, kind } => {
                for session in self.registry.iter_mut() {
                    if let SessionDetail::Rtu(rtu) = &mut session.detail {
                        if let Some(entry) = rtu.entry_by_name_mut(&name) {
                            if let Err(e) = entry.attach(kind) {
                                warn!("{}", e);
                            }
                            return;
                        }
                    }
                }
                debug!("attach event for unknown device '{}'", name);
            }
        }
    }

    // ---- Tick ----

    /// One 2 Hz supervisor tick: timers, watchdogs, telemetry copy,
    /// facility update, command push, status push.
    pub fn tick(&mut self, now_ms: u64) {
        self.run_timers(now_ms);
        self.prune_sessions(now_ms);
        self.copy_plc_telemetry();
        self.sync_unit_devices();

        let readings = self.collect_readings();
        let output = self.facility.update(now_ms, &readings);

        if output.scram_all {
            self.broadcast_scram(now_ms);
        }
        self.push_burn_commands(now_ms, readings.sps_online);
        self.push_status(now_ms);
    }

    fn run_timers(&mut self, now_ms: u64) {
        for timer in self.timers.due(now_ms) {
            match timer {
                TimerId::FormedPoll(session_id, uid) => {
                    let remounted = self
                        .registry
                        .get_mut(session_id)
                        .and_then(|s| s.rtu_mut())
                        .and_then(|rtu| rtu.entry_mut(uid))
                        .map(|entry| entry.poll_formed())
                        .unwrap_or(false);
                    if remounted {
                        self.notify_remount(uid, now_ms);
                    }
                }
                TimerId::KeepAlive(session_id) => {
                    if self.registry.get(session_id).is_some() {
                        self.send_to_session(
                            session_id,
                            ProtocolId::ScadaMgmt,
                            MgmtPacket::KeepAlive { sent_ms: now_ms, reply: false }.encode(),
                            now_ms,
                        );
                    } else {
                        self.timers.cancel(&TimerId::KeepAlive(session_id));
                    }
                }
                TimerId::BurnResend(_) => {}
            }
        }
    }

    /// Tell every coordinator/pocket session that a multiblock re-formed.
    fn notify_remount(&mut self, uid: u8, now_ms: u64) {
        let targets: Vec<u32> = self
            .registry
            .iter()
            .filter(|s| matches!(s.kind, SessionKind::Coordinator | SessionKind::Pocket))
            .map(|s| s.id)
            .collect();
        for target in targets {
            self.send_to_session(
                target,
                ProtocolId::ScadaMgmt,
                MgmtPacket::Remounted { uid }.encode(),
                now_ms,
            );
        }
    }

    fn prune_sessions(&mut self, now_ms: u64) {
        for session in self.registry.tick(now_ms) {
            self.detach_session_resources(&session);
        }
    }

    fn close_session(&mut self, id: u32) {
        if let Some(session) = self.registry.close(id) {
            self.detach_session_resources(&session);
        }
    }

    fn detach_session_resources(&mut self, session: &crate::session::Session) {
        self.timers.cancel_session(session.id);
        match &session.detail {
            SessionDetail::Plc(plc) => {
                if let Some(unit) = self.facility.unit_mut(plc.reactor_id) {
                    unit.detach_plc(session.id);
                }
            }
            SessionDetail::Rtu(rtu) => {
                // Unit-scoped device links disappear with the session
                let touched: Vec<u8> = rtu
                    .entries
                    .iter()
                    .filter(|e| e.reactor >= 1)
                    .map(|e| e.reactor)
                    .collect();
                for reactor in touched {
                    if let Some(unit) = self.facility.unit_mut(reactor) {
                        unit.clear_device_links();
                    }
                }
            }
            SessionDetail::Coord(_) => {}
        }
    }

    /// Copy telemetry snapshots from PLC sessions into their units.
    fn copy_plc_telemetry(&mut self) {
        for unit in &mut self.facility.units {
            let Some(session_id) = unit.plc_session() else { continue };
            let Some(plc) = self.registry.get(session_id).and_then(|s| s.plc()) else {
                continue;
            };
            if plc.has_status {
                unit.ingest_status(plc.status.clone());
            }
            unit.ingest_rps(plc.rps_tripped, plc.rps_trips);
        }
    }

    /// Refresh per-unit boiler/turbine link states from RTU entries.
    fn sync_unit_devices(&mut self) {
        #[allow(clippy::type_complexity)]
        let mut links: Vec<(u8, RtuDeviceKind, u8, DeviceLink)> = Vec::new();
        for session in self.registry.iter() {
            let Some(rtu) = session.rtu() else { continue };
            for entry in &rtu.entries {
                if entry.reactor >= 1 {
                    links.push((
                        entry.reactor,
                        entry.kind,
                        entry.index,
                        DeviceLink {
                            hw_state: entry.hw_state,
                            trip: entry.server.turbine_trip(),
                        },
                    ));
                }
            }
        }
        for (reactor, kind, index, link) in links {
            let Some(unit) = self.facility.unit_mut(reactor) else { continue };
            match kind {
                RtuDeviceKind::BoilerValve => unit.set_boiler_link(index, link),
                RtuDeviceKind::TurbineValve => unit.set_turbine_link(index, link),
                _ => {}
            }
        }
    }

    /// Collect matrix/SPS/radiation readings from online RTU entries.
    fn collect_readings(&self) -> DeviceReadings {
        let mut readings = DeviceReadings::default();
        for session in self.registry.iter() {
            let Some(rtu) = session.rtu() else { continue };
            for entry in &rtu.entries {
                match entry.kind {
                    RtuDeviceKind::InductionMatrix if entry.is_online() => {
                        readings.matrix = Some(MatrixReading {
                            charge: entry.server.charge_fraction(),
                            inflow: entry.server.inflow_kfe(),
                            outflow: entry.server.outflow_kfe(),
                        });
                    }
                    RtuDeviceKind::Sps if entry.is_online() => {
                        readings.sps_online = true;
                    }
                    RtuDeviceKind::EnvDetector if entry.is_online() => {
                        readings.max_radiation_msv_h = readings
                            .max_radiation_msv_h
                            .max(entry.server.radiation_msv_h());
                    }
                    _ => {}
                }
            }
        }
        readings
    }

    fn broadcast_scram(&mut self, now_ms: u64) {
        warn!("broadcasting SCRAM to all linked PLCs");
        let plcs: Vec<u32> = self
            .registry
            .iter()
            .filter(|s| s.kind == SessionKind::Plc)
            .map(|s| s.id)
            .collect();
        for id in plcs {
            self.send_to_session(
                id,
                ProtocolId::Rplc,
                RplcPacket::Command { command: PlcCommand::Scram }.encode(),
                now_ms,
            );
        }
    }

    /// Idempotent burn-rate/waste command push for every linked unit.
    fn push_burn_commands(&mut self, now_ms: u64, sps_online: bool) {
        #[allow(clippy::type_complexity)]
        let mut pending: Vec<(u32, PlcCommand)> = Vec::new();

        for unit in &self.facility.units {
            let Some(session_id) = unit.plc_session() else { continue };
            let waste = self.facility.effective_waste_mode(unit, sps_online);
            let target = unit.burn_target;

            if let Some(plc) = self.registry.get_mut(session_id).and_then(|s| s.plc_mut()) {
                if plc.burn_command_due(target) {
                    pending.push((session_id, PlcCommand::SetBurnRate { rate: target }));
                }
                if plc.waste_command_due(waste) {
                    pending.push((session_id, PlcCommand::SetWaste { mode: waste }));
                }
            }
        }

        for (session_id, command) in pending {
            self.send_to_session(
                session_id,
                ProtocolId::Rplc,
                RplcPacket::Command { command }.encode(),
                now_ms,
            );
        }
    }

    fn send_plc_command(&mut self, unit_id: u8, command: PlcCommand, now_ms: u64) {
        let Some(session_id) = self.facility.unit(unit_id).and_then(|u| u.plc_session()) else {
            debug!("unit {}: no PLC linked, command dropped", unit_id);
            return;
        };
        self.send_to_session(
            session_id,
            ProtocolId::Rplc,
            RplcPacket::Command { command }.encode(),
            now_ms,
        );
    }

    /// Push facility and unit status frames to every coordinator/pocket.
    fn push_status(&mut self, now_ms: u64) {
        let targets: Vec<(u32, bool)> = self
            .registry
            .iter()
            .filter(|s| matches!(s.kind, SessionKind::Coordinator | SessionKind::Pocket))
            .filter_map(|s| s.coord().map(|c| (s.id, c.builds_sent)))
            .collect();
        if targets.is_empty() {
            return;
        }

        let fac_status = CoordPacket::FacStatus { status: Box::new(self.facility.fac_status()) }.encode();
        let unit_statuses: Vec<Bytes> = self
            .facility
            .units
            .iter()
            .map(|u| CoordPacket::UnitStatus { status: Box::new(self.facility.unit_status(u)) }.encode())
            .collect();

        for (id, builds_sent) in targets {
            if !builds_sent {
                self.push_builds(id, now_ms);
            }
            self.send_to_session(id, ProtocolId::CoordData, fac_status.clone(), now_ms);
            for status in &unit_statuses {
                self.send_to_session(id, ProtocolId::CoordData, status.clone(), now_ms);
            }
        }
    }

    fn push_builds(&mut self, id: u32, now_ms: u64) {
        let builds: Vec<UnitBuild> = self
            .config
            .facility
            .cooling
            .iter()
            .enumerate()
            .map(|(i, c)| UnitBuild {
                id: i as u8 + 1,
                boilers: c.boiler_count,
                turbines: c.turbine_count,
                tank_connection: c.tank_connection,
            })
            .collect();

        self.send_to_session(
            id,
            ProtocolId::CoordData,
            CoordPacket::FacBuilds { units: builds.clone() }.encode(),
            now_ms,
        );
        self.send_to_session(
            id,
            ProtocolId::CoordData,
            CoordPacket::UnitBuilds { units: builds }.encode(),
            now_ms,
        );
        if let Some(coord) = self.registry.get_mut(id).and_then(|s| s.coord_mut()) {
            coord.builds_sent = true;
        }
    }

    // ---- Outbound ----

    fn send_to_session(&mut self, id: u32, protocol: ProtocolId, payload: Bytes, now_ms: u64) {
        let (dst, seq, kind) = match self.registry.get_mut(id) {
            Some(session) => (session.remote_addr, session.seq_tx.next(), session.kind),
            None => return,
        };
        let src = match kind {
            SessionKind::Plc | SessionKind::Rtu => self.config.comms.svr_channel,
            SessionKind::Coordinator | SessionKind::Pocket => self.config.comms.crd_channel,
        };
        self.queue_frame(dst, src, protocol, seq, payload, now_ms);
    }

    /// Reply to a peer that has no session (handshake denials, orphan
    /// hints). Sequence number 0; the peer accepts it statelessly.
    fn send_unsessioned(
        &mut self,
        dst: u16,
        src: u16,
        protocol: ProtocolId,
        payload: Bytes,
        now_ms: u64,
    ) {
        self.queue_frame(dst, src, protocol, 0, payload, now_ms);
    }

    fn queue_frame(
        &mut self,
        dst: u16,
        src: u16,
        protocol: ProtocolId,
        seq: u32,
        payload: Bytes,
        now_ms: u64,
    ) {
        let frame = Frame::new(protocol, seq, now_ms, payload);
        match frame.encode(self.auth.as_ref()) {
            Ok(bytes) => self.outbound.push_back(OutboundFrame { dst, src, bytes }),
            Err(e) => warn!("outbound frame dropped: {}", e),
        }
    }
}

fn kind_name(packet: &Packet) -> &'static str {
    match packet {
        Packet::Modbus(_) => "MODBUS request",
        Packet::ModbusReply(_) => "MODBUS reply",
        Packet::Rplc(_) => "RPLC",
        Packet::Mgmt(_) => "SCADA_MGMT",
        Packet::Coord(_) => "COORD_DATA",
    }
}
