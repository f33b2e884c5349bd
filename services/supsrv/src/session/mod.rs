//! Session registry
//!
//! One session per linked peer, keyed by `(kind, remote address)`. The
//! registry owns session lifecycles: establishment on a valid link
//! request, watchdog-driven teardown, and inbound routing lookups.

pub mod coord;
pub mod plc;
pub mod rtu;

use std::collections::HashMap;
use std::time::Duration;

use fission_comlink::frame::{SeqCounter, SeqWindow};
use fission_comlink::mgmt::MgmtEndpoint;
use fission_comlink::protocols::LinkResult;
use tracing::{info, warn};

use crate::scheduler::Watchdog;
use coord::CoordSessionState;
use plc::PlcSessionState;
use rtu::RtuSessionState;

/// Comms version peers must match to link.
pub const SUPERVISOR_COMMS_VERSION: u16 = 3;

/// Peer kinds a session can represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKind {
    Plc,
    Rtu,
    Coordinator,
    Pocket,
}

/// Kind-specific session state.
#[derive(Debug)]
pub enum SessionDetail {
    Plc(PlcSessionState),
    Rtu(RtuSessionState),
    Coord(CoordSessionState),
}

/// One established (or establishing) peer session.
#[derive(Debug)]
pub struct Session {
    pub id: u32,
    pub kind: SessionKind,
    /// The peer's reply channel
    pub remote_addr: u16,
    pub seq_rx: SeqWindow,
    pub seq_tx: SeqCounter,
    pub last_rx_ms: u64,
    pub watchdog: Watchdog,
    pub linked: bool,
    pub version: u16,
    pub detail: SessionDetail,
}

impl Session {
    /// Record a valid inbound packet: re-arm the watchdog.
    pub fn touch(&mut self, now_ms: u64) {
        self.last_rx_ms = now_ms;
        self.watchdog.feed(now_ms);
    }

    pub fn plc(&self) -> Option<&PlcSessionState> {
        match &self.detail {
            SessionDetail::Plc(p) => Some(p),
            _ => None,
        }
    }

    pub fn plc_mut(&mut self) -> Option<&mut PlcSessionState> {
        match &mut self.detail {
            SessionDetail::Plc(p) => Some(p),
            _ => None,
        }
    }

    pub fn rtu(&self) -> Option<&RtuSessionState> {
        match &self.detail {
            SessionDetail::Rtu(r) => Some(r),
            _ => None,
        }
    }

    pub fn rtu_mut(&mut self) -> Option<&mut RtuSessionState> {
        match &mut self.detail {
            SessionDetail::Rtu(r) => Some(r),
            _ => None,
        }
    }

    pub fn coord(&self) -> Option<&CoordSessionState> {
        match &self.detail {
            SessionDetail::Coord(c) => Some(c),
            _ => None,
        }
    }

    pub fn coord_mut(&mut self) -> Option<&mut CoordSessionState> {
        match &mut self.detail {
            SessionDetail::Coord(c) => Some(c),
            _ => None,
        }
    }
}

/// Outcome of a PLC link request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstablishOutcome {
    pub session_id: Option<u32>,
    pub result: LinkResult,
}

/// Process-wide session registry.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<u32, Session>,
    index: HashMap<(SessionKind, u16), u32>,
    next_id: u32,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            index: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn find(&self, kind: SessionKind, addr: u16) -> Option<&Session> {
        self.index
            .get(&(kind, addr))
            .and_then(|id| self.sessions.get(id))
    }

    pub fn find_mut(&mut self, kind: SessionKind, addr: u16) -> Option<&mut Session> {
        let id = *self.index.get(&(kind, addr))?;
        self.sessions.get_mut(&id)
    }

    pub fn get(&self, id: u32) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.sessions.values_mut()
    }

    fn insert(&mut self, mut session: Session) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        session.id = id;
        self.index.insert((session.kind, session.remote_addr), id);
        self.sessions.insert(id, session);
        id
    }

    fn new_session(
        &self,
        kind: SessionKind,
        addr: u16,
        version: u16,
        now_ms: u64,
        timeout: Duration,
        detail: SessionDetail,
    ) -> Session {
        Session {
            id: 0,
            kind,
            remote_addr: addr,
            seq_rx: SeqWindow::new(),
            seq_tx: SeqCounter::new(),
            last_rx_ms: now_ms,
            watchdog: Watchdog::new(timeout, now_ms),
            linked: true,
            version,
            detail,
        }
    }

    /// Reactor id already claimed by a live PLC session?
    pub fn plc_for_reactor(&self, reactor_id: u8) -> Option<&Session> {
        self.sessions.values().find(|s| {
            matches!(&s.detail, SessionDetail::Plc(p) if p.reactor_id == reactor_id)
        })
    }

    /// Establish a PLC session from a `LinkReq`.
    ///
    /// A second request for an already-claimed reactor replies COLLISION
    /// and leaves the existing session untouched; a version mismatch
    /// replies BAD_VERSION.
    pub fn establish_plc(
        &mut self,
        addr: u16,
        version: u16,
        reactor_id: u8,
        unit_count: u8,
        now_ms: u64,
        timeout: Duration,
    ) -> EstablishOutcome {
        if version != SUPERVISOR_COMMS_VERSION {
            warn!(
                "PLC link from {} rejected: version {} != {}",
                addr, version, SUPERVISOR_COMMS_VERSION
            );
            return EstablishOutcome { session_id: None, result: LinkResult::BadVersion };
        }
        if reactor_id < 1 || reactor_id > unit_count {
            warn!("PLC link from {} rejected: reactor {} unknown", addr, reactor_id);
            return EstablishOutcome { session_id: None, result: LinkResult::Deny };
        }
        if let Some(existing) = self.plc_for_reactor(reactor_id) {
            warn!(
                "PLC link from {} rejected: reactor {} claimed by session {}",
                addr, reactor_id, existing.id
            );
            return EstablishOutcome { session_id: None, result: LinkResult::Collision };
        }
        if self.index.contains_key(&(SessionKind::Plc, addr)) {
            warn!("PLC link from {} rejected: address already in session", addr);
            return EstablishOutcome { session_id: None, result: LinkResult::Collision };
        }

        let session = self.new_session(
            SessionKind::Plc,
            addr,
            version,
            now_ms,
            timeout,
            SessionDetail::Plc(PlcSessionState::new(reactor_id)),
        );
        let id = self.insert(session);
        info!("PLC session {} established for reactor {} (addr {})", id, reactor_id, addr);
        EstablishOutcome { session_id: Some(id), result: LinkResult::Allow }
    }

    /// Establish an RTU session shell. Advert validation happens in the
    /// caller where facility context lives.
    pub fn establish_rtu(
        &mut self,
        addr: u16,
        version: u16,
        now_ms: u64,
        timeout: Duration,
    ) -> EstablishOutcome {
        if version != SUPERVISOR_COMMS_VERSION {
            warn!(
                "RTU link from {} rejected: version {} != {}",
                addr, version, SUPERVISOR_COMMS_VERSION
            );
            return EstablishOutcome { session_id: None, result: LinkResult::BadVersion };
        }
        let existing = self.index.get(&(SessionKind::Rtu, addr)).copied();
        if let Some(existing) = existing {
            // A re-advert from the same gateway replaces its session
            info!("RTU re-advert from {}: closing session {}", addr, existing);
            self.close(existing);
        }

        let session = self.new_session(
            SessionKind::Rtu,
            addr,
            version,
            now_ms,
            timeout,
            SessionDetail::Rtu(RtuSessionState::new()),
        );
        let id = self.insert(session);
        info!("RTU session {} established (addr {})", id, addr);
        EstablishOutcome { session_id: Some(id), result: LinkResult::Allow }
    }

    /// Establish a coordinator or pocket session.
    pub fn establish_coord(
        &mut self,
        addr: u16,
        version: u16,
        endpoint: MgmtEndpoint,
        now_ms: u64,
        timeout: Duration,
    ) -> EstablishOutcome {
        if version != SUPERVISOR_COMMS_VERSION {
            return EstablishOutcome { session_id: None, result: LinkResult::BadVersion };
        }
        let kind = match endpoint {
            MgmtEndpoint::Coordinator => SessionKind::Coordinator,
            MgmtEndpoint::Pocket => SessionKind::Pocket,
        };
        // Only one full coordinator at a time
        if kind == SessionKind::Coordinator
            && self.sessions.values().any(|s| s.kind == SessionKind::Coordinator)
        {
            return EstablishOutcome { session_id: None, result: LinkResult::Collision };
        }
        if self.index.contains_key(&(kind, addr)) {
            return EstablishOutcome { session_id: None, result: LinkResult::Collision };
        }

        let session = self.new_session(
            kind,
            addr,
            version,
            now_ms,
            timeout,
            SessionDetail::Coord(CoordSessionState::new(endpoint)),
        );
        let id = self.insert(session);
        info!("{:?} session {} established (addr {})", kind, id, addr);
        EstablishOutcome { session_id: Some(id), result: LinkResult::Allow }
    }

    /// Close a session. The watchdog is canceled and the session returned
    /// so the caller can detach owned resources (PLC back-references, RTU
    /// projections).
    pub fn close(&mut self, id: u32) -> Option<Session> {
        let mut session = self.sessions.remove(&id)?;
        session.watchdog.cancel();
        session.linked = false;
        self.index.remove(&(session.kind, session.remote_addr));
        info!("session {} closed ({:?}, addr {})", id, session.kind, session.remote_addr);
        Some(session)
    }

    /// Scan sessions and prune those whose watchdog fired. Pruned sessions
    /// are returned for resource detachment.
    pub fn tick(&mut self, now_ms: u64) -> Vec<Session> {
        let expired: Vec<u32> = self
            .sessions
            .values()
            .filter(|s| s.watchdog.fired(now_ms))
            .map(|s| s.id)
            .collect();

        expired
            .into_iter()
            .filter_map(|id| {
                info!("session {} watchdog expired", id);
                self.close(id)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
