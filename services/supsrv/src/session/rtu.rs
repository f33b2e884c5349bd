//! RTU gateway session
//!
//! An RTU gateway advertises the device units it exposes; the supervisor
//! validates each entry, pairs accepted ones with a MODBUS server instance,
//! and services the gateway's MODBUS traffic per entry. Multiblock entries
//! are polled for formation; a device detach re-types the entry as VIRTUAL
//! until the hardware returns.

use fission_comlink::mgmt::{RtuAdvertUnit, RtuRejectReason};
use fission_comlink::modbus::{ModbusReply, ModbusRequest};
use fission_comlink::protocols::RtuDeviceKind;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{Result, SupervisorError};
use crate::modbus_server::ModbusServer;

/// Multiblock formed-state poll period.
pub const FORMED_POLL_MS: u64 = 250;

/// Hardware state of one RTU unit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HwState {
    /// Device detached from its gateway
    Offline,
    /// Multiblock present but not formed
    Unformed,
    /// Device present but failing
    Faulted,
    Ok,
}

/// One advertised and accepted device unit.
#[derive(Debug)]
pub struct RtuUnitEntry {
    pub uid: u8,
    pub kind: RtuDeviceKind,
    pub name: String,
    pub index: u8,
    /// Owning reactor unit, 0 for facility-wide devices
    pub reactor: u8,
    pub hw_state: HwState,
    /// Last observed formed flag (multiblock only)
    formed: bool,
    /// Real kind while the entry is VIRTUAL after a detach
    detached_kind: Option<RtuDeviceKind>,
    pub server: ModbusServer,
}

impl RtuUnitEntry {
    fn new(uid: u8, advert: &RtuAdvertUnit) -> Self {
        let hw_state = if advert.kind.is_multiblock() {
            HwState::Unformed
        } else {
            HwState::Ok
        };
        Self {
            uid,
            kind: advert.kind,
            name: advert.name.clone(),
            index: advert.index,
            reactor: advert.reactor,
            hw_state,
            formed: false,
            detached_kind: None,
            server: ModbusServer::new(),
        }
    }

    /// Service one MODBUS request against this entry's server.
    pub fn handle_request(&mut self, req: &ModbusRequest) -> ModbusReply {
        self.server.handle(req)
    }

    /// Periodic formed-state poll. Returns true when the entry re-formed
    /// and was remounted (the coordinator must be notified).
    pub fn poll_formed(&mut self) -> bool {
        if !self.kind.is_multiblock() || self.hw_state == HwState::Offline {
            return false;
        }

        let formed_now = self.server.formed();
        let remounted = !self.formed && formed_now;
        if remounted {
            info!("entry {} ({}): multiblock formed, remounting", self.uid, self.name);
            self.server.rebind();
            self.hw_state = HwState::Ok;
        } else if self.formed && !formed_now {
            warn!("entry {} ({}): multiblock unformed", self.uid, self.name);
            self.hw_state = HwState::Unformed;
        } else if formed_now && self.server.faulted() {
            self.hw_state = HwState::Faulted;
        } else if formed_now && self.hw_state == HwState::Faulted {
            self.hw_state = HwState::Ok;
        }
        self.formed = formed_now;
        remounted
    }

    /// Device detached at the gateway: go OFFLINE and re-type as VIRTUAL.
    pub fn detach(&mut self) {
        info!("entry {} ({}): device detached", self.uid, self.name);
        self.detached_kind = Some(self.kind);
        self.kind = RtuDeviceKind::Virtual;
        self.hw_state = HwState::Offline;
        self.formed = false;
    }

    /// Device re-attached. The reported hardware kind must match what was
    /// detached; a mismatch is an error, never an implicit re-type.
    pub fn attach(&mut self, kind: RtuDeviceKind) -> Result<()> {
        let expected = self.detached_kind.unwrap_or(self.kind);
        if kind != expected {
            error!(
                "entry {} ({}): attach kind mismatch, expected {:?} got {:?}",
                self.uid, self.name, expected, kind
            );
            return Err(SupervisorError::DeviceFault(format!(
                "entry {}: attach kind mismatch ({:?} != {:?})",
                self.uid, kind, expected
            )));
        }
        info!("entry {} ({}): device re-attached", self.uid, self.name);
        self.kind = expected;
        self.detached_kind = None;
        self.hw_state = if expected.is_multiblock() {
            HwState::Unformed
        } else {
            HwState::Ok
        };
        Ok(())
    }

    pub fn is_online(&self) -> bool {
        self.hw_state == HwState::Ok
    }
}

/// Facility context an advert is validated against.
#[derive(Debug, Clone)]
pub struct AdvertContext {
    pub unit_count: u8,
    /// Boiler count per unit, index 0 = unit 1
    pub boilers: Vec<u8>,
    /// Turbine count per unit, index 0 = unit 1
    pub turbines: Vec<u8>,
    /// An induction matrix is already attached facility-wide
    pub imatrix_present: bool,
    /// An SPS is already attached facility-wide
    pub sps_present: bool,
}

/// Per-RTU-session state: the accepted unit entries.
#[derive(Debug, Default)]
pub struct RtuSessionState {
    pub entries: Vec<RtuUnitEntry>,
    next_uid: u8,
}

impl RtuSessionState {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_uid: 1,
        }
    }

    /// Validate an advert and create entries for the accepted units.
    ///
    /// Returns `(accepted, rejected)` where `accepted` pairs each advert
    /// index with its assigned uid and `rejected` pairs indices with the
    /// rejection reason, so the gateway can warn.
    pub fn accept_advert(
        &mut self,
        ctx: &AdvertContext,
        units: &[RtuAdvertUnit],
    ) -> (Vec<(u8, u8)>, Vec<(u8, RtuRejectReason)>) {
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        let mut imatrix = ctx.imatrix_present;
        let mut sps = ctx.sps_present;

        for (i, advert) in units.iter().enumerate() {
            let idx = i as u8;
            match self.validate(ctx, advert, imatrix, sps) {
                Ok(()) => {
                    match advert.kind {
                        RtuDeviceKind::InductionMatrix => imatrix = true,
                        RtuDeviceKind::Sps => sps = true,
                        _ => {}
                    }
                    let uid = self.next_uid;
                    self.next_uid = self.next_uid.wrapping_add(1).max(1);
                    debug!(
                        "accepted RTU unit {:?} '{}' (reactor {}, index {}) as uid {}",
                        advert.kind, advert.name, advert.reactor, advert.index, uid
                    );
                    self.entries.push(RtuUnitEntry::new(uid, advert));
                    accepted.push((idx, uid));
                }
                Err(reason) => {
                    warn!(
                        "rejected RTU unit {:?} '{}' (reactor {}, index {}): {:?}",
                        advert.kind, advert.name, advert.reactor, advert.index, reason
                    );
                    rejected.push((idx, reason));
                }
            }
        }

        (accepted, rejected)
    }

    fn validate(
        &self,
        ctx: &AdvertContext,
        advert: &RtuAdvertUnit,
        imatrix_present: bool,
        sps_present: bool,
    ) -> std::result::Result<(), RtuRejectReason> {
        match advert.kind {
            RtuDeviceKind::Virtual => return Err(RtuRejectReason::BadKind),
            RtuDeviceKind::InductionMatrix => {
                if imatrix_present {
                    return Err(RtuRejectReason::DuplicateImatrix);
                }
            }
            RtuDeviceKind::Sps => {
                if sps_present {
                    return Err(RtuRejectReason::DuplicateSps);
                }
            }
            _ => {}
        }

        if advert.kind.is_unit_scoped() {
            if advert.reactor < 1 || advert.reactor > ctx.unit_count {
                return Err(RtuRejectReason::BadReactor);
            }
            let unit_idx = advert.reactor as usize - 1;
            let max_index = match advert.kind {
                RtuDeviceKind::BoilerValve => ctx.boilers.get(unit_idx).copied().unwrap_or(0),
                RtuDeviceKind::TurbineValve => ctx.turbines.get(unit_idx).copied().unwrap_or(0),
                RtuDeviceKind::DynamicValve => 1,
                _ => 0,
            };
            if advert.index < 1 || advert.index > max_index {
                return Err(RtuRejectReason::BadIndex);
            }
            // The slot must not already be attached through this session
            let taken = self.entries.iter().any(|e| {
                e.kind == advert.kind && e.reactor == advert.reactor && e.index == advert.index
            });
            if taken {
                return Err(RtuRejectReason::BadIndex);
            }
        }

        Ok(())
    }

    pub fn entry(&self, uid: u8) -> Option<&RtuUnitEntry> {
        self.entries.iter().find(|e| e.uid == uid)
    }

    pub fn entry_mut(&mut self, uid: u8) -> Option<&mut RtuUnitEntry> {
        self.entries.iter_mut().find(|e| e.uid == uid)
    }

    pub fn entry_by_name_mut(&mut self, name: &str) -> Option<&mut RtuUnitEntry> {
        self.entries.iter_mut().find(|e| e.name == name)
    }

    pub fn has_kind(&self, kind: RtuDeviceKind) -> bool {
        self.entries.iter().any(|e| e.kind == kind)
    }
}
