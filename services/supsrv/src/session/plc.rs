//! Reactor PLC session state
//!
//! After the RPLC handshake the PLC streams status, RPS state and telemetry
//! deltas; the supervisor pushes commands. Burn-rate commands are
//! idempotent on the wire: the supervisor re-sends the current target until
//! the PLC's reported burn converges.

use fission_comlink::protocols::WasteMode;
use fission_comlink::rplc::{ReactorStatus, RpsTrips};

/// Ticks between burn-rate command repeats while unconverged.
pub const BURN_RESEND_TICKS: u32 = 4;

/// Reported burn within this band of the command counts as converged.
pub const BURN_CMD_TOLERANCE: f64 = 0.01;

/// Session-local state for one linked PLC.
#[derive(Debug, Clone)]
pub struct PlcSessionState {
    pub reactor_id: u8,
    /// RPS mirror received with the handshake and kept current
    pub rps_tripped: bool,
    pub rps_trips: RpsTrips,
    /// Latest full telemetry snapshot
    pub status: ReactorStatus,
    /// A status has been received since link-up
    pub has_status: bool,

    last_burn_cmd: Option<f64>,
    ticks_since_burn_cmd: u32,
    last_waste_cmd: Option<WasteMode>,
}

impl PlcSessionState {
    pub fn new(reactor_id: u8) -> Self {
        Self {
            reactor_id,
            rps_tripped: false,
            rps_trips: RpsTrips::default(),
            status: ReactorStatus::default(),
            has_status: false,
            last_burn_cmd: None,
            ticks_since_burn_cmd: 0,
            last_waste_cmd: None,
        }
    }

    /// Decide whether a `SetBurnRate(target)` must go on the wire this
    /// tick. A new target sends immediately; an unconverged target repeats
    /// every [`BURN_RESEND_TICKS`] ticks.
    pub fn burn_command_due(&mut self, target: f64) -> bool {
        let changed = self
            .last_burn_cmd
            .map(|last| (last - target).abs() > f64::EPSILON)
            .unwrap_or(true);

        if changed {
            self.last_burn_cmd = Some(target);
            self.ticks_since_burn_cmd = 0;
            return true;
        }

        let converged = (self.status.burn_rate - target).abs() <= BURN_CMD_TOLERANCE;
        if converged {
            self.ticks_since_burn_cmd = 0;
            return false;
        }

        self.ticks_since_burn_cmd += 1;
        if self.ticks_since_burn_cmd >= BURN_RESEND_TICKS {
            self.ticks_since_burn_cmd = 0;
            true
        } else {
            false
        }
    }

    /// Waste mode commands send only on change.
    pub fn waste_command_due(&mut self, mode: WasteMode) -> bool {
        if self.last_waste_cmd != Some(mode) {
            self.last_waste_cmd = Some(mode);
            true
        } else {
            false
        }
    }
}
