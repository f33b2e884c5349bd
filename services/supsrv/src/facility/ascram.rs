//! Auto-SCRAM safety supervisor
//!
//! Watches facility-wide safety conditions while auto control is engaged.
//! The first matching cause trips the latch: auto control is forced to
//! INACTIVE, the cause is latched for the operator, and a single
//! `scram_all` broadcast goes to every PLC. The latch holds until the
//! operator acknowledges and re-issues `auto_start`.

use fission_comlink::coord::AscramStatus;
use fission_comlink::protocols::{AscramReason, ProcessMode};
use tracing::{info, warn};

/// Matrix charge fraction that trips MATRIX_FILL.
pub const MATRIX_FILL_TRIP: f64 = 0.99;

/// Environment detector level (mSv/h) that trips RADIATION.
pub const RADIATION_TRIP_MSV_H: f64 = 1.0;

/// Safety conditions sampled once per tick.
#[derive(Debug, Clone, Copy)]
pub struct SafetyInputs {
    pub mode: ProcessMode,
    pub matrix_online: bool,
    /// Charge fraction when a matrix is online
    pub matrix_charge: Option<f64>,
    pub any_crit_alarm: bool,
    /// Highest environment detector reading (mSv/h)
    pub max_radiation: f64,
    /// Generation loop integrator saturation latch
    pub gen_saturated: bool,
    /// At least one unit in an active group can burn
    pub any_unit_ready: bool,
}

/// Action the facility must take after an evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AscramTrip {
    pub reason: AscramReason,
    /// True exactly once per trip: broadcast `scram_all` to every PLC
    pub broadcast_scram: bool,
}

/// Latching auto-SCRAM supervisor.
#[derive(Debug, Clone, Default)]
pub struct AscramSupervisor {
    tripped: Option<AscramReason>,
    scram_sent: bool,
    status: AscramStatus,
    /// A matrix has been online during this engagement; "disconnected"
    /// means it was seen and then lost, not that none was ever fitted
    matrix_seen: bool,
}

impl AscramSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tripped(&self) -> Option<AscramReason> {
        self.tripped
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.is_some()
    }

    pub fn status(&self) -> AscramStatus {
        self.status
    }

    /// Evaluate the ordered cause list. Re-evaluating with unchanged inputs
    /// never issues a second broadcast.
    pub fn evaluate(&mut self, inputs: &SafetyInputs) -> Option<AscramTrip> {
        if inputs.mode == ProcessMode::Inactive && self.tripped.is_none() {
            self.matrix_seen = false;
        } else if inputs.matrix_online {
            self.matrix_seen = true;
        }

        let cause = self.check(inputs);

        // Per-cause latches surface on the operator panel even when a
        // different (earlier) cause took the trip
        if let Some(reason) = cause {
            match reason {
                AscramReason::MatrixDisconnect => self.status.matrix_dc = true,
                AscramReason::MatrixFill => self.status.matrix_fill = true,
                AscramReason::CritAlarm => self.status.crit_alarm = true,
                AscramReason::Radiation => self.status.radiation = true,
                AscramReason::GenFault => self.status.gen_fault = true,
            }
        }

        match (self.tripped, cause) {
            (None, Some(reason)) => {
                warn!("AUTO SCRAM: {:?}", reason);
                self.tripped = Some(reason);
                self.scram_sent = true;
                Some(AscramTrip { reason, broadcast_scram: true })
            }
            (Some(reason), _) => {
                // Already latched: no further broadcasts
                Some(AscramTrip { reason, broadcast_scram: false })
            }
            (None, None) => None,
        }
    }

    fn check(&self, inputs: &SafetyInputs) -> Option<AscramReason> {
        // The supervisor only arms while auto control is engaged
        if inputs.mode == ProcessMode::Inactive && self.tripped.is_none() {
            return None;
        }

        if self.matrix_seen && !inputs.matrix_online {
            return Some(AscramReason::MatrixDisconnect);
        }
        if inputs.matrix_charge.unwrap_or(0.0) >= MATRIX_FILL_TRIP {
            return Some(AscramReason::MatrixFill);
        }
        if inputs.any_crit_alarm {
            return Some(AscramReason::CritAlarm);
        }
        if inputs.max_radiation >= RADIATION_TRIP_MSV_H {
            return Some(AscramReason::Radiation);
        }
        if matches!(inputs.mode, ProcessMode::GenRate | ProcessMode::GenRateFaultIdle)
            && inputs.gen_saturated
            && !inputs.any_unit_ready
        {
            return Some(AscramReason::GenFault);
        }
        None
    }

    /// Operator acknowledge: clears the latch and the per-cause panel so
    /// auto control may be re-armed with a fresh `auto_start`.
    pub fn acknowledge(&mut self) -> bool {
        if self.tripped.is_some() {
            info!("auto SCRAM acknowledged, reason cleared: {:?}", self.tripped);
            self.tripped = None;
            self.scram_sent = false;
            self.status = AscramStatus::default();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy(mode: ProcessMode) -> SafetyInputs {
        SafetyInputs {
            mode,
            matrix_online: true,
            matrix_charge: Some(0.5),
            any_crit_alarm: false,
            max_radiation: 0.0,
            gen_saturated: false,
            any_unit_ready: true,
        }
    }

    #[test]
    fn test_healthy_facility_never_trips() {
        let mut sup = AscramSupervisor::new();
        assert_eq!(sup.evaluate(&healthy(ProcessMode::Charge)), None);
        assert!(!sup.is_tripped());
    }

    #[test]
    fn test_inactive_mode_not_supervised() {
        let mut sup = AscramSupervisor::new();
        let mut inputs = healthy(ProcessMode::Inactive);
        inputs.matrix_online = false;
        assert_eq!(sup.evaluate(&inputs), None);
    }

    #[test]
    fn test_matrix_disconnect_trips_first() {
        let mut sup = AscramSupervisor::new();
        assert_eq!(sup.evaluate(&healthy(ProcessMode::Charge)), None);

        let mut inputs = healthy(ProcessMode::Charge);
        inputs.matrix_online = false;
        inputs.matrix_charge = None;
        inputs.any_crit_alarm = true; // later cause must lose

        let trip = sup.evaluate(&inputs).unwrap();
        assert_eq!(trip.reason, AscramReason::MatrixDisconnect);
        assert!(trip.broadcast_scram);
    }

    #[test]
    fn test_no_matrix_fitted_never_disconnect_trips() {
        // A facility running BURN_RATE without any matrix must not trip
        let mut sup = AscramSupervisor::new();
        let mut inputs = healthy(ProcessMode::BurnRate);
        inputs.matrix_online = false;
        inputs.matrix_charge = None;
        assert_eq!(sup.evaluate(&inputs), None);
    }

    #[test]
    fn test_matrix_fill_trip() {
        let mut sup = AscramSupervisor::new();
        let mut inputs = healthy(ProcessMode::BurnRate);
        inputs.matrix_charge = Some(0.995);

        assert_eq!(sup.evaluate(&inputs).unwrap().reason, AscramReason::MatrixFill);
        assert!(sup.status().matrix_fill);
    }

    #[test]
    fn test_radiation_trip() {
        let mut sup = AscramSupervisor::new();
        let mut inputs = healthy(ProcessMode::Monitored);
        inputs.max_radiation = 2.5;

        assert_eq!(sup.evaluate(&inputs).unwrap().reason, AscramReason::Radiation);
    }

    #[test]
    fn test_gen_fault_needs_gen_mode() {
        let mut sup = AscramSupervisor::new();
        let mut inputs = healthy(ProcessMode::BurnRate);
        inputs.gen_saturated = true;
        inputs.any_unit_ready = false;
        assert_eq!(sup.evaluate(&inputs), None);

        inputs.mode = ProcessMode::GenRate;
        assert_eq!(sup.evaluate(&inputs).unwrap().reason, AscramReason::GenFault);
    }

    #[test]
    fn test_broadcast_exactly_once() {
        let mut sup = AscramSupervisor::new();
        let mut inputs = healthy(ProcessMode::Charge);
        inputs.any_crit_alarm = true;

        let first = sup.evaluate(&inputs).unwrap();
        let second = sup.evaluate(&inputs).unwrap();
        assert!(first.broadcast_scram);
        assert!(!second.broadcast_scram);
        assert_eq!(second.reason, AscramReason::CritAlarm);
    }

    #[test]
    fn test_ack_rearms() {
        let mut sup = AscramSupervisor::new();
        let mut inputs = healthy(ProcessMode::Charge);
        inputs.any_crit_alarm = true;
        sup.evaluate(&inputs);

        assert!(sup.acknowledge());
        assert!(!sup.is_tripped());
        assert_eq!(sup.status(), AscramStatus::default());

        // A persisting condition re-trips with a fresh broadcast
        let trip = sup.evaluate(&inputs).unwrap();
        assert!(trip.broadcast_scram);
    }

    #[test]
    fn test_ack_without_trip_is_noop() {
        let mut sup = AscramSupervisor::new();
        assert!(!sup.acknowledge());
    }
}
