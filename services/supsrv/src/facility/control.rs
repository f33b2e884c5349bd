//! Facility automatic process control
//!
//! Operator-selected process modes drive a discrete-time PI loop whose
//! output is a total commanded burn rate, partitioned across units by
//! priority group and per-unit limit. BURN_RATE mode bypasses the loop and
//! partitions the operator's target directly.

use fission_comlink::coord::AutoControlConfig;
use fission_comlink::protocols::ProcessMode;
use std::collections::VecDeque;
use tracing::{debug, info};

/// Smallest accepted burn target / per-unit limit (mB/t).
pub const MIN_BURN: f64 = 0.1;

/// Initial-ramp exit threshold: commanded vs measured total within 5 %.
pub const RAMP_EXIT_FRACTION: f64 = 0.05;

/// Charge loop gains (error is a charge fraction, output mB/t).
const CHARGE_KP: f64 = 12.5;
const CHARGE_KI: f64 = 0.45;
const CHARGE_KI_RAMP: f64 = 0.12;
const CHARGE_ACCUM_MAX: f64 = 60.0;

/// Generation loop gains (error in kFE/t, output mB/t).
const GEN_KP: f64 = 0.004;
const GEN_KI: f64 = 0.0011;
const GEN_KI_RAMP: f64 = 0.00028;
const GEN_ACCUM_MAX: f64 = 5_000.0;

/// Discrete-time PI regulator with accumulator clamping and a saturation
/// latch.
#[derive(Debug, Clone)]
pub struct PiController {
    kp: f64,
    ki: f64,
    ki_ramp: f64,
    accum: f64,
    accum_min: f64,
    accum_max: f64,
    saturated: bool,
}

impl PiController {
    pub fn new(kp: f64, ki: f64, ki_ramp: f64, accum_min: f64, accum_max: f64) -> Self {
        Self {
            kp,
            ki,
            ki_ramp,
            accum: 0.0,
            accum_min,
            accum_max,
            saturated: false,
        }
    }

    pub fn charge() -> Self {
        Self::new(CHARGE_KP, CHARGE_KI, CHARGE_KI_RAMP, 0.0, CHARGE_ACCUM_MAX)
    }

    pub fn gen_rate() -> Self {
        Self::new(GEN_KP, GEN_KI, GEN_KI_RAMP, 0.0, GEN_ACCUM_MAX)
    }

    /// One integrator step. `ramping` selects the slower integral gain used
    /// during the initial ramp.
    pub fn step(&mut self, setpoint: f64, measurement: f64, dt_s: f64, ramping: bool) -> f64 {
        let err = setpoint - measurement;
        let accum = (self.accum + err * dt_s).clamp(self.accum_min, self.accum_max);
        self.saturated = accum <= self.accum_min && err < 0.0 || accum >= self.accum_max;
        self.accum = accum;

        let ki = if ramping { self.ki_ramp } else { self.ki };
        (self.kp * err + ki * self.accum).max(0.0)
    }

    pub fn reset(&mut self) {
        self.accum = 0.0;
        self.saturated = false;
    }

    pub fn saturated(&self) -> bool {
        self.saturated
    }
}

/// Fixed-window moving average over timestamped samples.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    window_ms: u64,
    samples: VecDeque<(u64, f64)>,
}

impl MovingAverage {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            samples: VecDeque::new(),
        }
    }

    pub fn sample(&mut self, now_ms: u64, value: f64) {
        self.samples.push_back((now_ms, value));
        let cutoff = now_ms.saturating_sub(self.window_ms);
        while self.samples.front().is_some_and(|(t, _)| *t < cutoff) {
            self.samples.pop_front();
        }
    }

    pub fn value(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().map(|(_, v)| v).sum::<f64>() / self.samples.len() as f64
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Allocation input for one unit.
#[derive(Debug, Clone, Copy)]
pub struct UnitAlloc {
    pub id: u8,
    /// 0 = independent (excluded from auto control), 1..4 = ranked group
    pub group: u8,
    pub limit: f64,
    /// Burn already assigned to this unit before distribution
    pub current: f64,
    pub ready: bool,
}

/// One unit's commanded burn after distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BurnAllocation {
    pub id: u8,
    pub burn: f64,
}

/// Partition a total commanded burn across units.
///
/// Each unit carries its already-assigned burn forward; new demand splits
/// across groups 1..4 in priority order, inside a group proportionally to
/// residual capacity (`limit - current`), iterating units in ascending id
/// order. A command below the carried total sheds burn proportionally
/// instead. Independent units (group 0) take no part.
pub fn distribute_burn(cmd_total: f64, units: &[UnitAlloc]) -> Vec<BurnAllocation> {
    let mut allocations: Vec<BurnAllocation> = units
        .iter()
        .filter(|u| u.ready && u.group >= 1 && u.group <= 4)
        .map(|u| BurnAllocation { id: u.id, burn: u.current })
        .collect();

    let cmd_total = cmd_total.max(0.0);
    let seeded: f64 = allocations.iter().map(|a| a.burn).sum();
    if cmd_total < seeded {
        let scale = if seeded > 0.0 { cmd_total / seeded } else { 0.0 };
        for alloc in &mut allocations {
            alloc.burn *= scale;
        }
        return allocations;
    }

    let mut remaining = cmd_total - seeded;

    for group in 1..=4u8 {
        if remaining <= 0.0 {
            break;
        }
        let mut members: Vec<&UnitAlloc> = units
            .iter()
            .filter(|u| u.ready && u.group == group)
            .collect();
        members.sort_by_key(|u| u.id);

        let residual_total: f64 = members
            .iter()
            .map(|u| (u.limit - u.current).max(0.0))
            .sum();
        if residual_total <= 0.0 {
            continue;
        }

        let give = remaining.min(residual_total);
        for unit in members {
            let residual = (unit.limit - unit.current).max(0.0);
            let share = give * residual / residual_total;
            if let Some(slot) = allocations.iter_mut().find(|a| a.id == unit.id) {
                slot.burn = (slot.burn + share).min(unit.limit);
            }
        }
        remaining -= give;
    }

    allocations
}

/// Result of an `auto_start` request.
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    /// Mode engaged
    Started(ProcessMode),
    /// Limits applied, mode stays INACTIVE (units not ready or setpoint zero)
    Accepted,
    Rejected(String),
}

/// Per-tick inputs to the process controller.
#[derive(Debug, Clone)]
pub struct ControlInputs {
    pub units: Vec<UnitAlloc>,
    pub units_ready: bool,
    /// Induction matrix charge fraction, when a matrix is online
    pub matrix_charge: Option<f64>,
    /// 60 s moving average of matrix net flow (kFE/t)
    pub avg_net_gen: f64,
    /// Sum of reported burn across in-service units (mB/t)
    pub measured_total_burn: f64,
    pub dt_s: f64,
    /// External-charge idling configured and matrix charging externally
    pub ext_idle: bool,
}

/// The facility process control state machine.
#[derive(Debug, Clone)]
pub struct ProcessController {
    mode: ProcessMode,
    mode_set: ProcessMode,
    burn_target: f64,
    charge_setpoint: f64,
    gen_rate_setpoint: f64,
    charge_pi: PiController,
    gen_pi: PiController,
    initial_ramp: bool,
    last_cmd_total: f64,
}

impl Default for ProcessController {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessController {
    pub fn new() -> Self {
        Self {
            mode: ProcessMode::Inactive,
            mode_set: ProcessMode::Inactive,
            burn_target: 0.0,
            charge_setpoint: 0.0,
            gen_rate_setpoint: 0.0,
            charge_pi: PiController::charge(),
            gen_pi: PiController::gen_rate(),
            initial_ramp: false,
            last_cmd_total: 0.0,
        }
    }

    pub fn mode(&self) -> ProcessMode {
        self.mode
    }

    pub fn mode_set(&self) -> ProcessMode {
        self.mode_set
    }

    pub fn burn_target(&self) -> f64 {
        self.burn_target
    }

    pub fn charge_setpoint(&self) -> f64 {
        self.charge_setpoint
    }

    pub fn gen_rate_setpoint(&self) -> f64 {
        self.gen_rate_setpoint
    }

    pub fn initial_ramp(&self) -> bool {
        self.initial_ramp
    }

    /// Integrator saturation latch of the loop active in the current mode.
    pub fn saturated(&self) -> bool {
        match self.mode {
            ProcessMode::Charge => self.charge_pi.saturated(),
            ProcessMode::GenRate | ProcessMode::GenRateFaultIdle => self.gen_pi.saturated(),
            _ => false,
        }
    }

    /// Validate and apply an operator `auto_start`.
    ///
    /// Limits are persistent configuration and are applied by the caller
    /// regardless of whether the mode engages; the mode only advances from
    /// INACTIVE when units are ready and the chosen mode's setpoint is
    /// positive.
    pub fn auto_start(
        &mut self,
        cfg: &AutoControlConfig,
        unit_count: usize,
        units_ready: bool,
    ) -> StartOutcome {
        if !cfg.mode.is_requestable() {
            return StartOutcome::Rejected(format!("mode {} cannot be requested", cfg.mode));
        }
        if cfg.burn_target < 0.0 || cfg.charge_setpoint < 0.0 || cfg.gen_rate_setpoint < 0.0 {
            return StartOutcome::Rejected("setpoints must be non-negative".into());
        }
        if cfg.mode == ProcessMode::BurnRate && cfg.burn_target < MIN_BURN {
            return StartOutcome::Rejected(format!("burn target below minimum {}", MIN_BURN));
        }
        if cfg.limits.len() != unit_count {
            return StartOutcome::Rejected(format!(
                "{} limits supplied for {} units",
                cfg.limits.len(),
                unit_count
            ));
        }
        if cfg.limits.iter().any(|l| *l < MIN_BURN) {
            return StartOutcome::Rejected(format!("unit limits must be at least {}", MIN_BURN));
        }

        self.mode_set = cfg.mode;
        self.burn_target = cfg.burn_target;
        self.charge_setpoint = cfg.charge_setpoint;
        self.gen_rate_setpoint = cfg.gen_rate_setpoint;

        let setpoint_ok = match cfg.mode {
            ProcessMode::Monitored => true,
            ProcessMode::BurnRate => cfg.burn_target > 0.0,
            ProcessMode::Charge => cfg.charge_setpoint > 0.0,
            ProcessMode::GenRate => cfg.gen_rate_setpoint > 0.0,
            _ => false,
        };

        if units_ready && setpoint_ok {
            if self.mode == ProcessMode::Inactive {
                self.initial_ramp = true;
                self.charge_pi.reset();
                self.gen_pi.reset();
            }
            self.mode = cfg.mode;
            info!("auto control engaged: {}", self.mode);
            StartOutcome::Started(self.mode)
        } else {
            debug!(
                "auto start accepted without engaging (ready={}, setpoint_ok={})",
                units_ready, setpoint_ok
            );
            StartOutcome::Accepted
        }
    }

    /// Operator stop: drop to INACTIVE and reset the loops.
    pub fn auto_stop(&mut self) {
        info!("auto control stopped");
        self.mode = ProcessMode::Inactive;
        self.mode_set = ProcessMode::Inactive;
        self.initial_ramp = false;
        self.last_cmd_total = 0.0;
        self.charge_pi.reset();
        self.gen_pi.reset();
    }

    /// Safety supervisor override: force INACTIVE without touching the
    /// operator's requested mode (so status can show what was running).
    pub fn force_inactive(&mut self) {
        self.mode = ProcessMode::Inactive;
        self.initial_ramp = false;
        self.last_cmd_total = 0.0;
        self.charge_pi.reset();
        self.gen_pi.reset();
    }

    /// One control tick. Returns the per-unit burn allocations to command.
    pub fn step(&mut self, inputs: &ControlInputs) -> Vec<BurnAllocation> {
        // Ramp exits once measured total catches the command
        if self.initial_ramp && self.last_cmd_total > 0.0 {
            let delta = (inputs.measured_total_burn - self.last_cmd_total).abs();
            if delta < self.last_cmd_total * RAMP_EXIT_FRACTION {
                debug!("initial ramp complete");
                self.initial_ramp = false;
            }
        }

        let cmd_total = match self.mode {
            ProcessMode::Inactive | ProcessMode::Monitored => {
                self.last_cmd_total = 0.0;
                return Vec::new();
            }
            ProcessMode::BurnRate => self.burn_target,
            ProcessMode::Charge => {
                let charge = inputs.matrix_charge.unwrap_or(0.0);
                if inputs.ext_idle && charge >= self.charge_setpoint {
                    // External sources hold the matrix up; idle the loop
                    self.charge_pi.reset();
                    0.0
                } else {
                    self.charge_pi
                        .step(self.charge_setpoint, charge, inputs.dt_s, self.initial_ramp)
                }
            }
            ProcessMode::GenRate | ProcessMode::GenRateFaultIdle => self.gen_pi.step(
                self.gen_rate_setpoint,
                inputs.avg_net_gen,
                inputs.dt_s,
                self.initial_ramp,
            ),
        };

        // Fault-idle bookkeeping for generation mode
        if self.mode == ProcessMode::GenRate
            && self.gen_pi.saturated()
            && inputs.avg_net_gen <= f64::EPSILON
            && inputs.units_ready
        {
            info!("generation setpoint unreachable, idling");
            self.mode = ProcessMode::GenRateFaultIdle;
        } else if self.mode == ProcessMode::GenRateFaultIdle
            && (!self.gen_pi.saturated() || inputs.avg_net_gen > f64::EPSILON)
        {
            info!("generation recovering, resuming GEN_RATE");
            self.mode = ProcessMode::GenRate;
        }

        self.last_cmd_total = cmd_total;
        distribute_burn(cmd_total, &inputs.units)
    }
}
