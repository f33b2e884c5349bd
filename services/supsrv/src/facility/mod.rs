//! Facility state owner
//!
//! Single owner of all facility-wide state: the reactor units, the process
//! controller, the auto-SCRAM supervisor, the tone mixer and the rolling
//! telemetry averages. Everything mutates here, once per tick or per
//! operator command; other tasks see cloned status frames only.

pub mod alarm;
pub mod ascram;
pub mod control;
pub mod tanks;
pub mod unit;

use fission_comlink::coord::{AutoControlConfig, FacCommand, FacStatus, UnitCommand, UnitStatus};
use fission_comlink::protocols::{AscramReason, ProcessMode, WasteMode, TONE_COUNT};
use fission_comlink::rplc::PlcCommand;
use fission_config::SupervisorConfig;
use tracing::{debug, info, warn};

use crate::facility::alarm::ToneMixer;
use crate::facility::ascram::{AscramSupervisor, SafetyInputs, RADIATION_TRIP_MSV_H};
use crate::facility::control::{
    BurnAllocation, ControlInputs, MovingAverage, ProcessController, StartOutcome, UnitAlloc,
};
use crate::facility::unit::ReactorUnit;
use crate::i18n::{tr, Lang};

/// Moving-average window for charge and flow telemetry.
const AVG_WINDOW_MS: u64 = 60_000;

/// Induction matrix readings sampled from its RTU entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatrixReading {
    /// Charge fraction 0..1
    pub charge: f64,
    /// kFE/t
    pub inflow: f64,
    /// kFE/t
    pub outflow: f64,
}

/// Device readings collected from RTU entries before each tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceReadings {
    /// Present iff an induction matrix entry is online
    pub matrix: Option<MatrixReading>,
    pub sps_online: bool,
    /// Highest environment detector level, mSv/h
    pub max_radiation_msv_h: f64,
}

/// What the facility wants done after a tick.
#[derive(Debug, Default)]
pub struct TickOutput {
    /// New burn targets per unit (unit id, mB/t)
    pub burn_allocations: Vec<BurnAllocation>,
    /// Broadcast `scram` to every linked PLC (auto-SCRAM, once per trip)
    pub scram_all: bool,
    /// Tone bitmap for the audio renderer
    pub tones: [bool; TONE_COUNT],
}

/// Reply to an operator command.
#[derive(Debug, Clone, PartialEq)]
pub struct CmdOutcome {
    pub ok: bool,
    pub detail: String,
}

impl CmdOutcome {
    fn ok() -> Self {
        Self { ok: true, detail: String::new() }
    }

    fn err(detail: impl Into<String>) -> Self {
        Self { ok: false, detail: detail.into() }
    }
}

/// The facility.
pub struct Facility {
    pub units: Vec<ReactorUnit>,

    controller: ProcessController,
    ascram: AscramSupervisor,
    mixer: ToneMixer,

    tank_mode: u8,
    tank_defs: Vec<u8>,
    tank_list: Vec<u8>,

    avg_charge: MovingAverage,
    avg_inflow: MovingAverage,
    avg_outflow: MovingAverage,
    avg_net: MovingAverage,

    /// Charge sample held for rate-of-change estimates
    imtx_last_charge: f64,
    imtx_last_charge_ms: u64,

    waste_mode: WasteMode,
    pu_fallback: bool,
    sps_low_power: bool,

    ext_charge_idling: bool,
    lang: Lang,

    status_text: [String; 2],
    tones: [bool; TONE_COUNT],
    last_tick_ms: Option<u64>,
}

impl Facility {
    pub fn new(config: &SupervisorConfig) -> Self {
        let units = (1..=config.facility.unit_count)
            .map(|id| {
                ReactorUnit::new(id, config.boiler_count(id), config.turbine_count(id))
            })
            .collect();

        let tank_list =
            tanks::solve_tank_list(config.facility.tank_mode, &config.facility.tank_defs);
        info!(
            "facility: {} units, tank mode {}, tank list {:?}",
            config.facility.unit_count, config.facility.tank_mode, tank_list
        );

        Self {
            units,
            controller: ProcessController::new(),
            ascram: AscramSupervisor::new(),
            mixer: ToneMixer::new(),
            tank_mode: config.facility.tank_mode,
            tank_defs: config.facility.tank_defs.clone(),
            tank_list,
            avg_charge: MovingAverage::new(AVG_WINDOW_MS),
            avg_inflow: MovingAverage::new(AVG_WINDOW_MS),
            avg_outflow: MovingAverage::new(AVG_WINDOW_MS),
            avg_net: MovingAverage::new(AVG_WINDOW_MS),
            imtx_last_charge: 0.0,
            imtx_last_charge_ms: 0,
            waste_mode: WasteMode::Auto,
            pu_fallback: false,
            sps_low_power: false,
            ext_charge_idling: config.facility.ext_charge_idling,
            lang: Lang::default(),
            status_text: [String::new(), String::new()],
            tones: [false; TONE_COUNT],
            last_tick_ms: None,
        }
    }

    pub fn unit(&self, id: u8) -> Option<&ReactorUnit> {
        self.units.iter().find(|u| u.id == id)
    }

    pub fn unit_mut(&mut self, id: u8) -> Option<&mut ReactorUnit> {
        self.units.iter_mut().find(|u| u.id == id)
    }

    pub fn mode(&self) -> ProcessMode {
        self.controller.mode()
    }

    pub fn ascram_tripped(&self) -> Option<AscramReason> {
        self.ascram.tripped()
    }

    pub fn tank_list(&self) -> &[u8] {
        &self.tank_list
    }

    pub fn tank_defs(&self) -> &[u8] {
        &self.tank_defs
    }

    pub fn tank_mode(&self) -> u8 {
        self.tank_mode
    }

    /// Last matrix charge sample and its timestamp (for rate-of-change
    /// displays on the coordinator).
    pub fn matrix_last_charge(&self) -> (f64, u64) {
        (self.imtx_last_charge, self.imtx_last_charge_ms)
    }

    pub fn mixer_mut(&mut self) -> &mut ToneMixer {
        &mut self.mixer
    }

    /// All grouped units are ready and at least one unit is grouped.
    pub fn units_ready(&self) -> bool {
        let grouped: Vec<&ReactorUnit> =
            self.units.iter().filter(|u| u.group >= 1).collect();
        !grouped.is_empty() && grouped.iter().all(|u| u.ready())
    }

    // ---- Operator commands ----

    /// Handle a facility-level command from the coordinator.
    pub fn handle_fac_command(&mut self, command: &FacCommand) -> CmdOutcome {
        match command {
            FacCommand::AutoStart { config } => self.auto_start(config),
            FacCommand::AutoStop => {
                self.controller.auto_stop();
                for unit in &mut self.units {
                    unit.burn_target = 0.0;
                }
                CmdOutcome::ok()
            }
            FacCommand::Ack => {
                if self.ascram.acknowledge() {
                    CmdOutcome::ok()
                } else {
                    CmdOutcome::err("no auto SCRAM latched")
                }
            }
            FacCommand::SetGroup { unit, group } => self.set_group(*unit, *group),
            FacCommand::SetWaste { mode } => {
                self.waste_mode = *mode;
                CmdOutcome::ok()
            }
            FacCommand::SetPuFallback { enabled } => {
                self.pu_fallback = *enabled;
                CmdOutcome::ok()
            }
            FacCommand::SetSpsLowPower { enabled } => {
                self.sps_low_power = *enabled;
                CmdOutcome::ok()
            }
        }
    }

    fn auto_start(&mut self, config: &AutoControlConfig) -> CmdOutcome {
        if self.ascram.is_tripped() {
            return CmdOutcome::err("auto SCRAM latched, acknowledge first");
        }
        // Setpoints are only mutable while INACTIVE
        if self.controller.mode() != ProcessMode::Inactive {
            return CmdOutcome::err("auto control active, stop before reconfiguring");
        }

        let outcome =
            self.controller
                .auto_start(config, self.units.len(), self.units_ready());

        match outcome {
            StartOutcome::Rejected(detail) => {
                warn!("auto start rejected: {}", detail);
                CmdOutcome::err(detail)
            }
            started => {
                // Limits are persistent configuration, applied even when
                // the mode did not engage
                for (unit, limit) in self.units.iter_mut().zip(config.limits.iter()) {
                    unit.burn_limit = *limit;
                }
                if matches!(started, StartOutcome::Accepted) {
                    debug!("auto start accepted, mode holding at INACTIVE");
                }
                CmdOutcome::ok()
            }
        }
    }

    fn set_group(&mut self, unit_id: u8, group: u8) -> CmdOutcome {
        if group > 4 {
            return CmdOutcome::err(format!("group {} outside 0..4", group));
        }
        // Group assignments are frozen while auto control runs
        if self.controller.mode() != ProcessMode::Inactive {
            return CmdOutcome::err("group assignments frozen while auto control active");
        }
        match self.unit_mut(unit_id) {
            Some(unit) => {
                info!("unit {} assigned to group {}", unit_id, group);
                unit.group = group;
                CmdOutcome::ok()
            }
            None => CmdOutcome::err(format!("unknown unit {}", unit_id)),
        }
    }

    /// Handle a unit-level command. Commands that must reach the PLC are
    /// returned for the session layer to transmit.
    pub fn handle_unit_command(
        &mut self,
        unit_id: u8,
        command: &UnitCommand,
    ) -> (CmdOutcome, Option<PlcCommand>) {
        let auto_active = self.controller.mode() != ProcessMode::Inactive;
        let Some(unit) = self.unit_mut(unit_id) else {
            return (CmdOutcome::err(format!("unknown unit {}", unit_id)), None);
        };

        match command {
            UnitCommand::Scram => (CmdOutcome::ok(), Some(PlcCommand::Scram)),
            UnitCommand::ResetRps => (CmdOutcome::ok(), Some(PlcCommand::ResetRps)),
            UnitCommand::AckAlarm { alarm } => {
                unit.ack_alarm(*alarm);
                (CmdOutcome::ok(), None)
            }
            UnitCommand::AckAllAlarms => {
                unit.ack_all_alarms();
                (CmdOutcome::ok(), None)
            }
            UnitCommand::SetBurnRate { rate } => {
                if *rate < 0.0 {
                    return (CmdOutcome::err("burn rate must be non-negative"), None);
                }
                if auto_active && unit.group >= 1 {
                    return (
                        CmdOutcome::err("unit under auto control, burn rate frozen"),
                        None,
                    );
                }
                unit.requested_burn = *rate;
                unit.burn_target = *rate;
                (CmdOutcome::ok(), Some(PlcCommand::SetBurnRate { rate: *rate }))
            }
            UnitCommand::SetWaste { mode } => {
                unit.waste_mode = *mode;
                unit.auto_waste = *mode == WasteMode::Auto;
                (CmdOutcome::ok(), None)
            }
            UnitCommand::SetGroup { group } => (self.set_group(unit_id, *group), None),
        }
    }

    /// Waste route a unit's PLC should run, resolving `Auto` through the
    /// facility policy.
    pub fn effective_waste_mode(&self, unit: &ReactorUnit, sps_online: bool) -> WasteMode {
        let mode = if unit.auto_waste { self.waste_mode } else { unit.waste_mode };
        match mode {
            WasteMode::Auto => {
                if sps_online && !self.sps_low_power {
                    WasteMode::AntiMatter
                } else if self.pu_fallback {
                    WasteMode::Plutonium
                } else {
                    WasteMode::Polonium
                }
            }
            explicit => explicit,
        }
    }

    // ---- Tick ----

    /// One facility update. Serialized with command handling by the owner
    /// task; nothing else mutates facility state.
    pub fn update(&mut self, now_ms: u64, readings: &DeviceReadings) -> TickOutput {
        let dt_s = match self.last_tick_ms {
            Some(last) => ((now_ms - last) as f64 / 1000.0).max(0.001),
            None => crate::scheduler::TICK_MS as f64 / 1000.0,
        };
        self.last_tick_ms = Some(now_ms);

        // Rolling telemetry averages
        if let Some(matrix) = readings.matrix {
            self.avg_charge.sample(now_ms, matrix.charge);
            self.avg_inflow.sample(now_ms, matrix.inflow);
            self.avg_outflow.sample(now_ms, matrix.outflow);
            self.avg_net.sample(now_ms, matrix.inflow - matrix.outflow);
            self.imtx_last_charge = matrix.charge;
            self.imtx_last_charge_ms = now_ms;
        }

        // Annunciators
        for unit in &mut self.units {
            unit.update_alarms(readings.max_radiation_msv_h, RADIATION_TRIP_MSV_H);
        }

        let any_crit = self.units.iter().any(|u| u.panel().any_critical_active());
        let units_ready = self.units_ready();
        let any_unit_ready = self
            .units
            .iter()
            .any(|u| u.group >= 1 && u.ready());
        let measured_total: f64 = self
            .units
            .iter()
            .filter(|u| u.group >= 1)
            .map(|u| u.db.burn_rate)
            .sum();

        // Safety first: a trip forces auto control INACTIVE before any
        // setpoint math runs this tick
        let mut scram_all = false;
        let safety = SafetyInputs {
            mode: self.controller.mode(),
            matrix_online: readings.matrix.is_some(),
            matrix_charge: readings.matrix.map(|m| m.charge),
            any_crit_alarm: any_crit,
            max_radiation: readings.max_radiation_msv_h,
            gen_saturated: self.controller.saturated(),
            any_unit_ready,
        };
        if let Some(trip) = self.ascram.evaluate(&safety) {
            if trip.broadcast_scram {
                self.controller.force_inactive();
                for unit in &mut self.units {
                    unit.burn_target = 0.0;
                }
                scram_all = true;
            }
        }

        // Process control
        let allocs = if scram_all {
            Vec::new()
        } else {
            let unit_allocs: Vec<UnitAlloc> = self
                .units
                .iter()
                .map(|u| UnitAlloc {
                    id: u.id,
                    group: u.group,
                    limit: u.burn_limit,
                    current: u.burn_target,
                    ready: u.ready(),
                })
                .collect();
            let inputs = ControlInputs {
                units: unit_allocs,
                units_ready,
                matrix_charge: readings.matrix.map(|m| m.charge),
                avg_net_gen: self.avg_net.value(),
                measured_total_burn: measured_total,
                dt_s,
                ext_idle: self.ext_charge_idling,
            };
            self.controller.step(&inputs)
        };

        for alloc in &allocs {
            if let Some(unit) = self.unit_mut(alloc.id) {
                unit.burn_target = alloc.burn;
            }
        }

        // Tones
        let panels: Vec<&alarm::AnnunciatorPanel> =
            self.units.iter().map(|u| u.panel()).collect();
        self.tones = self.mixer.mix(&panels);

        self.refresh_status_text(units_ready);

        TickOutput {
            burn_allocations: allocs,
            scram_all,
            tones: self.tones,
        }
    }

    fn refresh_status_text(&mut self, units_ready: bool) {
        let mode_key = match self.controller.mode() {
            ProcessMode::Inactive => "mode.inactive",
            ProcessMode::Monitored => "mode.monitored",
            ProcessMode::BurnRate => "mode.burn_rate",
            ProcessMode::Charge => "mode.charge",
            ProcessMode::GenRate => "mode.gen_rate",
            ProcessMode::GenRateFaultIdle => "mode.gen_fault_idle",
        };
        self.status_text[0] = tr(self.lang, mode_key).to_string();

        self.status_text[1] = if let Some(reason) = self.ascram.tripped() {
            let key = match reason {
                AscramReason::MatrixDisconnect => "ascram.matrix_dc",
                AscramReason::MatrixFill => "ascram.matrix_fill",
                AscramReason::CritAlarm => "ascram.crit_alarm",
                AscramReason::Radiation => "ascram.radiation",
                AscramReason::GenFault => "ascram.gen_fault",
            };
            tr(self.lang, key).to_string()
        } else if self.controller.mode() != ProcessMode::Inactive {
            tr(self.lang, "status.running").to_string()
        } else if !units_ready {
            tr(self.lang, "status.units_not_ready").to_string()
        } else {
            String::new()
        };
    }

    // ---- Status frames ----

    pub fn fac_status(&self) -> FacStatus {
        FacStatus {
            mode: self.controller.mode(),
            mode_set: self.controller.mode_set(),
            units_ready: self.units_ready(),
            status_text: self.status_text.clone(),
            ascram: self.ascram.is_tripped(),
            ascram_reason: self.ascram.tripped(),
            ascram_status: self.ascram.status(),
            tones: self.tones,
            charge_setpoint: self.controller.charge_setpoint(),
            gen_rate_setpoint: self.controller.gen_rate_setpoint(),
            burn_target: self.controller.burn_target(),
            avg_charge: self.avg_charge.value(),
            avg_inflow: self.avg_inflow.value(),
            avg_outflow: self.avg_outflow.value(),
            avg_net: self.avg_net.value(),
            pu_fallback: self.pu_fallback,
            sps_low_power: self.sps_low_power,
        }
    }

    pub fn unit_status(&self, unit: &ReactorUnit) -> UnitStatus {
        UnitStatus {
            id: unit.id,
            plc_linked: unit.plc_linked(),
            ready: unit.ready(),
            group: unit.group,
            burn_limit: unit.burn_limit,
            burn_target: unit.burn_target,
            waste_mode: unit.waste_mode,
            telemetry: unit.db.clone(),
            rps_tripped: unit.rps_tripped,
            rps_trips: unit.rps_trips,
            alarm_states: unit.alarm_states(),
        }
    }
}
