//! Reactor unit model
//!
//! Tracks one reactor: its PLC link, the RTU-exposed boilers and turbines
//! serving it, the latest telemetry snapshot, burn accounting, waste
//! routing and the unit's annunciator panel.

use std::collections::HashMap;

use fission_comlink::protocols::{Alarm, AlarmState, WasteMode, ALARM_COUNT};
use fission_comlink::rplc::{ReactorStatus, RpsTrips};
use tracing::{debug, info};

use crate::facility::alarm::AnnunciatorPanel;
use crate::session::rtu::HwState;

/// Alarm trip thresholds.
mod thresholds {
    /// Reactor damage fraction for CONTAINMENT BREACH
    pub const BREACH_DAMAGE: f64 = 1.0;
    /// Reactor damage fraction for CRITICAL DAMAGE
    pub const CRIT_DAMAGE: f64 = 0.9;
    /// Kelvin, OVER TEMP (at/above design limit)
    pub const OVER_TEMP_K: f64 = 1200.0;
    /// Kelvin, HIGH TEMP warning band
    pub const HIGH_TEMP_K: f64 = 1150.0;
    /// Waste fill for WASTE LEAK imminent
    pub const WASTE_LEAK: f64 = 0.99;
    /// Waste fill for HIGH WASTE warning
    pub const HIGH_WASTE: f64 = 0.8;
}

/// Burn rates within this tolerance of the command count as matching.
pub const BURN_TOLERANCE: f64 = 0.01;

/// Link state of one boiler/turbine device serving this unit.
#[derive(Debug, Clone, Copy)]
pub struct DeviceLink {
    pub hw_state: HwState,
    /// Turbine trip flag (always false for boilers)
    pub trip: bool,
}

/// One reactor unit.
#[derive(Debug)]
pub struct ReactorUnit {
    pub id: u8,
    pub boilers: u8,
    pub turbines: u8,

    plc_session: Option<u32>,
    /// A PLC was linked at some point (drives the REACTOR LOST alarm)
    was_linked: bool,

    /// Boiler index -> link state
    boiler_links: HashMap<u8, DeviceLink>,
    /// Turbine index -> link state
    turbine_links: HashMap<u8, DeviceLink>,

    /// Priority group, 0 = independent
    pub group: u8,
    /// Persistent per-unit burn limit (mB/t)
    pub burn_limit: f64,
    /// Manual burn request from the operator (mB/t)
    pub requested_burn: f64,
    /// Burn currently commanded to the PLC (mB/t)
    pub burn_target: f64,

    pub auto_waste: bool,
    pub waste_mode: WasteMode,

    /// Most recent telemetry from the PLC
    pub db: ReactorStatus,
    pub rps_tripped: bool,
    pub rps_trips: RpsTrips,

    panel: AnnunciatorPanel,
}

impl ReactorUnit {
    pub fn new(id: u8, boilers: u8, turbines: u8) -> Self {
        Self {
            id,
            boilers,
            turbines,
            plc_session: None,
            was_linked: false,
            boiler_links: HashMap::new(),
            turbine_links: HashMap::new(),
            group: 0,
            burn_limit: 0.0,
            requested_burn: 0.0,
            burn_target: 0.0,
            auto_waste: true,
            waste_mode: WasteMode::Auto,
            db: ReactorStatus::default(),
            rps_tripped: false,
            rps_trips: RpsTrips::default(),
            panel: AnnunciatorPanel::new(),
        }
    }

    // ---- PLC link ----

    pub fn plc_session(&self) -> Option<u32> {
        self.plc_session
    }

    pub fn plc_linked(&self) -> bool {
        self.plc_session.is_some()
    }

    pub fn attach_plc(&mut self, session_id: u32) {
        info!("unit {}: PLC session {} attached", self.id, session_id);
        self.plc_session = Some(session_id);
        self.was_linked = true;
    }

    /// Clear the back-reference on session teardown. Stale ids are ignored
    /// so a re-established session cannot be detached by its predecessor.
    pub fn detach_plc(&mut self, session_id: u32) {
        if self.plc_session == Some(session_id) {
            info!("unit {}: PLC session {} detached", self.id, session_id);
            self.plc_session = None;
        }
    }

    // ---- RTU devices ----

    pub fn set_boiler_link(&mut self, index: u8, link: DeviceLink) {
        self.boiler_links.insert(index, link);
    }

    pub fn set_turbine_link(&mut self, index: u8, link: DeviceLink) {
        self.turbine_links.insert(index, link);
    }

    pub fn clear_device_links(&mut self) {
        self.boiler_links.clear();
        self.turbine_links.clear();
    }

    /// A unit is ready iff its PLC is linked, each required boiler and
    /// turbine is linked, and none of them is faulted or offline.
    pub fn ready(&self) -> bool {
        if !self.plc_linked() {
            return false;
        }
        for i in 1..=self.boilers {
            match self.boiler_links.get(&i) {
                Some(link) if link.hw_state == HwState::Ok => {}
                _ => return false,
            }
        }
        for i in 1..=self.turbines {
            match self.turbine_links.get(&i) {
                Some(link) if link.hw_state == HwState::Ok => {}
                _ => return false,
            }
        }
        true
    }

    fn any_rcs_fault(&self) -> bool {
        self.boiler_links
            .values()
            .chain(self.turbine_links.values())
            .any(|l| matches!(l.hw_state, HwState::Faulted | HwState::Offline))
    }

    fn any_turbine_trip(&self) -> bool {
        self.turbine_links.values().any(|l| l.trip)
    }

    // ---- Telemetry ----

    pub fn ingest_status(&mut self, status: ReactorStatus) {
        self.db = status;
    }

    pub fn ingest_rps(&mut self, tripped: bool, trips: RpsTrips) {
        self.rps_tripped = tripped;
        self.rps_trips = trips;
    }

    /// Apply a sparse telemetry delta onto the stored snapshot.
    pub fn ingest_delta(&mut self, fields: &serde_json::Map<String, serde_json::Value>) {
        let mut merged = match serde_json::to_value(&self.db) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => return,
        };
        for (k, v) in fields {
            merged.insert(k.clone(), v.clone());
        }
        match serde_json::from_value(serde_json::Value::Object(merged)) {
            Ok(status) => self.db = status,
            Err(e) => debug!("unit {}: bad telemetry delta ignored: {}", self.id, e),
        }
    }

    // ---- Alarms ----

    /// Evaluate the annunciator panel against current conditions.
    /// `radiation_msv_h` is the highest environment detector reading.
    pub fn update_alarms(&mut self, radiation_msv_h: f64, radiation_trip: f64) {
        let mut conditions = [false; ALARM_COUNT];
        let db = &self.db;

        conditions[Alarm::ContainmentBreach.index()] = db.damage >= thresholds::BREACH_DAMAGE;
        conditions[Alarm::ContainmentRadiation.index()] = radiation_msv_h >= radiation_trip;
        conditions[Alarm::ReactorLost.index()] = self.was_linked && !self.plc_linked();
        conditions[Alarm::CriticalDamage.index()] = db.damage >= thresholds::CRIT_DAMAGE;
        conditions[Alarm::ReactorDamage.index()] = db.damage > 0.0;
        conditions[Alarm::ReactorOverTemp.index()] = db.temperature >= thresholds::OVER_TEMP_K;
        conditions[Alarm::ReactorHighTemp.index()] = db.temperature >= thresholds::HIGH_TEMP_K;
        conditions[Alarm::ReactorWasteLeak.index()] = db.waste_fill >= thresholds::WASTE_LEAK;
        conditions[Alarm::ReactorHighWaste.index()] = db.waste_fill >= thresholds::HIGH_WASTE;
        conditions[Alarm::RpsTransient.index()] = self.rps_tripped;
        conditions[Alarm::RcsTransient.index()] = self.any_rcs_fault();
        conditions[Alarm::TurbineTrip.index()] = self.any_turbine_trip();

        self.panel.update(&conditions);
    }

    pub fn ack_alarm(&mut self, alarm: Alarm) {
        self.panel.ack(alarm);
    }

    pub fn ack_all_alarms(&mut self) {
        self.panel.ack_all();
    }

    pub fn alarm_states(&self) -> [AlarmState; ALARM_COUNT] {
        self.panel.states()
    }

    pub fn panel(&self) -> &AnnunciatorPanel {
        &self.panel
    }

    /// Burn currently reported by the PLC matches the command.
    pub fn burn_converged(&self) -> bool {
        (self.db.burn_rate - self.burn_target).abs() <= BURN_TOLERANCE
    }
}
