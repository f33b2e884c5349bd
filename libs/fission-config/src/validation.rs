//! Configuration validation
//!
//! Startup is refused while `validate` reports errors; the operator is
//! directed to the configurator instead. Warnings do not block startup.

use crate::{timeouts, SupervisorConfig};

/// Validation stage that produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationLevel {
    /// Structural checks: lengths, ranges
    Schema,
    /// Cross-field facility rules
    Business,
}

/// Aggregated validation outcome.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub level: ValidationLevel,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new(level: ValidationLevel) -> Self {
        Self {
            is_valid: true,
            level,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
        self.is_valid = false;
    }

    pub fn warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn merge(&mut self, other: ValidationResult) {
        if !other.is_valid {
            self.is_valid = false;
        }
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

impl SupervisorConfig {
    /// Validate the whole tree. Errors refuse startup.
    pub fn validate(&self) -> ValidationResult {
        let mut result = self.validate_schema();
        result.merge(self.validate_business());
        result
    }

    fn validate_schema(&self) -> ValidationResult {
        let mut result = ValidationResult::new(ValidationLevel::Schema);
        let fac = &self.facility;
        let units = fac.unit_count as usize;

        if !(1..=4).contains(&fac.unit_count) {
            result.error(format!("unit count {} outside 1..4", fac.unit_count));
        }
        if fac.cooling.len() != units {
            result.error(format!(
                "cooling config has {} entries for {} units",
                fac.cooling.len(),
                units
            ));
        }
        for (i, cool) in fac.cooling.iter().enumerate() {
            if cool.boiler_count > 2 {
                result.error(format!("unit {}: boiler count {} > 2", i + 1, cool.boiler_count));
            }
            if !(1..=3).contains(&cool.turbine_count) {
                result.error(format!(
                    "unit {}: turbine count {} outside 1..3",
                    i + 1,
                    cool.turbine_count
                ));
            }
            if cool.tank_connection > 2 {
                result.error(format!(
                    "unit {}: tank connection {} outside 0..2",
                    i + 1,
                    cool.tank_connection
                ));
            }
        }
        if fac.tank_mode > 7 {
            result.error(format!("facility tank mode {} outside 0..7", fac.tank_mode));
        }
        if fac.tank_defs.len() != units {
            result.error(format!(
                "tank defs has {} entries for {} units",
                fac.tank_defs.len(),
                units
            ));
        }
        if fac.tank_defs.iter().any(|d| *d > 2) {
            result.error("tank defs must be 0 (none), 1 (unit) or 2 (facility)");
        }

        let comms = &self.comms;
        let chans = [
            comms.svr_channel,
            comms.plc_channel,
            comms.rtu_channel,
            comms.crd_channel,
            comms.pkt_channel,
        ];
        for (i, a) in chans.iter().enumerate() {
            if *a == 0 {
                result.error("channels must be non-zero");
            }
            if chans[i + 1..].contains(a) {
                result.error(format!("channel {} assigned twice", a));
            }
        }
        for (name, t) in [
            ("PLC", comms.plc_timeout_s),
            ("RTU", comms.rtu_timeout_s),
            ("CRD", comms.crd_timeout_s),
            ("PKT", comms.pkt_timeout_s),
        ] {
            if t < timeouts::MIN_TIMEOUT_S {
                result.error(format!(
                    "{} timeout {:.1}s below minimum {:.1}s",
                    name,
                    t,
                    timeouts::MIN_TIMEOUT_S
                ));
            }
        }
        if comms.trusted_range < 0.0 {
            result.error("trusted range must be >= 0");
        }

        result
    }

    fn validate_business(&self) -> ValidationResult {
        let mut result = ValidationResult::new(ValidationLevel::Business);
        let fac = &self.facility;

        if fac.tank_mode != 0 && !fac.tank_defs.contains(&2) {
            result.error("shared facility tank mode set but no unit marked as facility-connected");
        }
        if fac.tank_mode == 0 && fac.tank_defs.contains(&2) {
            result.warning("facility-connected tank defs ignored while tank mode is 0");
        }
        for (i, (cool, def)) in fac.cooling.iter().zip(fac.tank_defs.iter()).enumerate() {
            if cool.tank_connection != *def {
                result.warning(format!(
                    "unit {}: tank connection {} disagrees with tank def {}",
                    i + 1,
                    cool.tank_connection,
                    def
                ));
            }
        }

        if self.comms.auth_enabled() && self.comms.auth_key.len() < 8 {
            result.error("auth key must be at least 8 characters");
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UnitCoolingConfig;

    fn valid_config(units: u8) -> SupervisorConfig {
        let mut cfg = SupervisorConfig::default();
        cfg.facility.unit_count = units;
        cfg.facility.cooling =
            (0..units).map(|_| UnitCoolingConfig::default()).collect();
        cfg.facility.tank_defs = vec![1; units as usize];
        cfg.facility.tank_mode = 0;
        cfg
    }

    #[test]
    fn test_default_config_valid() {
        let result = SupervisorConfig::default().validate();
        assert!(result.is_valid, "errors: {:?}", result.errors);
    }

    #[test]
    fn test_unit_count_bounds() {
        let mut cfg = valid_config(1);
        cfg.facility.unit_count = 5;
        assert!(!cfg.validate().is_valid);
    }

    #[test]
    fn test_cooling_length_mismatch() {
        let mut cfg = valid_config(2);
        cfg.facility.cooling.pop();
        assert!(!cfg.validate().is_valid);
    }

    #[test]
    fn test_duplicate_channels_rejected() {
        let mut cfg = valid_config(1);
        cfg.comms.plc_channel = cfg.comms.svr_channel;
        assert!(!cfg.validate().is_valid);
    }

    #[test]
    fn test_short_timeout_rejected() {
        let mut cfg = valid_config(1);
        cfg.comms.rtu_timeout_s = 0.5;
        assert!(!cfg.validate().is_valid);
    }

    #[test]
    fn test_tank_mode_requires_facility_def() {
        let mut cfg = valid_config(2);
        cfg.facility.tank_mode = 3;
        // All defs unit-local: business rule error
        assert!(!cfg.validate().is_valid);

        cfg.facility.tank_defs = vec![2, 2];
        cfg.facility.cooling[0].tank_connection = 2;
        cfg.facility.cooling[1].tank_connection = 2;
        assert!(cfg.validate().is_valid);
    }

    #[test]
    fn test_short_auth_key_rejected() {
        let mut cfg = valid_config(1);
        cfg.comms.auth_key = "abc".into();
        assert!(!cfg.validate().is_valid);

        cfg.comms.auth_key = "long-enough-key".into();
        assert!(cfg.validate().is_valid);
    }

    #[test]
    fn test_tank_connection_disagreement_warns() {
        let mut cfg = valid_config(1);
        cfg.facility.cooling[0].tank_connection = 0;
        let result = cfg.validate();
        assert!(result.is_valid);
        assert!(!result.warnings.is_empty());
    }
}
