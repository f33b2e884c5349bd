//! Legacy settings import
//!
//! Earlier releases persisted configuration as a flat key/value blob
//! (`UnitCount`, `PLC_Channel`, ...). This maps those pairs 1:1 onto
//! [`SupervisorConfig`]; keys absent from the blob keep their defaults, so
//! an old settings file upgrades in place.

use std::collections::HashMap;

use tracing::warn;

use crate::{SupervisorConfig, TankFluidType, UnitCoolingConfig};

impl SupervisorConfig {
    /// Import a legacy flat key/value settings blob.
    ///
    /// Unknown keys are ignored with a warning; malformed values keep the
    /// default for that field and warn.
    pub fn from_legacy_pairs(pairs: &HashMap<String, String>) -> Self {
        let mut cfg = SupervisorConfig::default();

        let get = |key: &str| pairs.get(key).cloned();

        if let Some(v) = get("UnitCount") {
            parse_into(&mut cfg.facility.unit_count, "UnitCount", &v);
        }
        let units = cfg.facility.unit_count as usize;

        cfg.facility.cooling = (1..=units)
            .map(|i| {
                let mut cool = UnitCoolingConfig::default();
                if let Some(v) = pairs.get(&format!("CoolingConfig_{}_BoilerCount", i)) {
                    parse_into(&mut cool.boiler_count, "BoilerCount", v);
                }
                if let Some(v) = pairs.get(&format!("CoolingConfig_{}_TurbineCount", i)) {
                    parse_into(&mut cool.turbine_count, "TurbineCount", v);
                }
                if let Some(v) = pairs.get(&format!("CoolingConfig_{}_TankConnection", i)) {
                    parse_into(&mut cool.tank_connection, "TankConnection", v);
                }
                cool
            })
            .collect();

        if let Some(v) = get("FacilityTankMode") {
            parse_into(&mut cfg.facility.tank_mode, "FacilityTankMode", &v);
        }
        cfg.facility.tank_defs = list_u8(pairs, "FacilityTankDefs", units, 1);
        cfg.facility.tank_fluid_types = list_u8(pairs, "TankFluidTypes", units, 0)
            .into_iter()
            .map(|v| if v == 1 { TankFluidType::Sodium } else { TankFluidType::Water })
            .collect();
        cfg.facility.auxiliary_coolant = list_u8(pairs, "AuxiliaryCoolant", units, 0)
            .into_iter()
            .map(|v| v != 0)
            .collect();
        if let Some(v) = get("ExtChargeIdling") {
            cfg.facility.ext_charge_idling = parse_bool("ExtChargeIdling", &v);
        }

        if let Some(v) = get("SVR_Channel") {
            parse_into(&mut cfg.comms.svr_channel, "SVR_Channel", &v);
        }
        if let Some(v) = get("PLC_Channel") {
            parse_into(&mut cfg.comms.plc_channel, "PLC_Channel", &v);
        }
        if let Some(v) = get("RTU_Channel") {
            parse_into(&mut cfg.comms.rtu_channel, "RTU_Channel", &v);
        }
        if let Some(v) = get("CRD_Channel") {
            parse_into(&mut cfg.comms.crd_channel, "CRD_Channel", &v);
        }
        if let Some(v) = get("PKT_Channel") {
            parse_into(&mut cfg.comms.pkt_channel, "PKT_Channel", &v);
        }
        if let Some(v) = get("PLC_Timeout") {
            parse_into(&mut cfg.comms.plc_timeout_s, "PLC_Timeout", &v);
        }
        if let Some(v) = get("RTU_Timeout") {
            parse_into(&mut cfg.comms.rtu_timeout_s, "RTU_Timeout", &v);
        }
        if let Some(v) = get("CRD_Timeout") {
            parse_into(&mut cfg.comms.crd_timeout_s, "CRD_Timeout", &v);
        }
        if let Some(v) = get("PKT_Timeout") {
            parse_into(&mut cfg.comms.pkt_timeout_s, "PKT_Timeout", &v);
        }
        if let Some(v) = get("TrustedRange") {
            parse_into(&mut cfg.comms.trusted_range, "TrustedRange", &v);
        }
        if let Some(v) = get("AuthKey") {
            cfg.comms.auth_key = v;
        }

        if let Some(v) = get("LogMode") {
            cfg.log.mode = v;
        }
        if let Some(v) = get("LogPath") {
            cfg.log.path = v;
        }
        if let Some(v) = get("LogDebug") {
            cfg.log.debug = parse_bool("LogDebug", &v);
        }
        if let Some(v) = get("FrontPanelTheme") {
            cfg.ui.front_panel_theme = v;
        }
        if let Some(v) = get("ColorMode") {
            parse_into(&mut cfg.ui.color_mode, "ColorMode", &v);
        }

        cfg
    }
}

fn parse_into<T: std::str::FromStr>(slot: &mut T, key: &str, value: &str) {
    match value.parse::<T>() {
        Ok(v) => *slot = v,
        Err(_) => warn!("legacy setting {} has malformed value '{}', keeping default", key, value),
    }
}

fn parse_bool(key: &str, value: &str) -> bool {
    match value {
        "true" | "1" | "yes" => true,
        "false" | "0" | "no" => false,
        other => {
            warn!("legacy setting {} has malformed value '{}', using false", key, other);
            false
        }
    }
}

/// Read `Key_1 .. Key_n` indexed entries, padding with `default`.
fn list_u8(pairs: &HashMap<String, String>, key: &str, n: usize, default: u8) -> Vec<u8> {
    (1..=n)
        .map(|i| {
            pairs
                .get(&format!("{}_{}", key, i))
                .and_then(|v| v.parse::<u8>().ok())
                .unwrap_or(default)
        })
        .collect()
}
