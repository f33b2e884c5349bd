//! Operator string lookup
//!
//! All operator-visible strings go through this table so the coordinator can
//! present either language. Keys are stable identifiers; missing entries
//! fall back to English.

use std::collections::HashMap;
use std::sync::OnceLock;

/// Display language for operator-facing strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lang {
    #[default]
    English,
    Chinese,
}

struct Table {
    en: HashMap<&'static str, &'static str>,
    zh: HashMap<&'static str, &'static str>,
}

fn table() -> &'static Table {
    static TABLE: OnceLock<Table> = OnceLock::new();
    TABLE.get_or_init(|| {
        let entries: &[(&str, &str, &str)] = &[
            ("mode.inactive", "IDLE", "待机"),
            ("mode.monitored", "MONITORED", "监视"),
            ("mode.burn_rate", "BURN RATE", "燃耗率"),
            ("mode.charge", "CHARGE", "充能"),
            ("mode.gen_rate", "GENERATION RATE", "发电率"),
            ("mode.gen_fault_idle", "GENERATION IDLE (FAULT)", "发电待机（故障）"),
            ("status.running", "running", "运行中"),
            ("status.units_not_ready", "units not ready", "机组未就绪"),
            ("status.awaiting_ack", "awaiting operator acknowledge", "等待操作员确认"),
            ("ascram.matrix_dc", "AUTO SCRAM: matrix disconnected", "自动紧急停堆：感应矩阵断开"),
            ("ascram.matrix_fill", "AUTO SCRAM: matrix full", "自动紧急停堆：感应矩阵已满"),
            ("ascram.crit_alarm", "AUTO SCRAM: critical alarm", "自动紧急停堆：严重警报"),
            ("ascram.radiation", "AUTO SCRAM: high radiation", "自动紧急停堆：高辐射"),
            ("ascram.gen_fault", "AUTO SCRAM: generation fault", "自动紧急停堆：发电故障"),
        ];
        let mut en = HashMap::new();
        let mut zh = HashMap::new();
        for (key, e, z) in entries {
            en.insert(*key, *e);
            zh.insert(*key, *z);
        }
        Table { en, zh }
    })
}

/// Look up an operator string. Unknown keys return the key itself so a
/// missing entry is visible rather than silent.
pub fn tr(lang: Lang, key: &str) -> &str {
    let t = table();
    let map = match lang {
        Lang::English => &t.en,
        Lang::Chinese => &t.zh,
    };
    map.get(key)
        .or_else(|| t.en.get(key))
        .copied()
        .unwrap_or(key)
}
