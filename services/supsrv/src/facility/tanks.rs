//! Facility tank topology solver
//!
//! Units with a facility-connected dynamic tank (`def = 2`) can fan into
//! shared tanks according to the facility tank mode. The solver reduces the
//! per-unit tank definitions to a tank list: a non-zero entry means a tank
//! object is physically present in that slot, later slots that share the
//! same facility tank become 0.
//!
//! Mode groupings over four slots (`A`/`B`/`C` denote shared tanks):
//!
//! | mode | grouping |
//! |------|----------|
//! | 0    | per-unit tanks, defs copied |
//! | 1    | A A A A  |
//! | 2    | A A A B  |
//! | 3    | A A B B  |
//! | 4    | A B B B  |
//! | 5    | A A B C  |
//! | 6    | A B B C  |
//! | 7    | A B C C  |

/// Maximum number of reactor units / tank slots.
pub const MAX_UNITS: usize = 4;

/// Shared-window spans per mode, 0-indexed half-open ranges. Slots outside
/// every window keep their definition as-is (they are their own tank).
fn mode_windows(mode: u8) -> &'static [(usize, usize)] {
    match mode {
        1 => &[(0, 4)],
        2 => &[(0, 3)],
        3 => &[(0, 2), (2, 4)],
        4 => &[(1, 4)],
        5 => &[(0, 2)],
        6 => &[(1, 3)],
        7 => &[(2, 4)],
        _ => &[],
    }
}

/// Reduce tank definitions to the physical tank list.
///
/// `defs[i] ∈ {0 = none, 1 = unit-local, 2 = facility}`; `mode ∈ 0..=7`.
/// Within each shared window, the first facility-connected slot keeps its
/// `2` (it holds the shared tank) and every later `2` in the window becomes
/// `0`. `0` and `1` entries always pass through.
pub fn solve_tank_list(mode: u8, defs: &[u8]) -> Vec<u8> {
    let mut list = defs.to_vec();
    if mode == 0 {
        return list;
    }

    for &(start, end) in mode_windows(mode) {
        let end = end.min(list.len());
        if start >= end {
            continue;
        }
        let mut seen_facility = false;
        for slot in &mut list[start..end] {
            if *slot == 2 {
                if seen_facility {
                    *slot = 0;
                } else {
                    seen_facility = true;
                }
            }
        }
    }

    list
}

/// Count of physical tanks in a solved list.
pub fn tank_count(list: &[u8]) -> usize {
    list.iter().filter(|t| **t != 0).count()
}
