//! Tick clock, watchdogs and the timer dispatch table
//!
//! A single 2 Hz monotonic tick drives the facility update, session
//! scanning and alarm evaluation. All deadlines are expressed in
//! milliseconds on the supervisor's monotonic clock so the logic stays
//! testable without a runtime.

use std::collections::HashMap;
use std::time::Duration;

/// Facility update rate.
pub const TICK_HZ: u64 = 2;

/// Milliseconds between facility ticks.
pub const TICK_MS: u64 = 1000 / TICK_HZ;

/// Tick period as a `Duration` for `tokio::time::interval`.
pub fn tick_period() -> Duration {
    Duration::from_millis(TICK_MS)
}

/// Per-session liveness watchdog.
///
/// Re-armed on every valid inbound packet; cancelable during link teardown.
/// Expiry is the sole liveness criterion for a session.
#[derive(Debug, Clone)]
pub struct Watchdog {
    timeout_ms: u64,
    deadline_ms: u64,
    armed: bool,
}

impl Watchdog {
    pub fn new(timeout: Duration, now_ms: u64) -> Self {
        let timeout_ms = timeout.as_millis() as u64;
        Self {
            timeout_ms,
            deadline_ms: now_ms + timeout_ms,
            armed: true,
        }
    }

    /// Re-arm from a valid packet.
    pub fn feed(&mut self, now_ms: u64) {
        self.deadline_ms = now_ms + self.timeout_ms;
        self.armed = true;
    }

    pub fn cancel(&mut self) {
        self.armed = false;
    }

    pub fn fired(&self, now_ms: u64) -> bool {
        self.armed && now_ms >= self.deadline_ms
    }
}

/// Identifies a recurring timer owned by a session or the facility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// Burn-rate command re-send for a unit (unit id)
    BurnResend(u8),
    /// Multiblock formed-state poll for an RTU entry (session id, uid)
    FormedPoll(u32, u8),
    /// Keep-alive probe for a session (session id)
    KeepAlive(u32),
}

/// Timer dispatch table keyed by [`TimerId`], so nested timers co-exist.
///
/// `due` drains every timer whose deadline passed and re-arms periodic ones
/// in place.
#[derive(Debug, Default)]
pub struct TimerTable {
    timers: HashMap<TimerId, TimerEntry>,
}

#[derive(Debug, Clone)]
struct TimerEntry {
    deadline_ms: u64,
    period_ms: Option<u64>,
}

impl TimerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) a one-shot timer.
    pub fn arm_oneshot(&mut self, id: TimerId, now_ms: u64, delay: Duration) {
        self.timers.insert(
            id,
            TimerEntry {
                deadline_ms: now_ms + delay.as_millis() as u64,
                period_ms: None,
            },
        );
    }

    /// Arm (or re-arm) a periodic timer.
    pub fn arm_periodic(&mut self, id: TimerId, now_ms: u64, period: Duration) {
        let period_ms = period.as_millis() as u64;
        self.timers.insert(
            id,
            TimerEntry {
                deadline_ms: now_ms + period_ms,
                period_ms: Some(period_ms),
            },
        );
    }

    pub fn cancel(&mut self, id: &TimerId) {
        self.timers.remove(id);
    }

    /// Cancel every timer belonging to a session (used on session close).
    pub fn cancel_session(&mut self, session_id: u32) {
        self.timers.retain(|id, _| match id {
            TimerId::FormedPoll(sid, _) | TimerId::KeepAlive(sid) => *sid != session_id,
            TimerId::BurnResend(_) => true,
        });
    }

    /// Drain due timers. Periodic timers re-arm from their old deadline so
    /// the rate does not drift with dispatch latency.
    pub fn due(&mut self, now_ms: u64) -> Vec<TimerId> {
        let mut fired = Vec::new();
        for (id, entry) in self.timers.iter_mut() {
            if entry.deadline_ms <= now_ms {
                fired.push(*id);
                if let Some(period) = entry.period_ms {
                    entry.deadline_ms += period.max(1);
                    // If dispatch fell far behind, skip missed firings
                    if entry.deadline_ms <= now_ms {
                        entry.deadline_ms = now_ms + period;
                    }
                }
            }
        }
        for id in &fired {
            if self.timers.get(id).is_some_and(|e| e.period_ms.is_none()) {
                self.timers.remove(id);
            }
        }
        fired
    }

    pub fn is_armed(&self, id: &TimerId) -> bool {
        self.timers.contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watchdog_feeds_and_fires() {
        let mut wd = Watchdog::new(Duration::from_secs(5), 0);
        assert!(!wd.fired(4_999));
        assert!(wd.fired(5_000));

        wd.feed(4_000);
        assert!(!wd.fired(8_999));
        assert!(wd.fired(9_000));
    }

    #[test]
    fn test_watchdog_cancel() {
        let mut wd = Watchdog::new(Duration::from_secs(5), 0);
        wd.cancel();
        assert!(!wd.fired(100_000));
    }

    #[test]
    fn test_oneshot_fires_once() {
        let mut table = TimerTable::new();
        table.arm_oneshot(TimerId::BurnResend(1), 0, Duration::from_millis(100));

        assert!(table.due(50).is_empty());
        assert_eq!(table.due(100), vec![TimerId::BurnResend(1)]);
        assert!(table.due(10_000).is_empty());
    }

    #[test]
    fn test_periodic_rearms() {
        let mut table = TimerTable::new();
        table.arm_periodic(TimerId::FormedPoll(7, 1), 0, Duration::from_millis(250));

        assert_eq!(table.due(250), vec![TimerId::FormedPoll(7, 1)]);
        assert!(table.due(300).is_empty());
        assert_eq!(table.due(500), vec![TimerId::FormedPoll(7, 1)]);
    }

    #[test]
    fn test_periodic_skips_missed_firings() {
        let mut table = TimerTable::new();
        table.arm_periodic(TimerId::KeepAlive(1), 0, Duration::from_millis(250));

        // Dispatch stalls for 10 periods: a single firing, then back on rate
        assert_eq!(table.due(2_500).len(), 1);
        assert!(table.due(2_600).is_empty());
        assert_eq!(table.due(2_750).len(), 1);
    }

    #[test]
    fn test_cancel_session_scoped() {
        let mut table = TimerTable::new();
        table.arm_periodic(TimerId::FormedPoll(1, 1), 0, Duration::from_millis(250));
        table.arm_periodic(TimerId::FormedPoll(2, 1), 0, Duration::from_millis(250));
        table.arm_periodic(TimerId::KeepAlive(1), 0, Duration::from_millis(1000));
        table.arm_oneshot(TimerId::BurnResend(1), 0, Duration::from_millis(100));

        table.cancel_session(1);

        assert!(!table.is_armed(&TimerId::FormedPoll(1, 1)));
        assert!(!table.is_armed(&TimerId::KeepAlive(1)));
        assert!(table.is_armed(&TimerId::FormedPoll(2, 1)));
        assert!(table.is_armed(&TimerId::BurnResend(1)));
    }
}
