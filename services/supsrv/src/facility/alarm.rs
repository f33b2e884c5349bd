//! Alarm annunciators and the tone mixer
//!
//! Each unit runs one annunciator per alarm channel, latching through the
//! standard alarm discipline: a condition trips the channel, the operator
//! acknowledges it, and a cleared condition rings back until reset. The
//! mixer folds every audible annunciator into the 8-slot tone bitmap handed
//! to the audio renderer once per tick.

use fission_comlink::protocols::{Alarm, AlarmState, ALARM_COUNT, TONE_COUNT};

/// One latching annunciator channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct Annunciator {
    state: AlarmState,
}

impl Annunciator {
    /// Advance the latch from the current condition and any pending
    /// acknowledge.
    ///
    /// INACTIVE --condition--> TRIPPED
    /// TRIPPED  --ack-------->  ACKED      (condition still present)
    /// TRIPPED  --clears----->  RING_BACK
    /// ACKED    --clears----->  RING_BACK
    /// RING_BACK --condition->  TRIPPED
    /// RING_BACK --ack------->  INACTIVE
    pub fn update(&mut self, condition: bool, ack: bool) {
        self.state = match self.state {
            AlarmState::Inactive => {
                if condition {
                    AlarmState::Tripped
                } else {
                    AlarmState::Inactive
                }
            }
            AlarmState::Tripped => {
                if !condition {
                    AlarmState::RingBack
                } else if ack {
                    AlarmState::Acked
                } else {
                    AlarmState::Tripped
                }
            }
            AlarmState::Acked => {
                if !condition {
                    AlarmState::RingBack
                } else {
                    AlarmState::Acked
                }
            }
            AlarmState::RingBack => {
                if condition {
                    AlarmState::Tripped
                } else if ack {
                    AlarmState::Inactive
                } else {
                    AlarmState::RingBack
                }
            }
        };
    }

    pub fn state(&self) -> AlarmState {
        self.state
    }

    /// The alarm condition is present (acknowledged or not).
    pub fn is_active(&self) -> bool {
        matches!(self.state, AlarmState::Tripped | AlarmState::Acked)
    }
}

/// The full annunciator panel of one unit.
#[derive(Debug, Clone, Default)]
pub struct AnnunciatorPanel {
    channels: [Annunciator; ALARM_COUNT],
    ack_pending: [bool; ALARM_COUNT],
}

impl AnnunciatorPanel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an operator acknowledge for one alarm; consumed on the next
    /// update.
    pub fn ack(&mut self, alarm: Alarm) {
        self.ack_pending[alarm.index()] = true;
    }

    pub fn ack_all(&mut self) {
        self.ack_pending = [true; ALARM_COUNT];
    }

    /// Evaluate all channels against their current conditions.
    pub fn update(&mut self, conditions: &[bool; ALARM_COUNT]) {
        for (i, channel) in self.channels.iter_mut().enumerate() {
            channel.update(conditions[i], self.ack_pending[i]);
            self.ack_pending[i] = false;
        }
    }

    pub fn states(&self) -> [AlarmState; ALARM_COUNT] {
        let mut out = [AlarmState::Inactive; ALARM_COUNT];
        for (i, c) in self.channels.iter().enumerate() {
            out[i] = c.state();
        }
        out
    }

    pub fn state_of(&self, alarm: Alarm) -> AlarmState {
        self.channels[alarm.index()].state()
    }

    /// Any critical alarm with its condition present.
    pub fn any_critical_active(&self) -> bool {
        Alarm::ALL
            .iter()
            .any(|a| a.is_critical() && self.channels[a.index()].is_active())
    }

    /// Fold this panel into a tone bitmap.
    pub fn mix_into(&self, tones: &mut [bool; TONE_COUNT]) {
        for alarm in Alarm::ALL {
            if self.channels[alarm.index()].state().is_audible() {
                tones[alarm.tone_slot()] = true;
            }
        }
    }
}

/// Facility-level tone mixing with test-mode override.
///
/// Real alarm tones and test tones are mutually exclusive: engaging either
/// side clears the other.
#[derive(Debug, Clone, Default)]
pub struct ToneMixer {
    test_tones: [bool; TONE_COUNT],
    alarm_tests: [bool; ALARM_COUNT],
    test_engaged: bool,
}

impl ToneMixer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct tone test from the coordinator diagnostics page.
    pub fn set_tone_test(&mut self, states: [bool; TONE_COUNT]) {
        self.test_tones = states;
        self.alarm_tests = [false; ALARM_COUNT];
        self.test_engaged = states.iter().any(|s| *s);
    }

    /// Per-alarm test: drives the alarm's tone slot without a real trip.
    pub fn set_alarm_test(&mut self, alarm: Alarm, active: bool) {
        self.alarm_tests[alarm.index()] = active;
        self.test_tones = [false; TONE_COUNT];
        self.test_engaged = self.alarm_tests.iter().any(|s| *s);
    }

    pub fn test_engaged(&self) -> bool {
        self.test_engaged
    }

    pub fn alarm_tests(&self) -> [bool; ALARM_COUNT] {
        self.alarm_tests
    }

    /// Produce the tone bitmap for this tick. Engaging any real alarm drops
    /// the test override.
    pub fn mix(&mut self, panels: &[&AnnunciatorPanel]) -> [bool; TONE_COUNT] {
        let mut real = [false; TONE_COUNT];
        for panel in panels {
            panel.mix_into(&mut real);
        }

        if real.iter().any(|t| *t) {
            // Real alarms pre-empt any running test
            self.test_tones = [false; TONE_COUNT];
            self.alarm_tests = [false; ALARM_COUNT];
            self.test_engaged = false;
            return real;
        }

        if self.test_engaged {
            let mut out = self.test_tones;
            for alarm in Alarm::ALL {
                if self.alarm_tests[alarm.index()] {
                    out[alarm.tone_slot()] = true;
                }
            }
            return out;
        }

        real
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_conditions() -> [bool; ALARM_COUNT] {
        [false; ALARM_COUNT]
    }

    fn condition(alarm: Alarm) -> [bool; ALARM_COUNT] {
        let mut c = no_conditions();
        c[alarm.index()] = true;
        c
    }

    #[test]
    fn test_trip_ack_clear_reset_cycle() {
        let mut panel = AnnunciatorPanel::new();
        let alarm = Alarm::ReactorHighTemp;

        panel.update(&condition(alarm));
        assert_eq!(panel.state_of(alarm), AlarmState::Tripped);

        panel.ack(alarm);
        panel.update(&condition(alarm));
        assert_eq!(panel.state_of(alarm), AlarmState::Acked);

        panel.update(&no_conditions());
        assert_eq!(panel.state_of(alarm), AlarmState::RingBack);

        panel.ack(alarm);
        panel.update(&no_conditions());
        assert_eq!(panel.state_of(alarm), AlarmState::Inactive);
    }

    #[test]
    fn test_unacked_clear_rings_back() {
        let mut panel = AnnunciatorPanel::new();
        let alarm = Alarm::TurbineTrip;

        panel.update(&condition(alarm));
        panel.update(&no_conditions());
        assert_eq!(panel.state_of(alarm), AlarmState::RingBack);
    }

    #[test]
    fn test_ring_back_retrips() {
        let mut panel = AnnunciatorPanel::new();
        let alarm = Alarm::ReactorDamage;

        panel.update(&condition(alarm));
        panel.update(&no_conditions());
        panel.update(&condition(alarm));
        assert_eq!(panel.state_of(alarm), AlarmState::Tripped);
    }

    #[test]
    fn test_ack_without_condition_is_inert() {
        let mut panel = AnnunciatorPanel::new();
        panel.ack(Alarm::RpsTransient);
        panel.update(&no_conditions());
        assert_eq!(panel.state_of(Alarm::RpsTransient), AlarmState::Inactive);
    }

    #[test]
    fn test_critical_detection() {
        let mut panel = AnnunciatorPanel::new();
        panel.update(&condition(Alarm::ReactorHighWaste));
        assert!(!panel.any_critical_active());

        panel.update(&condition(Alarm::CriticalDamage));
        assert!(panel.any_critical_active());

        // Ring-back is a cleared condition: no longer critical-active
        panel.update(&no_conditions());
        assert!(!panel.any_critical_active());
    }

    #[test]
    fn test_mixer_real_tones() {
        let mut panel = AnnunciatorPanel::new();
        panel.update(&condition(Alarm::RpsTransient));

        let mut mixer = ToneMixer::new();
        let tones = mixer.mix(&[&panel]);
        assert!(tones[Alarm::RpsTransient.tone_slot()]);
        assert_eq!(tones.iter().filter(|t| **t).count(), 1);
    }

    #[test]
    fn test_mixer_test_mode_replaces_real() {
        let mut mixer = ToneMixer::new();
        let quiet = AnnunciatorPanel::new();

        mixer.set_tone_test([true, false, false, false, false, false, false, true]);
        let tones = mixer.mix(&[&quiet]);
        assert!(tones[0] && tones[7]);
    }

    #[test]
    fn test_real_alarm_preempts_test() {
        let mut mixer = ToneMixer::new();
        mixer.set_tone_test([true; TONE_COUNT]);

        let mut panel = AnnunciatorPanel::new();
        panel.update(&condition(Alarm::ReactorOverTemp));

        let tones = mixer.mix(&[&panel]);
        assert!(tones[Alarm::ReactorOverTemp.tone_slot()]);
        assert!(!mixer.test_engaged());
        // Only the real alarm's slot sounds
        assert_eq!(tones.iter().filter(|t| **t).count(), 1);
    }

    #[test]
    fn test_alarm_test_drives_mapped_slot() {
        let mut mixer = ToneMixer::new();
        mixer.set_alarm_test(Alarm::ContainmentBreach, true);

        let quiet = AnnunciatorPanel::new();
        let tones = mixer.mix(&[&quiet]);
        assert!(tones[Alarm::ContainmentBreach.tone_slot()]);
    }

    #[test]
    fn test_tone_test_clears_alarm_test() {
        let mut mixer = ToneMixer::new();
        mixer.set_alarm_test(Alarm::ContainmentBreach, true);
        mixer.set_tone_test([false; TONE_COUNT]);

        assert!(!mixer.test_engaged());
        assert_eq!(mixer.alarm_tests(), [false; ALARM_COUNT]);
    }
}
