//! Countdown state machine.
//!
//! The countdown never reads a clock: the owner feeds it one [`Countdown::tick`]
//! per elapsed second, which keeps it deterministic under test.

/// Lifecycle of the countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownPhase {
    Running,
    /// Reading mode: time is frozen until resumed.
    Suspended,
    /// Terminal. Reached when the remaining time hits zero.
    Expired,
}

/// Result of feeding one tick to the countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// One second elapsed. `warning` carries the threshold crossed by this tick, if any.
    Advanced { remaining: u32, warning: Option<u32> },
    /// This tick reached zero. Returned exactly once.
    Expired,
    /// Nothing happened: the countdown is suspended or already expired.
    Ignored(CountdownPhase),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Countdown {
    remaining: u32,
    phase: CountdownPhase,
    thresholds: Vec<u32>,
}

impl Countdown {
    /// A running countdown. Starting at zero yields an already expired one.
    #[must_use]
    pub fn new(seconds: u32, thresholds: &[u32]) -> Self {
        let phase = if seconds == 0 {
            CountdownPhase::Expired
        } else {
            CountdownPhase::Running
        };
        Self {
            remaining: seconds,
            phase,
            thresholds: thresholds.to_vec(),
        }
    }

    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    #[must_use]
    pub fn phase(&self) -> CountdownPhase {
        self.phase
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.phase == CountdownPhase::Expired
    }

    pub fn tick(&mut self) -> Tick {
        if self.phase != CountdownPhase::Running {
            return Tick::Ignored(self.phase);
        }

        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.phase = CountdownPhase::Expired;
            return Tick::Expired;
        }

        let warning = self.thresholds.iter().copied().find(|t| *t == self.remaining);
        Tick::Advanced {
            remaining: self.remaining,
            warning,
        }
    }

    /// Freeze the countdown. Returns false unless it was running.
    pub fn suspend(&mut self) -> bool {
        if self.phase == CountdownPhase::Running {
            self.phase = CountdownPhase::Suspended;
            true
        } else {
            false
        }
    }

    /// Continue from the frozen value. Returns false unless it was suspended.
    pub fn resume(&mut self) -> bool {
        if self.phase == CountdownPhase::Suspended {
            self.phase = CountdownPhase::Running;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_decrement_by_one() {
        let mut countdown = Countdown::new(5, &[]);
        assert_eq!(
            countdown.tick(),
            Tick::Advanced {
                remaining: 4,
                warning: None
            }
        );
        assert_eq!(countdown.remaining(), 4);
    }

    #[test]
    fn reaching_zero_expires_exactly_once() {
        let mut countdown = Countdown::new(2, &[]);
        countdown.tick();
        assert_eq!(countdown.tick(), Tick::Expired);
        assert_eq!(countdown.tick(), Tick::Ignored(CountdownPhase::Expired));
        assert_eq!(countdown.remaining(), 0);
        assert!(countdown.is_expired());
    }

    #[test]
    fn warnings_fire_once_per_threshold() {
        let mut countdown = Countdown::new(125, &[120, 60, 30]);
        let mut warnings = Vec::new();
        while let Tick::Advanced { warning, .. } = countdown.tick() {
            warnings.extend(warning);
        }
        assert_eq!(warnings, vec![120, 60, 30]);
        assert!(countdown.is_expired());
    }

    #[test]
    fn thresholds_already_passed_do_not_fire() {
        let mut countdown = Countdown::new(50, &[120, 60, 30]);
        let mut warnings = Vec::new();
        while let Tick::Advanced { warning, .. } = countdown.tick() {
            warnings.extend(warning);
        }
        assert_eq!(warnings, vec![30]);
    }

    #[test]
    fn suspension_freezes_time() {
        let mut countdown = Countdown::new(10, &[]);
        countdown.tick();
        assert!(countdown.suspend());
        assert_eq!(countdown.tick(), Tick::Ignored(CountdownPhase::Suspended));
        assert_eq!(countdown.remaining(), 9);
        assert!(!countdown.suspend());

        assert!(countdown.resume());
        countdown.tick();
        assert_eq!(countdown.remaining(), 8);
    }

    #[test]
    fn expired_countdown_cannot_resume() {
        let mut countdown = Countdown::new(1, &[]);
        assert_eq!(countdown.tick(), Tick::Expired);
        assert!(!countdown.suspend());
        assert!(!countdown.resume());
        assert_eq!(countdown.phase(), CountdownPhase::Expired);
    }

    #[test]
    fn zero_budget_starts_expired() {
        let countdown = Countdown::new(0, &[30]);
        assert!(countdown.is_expired());
    }
}
