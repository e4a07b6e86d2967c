//! The domain clock.
//!
//! All engine timing (cooldowns, delays, deadlines, time-since
//! conditions) runs on an explicit clock advanced once per tick by the
//! frame delta. Core logic never reads a system clock, so pausing or
//! seeking the embedding game does not distort elapsed-time semantics.

/// Monotonically advancing domain time plus a tick counter.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DialogueClock {
    now: f64,
    tick: u64,
}

impl DialogueClock {
    /// A clock at time zero.
    pub const fn new() -> Self {
        Self { now: 0.0, tick: 0 }
    }

    /// Advance by one frame delta in seconds and return the new time.
    /// Negative deltas are clamped to zero; time never moves backwards.
    pub fn advance(&mut self, delta: f32) -> f64 {
        self.now += f64::from(delta.max(0.0));
        self.tick = self.tick.saturating_add(1);
        self.now
    }

    /// Current domain time in seconds.
    pub const fn now(&self) -> f64 {
        self.now
    }

    /// Number of ticks elapsed since startup.
    pub const fn tick(&self) -> u64 {
        self.tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_by_delta_and_counts_ticks() {
        let mut clock = DialogueClock::new();
        assert!((clock.advance(0.5) - 0.5).abs() < f64::EPSILON);
        assert!((clock.advance(0.25) - 0.75).abs() < f64::EPSILON);
        assert_eq!(clock.tick(), 2);
    }

    #[test]
    fn negative_delta_is_clamped() {
        let mut clock = DialogueClock::new();
        clock.advance(1.0);
        let now = clock.advance(-5.0);
        assert!((now - 1.0).abs() < f64::EPSILON);
        assert_eq!(clock.tick(), 2);
    }
}
