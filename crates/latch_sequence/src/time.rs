//! Evaluation clock
//!
//! Fixed-rate tick counter for the spawnables pass

use std::time::Duration;

/// Default evaluation rate (60 Hz)
pub const DEFAULT_FRAME_RATE: u32 = 60;

#[derive(Debug, Clone)]
pub struct EvaluationClock {
    frame_rate: u32,
    tick_count: u64,
}

impl EvaluationClock {
    /// Clock ticking at `frame_rate` Hz. Zero is treated as one.
    pub fn new(frame_rate: u32) -> Self {
        Self {
            frame_rate: frame_rate.max(1),
            tick_count: 0,
        }
    }

    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs(1) / self.frame_rate
    }

    /// Advance one tick, returning the new tick number.
    pub fn advance_tick(&mut self) -> u64 {
        self.tick_count += 1;
        self.tick_count
    }

    pub fn total_time(&self) -> Duration {
        let rate = u64::from(self.frame_rate);
        // remainder < frame_rate, so it fits in u32
        let partial = (self.tick_count % rate) as u32;
        Duration::from_secs(self.tick_count / rate)
            + Duration::from_secs(1) * partial / self.frame_rate
    }
}

impl Default for EvaluationClock {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_accumulate_time() {
        let mut clock = EvaluationClock::new(50);
        assert_eq!(clock.advance_tick(), 1);
        assert_eq!(clock.advance_tick(), 2);
        assert_eq!(clock.total_time(), Duration::from_millis(40));
        assert_eq!(EvaluationClock::new(0).frame_rate(), 1);
    }

    #[test]
    fn total_time_covers_long_runs() {
        let mut clock = EvaluationClock::new(1);
        clock.tick_count = u64::from(u32::MAX) + 10;
        assert_eq!(clock.total_time(), Duration::from_secs(u64::from(u32::MAX) + 10));

        let mut clock = EvaluationClock::new(60);
        clock.tick_count = 60 * 5_000_000_000 + 30;
        assert_eq!(
            clock.total_time(),
            Duration::from_secs(5_000_000_000) + Duration::from_millis(500)
        );
    }
}
