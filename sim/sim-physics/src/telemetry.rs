//! Per-stage tick timing and the real-time rate.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Stage durations of the last tick.
///
/// `real_time_rate` is `dt / total`: above 1 the engine runs faster than
/// simulated time.
#[derive(Debug, Clone)]
pub struct PhysicsEngineTimers {
    /// Whole tick.
    pub total: Duration,
    /// Controllers, snapshot and unconstrained forward dynamics.
    pub initial_phase: Duration,
    /// Collision detection.
    pub detect_collisions: Duration,
    /// Grouping and building the group solvers.
    pub configure_collision_handlers: Duration,
    /// Standalone joint limits and the group solvers.
    pub handle_collisions: Duration,
    /// Write-back, integration, frames and sensors.
    pub final_phase: Duration,
    /// Simulated time over wall time for the last tick.
    pub real_time_rate: f64,

    window: usize,
    rates: VecDeque<f64>,
    tick_start: Option<Instant>,
    checkpoint: Option<Instant>,
}

impl Default for PhysicsEngineTimers {
    fn default() -> Self {
        Self::new(100)
    }
}

impl PhysicsEngineTimers {
    /// Timers averaging the real-time rate over `window` ticks.
    #[must_use]
    pub fn new(window: usize) -> Self {
        Self {
            total: Duration::ZERO,
            initial_phase: Duration::ZERO,
            detect_collisions: Duration::ZERO,
            configure_collision_handlers: Duration::ZERO,
            handle_collisions: Duration::ZERO,
            final_phase: Duration::ZERO,
            real_time_rate: 0.0,
            window: window.max(1),
            rates: VecDeque::with_capacity(window.max(1)),
            tick_start: None,
            checkpoint: None,
        }
    }

    /// Number of ticks in the averaging window.
    #[must_use]
    pub fn window(&self) -> usize {
        self.window
    }

    /// Mean real-time rate over the last `window` ticks, 0 before the first.
    #[must_use]
    pub fn average_real_time_rate(&self) -> f64 {
        if self.rates.is_empty() {
            return 0.0;
        }
        self.rates.iter().sum::<f64>() / self.rates.len() as f64
    }

    pub(crate) fn start_tick(&mut self) {
        let now = Instant::now();
        self.tick_start = Some(now);
        self.checkpoint = Some(now);
    }

    /// Time since the previous checkpoint; moves the checkpoint to now.
    pub(crate) fn lap(&mut self) -> Duration {
        let now = Instant::now();
        let elapsed = self
            .checkpoint
            .map_or(Duration::ZERO, |last| now.saturating_duration_since(last));
        self.checkpoint = Some(now);
        elapsed
    }

    pub(crate) fn end_tick(&mut self, dt: f64) {
        self.total = self
            .tick_start
            .map_or(Duration::ZERO, |start| start.elapsed());
        self.record_rate(dt, self.total);
    }

    fn record_rate(&mut self, dt: f64, total: Duration) {
        let seconds = total.as_secs_f64();
        self.real_time_rate = if seconds > 0.0 { dt / seconds } else { f64::INFINITY };
        if !self.real_time_rate.is_finite() {
            return;
        }
        if self.rates.len() == self.window {
            self.rates.pop_front();
        }
        self.rates.push_back(self.real_time_rate);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_real_time_rate() {
        let mut timers = PhysicsEngineTimers::new(4);
        timers.record_rate(0.001, Duration::from_micros(500));
        assert_relative_eq!(timers.real_time_rate, 2.0, epsilon = 1e-12);
        assert_relative_eq!(timers.average_real_time_rate(), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_average_slides_over_window() {
        let mut timers = PhysicsEngineTimers::new(2);
        timers.record_rate(0.001, Duration::from_millis(1));
        timers.record_rate(0.001, Duration::from_micros(500));
        timers.record_rate(0.001, Duration::from_micros(250));
        // Only the last two ticks: rates 2 and 4.
        assert_relative_eq!(timers.average_real_time_rate(), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_duration_is_not_averaged() {
        let mut timers = PhysicsEngineTimers::default();
        timers.record_rate(0.001, Duration::ZERO);
        assert!(timers.real_time_rate.is_infinite());
        assert_eq!(timers.average_real_time_rate(), 0.0);
    }

    #[test]
    fn test_laps_accumulate_into_total() {
        let mut timers = PhysicsEngineTimers::default();
        timers.start_tick();
        let first = timers.lap();
        let second = timers.lap();
        timers.end_tick(0.001);
        assert!(timers.total >= first + second);
    }
}
