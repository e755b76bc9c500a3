/// Adaptive poll interval.
///
/// Activity snaps the interval to the floor so bursts are tracked promptly;
/// each idle cycle grows it geometrically up to the ceiling.
use std::time::Duration;

use crate::config::WatcherConfig;

pub trait PollingPolicy: Send {
    fn interval(&self) -> Duration;
    fn on_activity(&mut self);
    fn on_idle(&mut self);
    fn reset(&mut self);
}

#[derive(Debug, Clone)]
pub struct AdaptiveInterval {
    current: Duration,
    initial: Duration,
    min: Duration,
    max: Duration,
    backoff: f64,
}

impl AdaptiveInterval {
    pub fn new(min: Duration, initial: Duration, max: Duration, backoff: f64) -> Self {
        let max = max.max(min);
        let initial = initial.clamp(min, max);
        Self {
            current: initial,
            initial,
            min,
            max,
            backoff: if backoff.is_finite() && backoff >= 1.0 { backoff } else { 1.0 },
        }
    }

    pub fn from_config(config: &WatcherConfig) -> Self {
        Self::new(
            Duration::from_millis(config.min_interval_ms),
            Duration::from_millis(config.initial_interval_ms),
            Duration::from_millis(config.max_interval_ms),
            config.backoff_factor,
        )
    }
}

impl PollingPolicy for AdaptiveInterval {
    fn interval(&self) -> Duration {
        self.current
    }

    fn on_activity(&mut self) {
        self.current = self.min;
    }

    fn on_idle(&mut self) {
        self.current = self.current.mul_f64(self.backoff).min(self.max);
    }

    fn reset(&mut self) {
        self.current = self.initial;
    }
}
