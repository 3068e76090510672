// Per-client traffic decisions

use std::time::Duration;

use rand::rngs::{OsRng, SmallRng};
use rand::{Rng, SeedableRng};

use crate::config::Config;
use crate::error::SimError;

/// Lowest and highest synthetic callee number (`user1000` ..= `user9999`).
pub const CALLEE_RANGE: std::ops::RangeInclusive<u32> = 1000..=9999;

/// Randomization bounds for one client's traffic.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannerSettings {
    pub call_probability: f64,
    pub call_duration_min: Duration,
    pub call_duration_max: Duration,
    pub register_interval_min: Duration,
    pub register_interval_max: Duration,
}

impl PlannerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            call_probability: config.call_probability,
            call_duration_min: Duration::from_millis(config.call_duration_min_ms),
            call_duration_max: Duration::from_millis(config.call_duration_max_ms),
            register_interval_min: Duration::from_millis(config.register_interval_min_ms),
            register_interval_max: Duration::from_millis(config.register_interval_max_ms),
        }
    }
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// A call to place during a cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CallPlan {
    pub callee: String,
    pub duration: Duration,
}

/// Decisions for one REGISTER cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Cycle {
    pub call: Option<CallPlan>,
    /// Pause after the cycle before the next REGISTER.
    pub pause: Duration,
}

pub struct TrafficPlanner {
    rng: SmallRng,
    settings: PlannerSettings,
}

impl TrafficPlanner {
    /// Planner seeded from the OS randomness source.
    pub fn new(settings: PlannerSettings) -> Result<Self, SimError> {
        let rng = SmallRng::from_rng(OsRng)
            .map_err(|e| SimError::EntropyUnavailable(e.to_string()))?;
        Ok(Self { rng, settings })
    }

    /// Deterministic planner for tests and reproducible runs.
    pub fn seeded(settings: PlannerSettings, seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            settings,
        }
    }

    /// Uniform in `[min, max)`, or exactly `min` when the range is empty.
    fn sample(&mut self, min: Duration, max: Duration) -> Duration {
        if max <= min {
            return min;
        }
        self.rng.gen_range(min..max)
    }

    pub fn next_callee(&mut self) -> String {
        format!("user{}", self.rng.gen_range(CALLEE_RANGE))
    }

    pub fn next_cycle(&mut self) -> Cycle {
        let p = self.settings.call_probability.clamp(0.0, 1.0);
        let call = if self.rng.gen_bool(p) {
            let callee = self.next_callee();
            let duration =
                self.sample(self.settings.call_duration_min, self.settings.call_duration_max);
            Some(CallPlan { callee, duration })
        } else {
            None
        };
        let pause = self.sample(
            self.settings.register_interval_min,
            self.settings.register_interval_max,
        );
        Cycle { call, pause }
    }
}
