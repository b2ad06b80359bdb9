//! Temperature schedules for exploration/exploitation control
//!
//! The scheduler is advisory: it only ever returns a float, clamped to a
//! small positive floor so softmax selection never divides by zero.

use anyhow::Result;
use std::str::FromStr;

/// Floor applied to every returned temperature.
const MIN_TEMPERATURE: f64 = 1e-3;

/// Maximum boost multiplier for the adaptive schedule.
const MAX_BOOST: f64 = 4.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TemperatureSchedule {
    Linear,
    Exponential,
    Cosine,
    Adaptive,
}

impl TemperatureSchedule {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemperatureSchedule::Linear => "linear",
            TemperatureSchedule::Exponential => "exponential",
            TemperatureSchedule::Cosine => "cosine",
            TemperatureSchedule::Adaptive => "adaptive",
        }
    }
}

impl FromStr for TemperatureSchedule {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "linear" => Ok(TemperatureSchedule::Linear),
            "exponential" => Ok(TemperatureSchedule::Exponential),
            "cosine" => Ok(TemperatureSchedule::Cosine),
            "adaptive" => Ok(TemperatureSchedule::Adaptive),
            _ => Err(anyhow::anyhow!(
                "Invalid temperature schedule: {}. Must be linear, exponential, cosine, or adaptive",
                s
            )),
        }
    }
}

/// Per-run scheduler state. `observe` is called once per step with the best
/// score so far; the adaptive schedule boosts exploration after a patience
/// window without improvement and cools back down on improvement.
#[derive(Clone, Debug)]
pub struct TemperatureScheduler {
    initial: f64,
    schedule: TemperatureSchedule,
    patience: usize,
    min_improvement: f64,
    best_seen: f64,
    stagnant_steps: usize,
    boost: f64,
}

impl TemperatureScheduler {
    pub fn new(
        initial: f64,
        schedule: TemperatureSchedule,
        patience: usize,
        min_improvement: f64,
    ) -> Self {
        Self {
            initial,
            schedule,
            patience: patience.max(1),
            min_improvement,
            best_seen: f64::MIN,
            stagnant_steps: 0,
            boost: 1.0,
        }
    }

    /// Current temperature for `step` of `max_steps`.
    pub fn current(&self, step: usize, max_steps: usize) -> f64 {
        let t = step as f64 / max_steps.max(1) as f64;
        let base = match self.schedule {
            TemperatureSchedule::Linear => self.initial * (1.0 - t),
            TemperatureSchedule::Exponential => self.initial * (-3.0 * t).exp(),
            TemperatureSchedule::Cosine => {
                self.initial * 0.5 * (1.0 + (std::f64::consts::PI * t).cos())
            }
            TemperatureSchedule::Adaptive => {
                self.initial * 0.5 * (1.0 + (std::f64::consts::PI * t).cos()) * self.boost
            }
        };
        base.max(MIN_TEMPERATURE)
    }

    /// Record the observed best score for this step. Updates adaptive state
    /// only; the other schedules ignore observations.
    pub fn observe(&mut self, best_score: f64) {
        if best_score > self.best_seen + self.min_improvement {
            self.best_seen = best_score;
            self.stagnant_steps = 0;
            self.boost = (self.boost * 0.75).max(1.0);
        } else {
            self.stagnant_steps += 1;
            if self.stagnant_steps >= self.patience {
                self.boost = (self.boost * 1.5).min(MAX_BOOST);
                self.stagnant_steps = 0;
                tracing::debug!(boost = self.boost, "Adaptive temperature boosted");
            }
        }
    }
}
