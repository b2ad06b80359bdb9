//! Optimizer configuration

use anyhow::{Context, Result};
use std::time::Duration;

use crate::error::OptimizerError;
use crate::strategy::Strategy;
use crate::temperature::TemperatureSchedule;
use crate::trajectory::ModelConfig;

#[derive(Clone, Debug)]
pub struct OptimizerConfig {
    /// Number of optimization steps. Zero returns the initial program
    /// unchanged with no steps run.
    pub max_steps: usize,
    /// Examples per mini-batch
    pub batch_size: usize,
    /// Pool entries selected per sampling round
    pub num_candidates: usize,
    /// Concurrent sampler workers
    pub worker_budget: usize,
    /// Starting optimizer temperature
    pub initial_temperature: f64,
    pub temperature_schedule: TemperatureSchedule,
    /// Strategies in the order they are attempted each step
    pub strategy_priority: Vec<Strategy>,
    pub convergence_enabled: bool,
    /// Consecutive stagnant steps before convergence
    pub early_stopping_patience: usize,
    /// Best-score gain below this counts as stagnation
    pub min_improvement_threshold: f64,
    pub max_pool_size: usize,
    pub trajectory_retention_limit: usize,
    /// Demonstration budget driving the dropout rate
    pub max_demos: usize,
    /// Bucket spread at or above this marks improvement potential
    pub bucket_spread_threshold: f64,
    /// Cap on (program, example, model) work items per step; 0 = no cap
    pub max_trajectories_per_step: usize,
    /// Step-level deadline for sampling
    pub step_timeout: Duration,
    /// Model configurations varied across sampling
    pub model_configs: Vec<ModelConfig>,
    /// Seed for all optimizer randomness
    pub seed: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_steps: 15,
            batch_size: 8,
            num_candidates: 4,
            worker_budget: 8,
            initial_temperature: 1.0,
            temperature_schedule: TemperatureSchedule::Adaptive,
            strategy_priority: vec![Strategy::AppendDemonstration, Strategy::AppendRule],
            convergence_enabled: true,
            early_stopping_patience: 3,
            min_improvement_threshold: 0.01,
            max_pool_size: 16,
            trajectory_retention_limit: 512,
            max_demos: 4,
            bucket_spread_threshold: 0.2,
            max_trajectories_per_step: 64,
            step_timeout: Duration::from_secs(120),
            model_configs: vec![ModelConfig::default()],
            seed: 0,
        }
    }
}

impl OptimizerConfig {
    /// Quick development configuration (fast, cheap)
    pub fn development() -> Self {
        Self {
            max_steps: 5,
            batch_size: 4,
            num_candidates: 2,
            worker_budget: 4,
            max_trajectories_per_step: 16,
            step_timeout: Duration::from_secs(30),
            ..Default::default()
        }
    }

    /// Production configuration (thorough, expensive)
    pub fn production() -> Self {
        Self {
            max_steps: 30,
            batch_size: 16,
            num_candidates: 6,
            worker_budget: 16,
            max_pool_size: 32,
            trajectory_retention_limit: 2048,
            max_trajectories_per_step: 128,
            step_timeout: Duration::from_secs(300),
            ..Default::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_schedule(mut self, schedule: TemperatureSchedule) -> Self {
        self.temperature_schedule = schedule;
        self
    }

    /// Load configuration from SIMBA_* environment variables, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let strategy_priority = match std::env::var("SIMBA_STRATEGY_PRIORITY") {
            Ok(s) => s
                .split(',')
                .map(|name| name.trim().parse::<Strategy>())
                .collect::<Result<Vec<_>>>()
                .context("SIMBA_STRATEGY_PRIORITY must be a comma-separated strategy list")?,
            Err(_) => defaults.strategy_priority,
        };

        let temperature_schedule = match std::env::var("SIMBA_TEMPERATURE_SCHEDULE") {
            Ok(s) => s
                .parse()
                .context("SIMBA_TEMPERATURE_SCHEDULE must be a known schedule")?,
            Err(_) => defaults.temperature_schedule,
        };

        let model = std::env::var("SIMBA_MODEL").unwrap_or_else(|_| "default".to_string());
        let model_temperature: f32 = env_parse("SIMBA_MODEL_TEMPERATURE", 0.7)?;

        Ok(Self {
            max_steps: env_parse("SIMBA_MAX_STEPS", defaults.max_steps)?,
            batch_size: env_parse("SIMBA_BATCH_SIZE", defaults.batch_size)?,
            num_candidates: env_parse("SIMBA_NUM_CANDIDATES", defaults.num_candidates)?,
            worker_budget: env_parse("SIMBA_WORKER_BUDGET", defaults.worker_budget)?,
            initial_temperature: env_parse(
                "SIMBA_INITIAL_TEMPERATURE",
                defaults.initial_temperature,
            )?,
            temperature_schedule,
            strategy_priority,
            convergence_enabled: std::env::var("SIMBA_CONVERGENCE")
                .map(|s| s != "false" && s != "0")
                .unwrap_or(defaults.convergence_enabled),
            early_stopping_patience: env_parse(
                "SIMBA_PATIENCE",
                defaults.early_stopping_patience,
            )?,
            min_improvement_threshold: env_parse(
                "SIMBA_MIN_IMPROVEMENT",
                defaults.min_improvement_threshold,
            )?,
            max_pool_size: env_parse("SIMBA_MAX_POOL_SIZE", defaults.max_pool_size)?,
            trajectory_retention_limit: env_parse(
                "SIMBA_TRAJECTORY_RETENTION",
                defaults.trajectory_retention_limit,
            )?,
            max_demos: env_parse("SIMBA_MAX_DEMOS", defaults.max_demos)?,
            bucket_spread_threshold: env_parse(
                "SIMBA_SPREAD_THRESHOLD",
                defaults.bucket_spread_threshold,
            )?,
            max_trajectories_per_step: env_parse(
                "SIMBA_MAX_TRAJECTORIES",
                defaults.max_trajectories_per_step,
            )?,
            step_timeout: Duration::from_secs(env_parse("SIMBA_STEP_TIMEOUT_SECS", 120u64)?),
            model_configs: vec![ModelConfig::new(model, model_temperature)],
            seed: env_parse("SIMBA_SEED", defaults.seed)?,
        })
    }

    /// Check hyperparameter ranges. Run once before any step; failures are
    /// fatal and the optimizer returns without running.
    pub fn validate(&self) -> Result<(), OptimizerError> {
        if self.batch_size == 0 {
            return Err(OptimizerError::InvalidConfig(
                "batch_size must be > 0".to_string(),
            ));
        }
        if self.num_candidates == 0 {
            return Err(OptimizerError::InvalidConfig(
                "num_candidates must be > 0".to_string(),
            ));
        }
        if self.worker_budget == 0 {
            return Err(OptimizerError::InvalidConfig(
                "worker_budget must be > 0".to_string(),
            ));
        }
        if !(self.initial_temperature > 0.0) {
            return Err(OptimizerError::InvalidConfig(
                "initial_temperature must be > 0".to_string(),
            ));
        }
        if self.strategy_priority.is_empty() {
            return Err(OptimizerError::InvalidConfig(
                "strategy_priority must be non-empty".to_string(),
            ));
        }
        if self.early_stopping_patience == 0 {
            return Err(OptimizerError::InvalidConfig(
                "early_stopping_patience must be >= 1".to_string(),
            ));
        }
        if self.min_improvement_threshold < 0.0 {
            return Err(OptimizerError::InvalidConfig(
                "min_improvement_threshold must be >= 0".to_string(),
            ));
        }
        if self.max_pool_size == 0 {
            return Err(OptimizerError::InvalidConfig(
                "max_pool_size must be > 0".to_string(),
            ));
        }
        if self.trajectory_retention_limit == 0 {
            return Err(OptimizerError::InvalidConfig(
                "trajectory_retention_limit must be > 0".to_string(),
            ));
        }
        if self.max_demos == 0 {
            return Err(OptimizerError::InvalidConfig(
                "max_demos must be > 0".to_string(),
            ));
        }
        if self.model_configs.is_empty() {
            return Err(OptimizerError::InvalidConfig(
                "model_configs must be non-empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(var) {
        Ok(s) => s
            .parse()
            .with_context(|| format!("{var} must be a valid value")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_validates() {
        assert!(OptimizerConfig::default().validate().is_ok());
        assert!(OptimizerConfig::development().validate().is_ok());
        assert!(OptimizerConfig::production().validate().is_ok());
    }

    #[test]
    fn test_zero_max_steps_is_allowed() {
        // A zero-step run returns the initial program unchanged; it is not
        // a configuration error.
        let config = OptimizerConfig {
            max_steps: 0,
            ..OptimizerConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_fields_rejected() {
        let bad = |f: fn(&mut OptimizerConfig)| {
            let mut config = OptimizerConfig::default();
            f(&mut config);
            config.validate().is_err()
        };

        assert!(bad(|c| c.batch_size = 0));
        assert!(bad(|c| c.num_candidates = 0));
        assert!(bad(|c| c.worker_budget = 0));
        assert!(bad(|c| c.initial_temperature = 0.0));
        assert!(bad(|c| c.initial_temperature = -1.0));
        assert!(bad(|c| c.strategy_priority = vec![]));
        assert!(bad(|c| c.early_stopping_patience = 0));
        assert!(bad(|c| c.min_improvement_threshold = -0.1));
        assert!(bad(|c| c.max_pool_size = 0));
        assert!(bad(|c| c.trajectory_retention_limit = 0));
        assert!(bad(|c| c.model_configs = vec![]));
    }
}
