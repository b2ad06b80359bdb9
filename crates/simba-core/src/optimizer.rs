//! Optimization controller
//!
//! Orchestrates one step loop: select the circular batch, get the current
//! temperature, select pool candidates, sample trajectories, build buckets,
//! run the strategy engine, admit any produced candidate, and update the
//! convergence window. Steps are strictly sequential; each step's selection
//! depends on the previous step's pool state.

use anyhow::{Context, Result as AnyResult};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use crate::bucket::build_buckets;
use crate::config::OptimizerConfig;
use crate::dataset::{circular_batch, Example};
use crate::error::OptimizerError;
use crate::pool::ProgramPool;
use crate::program::Program;
use crate::sampler::{MetricFn, ProgramExecutor, TrajectorySampler};
use crate::strategy;
use crate::telemetry::{StepEvent, TelemetrySink};
use crate::temperature::TemperatureScheduler;
use crate::trajectory::TrajectoryStore;

/// Why the step loop stopped. Exhaustion is a normal terminal state, not
/// an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Converged,
    Exhausted,
}

/// Final result of an optimization run.
#[derive(Clone, Debug, Serialize)]
pub struct OptimizationReport {
    pub best_program: Program,
    pub best_score: f64,
    pub steps_run: usize,
    pub termination: Termination,
    /// Best score so far, per step
    pub score_history: Vec<f64>,
}

impl OptimizationReport {
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> AnyResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write report {}", path.as_ref().display()))?;
        Ok(())
    }
}

/// Per-run mutable state, owned solely by the controller and discarded at
/// termination. No ambient/global state.
struct OptimizerState {
    step: usize,
    scheduler: TemperatureScheduler,
    /// Recent best scores for convergence detection
    window: VecDeque<f64>,
    pool: ProgramPool,
    store: TrajectoryStore,
    rng: StdRng,
    best_so_far: f64,
    /// Snapshot of the program that achieved `best_so_far`, taken when the
    /// running maximum was last updated. Later recording can dilute or
    /// evict that pool entry; the snapshot keeps the reported program and
    /// score belonging to the same variant.
    best_program: Program,
}

/// A convergence window is stagnant when every consecutive step improved
/// the best score by less than the threshold.
fn window_stagnant(window: &VecDeque<f64>, threshold: f64) -> bool {
    window
        .iter()
        .zip(window.iter().skip(1))
        .all(|(prev, next)| next - prev < threshold)
}

pub struct Optimizer {
    config: OptimizerConfig,
    executor: Arc<dyn ProgramExecutor>,
    metric: MetricFn,
    sink: Option<Arc<dyn TelemetrySink>>,
}

impl Optimizer {
    pub fn new(
        config: OptimizerConfig,
        executor: Arc<dyn ProgramExecutor>,
        metric: MetricFn,
    ) -> Self {
        Self {
            config,
            executor,
            metric,
            sink: None,
        }
    }

    /// Attach a step-event sink. Optional; absence never affects the run.
    pub fn with_telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Run the optimization loop and return the best program variant found
    /// plus summary statistics. Returns an error only when no optimization
    /// could run at all; individual step and trajectory failures are
    /// absorbed.
    pub async fn optimize(
        &self,
        initial_program: Program,
        training_set: &[Example],
    ) -> Result<OptimizationReport, OptimizerError> {
        self.config.validate()?;
        if training_set.is_empty() {
            return Err(OptimizerError::EmptyTrainingSet);
        }

        let config = &self.config;
        let sampler = TrajectorySampler::new(
            Arc::clone(&self.executor),
            Arc::clone(&self.metric),
            config.worker_budget,
            config.step_timeout,
        );

        let initial_snapshot = initial_program.clone();
        let mut state = OptimizerState {
            step: 0,
            scheduler: TemperatureScheduler::new(
                config.initial_temperature,
                config.temperature_schedule,
                config.early_stopping_patience,
                config.min_improvement_threshold,
            ),
            window: VecDeque::new(),
            pool: ProgramPool::new(initial_program, config.max_pool_size),
            store: TrajectoryStore::new(config.trajectory_retention_limit),
            rng: StdRng::seed_from_u64(config.seed),
            best_so_far: 0.0,
            best_program: initial_snapshot,
        };

        tracing::info!(
            max_steps = config.max_steps,
            batch_size = config.batch_size,
            training_examples = training_set.len(),
            schedule = config.temperature_schedule.as_str(),
            "Starting optimization"
        );

        let mut score_history = Vec::with_capacity(config.max_steps);
        let mut termination = Termination::Exhausted;
        let mut steps_run = 0;

        for step in 0..config.max_steps {
            state.step = step;

            let batch = circular_batch(training_set, step, config.batch_size);
            let temperature = state.scheduler.current(step, config.max_steps);
            let candidates =
                state
                    .pool
                    .select(config.num_candidates, temperature, &mut state.rng);

            let trajectories = sampler
                .sample(
                    &candidates,
                    &batch,
                    &config.model_configs,
                    config.max_trajectories_per_step,
                    &mut state.rng,
                )
                .await;
            for t in &trajectories {
                state.store.insert(t.clone());
            }
            state.pool.record(&trajectories);

            let buckets = build_buckets(&trajectories, config.bucket_spread_threshold);

            let target_bucket = strategy::select_bucket(&buckets);
            let target = target_bucket.map(|b| b.example_index);

            // Mutate the program that produced the chosen bucket's best
            // trajectory; fall back to the pool best when it has already
            // been evicted.
            let source = target_bucket
                .and_then(|b| b.best())
                .and_then(|t| state.pool.get(t.program_id))
                .map(|e| e.program.clone())
                .unwrap_or_else(|| state.pool.best().program.clone());

            let mut candidates_produced = 0;
            let mut strategy_used = None;
            if let Some((candidate, used)) = strategy::propose(
                &buckets,
                &source,
                &config.strategy_priority,
                config.max_demos,
                &mut state.rng,
            ) {
                let candidate_trajectories = sampler
                    .sample(
                        std::slice::from_ref(&candidate),
                        &batch,
                        &config.model_configs,
                        config.max_trajectories_per_step,
                        &mut state.rng,
                    )
                    .await;
                for t in &candidate_trajectories {
                    state.store.insert(t.clone());
                }
                // Admit on the targeted example's trajectories alone, so a
                // candidate that solves its bucket enters at that score
                // rather than averaged against the rest of the batch.
                let admitted: Vec<_> = candidate_trajectories
                    .iter()
                    .filter(|t| Some(t.example_index) == target)
                    .cloned()
                    .collect();
                state.pool.admit(candidate, &admitted);
                candidates_produced = 1;
                strategy_used = Some(used.as_str().to_string());
            }

            let current_best = state.pool.best().score();
            if current_best > state.best_so_far {
                state.best_so_far = current_best;
                state.best_program = state.pool.best().program.clone();
            }
            state.scheduler.observe(state.best_so_far);
            score_history.push(state.best_so_far);
            state.store.compact();
            steps_run = step + 1;

            if let Some(sink) = &self.sink {
                sink.on_step(&StepEvent {
                    step_index: state.step,
                    best_score: state.best_so_far,
                    candidates_produced,
                    strategy_used,
                    temperature,
                });
            }

            if config.convergence_enabled {
                state.window.push_back(state.best_so_far);
                while state.window.len() > config.early_stopping_patience + 1 {
                    state.window.pop_front();
                }
                if state.window.len() == config.early_stopping_patience + 1
                    && window_stagnant(&state.window, config.min_improvement_threshold)
                {
                    tracing::info!(
                        step,
                        best_score = state.best_so_far,
                        "Converged: no meaningful improvement within patience window"
                    );
                    termination = Termination::Converged;
                    break;
                }
            }
        }

        tracing::info!(
            steps_run,
            best_score = state.best_so_far,
            pool_size = state.pool.len(),
            trajectories_retained = state.store.len(),
            "Optimization complete"
        );

        Ok(OptimizationReport {
            best_program: state.best_program,
            best_score: state.best_so_far,
            steps_run,
            termination,
            score_history,
        })
    }
}
