//! Concurrent trajectory sampling
//!
//! Executes (program, example, model config) combinations on a bounded
//! worker pool. Work items are independent; aggregation happens serially
//! on the controller after the step's single synchronization barrier.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::dataset::Example;
use crate::error::ExecutionError;
use crate::program::Program;
use crate::trajectory::{ModelConfig, Trajectory};

/// External program-execution collaborator. Implementations must be safe
/// to call concurrently from multiple workers.
#[async_trait]
pub trait ProgramExecutor: Send + Sync {
    async fn execute(
        &self,
        program: &Program,
        inputs: &HashMap<String, String>,
        model: &ModelConfig,
        timeout: Duration,
    ) -> Result<HashMap<String, String>, ExecutionError>;
}

/// User-supplied metric: scores produced outputs against an example,
/// in [0.0, 1.0].
pub type MetricFn = Arc<dyn Fn(&Example, &HashMap<String, String>) -> f64 + Send + Sync>;

pub struct TrajectorySampler {
    executor: Arc<dyn ProgramExecutor>,
    metric: MetricFn,
    worker_budget: usize,
    step_timeout: Duration,
}

impl TrajectorySampler {
    pub fn new(
        executor: Arc<dyn ProgramExecutor>,
        metric: MetricFn,
        worker_budget: usize,
        step_timeout: Duration,
    ) -> Self {
        Self {
            executor,
            metric,
            worker_budget: worker_budget.max(1),
            step_timeout,
        }
    }

    /// Produce one trajectory per (program, example, model) combination,
    /// subsampled down to `max_trajectories` when the cross-product is
    /// larger. Executor failures become failed trajectories; a step-level
    /// deadline aborts outstanding work and keeps whatever completed.
    ///
    /// Results are sorted by (example index, work-item order) so callers
    /// see an order independent of task completion order. All RNG draws
    /// happen before anything is spawned.
    pub async fn sample(
        &self,
        programs: &[Program],
        examples: &[Example],
        models: &[ModelConfig],
        max_trajectories: usize,
        rng: &mut StdRng,
    ) -> Vec<Trajectory> {
        let mut work: Vec<(Program, Example, ModelConfig)> = Vec::new();
        for program in programs {
            for example in examples {
                for model in models {
                    work.push((program.clone(), example.clone(), model.clone()));
                }
            }
        }
        if max_trajectories > 0 && work.len() > max_trajectories {
            work.shuffle(rng);
            work.truncate(max_trajectories);
        }

        tracing::debug!(
            work_items = work.len(),
            workers = self.worker_budget,
            "Sampling trajectories"
        );

        let semaphore = Arc::new(Semaphore::new(self.worker_budget));
        let mut join_set: JoinSet<(usize, Trajectory)> = JoinSet::new();

        for (item, (program, example, model)) in work.into_iter().enumerate() {
            let executor = Arc::clone(&self.executor);
            let metric = Arc::clone(&self.metric);
            let semaphore = Arc::clone(&semaphore);
            let timeout = self.step_timeout;

            join_set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => {
                        let t = Trajectory::failed(
                            program.id,
                            example.index,
                            model,
                            example.inputs.clone(),
                            Duration::ZERO,
                        );
                        return (item, t);
                    }
                };

                let started = Instant::now();
                let trajectory = match executor
                    .execute(&program, &example.inputs, &model, timeout)
                    .await
                {
                    Ok(outputs) => {
                        let score = (metric)(&example, &outputs);
                        Trajectory::new(
                            program.id,
                            example.index,
                            model,
                            example.inputs.clone(),
                            outputs,
                            score,
                            true,
                            started.elapsed(),
                        )
                    }
                    Err(e) => {
                        tracing::debug!(
                            program_id = %program.id,
                            example_index = example.index,
                            error = %e,
                            "Execution failed; recording failed trajectory"
                        );
                        Trajectory::failed(
                            program.id,
                            example.index,
                            model,
                            example.inputs.clone(),
                            started.elapsed(),
                        )
                    }
                };
                (item, trajectory)
            });
        }

        let deadline = tokio::time::Instant::now() + self.step_timeout;
        let mut completed: Vec<(usize, Trajectory)> = Vec::new();
        loop {
            tokio::select! {
                joined = join_set.join_next() => match joined {
                    Some(Ok(entry)) => completed.push(entry),
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Sampler task join failed");
                    }
                    None => break,
                },
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::warn!(
                        completed = completed.len(),
                        "Step deadline reached; aborting outstanding work"
                    );
                    join_set.abort_all();
                    while let Some(joined) = join_set.join_next().await {
                        if let Ok(entry) = joined {
                            completed.push(entry);
                        }
                    }
                    break;
                }
            }
        }

        // Sort by (example index, work-item order) so the result sequence is
        // a function of the work list alone, never of completion order.
        completed.sort_by_key(|(item, t)| (t.example_index, *item));
        completed.into_iter().map(|(_, t)| t).collect()
    }
}
