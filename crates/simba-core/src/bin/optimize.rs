//! Optimization CLI
//!
//! Runs the optimizer over a JSON dataset with a deterministic offline
//! executor, so the full loop can be exercised without API keys or a live
//! provider. Wire a real `ProgramExecutor` for production runs.
//!
//! Usage:
//!   cargo run --bin simba-optimize -- <dataset.json> [report.json]
//!
//! Configuration comes from SIMBA_* environment variables (see config.rs).

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use simba_core::{
    Dataset, Example, ExecutionError, MetricFn, ModelConfig, Optimizer, OptimizerConfig, Program,
    ProgramExecutor, TracingSink,
};

/// Offline executor: echoes an example's expected outputs when the program
/// carries a demonstration whose inputs match, and produces nothing
/// otherwise. Deterministic stand-in for a live LLM provider.
struct OfflineExecutor {
    answers: HashMap<String, HashMap<String, String>>,
}

impl OfflineExecutor {
    fn new(examples: &[Example]) -> Self {
        let answers = examples
            .iter()
            .map(|e| (canonical(&e.inputs), e.expected.clone()))
            .collect();
        Self { answers }
    }
}

fn canonical(inputs: &HashMap<String, String>) -> String {
    let mut fields: Vec<(&String, &String)> = inputs.iter().collect();
    fields.sort();
    format!("{fields:?}")
}

#[async_trait]
impl ProgramExecutor for OfflineExecutor {
    async fn execute(
        &self,
        program: &Program,
        inputs: &HashMap<String, String>,
        _model: &ModelConfig,
        _timeout: Duration,
    ) -> Result<HashMap<String, String>, ExecutionError> {
        let has_matching_demo = program.demos.iter().any(|d| &d.inputs == inputs);
        if has_matching_demo {
            if let Some(expected) = self.answers.get(&canonical(inputs)) {
                return Ok(expected.clone());
            }
        }
        Ok(HashMap::new())
    }
}

fn exact_match_metric() -> MetricFn {
    Arc::new(|example: &Example, outputs: &HashMap<String, String>| {
        if outputs == &example.expected {
            1.0
        } else {
            0.0
        }
    })
}

fn main() -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run())
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut args = std::env::args().skip(1);
    let dataset_path = args
        .next()
        .context("Usage: simba-optimize <dataset.json> [report.json]")?;
    let report_path = args.next();

    let dataset = Dataset::load_from_file(&dataset_path)?;
    println!("Dataset: {} ({} examples)", dataset.description, dataset.examples.len());
    let categories: Vec<String> = dataset
        .categories()
        .into_iter()
        .filter(|c| !c.is_empty())
        .collect();
    if !categories.is_empty() {
        println!("Categories: {}", categories.join(", "));
    }

    let config = OptimizerConfig::from_env()?;
    println!(
        "Config: {} steps, batch {}, {} candidates, schedule {}, seed {}",
        config.max_steps,
        config.batch_size,
        config.num_candidates,
        config.temperature_schedule.as_str(),
        config.seed
    );

    let executor = Arc::new(OfflineExecutor::new(&dataset.examples));
    let optimizer = Optimizer::new(config, executor, exact_match_metric())
        .with_telemetry(Arc::new(TracingSink));

    let report = optimizer
        .optimize(Program::new(), &dataset.examples)
        .await?;

    println!("\n=== Results ===");
    println!("Termination: {:?}", report.termination);
    println!("Steps run:   {}", report.steps_run);
    println!("Best score:  {:.3}", report.best_score);
    println!(
        "Best program: {} demos, {} instructions",
        report.best_program.demos.len(),
        report.best_program.instructions.len()
    );
    println!("\nScore evolution:");
    for (step, score) in report.score_history.iter().enumerate() {
        println!("  Step {step}: {score:.3}");
    }

    if let Some(path) = report_path {
        report.save_to_file(&path)?;
        println!("\nSaved report to: {path}");
    }

    Ok(())
}
