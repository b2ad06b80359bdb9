//! Error taxonomy for the optimizer
//!
//! Per-trajectory execution failures are absorbed into failed trajectories
//! and never propagate. Only configuration-time and setup failures reach
//! the caller of `Optimizer::optimize`.

use std::time::Duration;
use thiserror::Error;

/// Failure of one program-on-one-example execution.
///
/// Always isolated: the sampler converts these into failed trajectories
/// (score 0.0, success=false) instead of aborting the batch.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("execution failed: {0}")]
    Failed(String),
}

/// Fatal errors: the optimizer returns these before running any step.
#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("training set is empty")]
    EmptyTrainingSet,
}
