//! Simba Core Library
//!
//! Stochastic mini-batch optimization of LLM-calling programs: iteratively
//! proposes, evaluates, and selects program variants (attached
//! demonstrations and instructions) against a training set.

pub mod bucket;
pub mod config;
pub mod dataset;
pub mod error;
pub mod optimizer;
pub mod pool;
pub mod program;
pub mod sampler;
pub mod strategy;
pub mod telemetry;
pub mod temperature;
pub mod trajectory;

// Re-export key types for convenience
pub use config::OptimizerConfig;
pub use dataset::{Dataset, Example};
pub use error::{ExecutionError, OptimizerError};
pub use optimizer::{OptimizationReport, Optimizer, Termination};
pub use program::{Demonstration, Program};
pub use sampler::{MetricFn, ProgramExecutor};
pub use strategy::Strategy;
pub use telemetry::{StepEvent, TelemetrySink, TracingSink};
pub use temperature::TemperatureSchedule;
pub use trajectory::{ModelConfig, Trajectory};
