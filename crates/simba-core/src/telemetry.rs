//! Step-boundary telemetry events
//!
//! The controller emits one event per step to an optional sink. Absence of
//! a sink never affects optimization.

/// Snapshot emitted at each step boundary.
#[derive(Clone, Debug)]
pub struct StepEvent {
    pub step_index: usize,
    pub best_score: f64,
    pub candidates_produced: usize,
    pub strategy_used: Option<String>,
    pub temperature: f64,
}

pub trait TelemetrySink: Send + Sync {
    fn on_step(&self, event: &StepEvent);
}

/// Default sink: logs step events through `tracing`.
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn on_step(&self, event: &StepEvent) {
        tracing::info!(
            step = event.step_index,
            best_score = format!("{:.3}", event.best_score),
            candidates = event.candidates_produced,
            strategy = event.strategy_used.as_deref().unwrap_or("none"),
            temperature = format!("{:.3}", event.temperature),
            "Optimization step complete"
        );
    }
}
