//! Execution trajectories and the bounded in-memory trajectory store

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::Duration;
use uuid::Uuid;

/// Model parameters varied across sampling, distinct from the optimizer's
/// own temperature.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model: String,
    pub temperature: f32,
}

impl ModelConfig {
    pub fn new(model: impl Into<String>, temperature: f32) -> Self {
        Self {
            model: model.into(),
            temperature,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: "default".to_string(),
            temperature: 0.7,
        }
    }
}

/// Result of executing one (program, example, model config) combination.
/// Immutable after creation.
#[derive(Clone, Debug)]
pub struct Trajectory {
    pub program_id: Uuid,
    pub example_index: usize,
    pub model: ModelConfig,
    pub inputs: HashMap<String, String>,
    pub outputs: HashMap<String, String>,
    pub score: f64,
    pub success: bool,
    pub duration: Duration,
    pub content_hash: u64,
}

impl Trajectory {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        program_id: Uuid,
        example_index: usize,
        model: ModelConfig,
        inputs: HashMap<String, String>,
        outputs: HashMap<String, String>,
        score: f64,
        success: bool,
        duration: Duration,
    ) -> Self {
        let content_hash = content_hash(&program_id, example_index, &model.model, &outputs);
        Self {
            program_id,
            example_index,
            model,
            inputs,
            outputs,
            score: score.clamp(0.0, 1.0),
            success,
            duration,
            content_hash,
        }
    }

    /// Failed execution represented as data: score 0.0, no outputs.
    pub fn failed(
        program_id: Uuid,
        example_index: usize,
        model: ModelConfig,
        inputs: HashMap<String, String>,
        duration: Duration,
    ) -> Self {
        Self::new(
            program_id,
            example_index,
            model,
            inputs,
            HashMap::new(),
            0.0,
            false,
            duration,
        )
    }
}

/// Content hash for deduplication: identity of the combination plus the
/// produced outputs (sorted for map-order independence).
fn content_hash(
    program_id: &Uuid,
    example_index: usize,
    model: &str,
    outputs: &HashMap<String, String>,
) -> u64 {
    let mut hasher = DefaultHasher::new();
    program_id.hash(&mut hasher);
    example_index.hash(&mut hasher);
    model.hash(&mut hasher);
    let mut fields: Vec<(&String, &String)> = outputs.iter().collect();
    fields.sort();
    fields.hash(&mut hasher);
    hasher.finish()
}

/// Summary statistics for trajectories compacted out of the store.
#[derive(Clone, Debug, Default)]
pub struct EvictedSummary {
    pub count: usize,
    pub score_sum: f64,
    pub max_score: f64,
}

impl EvictedSummary {
    pub fn mean_score(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.score_sum / self.count as f64
        }
    }
}

/// Bounded in-memory ledger of trajectories, keyed by content hash.
///
/// Append-only during a step; compaction runs only between steps, so there
/// are never concurrent writers and evictors. Evicted entries are folded
/// into `EvictedSummary` rather than lost outright.
#[derive(Debug)]
pub struct TrajectoryStore {
    entries: HashMap<u64, Trajectory>,
    /// Insertion order of content hashes, oldest first
    order: Vec<u64>,
    retention_limit: usize,
    evicted: EvictedSummary,
}

impl TrajectoryStore {
    pub fn new(retention_limit: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
            retention_limit: retention_limit.max(1),
            evicted: EvictedSummary::default(),
        }
    }

    /// Insert a trajectory. Returns false when an identical trajectory
    /// (same content hash) was already recorded.
    pub fn insert(&mut self, trajectory: Trajectory) -> bool {
        let hash = trajectory.content_hash;
        if self.entries.contains_key(&hash) {
            return false;
        }
        self.entries.insert(hash, trajectory);
        self.order.push(hash);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, content_hash: u64) -> Option<&Trajectory> {
        self.entries.get(&content_hash)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Trajectory> {
        self.order.iter().filter_map(|h| self.entries.get(h))
    }

    pub fn evicted(&self) -> &EvictedSummary {
        &self.evicted
    }

    /// Compact down to the retention limit, keeping the most recent half of
    /// the budget plus the highest-scoring remainder. Called between steps.
    pub fn compact(&mut self) {
        if self.entries.len() <= self.retention_limit {
            return;
        }

        let recent_budget = self.retention_limit / 2;
        let recent: Vec<u64> = self
            .order
            .iter()
            .rev()
            .take(recent_budget)
            .copied()
            .collect();

        let mut rest: Vec<u64> = self
            .order
            .iter()
            .filter(|h| !recent.contains(h))
            .copied()
            .collect();
        // Highest-scoring first among the non-recent entries
        rest.sort_by(|a, b| {
            let sa = self.entries[a].score;
            let sb = self.entries[b].score;
            sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
        });

        let keep_rest = self.retention_limit - recent.len();
        for hash in rest.drain(keep_rest.min(rest.len())..) {
            if let Some(t) = self.entries.remove(&hash) {
                self.evicted.count += 1;
                self.evicted.score_sum += t.score;
                if t.score > self.evicted.max_score {
                    self.evicted.max_score = t.score;
                }
            }
        }
        self.order.retain(|h| self.entries.contains_key(h));

        tracing::debug!(
            retained = self.entries.len(),
            evicted_total = self.evicted.count,
            "Compacted trajectory store"
        );
    }
}
