//! Program pool: the authoritative set of known variants and their scores
//!
//! Mutated only serially by the controller. Selection is softmax sampling
//! over aggregate scores scaled by 1/temperature, with the current best
//! entry always included so the returned best never regresses.

use rand::rngs::StdRng;
use rand::Rng;
use uuid::Uuid;

use crate::program::Program;
use crate::trajectory::Trajectory;

/// Scores within this distance count as tied. Running means built from
/// identical per-trajectory scores can differ in the last ulp, which would
/// otherwise keep the trial-count tie-break from ever firing.
const SCORE_EPSILON: f64 = 1e-9;

/// A program plus its running aggregate score (simple mean over all
/// trajectories it has appeared in) and trial count.
#[derive(Clone, Debug)]
pub struct PoolEntry {
    pub program: Program,
    pub score_sum: f64,
    pub trials: usize,
}

impl PoolEntry {
    pub fn new(program: Program) -> Self {
        Self {
            program,
            score_sum: 0.0,
            trials: 0,
        }
    }

    pub fn score(&self) -> f64 {
        if self.trials == 0 {
            0.0
        } else {
            self.score_sum / self.trials as f64
        }
    }
}

pub struct ProgramPool {
    entries: Vec<PoolEntry>,
    max_size: usize,
}

impl ProgramPool {
    pub fn new(initial: Program, max_size: usize) -> Self {
        Self {
            entries: vec![PoolEntry::new(initial)],
            max_size: max_size.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[PoolEntry] {
        &self.entries
    }

    pub fn get(&self, program_id: Uuid) -> Option<&PoolEntry> {
        self.entries.iter().find(|e| e.program.id == program_id)
    }

    /// The best-scoring entry; ties broken by lowest trial count to prefer
    /// less-overfit entries.
    pub fn best(&self) -> &PoolEntry {
        self.entries
            .iter()
            .reduce(|best, e| {
                let diff = e.score() - best.score();
                let better = diff > SCORE_EPSILON
                    || (diff.abs() <= SCORE_EPSILON && e.trials < best.trials);
                if better {
                    e
                } else {
                    best
                }
            })
            .expect("pool always holds at least one entry")
    }

    /// Choose up to `k` programs for the next sampling round via softmax
    /// sampling over scores scaled by 1/temperature. The current best entry
    /// is always included regardless of sampling.
    pub fn select(&self, k: usize, temperature: f64, rng: &mut StdRng) -> Vec<Program> {
        if k == 0 {
            return Vec::new();
        }

        let best_id = self.best().program.id;
        let mut selected = vec![self.best().program.clone()];

        let temp = temperature.max(1e-6);
        let max_score = self
            .entries
            .iter()
            .map(|e| e.score())
            .fold(f64::MIN, f64::max);
        // Shift by the max so exp never overflows
        let mut remaining: Vec<(usize, f64)> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.program.id != best_id)
            .map(|(i, e)| (i, ((e.score() - max_score) / temp).exp()))
            .collect();

        // Weighted sampling without replacement over the non-best entries
        while selected.len() < k && !remaining.is_empty() {
            let total: f64 = remaining.iter().map(|(_, w)| w).sum();
            let mut draw = rng.gen::<f64>() * total;
            let mut pick = remaining.len() - 1;
            for (pos, (_, w)) in remaining.iter().enumerate() {
                draw -= w;
                if draw <= 0.0 {
                    pick = pos;
                    break;
                }
            }
            let (idx, _) = remaining.remove(pick);
            selected.push(self.entries[idx].program.clone());
        }
        selected
    }

    /// Fold a step's trajectory scores into the running means of the
    /// entries they belong to.
    pub fn record(&mut self, trajectories: &[Trajectory]) {
        for t in trajectories {
            if let Some(entry) = self.entries.iter_mut().find(|e| e.program.id == t.program_id) {
                entry.score_sum += t.score;
                entry.trials += 1;
            }
        }
    }

    /// Evaluate a candidate from the trajectories produced against it and
    /// insert (or update) its entry. Admitting with zero matching
    /// trajectories is a logged no-op, never fatal.
    pub fn admit(&mut self, candidate: Program, trajectories: &[Trajectory]) {
        let matching: Vec<&Trajectory> = trajectories
            .iter()
            .filter(|t| t.program_id == candidate.id)
            .collect();
        if matching.is_empty() {
            tracing::warn!(
                candidate_id = %candidate.id,
                "Skipping admission: no trajectories recorded against candidate"
            );
            return;
        }

        let score_sum: f64 = matching.iter().map(|t| t.score).sum();
        let trials = matching.len();

        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.program.id == candidate.id)
        {
            entry.score_sum += score_sum;
            entry.trials += trials;
        } else {
            self.entries.push(PoolEntry {
                program: candidate,
                score_sum,
                trials,
            });
        }
        self.enforce_bound();
    }

    /// Evict the lowest-scoring non-best entries until the pool fits.
    fn enforce_bound(&mut self) {
        while self.entries.len() > self.max_size {
            let best_id = self.best().program.id;
            let victim = self
                .entries
                .iter()
                .enumerate()
                .filter(|(_, e)| e.program.id != best_id)
                .min_by(|(_, a), (_, b)| {
                    a.score()
                        .partial_cmp(&b.score())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|(i, _)| i);
            match victim {
                Some(i) => {
                    let evicted = self.entries.remove(i);
                    tracing::debug!(
                        evicted_id = %evicted.program.id,
                        score = evicted.score(),
                        "Evicted pool entry"
                    );
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::ModelConfig;
    use rand::SeedableRng;
    use std::collections::HashMap;
    use std::time::Duration;

    fn trajectory_for(program_id: Uuid, example_index: usize, score: f64) -> Trajectory {
        Trajectory::new(
            program_id,
            example_index,
            ModelConfig::default(),
            HashMap::new(),
            HashMap::new(),
            score,
            true,
            Duration::ZERO,
        )
    }

    fn pool_with_scores(scores: &[f64]) -> ProgramPool {
        let mut pool = ProgramPool::new(Program::new(), 16);
        for &score in scores {
            let program = Program::new();
            let t = trajectory_for(program.id, 0, score);
            pool.admit(program, &[t]);
        }
        pool
    }

    #[test]
    fn test_best_tie_breaks_by_fewer_trials() {
        let mut pool = ProgramPool::new(Program::new(), 16);

        let veteran = Program::new();
        let vid = veteran.id;
        pool.admit(
            veteran,
            &[
                trajectory_for(vid, 0, 0.8),
                trajectory_for(vid, 1, 0.8),
                trajectory_for(vid, 2, 0.8),
            ],
        );

        let newcomer = Program::new();
        let nid = newcomer.id;
        pool.admit(newcomer, &[trajectory_for(nid, 0, 0.8)]);

        assert_eq!(pool.best().program.id, nid);
    }

    #[test]
    fn test_best_prefers_scored_over_untried() {
        // An untried entry (zero trials, score 0.0) is not a tie with a
        // genuinely scored one.
        let mut pool = ProgramPool::new(Program::new(), 16);
        let scored = Program::new();
        let id = scored.id;
        pool.admit(scored, &[trajectory_for(id, 0, 0.5)]);
        assert_eq!(pool.best().program.id, id);
    }

    #[test]
    fn test_select_always_includes_best() {
        let pool = pool_with_scores(&[0.1, 0.9, 0.4]);
        let best_id = pool.best().program.id;

        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..20 {
            let picked = pool.select(2, 5.0, &mut rng);
            assert!(picked.iter().any(|p| p.id == best_id));
            assert!(picked.len() <= 2);
        }
    }

    #[test]
    fn test_select_returns_distinct_programs() {
        let pool = pool_with_scores(&[0.2, 0.5, 0.7]);
        let mut rng = StdRng::seed_from_u64(9);
        let picked = pool.select(4, 1.0, &mut rng);
        let mut ids: Vec<Uuid> = picked.iter().map(|p| p.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), picked.len());
        assert_eq!(picked.len(), 4);
    }

    #[test]
    fn test_admit_with_no_trajectories_is_noop() {
        let mut pool = ProgramPool::new(Program::new(), 16);
        pool.admit(Program::new(), &[]);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_pool_bound_evicts_lowest_non_best() {
        let mut pool = ProgramPool::new(Program::new(), 3);
        for score in [0.9, 0.2, 0.5, 0.7, 0.1] {
            let program = Program::new();
            let t = trajectory_for(program.id, 0, score);
            pool.admit(program, &[t]);
        }
        assert!(pool.len() <= 3);
        assert_eq!(pool.best().score(), 0.9);
    }

    #[test]
    fn test_record_updates_running_mean() {
        let mut pool = ProgramPool::new(Program::new(), 16);
        let id = pool.best().program.id;
        pool.record(&[trajectory_for(id, 0, 1.0), trajectory_for(id, 1, 0.5)]);
        assert_eq!(pool.best().trials, 2);
        assert!((pool.best().score() - 0.75).abs() < 1e-9);
    }
}
