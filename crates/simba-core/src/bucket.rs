//! Bucket construction: trajectories grouped by training example
//!
//! Pure transform of a step's trajectory list into ordered per-example
//! buckets with the statistics the strategy engine selects on.

use std::collections::BTreeMap;

use crate::trajectory::Trajectory;

/// All trajectories sharing one source example across a sampling round.
#[derive(Clone, Debug)]
pub struct Bucket {
    pub example_index: usize,
    pub trajectories: Vec<Trajectory>,
    pub max_score: f64,
    pub min_score: f64,
    pub mean_score: f64,
    /// max - min; 0.0 for buckets with fewer than 2 trajectories
    pub spread: f64,
    /// True when the spread clears the configured threshold, marking the
    /// example as a good mutation candidate
    pub improvement_potential: bool,
}

impl Bucket {
    /// Highest-scoring trajectory in the bucket.
    pub fn best(&self) -> Option<&Trajectory> {
        self.trajectories
            .iter()
            .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal))
    }

    /// Lowest-scoring trajectory in the bucket.
    pub fn worst(&self) -> Option<&Trajectory> {
        self.trajectories
            .iter()
            .min_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal))
    }
}

/// Partition a step's trajectories by example identifier and compute
/// per-bucket statistics. Output is ordered by example index ascending.
pub fn build_buckets(trajectories: &[Trajectory], spread_threshold: f64) -> Vec<Bucket> {
    let mut groups: BTreeMap<usize, Vec<Trajectory>> = BTreeMap::new();
    for t in trajectories {
        groups.entry(t.example_index).or_default().push(t.clone());
    }

    groups
        .into_iter()
        .map(|(example_index, trajectories)| {
            let max_score = trajectories.iter().map(|t| t.score).fold(f64::MIN, f64::max);
            let min_score = trajectories.iter().map(|t| t.score).fold(f64::MAX, f64::min);
            let mean_score =
                trajectories.iter().map(|t| t.score).sum::<f64>() / trajectories.len() as f64;
            let spread = if trajectories.len() < 2 {
                0.0
            } else {
                max_score - min_score
            };
            Bucket {
                example_index,
                trajectories,
                max_score,
                min_score,
                mean_score,
                spread,
                improvement_potential: spread >= spread_threshold,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::ModelConfig;
    use std::collections::HashMap;
    use std::time::Duration;
    use uuid::Uuid;

    fn make_trajectory(example_index: usize, score: f64) -> Trajectory {
        Trajectory::new(
            Uuid::new_v4(),
            example_index,
            ModelConfig::default(),
            HashMap::new(),
            HashMap::new(),
            score,
            true,
            Duration::ZERO,
        )
    }

    #[test]
    fn test_buckets_ordered_by_example_index() {
        let trajectories = vec![
            make_trajectory(3, 0.2),
            make_trajectory(1, 0.5),
            make_trajectory(3, 0.9),
            make_trajectory(0, 0.1),
        ];
        let buckets = build_buckets(&trajectories, 0.2);
        let indices: Vec<usize> = buckets.iter().map(|b| b.example_index).collect();
        assert_eq!(indices, [0, 1, 3]);
    }

    #[test]
    fn test_bucket_statistics() {
        let trajectories = vec![
            make_trajectory(0, 0.2),
            make_trajectory(0, 0.8),
            make_trajectory(0, 0.5),
        ];
        let buckets = build_buckets(&trajectories, 0.2);
        assert_eq!(buckets.len(), 1);

        let b = &buckets[0];
        assert_eq!(b.max_score, 0.8);
        assert_eq!(b.min_score, 0.2);
        assert!((b.mean_score - 0.5).abs() < 1e-9);
        assert!((b.spread - 0.6).abs() < 1e-9);
        assert!(b.improvement_potential);
    }

    #[test]
    fn test_singleton_bucket_has_zero_spread() {
        let buckets = build_buckets(&[make_trajectory(2, 0.9)], 0.2);
        assert_eq!(buckets[0].spread, 0.0);
        assert!(!buckets[0].improvement_potential);
    }

    #[test]
    fn test_idempotent_construction() {
        let trajectories: Vec<Trajectory> = (0..6)
            .map(|i| make_trajectory(i % 3, i as f64 / 6.0))
            .collect();

        let first = build_buckets(&trajectories, 0.2);
        let second = build_buckets(&trajectories, 0.2);

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.example_index, b.example_index);
            assert_eq!(a.max_score, b.max_score);
            assert_eq!(a.min_score, b.min_score);
            assert_eq!(a.mean_score, b.mean_score);
            assert_eq!(a.spread, b.spread);
            assert_eq!(a.improvement_potential, b.improvement_potential);
        }
    }
}
