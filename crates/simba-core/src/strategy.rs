//! Mutation strategies: pluggable operators from bucket to candidate program
//!
//! Strategies are a closed set of tagged variants behind one interface.
//! Each is a pure function from (bucket, source program) to either a new
//! candidate or "not applicable"; non-applicability is never an error.

use anyhow::Result;
use rand::rngs::StdRng;
use rand::Rng;
use std::str::FromStr;

use crate::bucket::Bucket;
use crate::program::{Demonstration, Program};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// Append a demonstration built from the bucket's best trajectory,
    /// with Poisson-derived dropout of existing demonstrations
    AppendDemonstration,
    /// Append an instruction summarizing what separates the bucket's best
    /// and worst trajectories
    AppendRule,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::AppendDemonstration => "append-demonstration",
            Strategy::AppendRule => "append-rule",
        }
    }

    /// Apply this strategy to a bucket, producing a new candidate program
    /// or `None` when not applicable.
    pub fn try_apply(
        &self,
        bucket: &Bucket,
        program: &Program,
        max_demos: usize,
        rng: &mut StdRng,
    ) -> Option<Program> {
        match self {
            Strategy::AppendDemonstration => append_demonstration(bucket, program, max_demos, rng),
            Strategy::AppendRule => append_rule(bucket, program),
        }
    }
}

impl FromStr for Strategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "append-demonstration" => Ok(Strategy::AppendDemonstration),
            "append-rule" => Ok(Strategy::AppendRule),
            _ => Err(anyhow::anyhow!(
                "Invalid strategy: {}. Must be append-demonstration or append-rule",
                s
            )),
        }
    }
}

/// Pick the bucket to mutate: prefer buckets flagged with improvement
/// potential; tie-break by highest spread, then lowest example index.
pub fn select_bucket(buckets: &[Bucket]) -> Option<&Bucket> {
    let preferred: Vec<&Bucket> = buckets.iter().filter(|b| b.improvement_potential).collect();
    let pool: Vec<&Bucket> = if preferred.is_empty() {
        buckets.iter().collect()
    } else {
        preferred
    };

    pool.into_iter().reduce(|best, b| {
        if b.spread > best.spread
            || (b.spread == best.spread && b.example_index < best.example_index)
        {
            b
        } else {
            best
        }
    })
}

/// Run the strategy engine for one step: select a bucket, then try each
/// strategy in priority order against it. The first candidate wins; later
/// strategies are not attempted.
pub fn propose(
    buckets: &[Bucket],
    source: &Program,
    priority: &[Strategy],
    max_demos: usize,
    rng: &mut StdRng,
) -> Option<(Program, Strategy)> {
    let bucket = select_bucket(buckets)?;
    for strategy in priority {
        if let Some(candidate) = strategy.try_apply(bucket, source, max_demos, rng) {
            tracing::debug!(
                strategy = strategy.as_str(),
                example_index = bucket.example_index,
                spread = bucket.spread,
                "Strategy produced a candidate"
            );
            return Some((candidate, *strategy));
        }
    }
    None
}

fn append_demonstration(
    bucket: &Bucket,
    program: &Program,
    max_demos: usize,
    rng: &mut StdRng,
) -> Option<Program> {
    let best = bucket.best()?;
    if !best.success {
        return None;
    }

    // Poisson-derived dropout: probability approaches 1 as the list
    // outgrows the demo budget, near 0 for short lists.
    let drop_p = 1.0 - (-(program.demos.len() as f64) / max_demos.max(1) as f64).exp();
    let mut demos: Vec<Demonstration> = program
        .demos
        .iter()
        .filter(|_| rng.gen::<f64>() >= drop_p)
        .cloned()
        .collect();
    demos.push(Demonstration::new(best.inputs.clone(), best.outputs.clone()));

    Some(program.with_demonstrations(demos))
}

fn append_rule(bucket: &Bucket, program: &Program) -> Option<Program> {
    if bucket.trajectories.len() < 2 || bucket.spread <= 0.0 {
        return None;
    }
    let best = bucket.best()?;
    let worst = bucket.worst()?;
    if !best.success {
        return None;
    }

    // Name the output fields where the best and worst runs diverge
    let mut fields: Vec<&String> = best.outputs.keys().collect();
    fields.sort();
    let mut clauses = Vec::new();
    for field in fields {
        let good = &best.outputs[field];
        match worst.outputs.get(field) {
            Some(bad) if bad != good => clauses.push(format!(
                "field '{}' should resemble \"{}\" rather than \"{}\"",
                field,
                truncate(good, 60),
                truncate(bad, 60)
            )),
            None => clauses.push(format!(
                "field '{}' must be produced (e.g. \"{}\")",
                field,
                truncate(good, 60)
            )),
            _ => {}
        }
    }
    if clauses.is_empty() {
        return None;
    }

    let rule = format!(
        "For inputs like {}: {}.",
        summarize_inputs(best),
        clauses.join("; ")
    );
    Some(program.with_instruction(rule))
}

fn summarize_inputs(trajectory: &crate::trajectory::Trajectory) -> String {
    let mut keys: Vec<&String> = trajectory.inputs.keys().collect();
    keys.sort();
    let parts: Vec<String> = keys
        .into_iter()
        .map(|k| format!("{}=\"{}\"", k, truncate(&trajectory.inputs[k], 40)))
        .collect();
    if parts.is_empty() {
        "(no inputs)".to_string()
    } else {
        parts.join(", ")
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::build_buckets;
    use crate::trajectory::{ModelConfig, Trajectory};
    use rand::SeedableRng;
    use std::collections::HashMap;
    use std::time::Duration;
    use uuid::Uuid;

    fn make_trajectory(example_index: usize, score: f64, success: bool) -> Trajectory {
        let mut inputs = HashMap::new();
        inputs.insert("q".to_string(), format!("question {example_index}"));
        let mut outputs = HashMap::new();
        if success {
            outputs.insert("a".to_string(), format!("answer scoring {score}"));
        }
        Trajectory::new(
            Uuid::new_v4(),
            example_index,
            ModelConfig::default(),
            inputs,
            outputs,
            score,
            success,
            Duration::ZERO,
        )
    }

    #[test]
    fn test_strategy_round_trip() {
        for name in ["append-demonstration", "append-rule"] {
            let strategy: Strategy = name.parse().unwrap();
            assert_eq!(strategy.as_str(), name);
        }
        assert!("mutate-everything".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_select_bucket_prefers_improvement_potential() {
        let trajectories = vec![
            // Example 0: wide spread
            make_trajectory(0, 0.1, true),
            make_trajectory(0, 0.9, true),
            // Example 1: flat
            make_trajectory(1, 0.5, true),
            make_trajectory(1, 0.5, true),
        ];
        let buckets = build_buckets(&trajectories, 0.2);
        let chosen = select_bucket(&buckets).unwrap();
        assert_eq!(chosen.example_index, 0);
    }

    #[test]
    fn test_select_bucket_tie_breaks_by_lowest_index() {
        let trajectories = vec![
            make_trajectory(2, 0.3, true),
            make_trajectory(2, 0.8, true),
            make_trajectory(1, 0.3, true),
            make_trajectory(1, 0.8, true),
        ];
        let buckets = build_buckets(&trajectories, 0.2);
        assert_eq!(select_bucket(&buckets).unwrap().example_index, 1);
    }

    #[test]
    fn test_append_demonstration_uses_best_trajectory() {
        let trajectories = vec![make_trajectory(0, 0.2, true), make_trajectory(0, 0.9, true)];
        let buckets = build_buckets(&trajectories, 0.2);
        let mut rng = StdRng::seed_from_u64(1);

        let program = Program::new();
        let candidate = Strategy::AppendDemonstration
            .try_apply(&buckets[0], &program, 4, &mut rng)
            .unwrap();

        assert_eq!(candidate.demos.len(), 1);
        assert_eq!(
            candidate.demos[0].outputs.get("a").unwrap(),
            "answer scoring 0.9"
        );
        assert_ne!(candidate.id, program.id);
    }

    #[test]
    fn test_append_demonstration_rejects_failed_best() {
        let trajectories = vec![make_trajectory(0, 0.0, false)];
        let buckets = build_buckets(&trajectories, 0.2);
        let mut rng = StdRng::seed_from_u64(1);

        let result =
            Strategy::AppendDemonstration.try_apply(&buckets[0], &Program::new(), 4, &mut rng);
        assert!(result.is_none());
    }

    #[test]
    fn test_dropout_bounds_demo_list() {
        let mut rng = StdRng::seed_from_u64(42);
        let trajectories = vec![make_trajectory(0, 0.3, true), make_trajectory(0, 0.9, true)];
        let buckets = build_buckets(&trajectories, 0.2);

        // Grow a program far past the budget; dropout keeps it bounded
        let mut program = Program::new();
        for _ in 0..40 {
            program = Strategy::AppendDemonstration
                .try_apply(&buckets[0], &program, 4, &mut rng)
                .unwrap();
        }
        assert!(program.demos.len() < 12, "demos grew to {}", program.demos.len());
    }

    #[test]
    fn test_append_rule_names_differing_field() {
        let trajectories = vec![make_trajectory(0, 0.1, true), make_trajectory(0, 0.9, true)];
        let buckets = build_buckets(&trajectories, 0.2);

        let candidate = append_rule(&buckets[0], &Program::new()).unwrap();
        assert_eq!(candidate.instructions.len(), 1);
        assert!(candidate.instructions[0].contains("field 'a'"));
    }

    #[test]
    fn test_append_rule_needs_spread() {
        let trajectories = vec![make_trajectory(0, 0.5, true)];
        let buckets = build_buckets(&trajectories, 0.2);
        assert!(append_rule(&buckets[0], &Program::new()).is_none());
    }

    #[test]
    fn test_propose_respects_priority_order() {
        let trajectories = vec![make_trajectory(0, 0.1, true), make_trajectory(0, 0.9, true)];
        let buckets = build_buckets(&trajectories, 0.2);
        let mut rng = StdRng::seed_from_u64(1);
        let program = Program::new();

        let (_, used) = propose(
            &buckets,
            &program,
            &[Strategy::AppendRule, Strategy::AppendDemonstration],
            4,
            &mut rng,
        )
        .unwrap();
        assert_eq!(used, Strategy::AppendRule);
    }

    #[test]
    fn test_propose_empty_buckets_is_noop() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(propose(
            &[],
            &Program::new(),
            &[Strategy::AppendDemonstration],
            4,
            &mut rng
        )
        .is_none());
    }
}
