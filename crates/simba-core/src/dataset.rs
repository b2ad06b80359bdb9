//! Training data loading and batching

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// One training record: an input mapping and an expected-output mapping.
///
/// The stable identifier of an example is its index in the training set;
/// it is assigned when a dataset is loaded or built.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Example {
    /// Position in the training set, used as the example identity
    #[serde(default)]
    pub index: usize,
    pub inputs: HashMap<String, String>,
    pub expected: HashMap<String, String>,
    /// Optional grouping label (e.g. "math", "casual_chat")
    #[serde(default)]
    pub category: String,
}

impl Example {
    pub fn new(
        index: usize,
        inputs: HashMap<String, String>,
        expected: HashMap<String, String>,
    ) -> Self {
        Self {
            index,
            inputs,
            expected,
            category: String::new(),
        }
    }
}

/// JSON envelope for a training set on disk.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Dataset {
    pub description: String,
    pub version: String,
    pub examples: Vec<Example>,
}

impl Dataset {
    /// Load a dataset from a JSON file, reindexing examples by position.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read dataset {}", path.as_ref().display()))?;
        let mut dataset: Dataset =
            serde_json::from_str(&content).context("Failed to parse dataset JSON")?;
        for (i, example) in dataset.examples.iter_mut().enumerate() {
            example.index = i;
        }
        Ok(dataset)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).context("Failed to write dataset")?;
        Ok(())
    }

    pub fn filter_by_category(&self, category: &str) -> Vec<&Example> {
        self.examples
            .iter()
            .filter(|e| e.category == category)
            .collect()
    }

    pub fn categories(&self) -> Vec<String> {
        let mut cats: Vec<String> = self.examples.iter().map(|e| e.category.clone()).collect();
        cats.sort();
        cats.dedup();
        cats
    }

    /// Sample a random subset of examples using an injected RNG.
    pub fn sample(&self, n: usize, rng: &mut StdRng) -> Vec<&Example> {
        if n >= self.examples.len() {
            return self.examples.iter().collect();
        }
        let mut indices: Vec<usize> = (0..self.examples.len()).collect();
        indices.shuffle(rng);
        indices.truncate(n);
        indices.sort_unstable();
        indices.into_iter().map(|i| &self.examples[i]).collect()
    }
}

/// Select the circular mini-batch for a step: `batch_size` examples starting
/// at `step * batch_size`, wrapping around the training set.
pub fn circular_batch(examples: &[Example], step: usize, batch_size: usize) -> Vec<Example> {
    if examples.is_empty() {
        return Vec::new();
    }
    let start = (step * batch_size) % examples.len();
    (0..batch_size)
        .map(|i| examples[(start + i) % examples.len()].clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn make_example(index: usize) -> Example {
        let mut inputs = HashMap::new();
        inputs.insert("q".to_string(), format!("question {index}"));
        let mut expected = HashMap::new();
        expected.insert("a".to_string(), format!("answer {index}"));
        Example::new(index, inputs, expected)
    }

    #[test]
    fn test_circular_batch_wraps() {
        let examples: Vec<Example> = (0..4).map(make_example).collect();

        let step0 = circular_batch(&examples, 0, 2);
        assert_eq!(step0.iter().map(|e| e.index).collect::<Vec<_>>(), [0, 1]);

        let step1 = circular_batch(&examples, 1, 2);
        assert_eq!(step1.iter().map(|e| e.index).collect::<Vec<_>>(), [2, 3]);

        // Wraps back to the start
        let step2 = circular_batch(&examples, 2, 2);
        assert_eq!(step2.iter().map(|e| e.index).collect::<Vec<_>>(), [0, 1]);
    }

    #[test]
    fn test_circular_batch_larger_than_set() {
        let examples: Vec<Example> = (0..3).map(make_example).collect();
        let batch = circular_batch(&examples, 0, 5);
        assert_eq!(
            batch.iter().map(|e| e.index).collect::<Vec<_>>(),
            [0, 1, 2, 0, 1]
        );
    }

    #[test]
    fn test_filter_by_category() {
        let mut examples: Vec<Example> = (0..4).map(make_example).collect();
        examples[0].category = "math".to_string();
        examples[2].category = "math".to_string();
        let dataset = Dataset {
            description: "test".to_string(),
            version: "1.0".to_string(),
            examples,
        };

        let math = dataset.filter_by_category("math");
        assert_eq!(math.iter().map(|e| e.index).collect::<Vec<_>>(), [0, 2]);
        assert_eq!(dataset.categories(), ["", "math"]);
    }

    #[test]
    fn test_sample_is_seeded() {
        let dataset = Dataset {
            description: "test".to_string(),
            version: "1.0".to_string(),
            examples: (0..10).map(make_example).collect(),
        };

        let mut rng1 = StdRng::seed_from_u64(7);
        let mut rng2 = StdRng::seed_from_u64(7);
        let a: Vec<usize> = dataset.sample(4, &mut rng1).iter().map(|e| e.index).collect();
        let b: Vec<usize> = dataset.sample(4, &mut rng2).iter().map(|e| e.index).collect();
        assert_eq!(a, b);
        assert_eq!(a.len(), 4);
    }
}
