//! Program variants: the unit the optimizer mutates and scores
//!
//! A `Program` is immutable by convention. New variants are produced only
//! by copy-and-modify (`with_demonstration`, `with_instruction`), each with
//! a fresh identity, so pool entries and recorded trajectories stay valid
//! references to the exact configuration they were scored against.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// One input/output example pair attached to a program as a few-shot demo.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Demonstration {
    pub inputs: HashMap<String, String>,
    pub outputs: HashMap<String, String>,
}

impl Demonstration {
    pub fn new(inputs: HashMap<String, String>, outputs: HashMap<String, String>) -> Self {
        Self { inputs, outputs }
    }
}

/// An LLM-calling program configuration: attached demonstrations plus
/// optional natural-language instructions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Program {
    pub id: Uuid,
    pub demos: Vec<Demonstration>,
    pub instructions: Vec<String>,
}

impl Program {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            demos: Vec::new(),
            instructions: Vec::new(),
        }
    }

    /// Return a new variant with `demo` appended.
    pub fn with_demonstration(&self, demo: Demonstration) -> Self {
        let mut demos = self.demos.clone();
        demos.push(demo);
        Self {
            id: Uuid::new_v4(),
            demos,
            instructions: self.instructions.clone(),
        }
    }

    /// Return a new variant with the demonstration list replaced wholesale.
    /// Used by strategies that drop demos while appending a new one.
    pub fn with_demonstrations(&self, demos: Vec<Demonstration>) -> Self {
        Self {
            id: Uuid::new_v4(),
            demos,
            instructions: self.instructions.clone(),
        }
    }

    /// Return a new variant with `text` appended to the instruction list.
    pub fn with_instruction(&self, text: impl Into<String>) -> Self {
        let mut instructions = self.instructions.clone();
        instructions.push(text.into());
        Self {
            id: Uuid::new_v4(),
            demos: self.demos.clone(),
            instructions,
        }
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo(key: &str, val: &str) -> Demonstration {
        let mut inputs = HashMap::new();
        inputs.insert(key.to_string(), val.to_string());
        Demonstration::new(inputs, HashMap::new())
    }

    #[test]
    fn test_with_demonstration_is_copy_on_write() {
        let base = Program::new();
        let child = base.with_demonstration(demo("q", "hi"));

        assert_ne!(base.id, child.id);
        assert!(base.demos.is_empty());
        assert_eq!(child.demos.len(), 1);
    }

    #[test]
    fn test_with_instruction_preserves_demos() {
        let base = Program::new().with_demonstration(demo("q", "hi"));
        let child = base.with_instruction("Prefer short answers.");

        assert_ne!(base.id, child.id);
        assert_eq!(child.demos.len(), 1);
        assert_eq!(child.instructions, vec!["Prefer short answers."]);
        assert!(base.instructions.is_empty());
    }
}
