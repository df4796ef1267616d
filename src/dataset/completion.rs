//! Completion predicates, one per stage.
//!
//! Each predicate looks only at the on-disk state of a single unit, so
//! touching one unit can never change the answer for another.

use super::record::{EvaluationResults, ExampleMetadata};
use super::store::UnitDir;
use crate::categories::TaskCode;

/// Backends treated as already evaluated on editing tasks.
pub const DEFAULT_SKIP_ON_EDIT: &[&str] = &["uno"];

/// Default evaluator name; results land in `gemini_result.json`.
pub const DEFAULT_EVALUATOR: &str = "gemini";

/// Refine stage: a non-blank `prompt_refined` is stored.
pub fn refine_complete(metadata: &ExampleMetadata) -> bool {
    metadata.has_refined_prompt()
}

/// Objects stage: a non-empty `objects` list is stored.
pub fn objects_complete(metadata: &ExampleMetadata) -> bool {
    metadata.has_objects()
}

/// Generation stage: the backend's output image exists.
///
/// Only existence is checked, never content validity.
pub fn generation_complete(unit: &UnitDir, backend: &str) -> bool {
    unit.output_image(backend).is_some()
}

/// Decides which candidates of a unit still need a rating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationPolicy {
    /// Evaluator name; keys the results file and its top-level mapping.
    pub evaluator: String,
    /// Backends always considered complete on editing tasks.
    pub skip_on_edit: Vec<String>,
}

impl Default for EvaluationPolicy {
    fn default() -> Self {
        Self {
            evaluator: DEFAULT_EVALUATOR.to_string(),
            skip_on_edit: DEFAULT_SKIP_ON_EDIT.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl EvaluationPolicy {
    pub fn new(evaluator: impl Into<String>) -> Self {
        Self {
            evaluator: evaluator.into(),
            ..Default::default()
        }
    }

    pub fn with_skip_on_edit(mut self, backends: Vec<String>) -> Self {
        self.skip_on_edit = backends;
        self
    }

    /// Dataset-specific override: listed backends count as done for editing tasks.
    pub fn is_overridden(&self, task: TaskCode, backend: &str) -> bool {
        task.is_editing() && self.skip_on_edit.iter().any(|b| b == backend)
    }

    /// A stored key is permanently complete, whatever its content.
    pub fn is_complete(&self, results: &EvaluationResults, task: TaskCode, backend: &str) -> bool {
        self.is_overridden(task, backend) || results.contains(&self.evaluator, backend)
    }
}
