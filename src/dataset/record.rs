//! On-disk record schema for example units.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::parse::RatingScores;

/// File name of the per-unit metadata record.
pub const METADATA_FILE: &str = "metadata.json";

/// Directory holding one output image per generation backend.
pub const MODEL_OUTPUT_DIR: &str = "model_output";

/// Image extensions recognised as generation outputs.
pub const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

/// Metadata record of one benchmark example (`metadata.json`).
///
/// `prompt_refined` and `objects` are derived fields written at most once.
/// Keys this crate does not know about are kept in `extra` and written back
/// untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExampleMetadata {
    /// Task code as recorded by dataset preparation.
    #[serde(default)]
    pub task: String,
    /// Topic code; descriptive only.
    #[serde(default)]
    pub topic: String,
    /// Original free-text instruction.
    #[serde(default)]
    pub prompt: String,
    /// Improved instruction produced by the refine stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_refined: Option<String>,
    /// Required visual elements produced by the objects stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objects: Option<Vec<String>>,
    /// Conditioning image file names, relative to the unit directory.
    #[serde(default)]
    pub cond_images: Vec<String>,
    /// Unrecognised keys, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ExampleMetadata {
    /// Returns true once a non-blank refined prompt has been stored.
    pub fn has_refined_prompt(&self) -> bool {
        self.prompt_refined
            .as_deref()
            .is_some_and(|p| !p.trim().is_empty())
    }

    /// Returns true once a non-empty object list has been stored.
    pub fn has_objects(&self) -> bool {
        self.objects.as_ref().is_some_and(|o| !o.is_empty())
    }

    /// The instruction downstream stages should use: the refined prompt when
    /// present, the original otherwise. Always trimmed.
    pub fn effective_prompt(&self) -> &str {
        match self.prompt_refined.as_deref().map(str::trim) {
            Some(refined) if !refined.is_empty() => refined,
            _ => self.prompt.trim(),
        }
    }
}

/// Evaluation results of a unit (`<evaluator>_result.json`).
///
/// Shape: `{ "<evaluator>": { "<backend>": <rating object> }, ... }`. Only the
/// evaluator's own sub-object is treated as a rating mapping; every other
/// top-level key is carried through untouched. Stored entries are raw JSON so
/// that a malformed historical rating still marks its backend as complete.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvaluationResults {
    entries: Map<String, Value>,
}

impl EvaluationResults {
    pub fn new() -> Self {
        Self::default()
    }

    fn scores(&self, evaluator: &str) -> Option<&Map<String, Value>> {
        self.entries.get(evaluator).and_then(Value::as_object)
    }

    /// Returns true if `backend` already has an entry under `evaluator`.
    pub fn contains(&self, evaluator: &str, backend: &str) -> bool {
        self.scores(evaluator)
            .is_some_and(|scores| scores.contains_key(backend))
    }

    /// Returns the stored entry for a backend, if any.
    pub fn get(&self, evaluator: &str, backend: &str) -> Option<&Value> {
        self.scores(evaluator)?.get(backend)
    }

    /// Records a validated rating. Existing entries are never replaced.
    ///
    /// An evaluator value that is not an object is replaced by a fresh
    /// mapping. Returns false if the backend was already present.
    pub fn insert(&mut self, evaluator: &str, backend: &str, rating: RatingScores) -> bool {
        let slot = self
            .entries
            .entry(evaluator.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        let Value::Object(scores) = slot else {
            return false;
        };
        if scores.contains_key(backend) {
            return false;
        }
        scores.insert(backend.to_string(), rating.into_value());
        true
    }

    /// Number of backends rated by `evaluator`.
    pub fn rated_count(&self, evaluator: &str) -> usize {
        self.scores(evaluator).map(Map::len).unwrap_or(0)
    }

    /// True when no evaluator has a rating stored.
    pub fn is_empty(&self) -> bool {
        self.entries
            .values()
            .filter_map(Value::as_object)
            .all(Map::is_empty)
    }
}

/// File name of the results record for an evaluator.
pub fn results_file_name(evaluator: &str) -> String {
    format!("{}_result.json", evaluator)
}
