//! Dataset layout, records and completion tracking.
//!
//! A dataset is a tree of unit directories, each holding its own metadata,
//! generation outputs and evaluation results. Nothing here keeps state
//! across units.

pub mod completion;
pub mod enumerate;
pub mod record;
pub mod store;

pub use completion::{
    generation_complete, objects_complete, refine_complete, EvaluationPolicy, DEFAULT_EVALUATOR,
    DEFAULT_SKIP_ON_EDIT,
};
pub use enumerate::WorkEnumerator;
pub use record::{EvaluationResults, ExampleMetadata, METADATA_FILE, MODEL_OUTPUT_DIR};
pub use store::{CandidateImage, UnitDir};
