//! Backend-facing instructions for each pipeline stage.
//!
//! - [`refine`] - rewrite a dataset prompt into a clearer instruction
//! - [`objects`] - list the visual elements a result must contain
//! - [`generation`] - frame a prompt for image generation backends
//! - [`evaluation`] - rubric for rating a candidate image

pub mod evaluation;
pub mod generation;
pub mod objects;
pub mod refine;

pub use evaluation::{
    prompt_line, CANDIDATE_IMAGE_HEADER, EVALUATION_INSTRUCTION, REFERENCE_IMAGES_HEADER,
};
pub use generation::wrap_generation_prompt;
pub use objects::{build_objects_instruction, MAX_OBJECTS};
pub use refine::{build_refine_instruction, is_weak_prompt};
