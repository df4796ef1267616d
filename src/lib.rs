//! imagen-forge: orchestration core for an image generation benchmark.
//!
//! Walks a dataset of benchmark units, refines their prompts, extracts the
//! objects each output must show, generates candidate images with pluggable
//! backends and rates every candidate with a vision-language evaluator.
//! Every stage is resumable: work already stored on disk is never redone.

// Core modules
pub mod backend;
pub mod categories;
pub mod cli;
pub mod dataset;
pub mod error;
pub mod llm;
pub mod parse;
pub mod pipeline;
pub mod prompts;

// Re-export commonly used error types
pub use error::{BackendError, ConfigError, StageError, StoreError};
