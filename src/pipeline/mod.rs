//! Pipeline orchestration over the dataset tree.
//!
//! # Architecture
//!
//! - **Config**: dataset root, task filter and inter-call delay
//! - **Driver**: the sequential sweep loop with per-unit isolation
//! - **Stages**: refine, objects, generate and evaluate, each a [`Stage`]
//! - **Status**: read-only completion report
//!
//! # Sweep Flow
//!
//! 1. **Enumerate**: units are visited in lexical order, two levels below the root
//! 2. **Resolve**: the task is inferred from the path and the metadata loaded
//! 3. **Check**: the stage lists work items that are not complete yet
//! 4. **Attempt**: the backend is called once per item
//! 5. **Persist**: a fully validated result is written atomically, then the
//!    configured delay elapses
//!
//! Failures at any step are logged and leave the item pending for the next
//! sweep; nothing short of a configuration error stops the run.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use imagen_forge::llm::LiteLlmClient;
//! use imagen_forge::pipeline::{RefineStage, SweepConfig, SweepDriver};
//!
//! let config = SweepConfig::new("/data/bench");
//! config.validate()?;
//!
//! let backend = Arc::new(LiteLlmClient::from_env()?);
//! let summary = SweepDriver::new(config).run(&RefineStage::new(backend)).await;
//! println!("{}", summary);
//! ```

pub mod config;
pub mod driver;
pub mod stages;
pub mod status;

pub use config::{
    parse_task_list, SweepConfig, DEFAULT_GENERATION_DELAY_SECS, DEFAULT_TEXT_DELAY_SECS,
};
pub use driver::{resolve_unit, Stage, SweepDriver, SweepSummary, UnitContext, WorkItem};
pub use stages::{EvaluateStage, GenerateStage, ObjectsStage, RefineStage};
pub use status::{collect_status, StageStatus, StatusReport};
