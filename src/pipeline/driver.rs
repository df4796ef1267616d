//! Sweep driver.
//!
//! Walks every unit in lexical order and runs one [`Stage`] against it,
//! strictly sequentially. Each unit goes through
//! resolve → load → pending check → attempt → persist, and every failure is
//! contained to the unit (or work item) that raised it: it is logged, nothing
//! is written, and the item stays pending for the next sweep.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use super::config::SweepConfig;
use crate::categories::{topic_label, TaskCode, TopicCode};
use crate::dataset::{ExampleMetadata, UnitDir};
use crate::error::StageError;

/// Everything a stage needs to know about one unit.
#[derive(Debug, Clone)]
pub struct UnitContext {
    pub unit: UnitDir,
    pub task: TaskCode,
    pub metadata: ExampleMetadata,
}

impl UnitContext {
    /// Topic label from the metadata, or from the directory name when blank.
    pub fn topic_label(&self) -> String {
        if !self.metadata.topic.trim().is_empty() {
            return topic_label(&self.metadata.topic);
        }
        TopicCode::from_unit_name(&self.unit.name())
            .map(|t| t.label().to_string())
            .unwrap_or_default()
    }

    /// Conditioning image paths that exist on disk, in metadata order.
    pub fn existing_cond_images(&self) -> Vec<PathBuf> {
        self.unit
            .cond_image_paths(&self.metadata)
            .into_iter()
            .filter(|path| {
                let exists = path.is_file();
                if !exists {
                    warn!(
                        unit = %self.unit.name(),
                        image = %path.display(),
                        "Conditioning image missing, skipping it"
                    );
                }
                exists
            })
            .collect()
    }
}

/// One independently persisted piece of work inside a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Identity in logs: the stage name or a backend name.
    pub key: String,
    /// Input file for the item (e.g. the candidate image under evaluation).
    pub input: Option<PathBuf>,
}

impl WorkItem {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            input: None,
        }
    }

    pub fn with_input(mut self, input: PathBuf) -> Self {
        self.input = Some(input);
        self
    }
}

/// One pipeline stage.
///
/// `pending` must be a pure function of the unit's on-disk state; `attempt`
/// either persists a complete result or writes nothing.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    /// Work items of this unit that are not complete yet.
    fn pending(&self, ctx: &UnitContext) -> Result<Vec<WorkItem>, StageError>;

    /// Calls the backend for one item and persists the result.
    async fn attempt(&self, ctx: &UnitContext, item: &WorkItem) -> Result<(), StageError>;
}

/// Counters for one sweep, for logging only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub units_seen: usize,
    /// Units skipped for structural reasons (task not inferable, bad metadata).
    pub units_skipped: usize,
    /// Units with nothing left to do.
    pub units_complete: usize,
    pub items_attempted: usize,
    pub items_persisted: usize,
    pub items_failed: usize,
}

impl std::fmt::Display for SweepSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "units={} skipped={} complete={} attempted={} persisted={} failed={}",
            self.units_seen,
            self.units_skipped,
            self.units_complete,
            self.items_attempted,
            self.items_persisted,
            self.items_failed
        )
    }
}

/// Resolves the task of a unit and loads its metadata.
///
/// The task is inferred from the path relative to `root`, so codes that
/// happen to appear in the root path itself are ignored. Returns `None`
/// (after logging) when the unit must be skipped.
pub fn resolve_unit(root: &Path, unit: &UnitDir) -> Option<UnitContext> {
    let relative = unit.path().strip_prefix(root).unwrap_or(unit.path());
    let Some(task) = TaskCode::infer_from_path(relative) else {
        warn!(unit = %unit.path().display(), "Could not infer task from path, skipping");
        return None;
    };

    match unit.load_metadata() {
        Ok(metadata) => Some(UnitContext {
            unit: unit.clone(),
            task,
            metadata,
        }),
        Err(e) => {
            warn!(unit = %unit.name(), error = %e, "Could not load metadata, skipping");
            None
        }
    }
}

/// Runs stages over the dataset described by a [`SweepConfig`].
pub struct SweepDriver {
    config: SweepConfig,
}

impl SweepDriver {
    pub fn new(config: SweepConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Resolves the task and loads the records of one unit.
    pub fn resolve(&self, unit: &UnitDir) -> Option<UnitContext> {
        resolve_unit(&self.config.root, unit)
    }

    /// Runs one full sweep of `stage` over every enumerated unit.
    pub async fn run(&self, stage: &dyn Stage) -> SweepSummary {
        let mut summary = SweepSummary::default();
        info!(
            stage = stage.name(),
            root = %self.config.root.display(),
            "Starting sweep"
        );

        let enumerator = self.config.enumerator();
        for unit in enumerator.units() {
            summary.units_seen += 1;

            let Some(ctx) = self.resolve(&unit) else {
                summary.units_skipped += 1;
                continue;
            };

            let items = match stage.pending(&ctx) {
                Ok(items) => items,
                Err(e) => {
                    warn!(stage = stage.name(), unit = %unit.name(), error = %e, "Could not determine pending work, skipping");
                    summary.units_skipped += 1;
                    continue;
                }
            };

            if items.is_empty() {
                info!(stage = stage.name(), unit = %unit.name(), "Already complete, skipping");
                summary.units_complete += 1;
                continue;
            }

            for item in &items {
                summary.items_attempted += 1;
                debug!(stage = stage.name(), unit = %unit.name(), item = %item.key, "Attempting");

                match stage.attempt(&ctx, item).await {
                    Ok(()) => {
                        summary.items_persisted += 1;
                        info!(stage = stage.name(), unit = %unit.name(), item = %item.key, "Saved");
                        if !self.config.delay.is_zero() {
                            tokio::time::sleep(self.config.delay).await;
                        }
                    }
                    Err(e) => {
                        summary.items_failed += 1;
                        error!(
                            stage = stage.name(),
                            unit = %unit.name(),
                            item = %item.key,
                            error = %e,
                            "Attempt failed, will retry on next sweep"
                        );
                    }
                }
            }
        }

        info!(stage = stage.name(), summary = %summary, "Sweep finished");
        summary
    }
}
