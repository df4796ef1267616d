//! Read-only progress report.
//!
//! Applies every stage's completion predicate to every unit without calling
//! a backend or writing anything.

use std::collections::BTreeMap;
use std::fmt;

use super::config::SweepConfig;
use super::driver::resolve_unit;
use crate::dataset::{generation_complete, objects_complete, refine_complete, EvaluationPolicy};

/// Done/pending counts for one stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageStatus {
    pub complete: usize,
    pub pending: usize,
}

impl StageStatus {
    fn record(&mut self, complete: bool) {
        if complete {
            self.complete += 1;
        } else {
            self.pending += 1;
        }
    }
}

/// Completion counts across the dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    pub units: usize,
    /// Units whose task or metadata could not be resolved.
    pub unresolved: usize,
    pub refine: StageStatus,
    pub objects: StageStatus,
    /// Per generation backend.
    pub generation: BTreeMap<String, StageStatus>,
    /// Candidates found in `model_output/`, overridden ones counted as complete.
    pub evaluation: StageStatus,
    /// Units without a `model_output/` directory.
    pub without_outputs: usize,
}

/// Builds a [`StatusReport`] for the configured task categories.
pub fn collect_status(
    config: &SweepConfig,
    policy: &EvaluationPolicy,
    backends: &[String],
) -> StatusReport {
    let mut report = StatusReport::default();
    for backend in backends {
        report.generation.insert(backend.clone(), StageStatus::default());
    }

    for unit in config.enumerator().units() {
        report.units += 1;
        let Some(ctx) = resolve_unit(&config.root, &unit) else {
            report.unresolved += 1;
            continue;
        };

        report.refine.record(refine_complete(&ctx.metadata));
        report.objects.record(objects_complete(&ctx.metadata));
        for (backend, status) in report.generation.iter_mut() {
            status.record(generation_complete(&ctx.unit, backend));
        }

        match ctx.unit.candidate_images() {
            Ok(Some(candidates)) => {
                let results = ctx.unit.load_results(&policy.evaluator);
                for candidate in candidates {
                    report
                        .evaluation
                        .record(policy.is_complete(&results, ctx.task, &candidate.backend));
                }
            }
            Ok(None) | Err(_) => report.without_outputs += 1,
        }
    }

    report
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Units: {} ({} unresolved)", self.units, self.unresolved)?;
        writeln!(
            f,
            "  refine      {:>6} done {:>6} pending",
            self.refine.complete, self.refine.pending
        )?;
        writeln!(
            f,
            "  objects     {:>6} done {:>6} pending",
            self.objects.complete, self.objects.pending
        )?;
        for (backend, status) in &self.generation {
            writeln!(
                f,
                "  generate:{:<12} {:>6} done {:>6} pending",
                backend, status.complete, status.pending
            )?;
        }
        write!(
            f,
            "  evaluate    {:>6} done {:>6} pending ({} units without outputs)",
            self.evaluation.complete, self.evaluation.pending, self.without_outputs
        )
    }
}
