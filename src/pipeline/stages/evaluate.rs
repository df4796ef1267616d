//! Candidate evaluation stage.
//!
//! Every image in `model_output/` is a candidate keyed by its file stem. Each
//! candidate is rated and persisted on its own, so one bad response never
//! costs the ratings of the others.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use super::upload_tolerant;
use crate::backend::{TextBackend, TextRequest};
use crate::dataset::EvaluationPolicy;
use crate::error::StageError;
use crate::parse::{excerpt, parse_rating};
use crate::pipeline::driver::{Stage, UnitContext, WorkItem};
use crate::prompts::{
    prompt_line, CANDIDATE_IMAGE_HEADER, EVALUATION_INSTRUCTION, REFERENCE_IMAGES_HEADER,
};

/// Characters of raw response kept in failure logs.
const EXCERPT_CHARS: usize = 300;

pub struct EvaluateStage {
    backend: Arc<dyn TextBackend>,
    policy: EvaluationPolicy,
}

impl EvaluateStage {
    pub fn new(backend: Arc<dyn TextBackend>, policy: EvaluationPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn policy(&self) -> &EvaluationPolicy {
        &self.policy
    }
}

#[async_trait]
impl Stage for EvaluateStage {
    fn name(&self) -> &'static str {
        "evaluate"
    }

    fn pending(&self, ctx: &UnitContext) -> Result<Vec<WorkItem>, StageError> {
        let Some(candidates) = ctx.unit.candidate_images()? else {
            return Err(StageError::MissingInput(
                "no model_output directory".to_string(),
            ));
        };

        let results = ctx.unit.load_results(&self.policy.evaluator);
        let mut items = Vec::new();
        for candidate in candidates {
            if self.policy.is_overridden(ctx.task, &candidate.backend) {
                info!(unit = %ctx.unit.name(), backend = %candidate.backend, "Skipping backend on editing task");
                continue;
            }
            if results.contains(&self.policy.evaluator, &candidate.backend) {
                debug!(unit = %ctx.unit.name(), backend = %candidate.backend, "Already rated");
                continue;
            }
            items.push(WorkItem::new(candidate.backend).with_input(candidate.path));
        }
        Ok(items)
    }

    async fn attempt(&self, ctx: &UnitContext, item: &WorkItem) -> Result<(), StageError> {
        let path = item
            .input
            .as_ref()
            .ok_or_else(|| StageError::MissingInput("candidate image path".to_string()))?;
        let candidate = self.backend.upload(path).await?;
        let references = upload_tolerant(self.backend.as_ref(), ctx).await;

        let mut request = TextRequest::new()
            .text(EVALUATION_INSTRUCTION)
            .text(prompt_line(ctx.metadata.effective_prompt()));
        if !references.is_empty() {
            request = request.text(REFERENCE_IMAGES_HEADER).images(references);
        }
        let request = request
            .text(CANDIDATE_IMAGE_HEADER)
            .image(candidate)
            .with_temperature(0.0)
            .with_json_output();

        let response = self.backend.complete(request).await?;
        let rating = parse_rating(&response.text).map_err(|e| {
            error!(
                unit = %ctx.unit.name(),
                backend = %item.key,
                finish_reason = response.finish_reason.as_deref().unwrap_or("unknown"),
                usage = ?response.usage,
                raw = %excerpt(&response.text, EXCERPT_CHARS),
                "Evaluation response rejected"
            );
            StageError::InvalidResponse {
                reason: format!("{} ({})", e, response.diagnostics()),
                excerpt: excerpt(&response.text, EXCERPT_CHARS),
            }
        })?;

        let mut results = ctx.unit.load_results(&self.policy.evaluator);
        if !results.insert(&self.policy.evaluator, &item.key, rating) {
            warn!(unit = %ctx.unit.name(), backend = %item.key, "Rating appeared concurrently, keeping the stored one");
            return Ok(());
        }
        ctx.unit.save_results(&self.policy.evaluator, &results)?;
        Ok(())
    }
}
