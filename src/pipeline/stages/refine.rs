//! Prompt refinement stage.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::upload_tolerant;
use crate::backend::{TextBackend, TextRequest};
use crate::dataset::refine_complete;
use crate::error::StageError;
use crate::pipeline::driver::{Stage, UnitContext, WorkItem};
use crate::prompts::{build_refine_instruction, is_weak_prompt};

/// Rewrites each unit's prompt once and stores it as `prompt_refined`.
pub struct RefineStage {
    backend: Arc<dyn TextBackend>,
}

impl RefineStage {
    pub fn new(backend: Arc<dyn TextBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Stage for RefineStage {
    fn name(&self) -> &'static str {
        "refine"
    }

    fn pending(&self, ctx: &UnitContext) -> Result<Vec<WorkItem>, StageError> {
        if refine_complete(&ctx.metadata) {
            return Ok(Vec::new());
        }
        if ctx.metadata.prompt.trim().is_empty() {
            return Err(StageError::MissingInput("metadata has no prompt".to_string()));
        }
        Ok(vec![WorkItem::new("prompt_refined")])
    }

    async fn attempt(&self, ctx: &UnitContext, _item: &WorkItem) -> Result<(), StageError> {
        let prompt = ctx.metadata.prompt.trim();
        if is_weak_prompt(prompt) {
            info!(unit = %ctx.unit.name(), prompt, "Weak prompt detected");
        }

        let images = upload_tolerant(self.backend.as_ref(), ctx).await;
        let instruction =
            build_refine_instruction(ctx.task, &ctx.topic_label(), prompt, images.len());
        debug!(unit = %ctx.unit.name(), instruction = %instruction, "Refine instruction");

        let request = TextRequest::new().text(instruction).images(images);
        let response = self.backend.complete(request).await?;

        let refined = response.text.trim();
        if refined.is_empty() {
            return Err(StageError::InvalidResponse {
                reason: format!("empty refined prompt ({})", response.diagnostics()),
                excerpt: String::new(),
            });
        }

        let mut metadata = ctx.metadata.clone();
        metadata.prompt_refined = Some(refined.to_string());
        ctx.unit.save_metadata(&metadata)?;
        Ok(())
    }
}
