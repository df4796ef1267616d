//! Image generation stage.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::backend::{GenerationBackend, GenerationRequest};
use crate::dataset::generation_complete;
use crate::error::StageError;
use crate::pipeline::driver::{Stage, UnitContext, WorkItem};
use crate::prompts::wrap_generation_prompt;

/// Produces `model_output/<backend>.<ext>` for every unit.
pub struct GenerateStage {
    backend: Arc<dyn GenerationBackend>,
    wrap_prompt: bool,
}

impl GenerateStage {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            backend,
            wrap_prompt: false,
        }
    }

    /// Frame the prompt with the task definition and visual domain.
    pub fn with_wrapped_prompt(mut self, wrap: bool) -> Self {
        self.wrap_prompt = wrap;
        self
    }

    fn prompt_for(&self, ctx: &UnitContext) -> String {
        let prompt = ctx.metadata.effective_prompt();
        if self.wrap_prompt {
            wrap_generation_prompt(ctx.task, &ctx.topic_label(), prompt)
        } else {
            prompt.to_string()
        }
    }
}

#[async_trait]
impl Stage for GenerateStage {
    fn name(&self) -> &'static str {
        "generate"
    }

    fn pending(&self, ctx: &UnitContext) -> Result<Vec<WorkItem>, StageError> {
        let backend = self.backend.name();
        if generation_complete(&ctx.unit, backend) {
            return Ok(Vec::new());
        }
        if ctx.metadata.effective_prompt().is_empty() {
            return Err(StageError::MissingInput("metadata has no prompt".to_string()));
        }
        Ok(vec![WorkItem::new(backend)])
    }

    async fn attempt(&self, ctx: &UnitContext, _item: &WorkItem) -> Result<(), StageError> {
        let paths = ctx.existing_cond_images();
        if ctx.task.requires_images() && paths.is_empty() {
            return Err(StageError::MissingInput(format!(
                "{} needs conditioning images but none were found",
                ctx.task
            )));
        }

        let mut images = Vec::with_capacity(paths.len());
        for path in &paths {
            images.push(self.backend.load_image(path).await?);
        }

        let prompt = self.prompt_for(ctx);
        debug!(unit = %ctx.unit.name(), prompt = %prompt, images = images.len(), "Generation request");

        let generated = self
            .backend
            .generate(GenerationRequest::new(prompt).with_images(images))
            .await?;

        for text in &generated.text_parts {
            info!(unit = %ctx.unit.name(), backend = self.backend.name(), text = %text, "Backend returned text");
        }
        if generated.bytes.is_empty() {
            return Err(StageError::InvalidResponse {
                reason: "backend returned an empty image".to_string(),
                excerpt: String::new(),
            });
        }

        let path = ctx.unit.write_output_image(
            self.backend.name(),
            generated.extension(),
            &generated.bytes,
        )?;
        debug!(path = %path.display(), "Wrote output image");
        Ok(())
    }
}
