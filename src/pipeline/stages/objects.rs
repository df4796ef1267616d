//! Required-object extraction stage.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::upload_tolerant;
use crate::backend::{TextBackend, TextRequest};
use crate::dataset::objects_complete;
use crate::error::StageError;
use crate::parse::{excerpt, parse_bullet_list};
use crate::pipeline::driver::{Stage, UnitContext, WorkItem};
use crate::prompts::build_objects_instruction;

/// Lists the visual elements each unit's output must contain.
pub struct ObjectsStage {
    backend: Arc<dyn TextBackend>,
}

impl ObjectsStage {
    pub fn new(backend: Arc<dyn TextBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Stage for ObjectsStage {
    fn name(&self) -> &'static str {
        "objects"
    }

    fn pending(&self, ctx: &UnitContext) -> Result<Vec<WorkItem>, StageError> {
        if objects_complete(&ctx.metadata) {
            return Ok(Vec::new());
        }
        if ctx.metadata.effective_prompt().is_empty() {
            return Err(StageError::MissingInput("metadata has no prompt".to_string()));
        }
        Ok(vec![WorkItem::new("objects")])
    }

    async fn attempt(&self, ctx: &UnitContext, _item: &WorkItem) -> Result<(), StageError> {
        let images = upload_tolerant(self.backend.as_ref(), ctx).await;
        let instruction = build_objects_instruction(
            ctx.task,
            &ctx.topic_label(),
            ctx.metadata.effective_prompt(),
            images.len(),
        );
        debug!(unit = %ctx.unit.name(), instruction = %instruction, "Objects instruction");

        let request = TextRequest::new().text(instruction).images(images);
        let response = self.backend.complete(request).await?;

        let objects = parse_bullet_list(&response.text);
        if objects.is_empty() {
            return Err(StageError::InvalidResponse {
                reason: format!("no bullet items in response ({})", response.diagnostics()),
                excerpt: excerpt(&response.text, 300),
            });
        }

        let mut metadata = ctx.metadata.clone();
        metadata.objects = Some(objects);
        ctx.unit.save_metadata(&metadata)?;
        Ok(())
    }
}
