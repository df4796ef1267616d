//! The four pipeline stages.

mod evaluate;
mod generate;
mod objects;
mod refine;

pub use evaluate::EvaluateStage;
pub use generate::GenerateStage;
pub use objects::ObjectsStage;
pub use refine::RefineStage;

use tracing::warn;

use super::driver::UnitContext;
use crate::backend::{ImageHandle, TextBackend};

/// Uploads the unit's conditioning images, dropping any that fail.
async fn upload_tolerant(backend: &dyn TextBackend, ctx: &UnitContext) -> Vec<ImageHandle> {
    let mut handles = Vec::new();
    for path in ctx.existing_cond_images() {
        match backend.upload(&path).await {
            Ok(handle) => handles.push(handle),
            Err(e) => warn!(
                unit = %ctx.unit.name(),
                image = %path.display(),
                error = %e,
                "Image upload failed, continuing without it"
            ),
        }
    }
    handles
}
