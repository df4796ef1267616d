//! Local inference command adapter.
//!
//! Runs an external program once per request:
//!
//! ```text
//! <program> [args...] --prompt <text> --output <file> [--image <path>]...
//! ```
//!
//! The program must write the generated image to `--output` and exit 0.
//! Conditioning images are passed by path in order.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{GeneratedImage, GenerationBackend, GenerationRequest};
use crate::error::BackendError;

/// Default per-call timeout for local inference.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(600);

const OUTPUT_FILE_NAME: &str = "output.png";

/// Generation backend that shells out to a local inference program.
pub struct CommandBackend {
    name: String,
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandBackend {
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Extra arguments placed before the generated ones.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl GenerationBackend for CommandBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: GenerationRequest) -> Result<GeneratedImage, BackendError> {
        let scratch = tempfile::tempdir()?;
        let output_path = scratch.path().join(OUTPUT_FILE_NAME);

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg("--prompt")
            .arg(&request.prompt)
            .arg("--output")
            .arg(&output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for image in &request.images {
            cmd.arg("--image").arg(&image.source);
        }

        debug!(
            program = %self.program,
            images = request.images.len(),
            "Running local inference command"
        );

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(BackendError::Timeout {
                    seconds: self.timeout.as_secs(),
                })
            }
        };

        if !output.status.success() {
            return Err(BackendError::CommandFailed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let bytes = match tokio::fs::read(&output_path).await {
            Ok(bytes) if !bytes.is_empty() => bytes,
            Ok(_) => {
                return Err(BackendError::EmptyResponse(
                    "command wrote an empty output file".to_string(),
                ))
            }
            Err(_) => {
                return Err(BackendError::EmptyResponse(
                    "command exited without writing an output file".to_string(),
                ))
            }
        };

        let text_parts = if stdout.is_empty() { Vec::new() } else { vec![stdout] };
        Ok(GeneratedImage::new(bytes).with_text_parts(text_parts))
    }
}
