//! Backend capabilities used by the pipeline stages.
//!
//! Two seams are defined here:
//!
//! - [`TextBackend`] answers multimodal text requests (prompt refinement,
//!   object extraction, evaluation).
//! - [`GenerationBackend`] turns a prompt plus ordered conditioning images
//!   into image bytes.
//!
//! Concrete adapters live in [`crate::llm`] (OpenAI-compatible chat
//! completions), [`openai_images`] and [`command`]. Every error they return is
//! a soft, per-unit failure from the sweep's point of view.

pub mod command;
pub mod openai_images;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;

pub use command::CommandBackend;
pub use openai_images::OpenAiImagesBackend;

/// An image loaded or uploaded for inclusion in a backend request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHandle {
    /// File the image was read from.
    pub source: PathBuf,
    /// MIME type, e.g. `image/png`.
    pub mime_type: String,
    /// Raw file bytes.
    pub data: Vec<u8>,
}

impl ImageHandle {
    /// Reads an image file from disk.
    pub async fn read(path: &Path) -> Result<Self, BackendError> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| BackendError::ImageUnavailable {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        if data.is_empty() {
            return Err(BackendError::ImageUnavailable {
                path: path.display().to_string(),
                reason: "file is empty".to_string(),
            });
        }

        let mime_type = path
            .extension()
            .and_then(|ext| mime_for_extension(&ext.to_string_lossy()))
            .or_else(|| mime_for_extension(sniff_image_extension(&data)))
            .unwrap_or("image/png")
            .to_string();

        Ok(Self {
            source: path.to_path_buf(),
            mime_type,
            data,
        })
    }

    /// Encodes the image as a `data:` URL.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, BASE64.encode(&self.data))
    }

    pub fn file_name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image.png".to_string())
    }
}

/// One ordered piece of a multimodal text request.
#[derive(Debug, Clone)]
pub enum RequestPart {
    Text(String),
    Image(ImageHandle),
}

/// A multimodal request to a [`TextBackend`].
#[derive(Debug, Clone, Default)]
pub struct TextRequest {
    /// Content parts in the order the backend should see them.
    pub parts: Vec<RequestPart>,
    /// Sampling temperature; backend default when `None`.
    pub temperature: Option<f64>,
    /// Ask the backend for a JSON response body.
    pub json_output: bool,
}

impl TextRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.parts.push(RequestPart::Text(text.into()));
        self
    }

    pub fn image(mut self, image: ImageHandle) -> Self {
        self.parts.push(RequestPart::Image(image));
        self
    }

    pub fn images(mut self, images: impl IntoIterator<Item = ImageHandle>) -> Self {
        self.parts.extend(images.into_iter().map(RequestPart::Image));
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_json_output(mut self) -> Self {
        self.json_output = true;
        self
    }

    pub fn image_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|p| matches!(p, RequestPart::Image(_)))
            .count()
    }
}

/// Token usage reported by a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Raw answer of a [`TextBackend`].
///
/// `text` may be empty; stages decide whether that counts as a failure and
/// use `finish_reason` and `usage` for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct TextResponse {
    pub text: String,
    pub finish_reason: Option<String>,
    pub usage: Option<TokenUsage>,
}

impl TextResponse {
    /// Short diagnostic line with finish reason and token usage.
    pub fn diagnostics(&self) -> String {
        let finish = self.finish_reason.as_deref().unwrap_or("unknown");
        match self.usage {
            Some(usage) => format!(
                "finish_reason={} prompt_tokens={} completion_tokens={}",
                finish, usage.prompt_tokens, usage.completion_tokens
            ),
            None => format!("finish_reason={}", finish),
        }
    }
}

/// Prompt plus ordered conditioning images for a [`GenerationBackend`].
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub images: Vec<ImageHandle>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            images: Vec::new(),
        }
    }

    pub fn with_images(mut self, images: Vec<ImageHandle>) -> Self {
        self.images = images;
        self
    }
}

/// Image produced by a [`GenerationBackend`].
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    /// Text returned alongside the image, if any.
    pub text_parts: Vec<String>,
}

impl GeneratedImage {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            text_parts: Vec::new(),
        }
    }

    pub fn with_text_parts(mut self, text_parts: Vec<String>) -> Self {
        self.text_parts = text_parts;
        self
    }

    /// File extension matching the encoded bytes.
    pub fn extension(&self) -> &'static str {
        sniff_image_extension(&self.bytes)
    }
}

/// Answers multimodal text requests.
#[async_trait]
pub trait TextBackend: Send + Sync {
    /// Model identifier, used in logs.
    fn model(&self) -> &str;

    /// Makes an image available for inclusion in a request.
    async fn upload(&self, path: &Path) -> Result<ImageHandle, BackendError> {
        ImageHandle::read(path).await
    }

    async fn complete(&self, request: TextRequest) -> Result<TextResponse, BackendError>;
}

/// Produces an image from a prompt and conditioning images.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Backend name; also the stem of the output file.
    fn name(&self) -> &str;

    async fn load_image(&self, path: &Path) -> Result<ImageHandle, BackendError> {
        ImageHandle::read(path).await
    }

    async fn generate(&self, request: GenerationRequest) -> Result<GeneratedImage, BackendError>;
}

/// Detects the container format from magic bytes, defaulting to `png`.
pub fn sniff_image_extension(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        "png"
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "jpg"
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "webp"
    } else {
        "png"
    }
}

pub fn mime_for_extension(extension: &str) -> Option<&'static str> {
    match extension.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

/// Decodes a base64 `data:` URL into its MIME type and bytes.
pub fn decode_data_url(url: &str) -> Result<(Option<String>, Vec<u8>), BackendError> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| BackendError::ParseError("image is not a data URL".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| BackendError::ParseError("data URL has no payload".to_string()))?;
    if !header.ends_with(";base64") {
        return Err(BackendError::ParseError(
            "data URL is not base64 encoded".to_string(),
        ));
    }

    let mime = header.trim_end_matches(";base64");
    let bytes = decode_base64(payload)?;
    let mime = (!mime.is_empty()).then(|| mime.to_string());
    Ok((mime, bytes))
}

pub fn decode_base64(payload: &str) -> Result<Vec<u8>, BackendError> {
    BASE64
        .decode(payload.trim())
        .map_err(|e| BackendError::ParseError(format!("invalid base64 image data: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn test_sniff_image_extension() {
        assert_eq!(sniff_image_extension(&PNG_MAGIC), "png");
        assert_eq!(sniff_image_extension(&[0xFF, 0xD8, 0xFF, 0xE0]), "jpg");
        assert_eq!(sniff_image_extension(b"RIFF\0\0\0\0WEBPVP8 "), "webp");
        assert_eq!(sniff_image_extension(b"garbage"), "png");
    }

    #[test]
    fn test_data_url_round_trip() {
        let handle = ImageHandle {
            source: PathBuf::from("ref.png"),
            mime_type: "image/png".to_string(),
            data: PNG_MAGIC.to_vec(),
        };
        let url = handle.to_data_url();
        assert!(url.starts_with("data:image/png;base64,"));

        let (mime, bytes) = decode_data_url(&url).expect("decode");
        assert_eq!(mime.as_deref(), Some("image/png"));
        assert_eq!(bytes, PNG_MAGIC.to_vec());
    }

    #[test]
    fn test_decode_rejects_remote_url() {
        assert!(matches!(
            decode_data_url("https://example.com/a.png"),
            Err(BackendError::ParseError(_))
        ));
    }

    #[tokio::test]
    async fn test_read_image_handle() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("photo.JPG");
        std::fs::write(&path, [0xFF, 0xD8, 0xFF, 0xE0]).expect("write");

        let handle = ImageHandle::read(&path).await.expect("read");
        assert_eq!(handle.mime_type, "image/jpeg");
        assert_eq!(handle.file_name(), "photo.JPG");
    }

    #[tokio::test]
    async fn test_read_missing_or_empty_image() {
        let temp = tempdir().expect("tempdir");
        let missing = ImageHandle::read(&temp.path().join("nope.png")).await;
        assert!(matches!(missing, Err(BackendError::ImageUnavailable { .. })));

        let empty = temp.path().join("empty.png");
        std::fs::write(&empty, b"").expect("write");
        assert!(ImageHandle::read(&empty).await.is_err());
    }

    #[test]
    fn test_text_request_builder() {
        let image = ImageHandle {
            source: PathBuf::from("a.png"),
            mime_type: "image/png".to_string(),
            data: vec![1],
        };
        let request = TextRequest::new()
            .text("rate this")
            .image(image)
            .with_temperature(0.0)
            .with_json_output();
        assert_eq!(request.parts.len(), 2);
        assert_eq!(request.image_count(), 1);
        assert_eq!(request.temperature, Some(0.0));
        assert!(request.json_output);
    }

    #[test]
    fn test_response_diagnostics() {
        let response = TextResponse {
            text: String::new(),
            finish_reason: Some("SAFETY".to_string()),
            usage: Some(TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 0,
                total_tokens: 10,
            }),
        };
        assert_eq!(
            response.diagnostics(),
            "finish_reason=SAFETY prompt_tokens=10 completion_tokens=0"
        );
        assert_eq!(TextResponse::default().diagnostics(), "finish_reason=unknown");
    }
}
