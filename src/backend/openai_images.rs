//! OpenAI Images API adapter.
//!
//! Text-only requests go to `/images/generations`; requests with
//! conditioning images go to `/images/edits` as multipart uploads, one
//! `image[]` field per image in order. Both return base64 image data.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};

use super::{decode_base64, GeneratedImage, GenerationBackend, GenerationRequest};
use crate::error::BackendError;

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_IMAGE_MODEL: &str = "gpt-image-1";

#[derive(Debug, Serialize)]
struct GenerationsBody<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    revised_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Generation backend backed by the OpenAI Images API.
pub struct OpenAiImagesBackend {
    name: String,
    api_base: String,
    api_key: String,
    model: String,
    size: Option<String>,
    http_client: Client,
}

impl OpenAiImagesBackend {
    pub fn new(
        name: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(BackendError::MissingApiKey(
                "OpenAI images backend needs an API key".to_string(),
            ));
        }
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::RequestFailed(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            name: name.into(),
            api_base: OPENAI_API_BASE.to_string(),
            api_key,
            model: DEFAULT_IMAGE_MODEL.to_string(),
            size: None,
            http_client,
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Output size such as `1024x1024`.
    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = Some(size.into());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn edits_form(&self, request: &GenerationRequest) -> Result<Form, BackendError> {
        let mut form = Form::new()
            .text("model", self.model.clone())
            .text("prompt", request.prompt.clone())
            .text("n", "1");
        if let Some(ref size) = self.size {
            form = form.text("size", size.clone());
        }

        for image in &request.images {
            let part = Part::bytes(image.data.clone())
                .file_name(image.file_name())
                .mime_str(&image.mime_type)
                .map_err(|e| BackendError::ImageUnavailable {
                    path: image.source.display().to_string(),
                    reason: e.to_string(),
                })?;
            form = form.part("image[]", part);
        }
        Ok(form)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<ImagesResponse, BackendError> {
        let http_response = builder
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| BackendError::RequestFailed(e.to_string()))?;

        let status = http_response.status();
        if !status.is_success() {
            let status_code = status.as_u16();
            let error_text = http_response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            let message = serde_json::from_str::<ApiErrorResponse>(&error_text)
                .map(|r| r.error.message)
                .unwrap_or(error_text);

            if status_code == 429 {
                return Err(BackendError::RateLimited(message));
            }
            return Err(BackendError::ApiError {
                code: status_code,
                message,
            });
        }

        http_response
            .json::<ImagesResponse>()
            .await
            .map_err(|e| BackendError::ParseError(format!("Failed to parse images response: {}", e)))
    }
}

fn into_generated_image(response: ImagesResponse) -> Result<GeneratedImage, BackendError> {
    let datum = response
        .data
        .into_iter()
        .next()
        .ok_or_else(|| BackendError::EmptyResponse("images response has no data".to_string()))?;
    let payload = datum
        .b64_json
        .ok_or_else(|| BackendError::EmptyResponse("image entry has no b64_json".to_string()))?;

    let bytes = decode_base64(&payload)?;
    let text_parts = datum.revised_prompt.into_iter().collect();
    Ok(GeneratedImage::new(bytes).with_text_parts(text_parts))
}

#[async_trait]
impl GenerationBackend for OpenAiImagesBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: GenerationRequest) -> Result<GeneratedImage, BackendError> {
        let response = if request.images.is_empty() {
            let body = GenerationsBody {
                model: &self.model,
                prompt: &request.prompt,
                n: 1,
                size: self.size.as_deref(),
            };
            let url = format!("{}/images/generations", self.api_base);
            self.send(self.http_client.post(&url).json(&body)).await?
        } else {
            let form = self.edits_form(&request)?;
            let url = format!("{}/images/edits", self.api_base);
            self.send(self.http_client.post(&url).multipart(form)).await?
        };

        into_generated_image(response)
    }
}
