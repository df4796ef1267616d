//! LiteLLM/OpenRouter-compatible chat completions client.
//!
//! Talks to any OpenAI-compatible `/chat/completions` endpoint. Messages carry
//! multimodal content parts, with images inlined as base64 data URLs, so the
//! same client serves as a [`TextBackend`] and, for models that answer with
//! images (`modalities: ["image", "text"]`), as a [`GenerationBackend`].

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::backend::{
    decode_data_url, GeneratedImage, GenerationBackend, GenerationRequest, ImageHandle,
    RequestPart, TextBackend, TextRequest, TextResponse, TokenUsage,
};
use crate::error::BackendError;

/// Default OpenAI-compatible endpoint.
pub const DEFAULT_API_BASE: &str = "https://openrouter.ai/api/v1";

/// Default model for text stages and evaluation.
pub const DEFAULT_MODEL: &str = "google/gemini-2.5-flash";

/// Per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Base delay for exponential backoff in milliseconds.
const BASE_RETRY_DELAY_MS: u64 = 1000;

/// Upper bound for a single backoff delay in milliseconds.
const MAX_RETRY_DELAY_MS: u64 = 60_000;

/// A single content part of a multimodal message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image(image: &ImageHandle) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: image.to_data_url(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Message content: plain text or an ordered list of parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Joins all text carried by the content, newline separated.
    pub fn joined_text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// A message in a conversation with an LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender (e.g., "system", "user", "assistant").
    pub role: String,
    pub content: MessageContent,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Text(content.into()),
        }
    }

    /// User message made of ordered text and image parts.
    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Parts(parts),
        }
    }
}

/// Requested response format (`{"type": "json_object"}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: String,
}

impl ResponseFormat {
    pub fn json_object() -> Self {
        Self {
            kind: "json_object".to_string(),
        }
    }
}

/// Request for a chat completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model identifier; the client default is used when empty.
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    /// Output modalities, e.g. `["image", "text"]` for image generation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Vec<String>>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
            response_format: None,
            modalities: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_json_output(mut self) -> Self {
        self.response_format = Some(ResponseFormat::json_object());
        self
    }

    pub fn with_image_output(mut self) -> Self {
        self.modalities = Some(vec!["image".to_string(), "text".to_string()]);
        self
    }
}

/// Response from a chat completion request.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

impl ChatResponse {
    /// Text of the first choice, falling back to all choices joined.
    pub fn text(&self) -> String {
        let first = self
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .map(MessageContent::joined_text)
            .unwrap_or_default();
        if !first.trim().is_empty() {
            return first;
        }

        self.choices
            .iter()
            .filter_map(|c| c.message.content.as_ref())
            .map(MessageContent::joined_text)
            .filter(|t| !t.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.choices.first().and_then(|c| c.finish_reason.as_deref())
    }

    /// Image URLs returned in the messages, in order.
    pub fn image_urls(&self) -> impl Iterator<Item = &str> {
        self.choices
            .iter()
            .flat_map(|c| c.message.images.iter())
            .map(|image| image.image_url.url.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    pub message: ResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<MessageContent>,
    #[serde(default)]
    pub images: Vec<ResponseImage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseImage {
    pub image_url: ImageUrl,
}

/// Error response from the API.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Anything that can answer a chat completion request.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, request: ChatRequest) -> Result<ChatResponse, BackendError>;
}

/// Client for LiteLLM/OpenRouter-compatible APIs.
pub struct LiteLlmClient {
    api_base: String,
    api_key: Option<String>,
    default_model: String,
    /// Name used when the client acts as a generation backend.
    backend_name: Option<String>,
    max_attempts: u32,
    http_client: Client,
}

impl LiteLlmClient {
    /// Create a new client with explicit configuration.
    ///
    /// # Arguments
    ///
    /// * `api_base` - Base URL of the API (e.g., "http://localhost:4000")
    /// * `api_key` - Optional API key, sent as a bearer token
    /// * `default_model` - Model used when a request leaves it empty
    /// * `timeout` - Hard per-request timeout
    pub fn new(
        api_base: impl Into<String>,
        api_key: Option<String>,
        default_model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::RequestFailed(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key,
            default_model: default_model.into(),
            backend_name: None,
            max_attempts: 1,
            http_client,
        })
    }

    /// Create a client pre-configured for OpenRouter.
    pub fn new_with_defaults(api_key: String) -> Result<Self, BackendError> {
        Self::new(
            DEFAULT_API_BASE,
            Some(api_key),
            DEFAULT_MODEL,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }

    /// Create a client from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `LITELLM_API_BASE`: base URL (defaults to OpenRouter)
    /// - `OPENROUTER_API_KEY` or `LITELLM_API_KEY`: API key (required)
    /// - `LITELLM_DEFAULT_MODEL`: default model
    pub fn from_env() -> Result<Self, BackendError> {
        let api_key = env::var("OPENROUTER_API_KEY")
            .or_else(|_| env::var("LITELLM_API_KEY"))
            .map_err(|_| {
                BackendError::MissingApiKey(
                    "set OPENROUTER_API_KEY or LITELLM_API_KEY".to_string(),
                )
            })?;
        let api_base =
            env::var("LITELLM_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        let default_model =
            env::var("LITELLM_DEFAULT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        Self::new(
            api_base,
            Some(api_key),
            default_model,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }

    /// Sets the name reported when acting as a generation backend.
    pub fn with_backend_name(mut self, name: impl Into<String>) -> Self {
        self.backend_name = Some(name.into());
        self
    }

    /// Retries transient transport failures up to `attempts` times in total.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    async fn execute_with_retry(&self, request: &ChatRequest) -> Result<ChatResponse, BackendError> {
        let url = format!("{}/chat/completions", self.api_base);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.execute_request(&url, request).await {
                Ok(response) => return Ok(response),
                Err(err) if attempt < self.max_attempts && is_transient_error(&err) => {
                    let delay_ms = retry_delay_ms(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms,
                        error = %err,
                        "Transient error, will retry"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn execute_request(
        &self,
        url: &str,
        request: &ChatRequest,
    ) -> Result<ChatResponse, BackendError> {
        let mut http_request = self
            .http_client
            .post(url)
            .header("Content-Type", "application/json")
            .header("HTTP-Referer", "https://imagen-forge.local")
            .header("X-Title", "imagen-forge");

        if let Some(ref api_key) = self.api_key {
            http_request = http_request.header("Authorization", format!("Bearer {}", api_key));
        }

        let http_response = http_request
            .json(request)
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
            .json::<ChatResponse>()
            .await
            .map_err(|e| BackendError::ParseError(format!("Failed to parse API response: {}", e)))
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, BackendError> {
        if url.starts_with("data:") {
            return decode_data_url(url).map(|(_, bytes)| bytes);
        }

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| BackendError::RequestFailed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(BackendError::ApiError {
                code: response.status().as_u16(),
                message: format!("failed to download generated image from {}", url),
            });
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| BackendError::RequestFailed(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Exponential backoff for the given 1-based attempt, capped at one minute.
fn retry_delay_ms(attempt: u32) -> u64 {
    let factor = 1u64
        .checked_shl(attempt.saturating_sub(1))
        .unwrap_or(u64::MAX);
    BASE_RETRY_DELAY_MS
        .saturating_mul(factor)
        .min(MAX_RETRY_DELAY_MS)
}

/// Transport failures, rate limits and 5xx responses are worth retrying.
fn is_transient_error(err: &BackendError) -> bool {
    match err {
        BackendError::RequestFailed(_) | BackendError::RateLimited(_) => true,
        BackendError::ApiError { code, .. } => *code >= 500,
        _ => false,
    }
}

fn message_from_parts(parts: Vec<RequestPart>) -> Message {
    let content = parts
        .iter()
        .map(|part| match part {
            RequestPart::Text(text) => ContentPart::text(text.clone()),
            RequestPart::Image(image) => ContentPart::image(image),
        })
        .collect();
    Message::user_parts(content)
}

#[async_trait]
impl LlmProvider for LiteLlmClient {
    async fn generate(&self, mut request: ChatRequest) -> Result<ChatResponse, BackendError> {
        if request.model.is_empty() {
            request.model = self.default_model.clone();
        }
        self.execute_with_retry(&request).await
    }
}

#[async_trait]
impl TextBackend for LiteLlmClient {
    fn model(&self) -> &str {
        &self.default_model
    }

    async fn complete(&self, request: TextRequest) -> Result<TextResponse, BackendError> {
        let mut chat = ChatRequest::new(
            self.default_model.clone(),
            vec![message_from_parts(request.parts)],
        );
        if let Some(temperature) = request.temperature {
            chat = chat.with_temperature(temperature);
        }
        if request.json_output {
            chat = chat.with_json_output();
        }

        let response = LlmProvider::generate(self, chat).await?;
        Ok(TextResponse {
            text: response.text(),
            finish_reason: response.finish_reason().map(str::to_string),
            usage: response.usage,
        })
    }
}

#[async_trait]
impl GenerationBackend for LiteLlmClient {
    fn name(&self) -> &str {
        self.backend_name.as_deref().unwrap_or(&self.default_model)
    }

    async fn generate(&self, request: GenerationRequest) -> Result<GeneratedImage, BackendError> {
        let mut parts = vec![ContentPart::text(request.prompt)];
        parts.extend(request.images.iter().map(ContentPart::image));

        let chat = ChatRequest::new(self.default_model.clone(), vec![Message::user_parts(parts)])
            .with_image_output();
        let response = LlmProvider::generate(self, chat).await?;

        let text = response.text();
        let text_parts: Vec<String> = if text.trim().is_empty() {
            Vec::new()
        } else {
            vec![text]
        };

        let url = response.image_urls().next().ok_or_else(|| {
            BackendError::EmptyResponse(format!(
                "no image in response (finish_reason={})",
                response.finish_reason().unwrap_or("unknown")
            ))
        })?;
        let bytes = self.fetch_image(url).await?;
        if bytes.is_empty() {
            return Err(BackendError::EmptyResponse("image payload is empty".to_string()));
        }

        Ok(GeneratedImage::new(bytes).with_text_parts(text_parts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn client(base: &str) -> LiteLlmClient {
        LiteLlmClient::new(base, None, "gpt-4o", Duration::from_secs(5)).expect("client")
    }

    #[test]
    fn test_client_new() {
        let client = LiteLlmClient::new(
            "http://localhost:4000/",
            Some("test-key".to_string()),
            "gpt-4o",
            Duration::from_secs(30),
        )
        .expect("client");

        assert_eq!(client.api_base(), "http://localhost:4000");
        assert_eq!(client.default_model(), "gpt-4o");
        assert!(client.has_api_key());
        assert_eq!(GenerationBackend::name(&client), "gpt-4o");

        let named = client.with_backend_name("gemini");
        assert_eq!(GenerationBackend::name(&named), "gemini");
    }

    #[test]
    fn test_client_new_with_defaults() {
        let client = LiteLlmClient::new_with_defaults("key".to_string()).expect("client");
        assert_eq!(client.api_base(), DEFAULT_API_BASE);
        assert_eq!(client.default_model(), DEFAULT_MODEL);
    }

    #[test]
    fn test_multimodal_request_serialization() {
        let image = ImageHandle {
            source: PathBuf::from("ref.png"),
            mime_type: "image/png".to_string(),
            data: vec![1, 2, 3],
        };
        let request = ChatRequest::new(
            "gpt-4o",
            vec![Message::user_parts(vec![
                ContentPart::text("describe"),
                ContentPart::image(&image),
            ])],
        )
        .with_temperature(0.0)
        .with_json_output();

        let json = serde_json::to_value(&request).expect("serialize");
        assert_eq!(json["messages"][0]["content"][0]["type"], "text");
        assert_eq!(json["messages"][0]["content"][1]["type"], "image_url");
        assert_eq!(
            json["messages"][0]["content"][1]["image_url"]["url"],
            "data:image/png;base64,AQID"
        );
        assert_eq!(json["response_format"]["type"], "json_object");
        assert!(json.get("modalities").is_none());
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn test_response_text_and_images() {
        let body = r#"{
            "id": "gen-1",
            "choices": [{
                "index": 0,
                "finish_reason": "stop",
                "message": {
                    "role": "assistant",
                    "content": [{"type": "text", "text": "here you go"}],
                    "images": [{"type": "image_url", "image_url": {"url": "data:image/png;base64,AQID"}}]
                }
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        }"#;
        let response: ChatResponse = serde_json::from_str(body).expect("parse");
        assert_eq!(response.text(), "here you go");
        assert_eq!(response.finish_reason(), Some("stop"));
        assert_eq!(response.usage.map(|u| u.total_tokens), Some(15));
        assert_eq!(
            response.image_urls().collect::<Vec<_>>(),
            vec!["data:image/png;base64,AQID"]
        );
    }

    #[test]
    fn test_response_with_null_content() {
        let body = r#"{"choices":[{"message":{"content":null},"finish_reason":"content_filter"}]}"#;
        let response: ChatResponse = serde_json::from_str(body).expect("parse");
        assert_eq!(response.text(), "");
        assert_eq!(response.finish_reason(), Some("content_filter"));
        assert!(response.usage.is_none());
    }

    #[test]
    fn test_retry_delay_is_bounded() {
        assert_eq!(retry_delay_ms(1), 1000);
        assert_eq!(retry_delay_ms(2), 2000);
        assert_eq!(retry_delay_ms(4), 8000);
        assert_eq!(retry_delay_ms(7), MAX_RETRY_DELAY_MS);
        assert_eq!(retry_delay_ms(64), MAX_RETRY_DELAY_MS);
        assert_eq!(retry_delay_ms(u32::MAX), MAX_RETRY_DELAY_MS);
    }

    #[test]
    fn test_transient_errors() {
        assert!(is_transient_error(&BackendError::RateLimited("slow".into())));
        assert!(is_transient_error(&BackendError::ApiError {
            code: 503,
            message: "busy".into()
        }));
        assert!(!is_transient_error(&BackendError::ApiError {
            code: 400,
            message: "bad".into()
        }));
        assert!(!is_transient_error(&BackendError::ParseError("x".into())));
    }

    #[tokio::test]
    async fn test_complete_connection_error() {
        let client = client("http://localhost:65535");
        let result = client.complete(TextRequest::new().text("hello")).await;
        assert!(matches!(result, Err(BackendError::RequestFailed(_))));
    }
}
