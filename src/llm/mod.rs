//! LLM integration for imagen-forge.
//!
//! [`LiteLlmClient`] talks to any OpenAI-compatible chat completions endpoint
//! (OpenRouter, a LiteLLM proxy) and implements both backend capabilities:
//!
//! ```ignore
//! use imagen_forge::backend::{TextBackend, TextRequest};
//! use imagen_forge::llm::LiteLlmClient;
//!
//! let client = LiteLlmClient::from_env()?;
//! let response = client
//!     .complete(TextRequest::new().text("Describe a sunset").with_temperature(0.0))
//!     .await?;
//! println!("{}", response.text);
//! ```

pub mod litellm;

pub use litellm::{
    ChatRequest, ChatResponse, Choice, ContentPart, ImageUrl, LiteLlmClient, LlmProvider, Message,
    MessageContent, ResponseFormat, DEFAULT_API_BASE, DEFAULT_MODEL, DEFAULT_TIMEOUT_SECS,
};
