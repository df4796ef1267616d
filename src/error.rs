//! Error types for imagen-forge operations.
//!
//! Defines error types for the major subsystems:
//! - Record store reads and writes inside example directories
//! - Backend capabilities (remote LLM / image APIs, local inference commands)
//! - Per-unit stage execution
//! - Sweep configuration

use thiserror::Error;

/// Errors that can occur while reading or writing unit records.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Required file not found: {0}")]
    MissingFile(String),

    #[error("Failed to parse '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to persist '{path}': {message}")]
    Persist { path: String, message: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by a generation or text backend.
///
/// Every variant is a soft, per-unit failure from the sweep's point of view.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Missing API key: {0}")]
    MissingApiKey(String),

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Failed to parse backend response: {0}")]
    ParseError(String),

    #[error("Backend returned no usable output: {0}")]
    EmptyResponse(String),

    #[error("Backend call timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Command exited with code {code:?}: {stderr}")]
    CommandFailed { code: Option<i32>, stderr: String },

    #[error("Image '{path}' unavailable: {reason}")]
    ImageUnavailable { path: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors produced while a stage works on a single unit.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid backend response ({reason}); raw='{excerpt}'")]
    InvalidResponse { reason: String, excerpt: String },

    #[error("Missing input: {0}")]
    MissingInput(String),
}

/// Errors that can occur while building the sweep configuration.
///
/// These are the only errors allowed to abort a run, and they are raised
/// before any unit is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}
