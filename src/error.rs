//! Error types for the apothecary library
//!
//! Expected lookup outcomes (found / not-found / ambiguous) are never errors;
//! they are plain values consumed by the flow logic. Errors here cover the
//! external language service and orchestrator-internal failures only.

use std::time::Duration;
use thiserror::Error;

/// Errors from the external language-understanding/generation service
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProviderError {
    /// Underlying API call failed
    #[error("provider API error: {0}")]
    Api(String),

    /// The classifier was asked for JSON and returned something else
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    /// The provider returned an empty completion or stream
    #[error("empty provider response")]
    EmptyResponse,

    /// The call did not complete within the configured deadline
    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),

    /// Provider misconfiguration (missing API key, bad model name)
    #[error("provider configuration error: {0}")]
    Configuration(String),
}

/// Main error type for apothecary operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AssistantError {
    /// External language service error
    #[error("language service error: {0}")]
    Provider(#[from] ProviderError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Orchestrator misconfiguration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Internal error (should not happen in normal operation)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Type alias for apothecary Result
pub type Result<T> = std::result::Result<T, AssistantError>;

/// Type alias for provider Result
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;
