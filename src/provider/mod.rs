//! Language-service abstraction
//!
//! The orchestrator talks to exactly three narrow language operations:
//! intent classification, medication-mention extraction, and rendering a
//! reply from a fixed instruction plus structured facts. Everything that
//! decides *what* to say is deterministic Rust; the provider only decides
//! *how* to phrase it.

pub mod openai;

pub use openai::OpenAIProvider;

use crate::error::ProviderResult;
use crate::intent::Intent;
use crate::types::Language;
use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;
use std::pin::Pin;

/// Token stream produced by a streaming render call
pub type TextStream = Pin<Box<dyn Stream<Item = ProviderResult<String>> + Send>>;

/// What the renderer is given: the reply language, a fixed instruction
/// describing the move to make, and the facts it may state. The renderer
/// must never add facts of its own.
#[derive(Debug, Clone)]
pub struct RenderPrompt {
    pub language: Language,
    pub instruction: String,
    pub facts: Value,
}

impl RenderPrompt {
    pub fn new(language: Language, instruction: impl Into<String>, facts: Value) -> Self {
        Self {
            language,
            instruction: instruction.into(),
            facts,
        }
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Classify the user message into one of the supported intents,
    /// given a one-line summary of the active flow for context.
    async fn classify_intent(&self, message: &str, flow_summary: &str)
        -> ProviderResult<Intent>;

    /// Extract a single medication mention from free text, or `None`
    /// when the text names no medication.
    async fn extract_medication(&self, message: &str) -> ProviderResult<Option<String>>;

    /// Render a complete reply in one shot.
    async fn render(&self, prompt: &RenderPrompt) -> ProviderResult<String>;

    /// Render a reply as a token stream.
    async fn render_stream(&self, prompt: &RenderPrompt) -> ProviderResult<TextStream>;
}
