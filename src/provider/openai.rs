//! OpenAI-backed language service
//!
//! Implements [`LlmProvider`] on top of the chat completions API. The
//! classification and extraction calls are plain completions with strict
//! output contracts (a JSON object, or a bare name / NULL); rendering
//! uses the streaming API.

use crate::error::{ProviderError, ProviderResult};
use crate::intent::Intent;
use crate::provider::{LlmProvider, RenderPrompt, TextStream};
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use futures::StreamExt;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, trace, warn};

const DEFAULT_MODEL: &str = "gpt-4o-mini";

const ROUTER_SYSTEM_PROMPT: &str = "\
You are an intent router for a pharmacist assistant.
Return ONLY a valid JSON object and nothing else.

Allowed intents:
- med_info: the user asks about a medication by name or wants factual information about one. Do NOT use this for requests for medical advice or guidance.
- stock_check: the user asks whether a medication is available or in stock at a branch, city, or store.
- rx_verify: the user asks about the status or validity of a prescription, or mentions a prescription or customer identifier.
- small_talk: greetings, thanks, 'what can you do', chit-chat, and anything not covered by the intents above.

JSON schema:
{\"intent\": \"med_info|stock_check|rx_verify|small_talk\"}";

const EXTRACTOR_SYSTEM_PROMPT: &str = "\
You are a professional entity extractor specializing in medicine names.
The user may write in Hebrew or English.
Your task:
1. Read the user's text carefully.
2. Identify the name of the medicine mentioned.
3. Return ONLY the medicine name, in the same language it was written.
4. You may correct a spelling mistake ONLY when you are sure that is the case.
5. If no medicine is identified, return NULL.

Examples:
Input: tell me about aspirin
Output: aspirin

Input: tell me about Hindu history
Output: NULL

Input: אדביל
Output: אדביל";

#[derive(Deserialize)]
struct RouterVerdict {
    intent: Intent,
}

pub struct OpenAIProvider {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    json_object: Regex,
}

impl OpenAIProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        Self {
            client: Client::with_config(config),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.2,
            max_tokens: 300,
            json_object: Regex::new(r"(?s)\{.*\}").expect("json object pattern must compile"),
        }
    }

    /// Read the API key from `OPENAI_API_KEY`.
    pub fn from_env() -> ProviderResult<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            ProviderError::Configuration("OPENAI_API_KEY environment variable not set".to_string())
        })?;
        Ok(Self::new(api_key))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    async fn complete(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
    ) -> ProviderResult<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .build()
            .map_err(|e| ProviderError::Api(format!("failed to build request: {e}")))?;

        trace!(model = %self.model, "sending completion request");

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!(error = %e, "OpenAI API error");
            ProviderError::Api(e.to_string())
        })?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or(ProviderError::EmptyResponse)
    }

    /// The model occasionally wraps its JSON in prose; take the first
    /// object-shaped span.
    fn extract_json_object<'a>(&self, raw: &'a str) -> ProviderResult<&'a str> {
        self.json_object
            .find(raw.trim())
            .map(|m| m.as_str())
            .ok_or_else(|| {
                ProviderError::MalformedResponse(format!("no JSON object in response: {raw:?}"))
            })
    }

    fn render_messages(&self, prompt: &RenderPrompt) -> Vec<ChatCompletionRequestMessage> {
        let system = format!(
            "You are a pharmacist assistant UI text generator.\n\
             Rules:\n\
             - You may respond ONLY in English or Hebrew. This time reply in {}.\n\
             - Use ONLY the facts provided. Do not add medical advice, diagnosis, dosage, \
             recommendations, or purchase encouragement from your prior knowledge.\n\
             - Keep it concise (3-6 short lines).\n\
             - You HAVE to follow the instruction below.\n\n\
             Instruction:\n{}",
            prompt.language.english_name(),
            prompt.instruction,
        );
        let user = format!("Facts:\n{}", prompt.facts);
        vec![system_message(system), user_message(user)]
    }
}

fn system_message(content: String) -> ChatCompletionRequestMessage {
    ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
        content: ChatCompletionRequestSystemMessageContent::Text(content),
        name: None,
    })
}

fn user_message(content: String) -> ChatCompletionRequestMessage {
    ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
        content: ChatCompletionRequestUserMessageContent::Text(content),
        name: None,
    })
}

#[async_trait]
impl LlmProvider for OpenAIProvider {
    async fn classify_intent(
        &self,
        message: &str,
        flow_summary: &str,
    ) -> ProviderResult<Intent> {
        info!(model = %self.model, "classifying intent");

        let user = format!("Active flow: {flow_summary}\nUser message:\n{message}");
        let raw = self
            .complete(vec![
                system_message(ROUTER_SYSTEM_PROMPT.to_string()),
                user_message(user),
            ])
            .await?;

        let json_str = self.extract_json_object(&raw)?;
        let verdict: RouterVerdict = serde_json::from_str(json_str).map_err(|e| {
            ProviderError::MalformedResponse(format!("router returned invalid JSON: {e}"))
        })?;

        debug!(intent = verdict.intent.as_str(), "router verdict");
        Ok(verdict.intent)
    }

    async fn extract_medication(&self, message: &str) -> ProviderResult<Option<String>> {
        let raw = self
            .complete(vec![
                system_message(EXTRACTOR_SYSTEM_PROMPT.to_string()),
                user_message(message.to_string()),
            ])
            .await?;

        let out = raw.trim();
        if out.is_empty() || out.eq_ignore_ascii_case("null") {
            return Ok(None);
        }
        debug!(mention = %out, "medication mention extracted");
        Ok(Some(out.to_string()))
    }

    async fn render(&self, prompt: &RenderPrompt) -> ProviderResult<String> {
        self.complete(self.render_messages(prompt)).await
    }

    async fn render_stream(&self, prompt: &RenderPrompt) -> ProviderResult<TextStream> {
        info!(model = %self.model, "requesting streaming render");

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(self.render_messages(prompt))
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .build()
            .map_err(|e| ProviderError::Api(format!("failed to build request: {e}")))?;

        let stream = self.client.chat().create_stream(request).await.map_err(|e| {
            warn!(error = %e, "OpenAI streaming error");
            ProviderError::Api(e.to_string())
        })?;

        // The first chunk often carries only the role; skip empty deltas.
        let mapped = stream.filter_map(|result| async move {
            match result {
                Ok(chunk) => chunk
                    .choices
                    .first()
                    .and_then(|choice| choice.delta.content.clone())
                    .filter(|delta| !delta.is_empty())
                    .map(Ok),
                Err(e) => Some(Err(ProviderError::Api(format!("stream error: {e}")))),
            }
        });

        Ok(Box::pin(mapped))
    }
}
