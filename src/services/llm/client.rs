//! LLM Client — HTTP client for OpenAI-compatible chat completion APIs.
//! Generalized from a single-provider, DB-backed client into a plain
//! `LlmClient` trait over (system prompt, user prompt, model, budget),
//! matching §6's "no provider SDK details assumed" interface.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::models::LLMError;
use crate::services::optimizer::ModelInfo;

/// A completed call: the parsed JSON body plus token usage for the
/// optimizer's EMA accounting (§4.8) and the repository's spend ledger (§5).
#[derive(Debug, Clone)]
pub struct LlmCallOutcome {
    pub body: serde_json::Value,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Capability interface for "any provider supporting text-in/structured-
/// text-out" (§6), selected by configuration rather than runtime type
/// introspection (§9 REDESIGN FLAGS).
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn call(&self, system_prompt: &str, user_prompt: &str, model: ModelInfo, max_output_tokens: u32, timeout: Duration) -> Result<LlmCallOutcome, LLMError>;
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize, Default)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

/// OpenAI-compatible chat completion client. Works against OpenAI, Azure
/// OpenAI, DeepSeek, and any other API that speaks the same wire format.
pub struct HttpLlmClient {
    http_client: Client,
    api_base: String,
    api_key: String,
}

impl HttpLlmClient {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self { http_client: Client::builder().build().expect("failed to build reqwest client"), api_base: api_base.into(), api_key: api_key.into() }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn call(&self, system_prompt: &str, user_prompt: &str, model: ModelInfo, max_output_tokens: u32, timeout: Duration) -> Result<LlmCallOutcome, LLMError> {
        let request = ChatCompletionRequest {
            model: model.model_id,
            messages: vec![ChatMessage { role: "system", content: system_prompt }, ChatMessage { role: "user", content: user_prompt }],
            max_tokens: max_output_tokens,
            temperature: 0.2,
            response_format: ResponseFormat { kind: "json_object" },
        };

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| if e.is_timeout() { LLMError::Timeout(timeout.as_secs()) } else { LLMError::ApiError(e.to_string()) })?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response.headers().get("retry-after").and_then(|v| v.to_str().ok()).and_then(|s| s.parse::<u64>().ok()).unwrap_or(60);
            return Err(LLMError::RateLimited(retry_after));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LLMError::ApiError(format!("HTTP {status}: {body}")));
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|e| LLMError::ParseError(e.to_string()))?;
        let content = parsed.choices.into_iter().next().map(|c| c.message.content).ok_or_else(|| LLMError::ParseError("empty choices array".into()))?;
        let body: serde_json::Value = serde_json::from_str(&content).map_err(|e| LLMError::ParseError(format!("response was not valid JSON: {e}")))?;
        let usage = parsed.usage.unwrap_or_default();

        Ok(LlmCallOutcome { body, input_tokens: usage.prompt_tokens, output_tokens: usage.completion_tokens })
    }
}
