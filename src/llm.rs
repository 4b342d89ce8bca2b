//! Language-model capability interface
//!
//! ## Table of Contents
//! - **LlmClient**: Capability trait (structured prompt in, JSON out)
//! - **HttpLlmClient**: reqwest-backed client for chat-completion APIs
//!
//! The model is advisory, never authoritative: callers must treat a
//! malformed or missing response as a recoverable error and fall back to
//! their deterministic path.

use crate::error::{Result, SentinelError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Capability trait for structured LLM completion
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete the prompt pair and return the parsed JSON payload.
    ///
    /// Implementations must map non-JSON output to
    /// `SentinelError::LlmMalformed`, not panic.
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<Value>;

    /// Client name for logging
    fn name(&self) -> &str;
}

/// Boxed LLM client handle
pub type BoxedLlmClient = std::sync::Arc<dyn LlmClient>;

/// HTTP client for an OpenAI-compatible chat-completion endpoint
#[derive(Clone)]
pub struct HttpLlmClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl HttpLlmClient {
    /// Create a new client for the given endpoint
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| SentinelError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
        })
    }

    /// Set the API key
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the model name
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn add_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<Value> {
        let payload = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt },
            ],
            "response_format": { "type": "json_object" },
        });

        let url = format!("{}/v1/chat/completions", self.base_url);
        let resp = self
            .add_auth(self.client.post(&url))
            .json(&payload)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| SentinelError::external(e.to_string()))?;

        let body: ChatResponse = resp
            .json()
            .await
            .map_err(|e| SentinelError::external(e.to_string()))?;

        let content = body
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| SentinelError::llm_malformed("response contained no choices"))?;

        parse_json_payload(content)
    }

    fn name(&self) -> &str {
        "http-llm"
    }
}

/// Parse model output into JSON, tolerating markdown code fences.
pub fn parse_json_payload(content: &str) -> Result<Value> {
    let trimmed = content.trim();
    let stripped = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|s| s.trim_end_matches("```").trim())
        .unwrap_or(trimmed);

    serde_json::from_str(stripped)
        .map_err(|e| SentinelError::llm_malformed(format!("unparseable model output: {}", e)))
}
