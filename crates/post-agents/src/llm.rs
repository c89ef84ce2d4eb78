//! OpenAI-compatible chat client and response parsing helpers.
//!
//! Every agent talks to the model through [`ChatBackend`], so tests can
//! swap in a mock and the HTTP client stays in one place.

use std::time::Duration;

use async_trait::async_trait;
use post_pipeline::CallError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::LlmConfig;

/// Failure talking to the model endpoint.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unparseable response: {0}")]
    Parse(String),

    #[error("response had no content")]
    Empty,
}

impl From<LlmError> for CallError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Parse(_) | LlmError::Empty => CallError::malformed(e.to_string()),
            LlmError::Request(_) | LlmError::Status { .. } => CallError::failed(e.to_string()),
        }
    }
}

/// One system + user exchange.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the endpoint for a JSON object response.
    pub json: bool,
}

impl ChatRequest {
    pub fn json(system: impl Into<String>, user: impl Into<String>, temperature: f32) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature,
            max_tokens: 1024,
            json: true,
        }
    }
}

/// Model answer plus token accounting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatReply {
    pub content: String,
    pub model: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<ChatReply, LlmError>;
}

/// `POST {base_url}/chat/completions` client.
pub struct OpenAiChatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiChatClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| LlmError::Request(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            model: config.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn body(&self, request: &ChatRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user}
            ],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        if request.json {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }
        body
    }
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct TokenUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[async_trait]
impl ChatBackend for OpenAiChatClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatReply, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut call = self.client.post(&url).json(&self.body(&request));
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }

        let response = call
            .send()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status, body });
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;
        reply_from(parsed, &self.model)
    }
}

fn reply_from(parsed: CompletionResponse, fallback_model: &str) -> Result<ChatReply, LlmError> {
    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or(LlmError::Empty)?;
    let usage = parsed.usage.unwrap_or(TokenUsage {
        prompt_tokens: 0,
        completion_tokens: 0,
    });
    debug!(
        prompt_tokens = usage.prompt_tokens,
        completion_tokens = usage.completion_tokens,
        "chat completion"
    );
    Ok(ChatReply {
        content,
        model: parsed.model.unwrap_or_else(|| fallback_model.to_string()),
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
    })
}

/// Drop a surrounding Markdown code fence (```json ... ```), if any.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the language tag line.
    let body = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parse a model answer as a JSON object.
///
/// Tolerates code fences and prose around the object.
pub fn parse_json_object(text: &str) -> Result<serde_json::Value, LlmError> {
    let cleaned = strip_code_fences(text);
    let whole = serde_json::from_str::<serde_json::Value>(cleaned);
    if let Ok(value @ serde_json::Value::Object(_)) = whole {
        return Ok(value);
    }
    let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) else {
        return Err(LlmError::Parse("no JSON object in response".into()));
    };
    if end <= start {
        return Err(LlmError::Parse("no JSON object in response".into()));
    }
    match serde_json::from_str::<serde_json::Value>(&cleaned[start..=end]) {
        Ok(value @ serde_json::Value::Object(_)) => Ok(value),
        Ok(_) => Err(LlmError::Parse("response is not a JSON object".into())),
        Err(e) => Err(LlmError::Parse(e.to_string())),
    }
}
