//! Draft writer: turns a brief into a candidate through the chat backend.

use std::sync::Arc;

use async_trait::async_trait;
use post_pipeline::{AvoidPatterns, Brief, CallError, Candidate, DraftProducer};
use serde_json::Value;
use tracing::info;

use crate::config::BrandConfig;
use crate::llm::{parse_json_object, ChatBackend, ChatRequest};
use crate::prompts;
use crate::usage::CostTracker;

/// Model-backed draft producer writing in the brand voice.
pub struct LlmWriter {
    backend: Arc<dyn ChatBackend>,
    costs: Arc<CostTracker>,
    model: String,
    preamble: String,
    temperature: f32,
}

impl LlmWriter {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        costs: Arc<CostTracker>,
        model: impl Into<String>,
        brand: &BrandConfig,
        temperature: f32,
    ) -> Self {
        Self {
            backend,
            costs,
            model: model.into(),
            preamble: prompts::writer_preamble(brand),
            temperature,
        }
    }
}

#[async_trait]
impl DraftProducer for LlmWriter {
    async fn generate(&self, brief: &Brief, avoid: &AvoidPatterns) -> Result<Candidate, CallError> {
        let request = ChatRequest::json(
            self.preamble.clone(),
            prompts::writer_prompt(brief, avoid),
            self.temperature,
        );
        let reply = self.backend.chat(request).await?;
        let model = if reply.model.is_empty() { &self.model } else { &reply.model };
        let usage = self
            .costs
            .record("writer", model, reply.prompt_tokens, reply.completion_tokens);

        let candidate = parse_draft(&reply.content)?.with_usage(usage);
        info!(
            slot = brief.slot,
            chars = candidate.content().len(),
            tags = candidate.tags().len(),
            "draft written"
        );
        Ok(candidate)
    }
}

/// Build a candidate from the writer's JSON answer.
///
/// `content` is required; `hook` and `hashtags` are optional.
pub(crate) fn parse_draft(text: &str) -> Result<Candidate, CallError> {
    let value = parse_json_object(text)?;
    let content = value
        .get("content")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| CallError::malformed("writer response has no content"))?;

    let mut candidate = Candidate::draft(content).with_tags(hashtags(&value));
    if let Some(hook) = value
        .get("hook")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|h| !h.is_empty())
    {
        candidate = candidate.with_hook(hook);
    }
    Ok(candidate)
}

/// `hashtags` as normalised `#tag` strings.
pub(crate) fn hashtags(value: &Value) -> Vec<String> {
    value
        .get("hashtags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|t| !t.trim_start_matches('#').is_empty())
                .map(|t| {
                    if t.starts_with('#') {
                        t.to_string()
                    } else {
                        format!("#{t}")
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}
