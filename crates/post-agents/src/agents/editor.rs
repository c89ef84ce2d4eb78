//! Feedback aggregator and editor for the single revision pass.

use std::sync::Arc;

use async_trait::async_trait;
use post_pipeline::{CallError, Candidate, FeedbackAggregator, Guidance, RevisionProducer, Verdict};
use serde_json::Value;
use tracing::debug;

use crate::config::BrandConfig;
use crate::llm::{parse_json_object, ChatBackend, ChatRequest};
use crate::prompts;
use crate::usage::CostTracker;

/// Model-backed feedback aggregator.
pub struct LlmFeedbackAggregator {
    backend: Arc<dyn ChatBackend>,
    costs: Arc<CostTracker>,
    model: String,
    temperature: f32,
}

impl LlmFeedbackAggregator {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        costs: Arc<CostTracker>,
        model: impl Into<String>,
        temperature: f32,
    ) -> Self {
        Self {
            backend,
            costs,
            model: model.into(),
            temperature,
        }
    }
}

#[async_trait]
impl FeedbackAggregator for LlmFeedbackAggregator {
    async fn aggregate(
        &self,
        candidate: &Candidate,
        verdicts: &[Verdict],
    ) -> Result<Guidance, CallError> {
        let request = ChatRequest::json(
            prompts::AGGREGATOR_PREAMBLE,
            prompts::aggregator_prompt(candidate, verdicts),
            self.temperature,
        );
        let reply = self.backend.chat(request).await?;
        let model = if reply.model.is_empty() { &self.model } else { &reply.model };
        self.costs
            .record("aggregator", model, reply.prompt_tokens, reply.completion_tokens);
        let guidance = parse_guidance(&reply.content)?;
        debug!(
            candidate_id = %candidate.id(),
            issues = guidance.critical_issues.len(),
            focus = %guidance.priority_focus,
            "feedback aggregated"
        );
        Ok(guidance)
    }
}

pub(crate) fn parse_guidance(text: &str) -> Result<Guidance, CallError> {
    let value = parse_json_object(text)?;
    let guidance = Guidance {
        critical_issues: strings(&value, "critical_issues"),
        preserve_elements: strings(&value, "preserve"),
        priority_focus: value
            .get("priority_focus")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string(),
        notes: value
            .get("revision_guidance")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from),
    };
    if guidance.critical_issues.is_empty()
        && guidance.priority_focus.is_empty()
        && guidance.notes.is_none()
    {
        return Err(CallError::malformed("aggregator returned no guidance"));
    }
    Ok(guidance)
}

fn strings(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Model-backed editor producing the revised post text.
pub struct LlmEditor {
    backend: Arc<dyn ChatBackend>,
    costs: Arc<CostTracker>,
    model: String,
    preamble: String,
    temperature: f32,
}

impl LlmEditor {
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
            preamble: prompts::editor_preamble(brand),
            temperature,
        }
    }
}

#[async_trait]
impl RevisionProducer for LlmEditor {
    async fn revise(
        &self,
        candidate: &Candidate,
        guidance: &Guidance,
    ) -> Result<String, CallError> {
        let request = ChatRequest::json(
            self.preamble.clone(),
            prompts::editor_prompt(candidate, guidance),
            self.temperature,
        );
        let reply = self.backend.chat(request).await?;
        let model = if reply.model.is_empty() { &self.model } else { &reply.model };
        self.costs
            .record("editor", model, reply.prompt_tokens, reply.completion_tokens);

        let value = parse_json_object(&reply.content)?;
        value
            .get("revised_content")
            .or_else(|| value.get("content"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .ok_or_else(|| CallError::malformed("editor response has no revised_content"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatReply, MockChatBackend};
    use post_pipeline::FailureKind;

    fn backend_answering(content: &'static str) -> Arc<dyn ChatBackend> {
        let mut backend = MockChatBackend::new();
        backend.expect_chat().returning(move |_| {
            Ok(ChatReply {
                content: content.to_string(),
                model: "gpt-4o-mini".to_string(),
                prompt_tokens: 50,
                completion_tokens: 20,
            })
        });
        Arc::new(backend)
    }

    #[test]
    fn test_parse_guidance_maps_fields() {
        let g = parse_guidance(
            r#"{"critical_issues": ["hook is vague", ""], "preserve": ["ending"],
                "revision_guidance": "Lead with the calendar.", "priority_focus": "hook_strength",
                "expected_improvement": "strategist"}"#,
        )
        .unwrap();
        assert_eq!(g.critical_issues, ["hook is vague"]);
        assert_eq!(g.preserve_elements, ["ending"]);
        assert_eq!(g.priority_focus, "hook_strength");
        assert_eq!(g.notes.as_deref(), Some("Lead with the calendar."));
    }

    #[test]
    fn test_empty_guidance_is_malformed() {
        let err = parse_guidance(r#"{"preserve": ["everything"]}"#).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Malformed);
    }

    #[tokio::test]
    async fn test_editor_returns_revised_content() {
        let editor = LlmEditor::new(
            backend_answering(r#"{"revised_content": "Tighter.\nBalm.", "changes_made": []}"#),
            Arc::new(CostTracker::new()),
            "gpt-4o-mini",
            &BrandConfig::default(),
            0.7,
        );
        let text = editor
            .revise(&Candidate::draft("Loose draft."), &Guidance::default())
            .await
            .unwrap();
        assert_eq!(text, "Tighter.\nBalm.");
    }

    #[tokio::test]
    async fn test_editor_without_text_is_malformed() {
        let costs = Arc::new(CostTracker::new());
        let editor = LlmEditor::new(
            backend_answering(r#"{"revised_content": "   "}"#),
            costs.clone(),
            "gpt-4o-mini",
            &BrandConfig::default(),
            0.7,
        );
        let err = editor
            .revise(&Candidate::draft("Loose draft."), &Guidance::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Malformed);
        assert_eq!(costs.summary().by_agent["editor"].calls, 1);
    }

    #[tokio::test]
    async fn test_aggregator_round_trip() {
        let aggregator = LlmFeedbackAggregator::new(
            backend_answering(r#"{"critical_issues": ["too long"], "priority_focus": "brevity"}"#),
            Arc::new(CostTracker::new()),
            "gpt-4o-mini",
            0.3,
        );
        let candidate = Candidate::draft("Draft");
        let verdicts = [Verdict::scored("strategist", 5.0, "too long")];
        let g = aggregator.aggregate(&candidate, &verdicts).await.unwrap();
        assert_eq!(g.priority_focus, "brevity");
    }
}
