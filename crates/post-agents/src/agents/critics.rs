//! Persona critics scoring drafts through the chat backend.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use post_pipeline::{Breakdown, CallError, Candidate, Critic, Verdict};
use serde_json::Value;
use tracing::debug;

use crate::llm::{parse_json_object, ChatBackend, ChatRequest};
use crate::prompts;
use crate::usage::CostTracker;

/// The audience perspectives a persona critic can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persona {
    Customer,
    CreativeDirector,
    Strategist,
}

impl Persona {
    pub const ALL: [Persona; 3] = [Self::Customer, Self::CreativeDirector, Self::Strategist];

    pub fn name(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::CreativeDirector => "creative_director",
            Self::Strategist => "strategist",
        }
    }

    pub fn preamble(self) -> &'static str {
        match self {
            Self::Customer => prompts::CUSTOMER_PREAMBLE,
            Self::CreativeDirector => prompts::CREATIVE_DIRECTOR_PREAMBLE,
            Self::Strategist => prompts::STRATEGIST_PREAMBLE,
        }
    }

    pub fn criteria(self) -> &'static [&'static str] {
        match self {
            Self::Customer => &[
                "authenticity",
                "relatability",
                "humor_quality",
                "brand_fit",
                "would_engage",
            ],
            Self::CreativeDirector => &[
                "creative_excellence",
                "brand_voice_consistency",
                "strategic_alignment",
                "cultural_relevance",
                "portfolio_worthy",
            ],
            Self::Strategist => &[
                "hook_strength",
                "engagement_potential",
                "algorithm_optimization",
                "shareability",
                "viral_potential",
            ],
        }
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Model-backed critic judging from one persona's point of view.
pub struct PersonaCritic {
    persona: Persona,
    backend: Arc<dyn ChatBackend>,
    costs: Arc<CostTracker>,
    model: String,
    temperature: f32,
}

impl PersonaCritic {
    pub fn new(
        persona: Persona,
        backend: Arc<dyn ChatBackend>,
        costs: Arc<CostTracker>,
        model: impl Into<String>,
        temperature: f32,
    ) -> Self {
        Self {
            persona,
            backend,
            costs,
            model: model.into(),
            temperature,
        }
    }

    pub fn persona(&self) -> Persona {
        self.persona
    }
}

#[async_trait]
impl Critic for PersonaCritic {
    fn name(&self) -> &str {
        self.persona.name()
    }

    async fn evaluate(&self, candidate: &Candidate) -> Result<Verdict, CallError> {
        let request = ChatRequest::json(
            self.persona.preamble(),
            prompts::critic_prompt(candidate),
            self.temperature,
        );
        let reply = self.backend.chat(request).await?;
        let model = if reply.model.is_empty() { &self.model } else { &reply.model };
        self.costs.record(
            &format!("critic:{}", self.persona),
            model,
            reply.prompt_tokens,
            reply.completion_tokens,
        );

        let verdict = parse_verdict(self.persona, &reply.content)?;
        debug!(
            candidate_id = %candidate.id(),
            critic = %self.persona,
            score = verdict.score(),
            approved = verdict.approved(),
            "persona verdict"
        );
        Ok(verdict)
    }
}

/// Turn a persona's JSON answer into a verdict.
///
/// The score is the mean of the numeric criteria; a top-level `score` is used
/// only when no criterion is numeric. The strategist additionally refuses
/// approval when it predicts `low` engagement.
pub(crate) fn parse_verdict(persona: Persona, text: &str) -> Result<Verdict, CallError> {
    let value = parse_json_object(text)?;

    let mut breakdown = Breakdown::new();
    if let Some(criteria) = value.get("criteria_breakdown").and_then(Value::as_object) {
        for (name, v) in criteria {
            breakdown.insert(name.clone(), v.clone());
        }
    }
    let numeric: Vec<f64> = breakdown.values().filter_map(Value::as_f64).collect();
    let score = if numeric.is_empty() {
        value
            .get("score")
            .and_then(Value::as_f64)
            .ok_or_else(|| CallError::malformed(format!("{persona} response has no score")))?
    } else {
        numeric.iter().sum::<f64>() / numeric.len() as f64
    };

    let mut gates_passed = true;
    if persona == Persona::Strategist {
        if let Some(engagement) = value.get("predicted_engagement").and_then(Value::as_str) {
            let engagement = engagement.trim().to_lowercase();
            gates_passed = engagement != "low";
            breakdown.insert("predicted_engagement".into(), Value::String(engagement));
        }
    }

    let feedback = value
        .get("feedback")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Ok(Verdict::new(
        persona.name(),
        score,
        gates_passed,
        feedback,
        breakdown,
    ))
}
