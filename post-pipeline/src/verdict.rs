//! Critic verdicts: one scored, structured opinion on one candidate.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::CallError;

/// Minimum score a verdict must reach before it may approve.
pub const APPROVAL_THRESHOLD: f64 = 7.0;

/// Score assigned to synthetic verdicts that stand in for a failed critic.
pub const NEUTRAL_SCORE: f64 = 5.0;

/// Upper bound of the score range (lower bound is 0).
pub const MAX_SCORE: f64 = 10.0;

/// Named sub-criteria → values (numbers, labels, lists).
pub type Breakdown = BTreeMap<String, serde_json::Value>;

/// A single critic's verdict.
///
/// `approved` is derived at construction: it is true only when the score
/// reaches [`APPROVAL_THRESHOLD`] *and* the critic's own secondary gates
/// passed. Deserialized verdicts are re-normalised the same way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "VerdictRecord")]
pub struct Verdict {
    critic: String,
    score: f64,
    approved: bool,
    feedback: String,
    breakdown: Breakdown,
    created_at: DateTime<Utc>,
    /// Set only by [`Verdict::from_failure`]; critics cannot forge it.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    synthetic: bool,
}

impl Verdict {
    /// Build a verdict from a score and the critic's secondary gates.
    ///
    /// The score is clamped to `[0, 10]`; NaN is treated as 0.
    pub fn new(
        critic: impl Into<String>,
        score: f64,
        gates_passed: bool,
        feedback: impl Into<String>,
        breakdown: Breakdown,
    ) -> Self {
        let score = clamp_score(score);
        Self {
            critic: critic.into(),
            score,
            approved: gates_passed && score >= APPROVAL_THRESHOLD,
            feedback: feedback.into(),
            breakdown,
            created_at: Utc::now(),
            synthetic: false,
        }
    }

    /// Verdict decided purely by the score threshold.
    pub fn scored(critic: impl Into<String>, score: f64, feedback: impl Into<String>) -> Self {
        Self::new(critic, score, true, feedback, Breakdown::new())
    }

    /// Synthetic non-approving verdict standing in for a failed critic call.
    pub fn from_failure(critic: impl Into<String>, error: &CallError) -> Self {
        let mut breakdown = Breakdown::new();
        breakdown.insert(
            "failure".to_string(),
            serde_json::Value::String(error.kind().to_string()),
        );
        Self {
            synthetic: true,
            ..Self::new(critic, NEUTRAL_SCORE, false, error.to_string(), breakdown)
        }
    }

    /// Attach one breakdown entry (builder style).
    pub fn with_criterion(mut self, name: &str, value: impl Into<serde_json::Value>) -> Self {
        self.breakdown.insert(name.to_string(), value.into());
        self
    }

    pub fn critic(&self) -> &str {
        &self.critic
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn approved(&self) -> bool {
        self.approved
    }

    pub fn feedback(&self) -> &str {
        &self.feedback
    }

    pub fn breakdown(&self) -> &Breakdown {
        &self.breakdown
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Whether this verdict was synthesised from a collaborator failure.
    pub fn is_failure(&self) -> bool {
        self.synthetic
    }

    /// Numeric sub-criteria only, in name order.
    pub fn numeric_criteria(&self) -> Vec<(&str, f64)> {
        self.breakdown
            .iter()
            .filter_map(|(k, v)| v.as_f64().map(|n| (k.as_str(), n)))
            .collect()
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {:.1}/10 {}",
            self.critic,
            self.score,
            if self.approved { "approve" } else { "deny" }
        )
    }
}

/// Wire shape used when deserializing; `approved` is re-derived.
#[derive(Debug, Deserialize)]
struct VerdictRecord {
    critic: String,
    score: f64,
    #[serde(default)]
    approved: bool,
    #[serde(default)]
    feedback: String,
    #[serde(default)]
    breakdown: Breakdown,
    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,
    #[serde(default)]
    synthetic: bool,
}

impl From<VerdictRecord> for Verdict {
    fn from(record: VerdictRecord) -> Self {
        let score = clamp_score(record.score);
        Self {
            critic: record.critic,
            score,
            approved: record.approved && score >= APPROVAL_THRESHOLD,
            feedback: record.feedback,
            breakdown: record.breakdown,
            created_at: record.created_at,
            synthetic: record.synthetic,
        }
    }
}

fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, MAX_SCORE)
    }
}

/// Mean score over a verdict set (0.0 when empty).
pub fn average_score(verdicts: &[Verdict]) -> f64 {
    if verdicts.is_empty() {
        return 0.0;
    }
    verdicts.iter().map(Verdict::score).sum::<f64>() / verdicts.len() as f64
}

/// Number of approving verdicts.
pub fn approval_count(verdicts: &[Verdict]) -> usize {
    verdicts.iter().filter(|v| v.approved()).count()
}
