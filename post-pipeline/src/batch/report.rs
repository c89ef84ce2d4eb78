//! Batch results: per-slot records, aggregate metrics, and the outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::candidate::{Candidate, CandidateId, CandidateState};

/// What happened in one slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotRecord {
    /// 1-based slot number.
    pub slot: usize,
    pub candidate_id: Option<CandidateId>,
    pub topic_id: Option<String>,
    pub topic_headline: Option<String>,
    pub final_state: CandidateState,
    pub revision_count: u32,
    pub approvals: usize,
    pub average_score: f64,
    pub has_media: bool,
    pub tokens: u64,
    pub cost: f64,
    pub processing_ms: u64,
    /// Why the slot ended without a candidate or was rejected by failure.
    pub error: Option<String>,
}

impl SlotRecord {
    /// Record for a slot that produced a candidate.
    pub fn from_candidate(slot: usize, candidate: &Candidate, processing_ms: u64) -> Self {
        let topic = candidate.topic();
        Self {
            slot,
            candidate_id: Some(candidate.id()),
            topic_id: topic.map(|t| t.id.clone()),
            topic_headline: topic.map(|t| t.headline.clone()),
            final_state: candidate.state(),
            revision_count: candidate.revision_count(),
            approvals: candidate.approval_count(),
            average_score: candidate.average_score(),
            has_media: !candidate.media().is_none(),
            tokens: candidate.usage().tokens,
            cost: candidate.usage().estimated_cost,
            processing_ms,
            error: None,
        }
    }

    /// Record for a slot that failed before a candidate existed.
    pub fn failed(
        slot: usize,
        topic: Option<(&str, &str)>,
        error: String,
        processing_ms: u64,
    ) -> Self {
        Self {
            slot,
            candidate_id: None,
            topic_id: topic.map(|(id, _)| id.to_string()),
            topic_headline: topic.map(|(_, headline)| headline.to_string()),
            final_state: CandidateState::Rejected,
            revision_count: 0,
            approvals: 0,
            average_score: 0.0,
            has_media: false,
            tokens: 0,
            cost: 0.0,
            processing_ms,
            error: Some(error),
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn is_approved(&self) -> bool {
        self.final_state == CandidateState::Approved
    }
}

/// Aggregate numbers for one batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchMetrics {
    pub total: usize,
    pub approved: usize,
    pub rejected: usize,
    /// Slots whose candidate went through at least one revision.
    pub revised: usize,
    pub with_media: usize,
    pub approval_rate: f64,
    /// Approved share of revised candidates.
    pub revision_success_rate: f64,
    /// Mean score of approved candidates.
    pub average_score: f64,
    pub average_processing_ms: f64,
    pub total_tokens: u64,
    pub total_cost: f64,
}

impl BatchMetrics {
    pub fn calculate(records: &[SlotRecord]) -> Self {
        if records.is_empty() {
            return Self::default();
        }
        let total = records.len();
        let approved: Vec<&SlotRecord> = records.iter().filter(|r| r.is_approved()).collect();
        let revised = records.iter().filter(|r| r.revision_count > 0).count();
        let revised_approved = approved.iter().filter(|r| r.revision_count > 0).count();

        Self {
            total,
            approved: approved.len(),
            rejected: records
                .iter()
                .filter(|r| r.final_state == CandidateState::Rejected)
                .count(),
            revised,
            with_media: records.iter().filter(|r| r.has_media).count(),
            approval_rate: approved.len() as f64 / total as f64,
            revision_success_rate: ratio(revised_approved, revised),
            average_score: if approved.is_empty() {
                0.0
            } else {
                approved.iter().map(|r| r.average_score).sum::<f64>() / approved.len() as f64
            },
            average_processing_ms: records.iter().map(|r| r.processing_ms as f64).sum::<f64>()
                / total as f64,
            total_tokens: records.iter().map(|r| r.tokens).sum(),
            total_cost: records.iter().map(|r| r.cost).sum(),
        }
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Everything a batch run returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub batch_id: Uuid,
    pub requested: usize,
    /// Approved candidates in slot order.
    pub accepted: Vec<Candidate>,
    pub records: Vec<SlotRecord>,
    pub metrics: BatchMetrics,
    /// Approved candidates the publish queue refused.
    pub publish_failures: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchOutcome {
    pub fn produced(&self) -> usize {
        self.accepted.len()
    }

    /// One-line requested vs. produced summary.
    pub fn summary(&self) -> String {
        let mut line = format!(
            "batch {}: produced {} of {} requested ({} revised, {:.0}% approval)",
            self.batch_id,
            self.produced(),
            self.requested,
            self.metrics.revised,
            self.metrics.approval_rate * 100.0
        );
        if self.publish_failures > 0 {
            line.push_str(&format!(", {} not queued", self.publish_failures));
        }
        line
    }
}
