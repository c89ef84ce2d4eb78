//! Consensus engine: concurrent critic fan-out and majority decision.
//!
//! # Decision rule
//!
//! With `N` configured critics, `required = N / 2 + 1`:
//!
//! ```text
//! approvals ≥ required                                  → Approved
//! required − approvals ≤ margin  ∧  revisions < cap     → ReviseOnce
//! otherwise                                             → Rejected
//! ```
//!
//! The default margin of 1 gives exactly one vote short a repair attempt.
//! Verdict order never matters; only the counts do.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::candidate::{Candidate, CandidateState};
use crate::critic::Critic;
use crate::errors::{PipelineError, PipelineResult};
use crate::resilience::bounded;
use crate::verdict::{approval_count, Verdict};

/// Outcome of one validation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    ReviseOnce,
    Rejected,
}

impl Decision {
    /// Lifecycle state a candidate lands in for this decision.
    pub fn target_state(self) -> CandidateState {
        match self {
            Self::Approved => CandidateState::Approved,
            Self::ReviseOnce => CandidateState::RevisionNeeded,
            Self::Rejected => CandidateState::Rejected,
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approved => write!(f, "approved"),
            Self::ReviseOnce => write!(f, "revise_once"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// Vote counts for one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub approvals: usize,
    pub required: usize,
    pub critics: usize,
}

impl Tally {
    pub fn new(approvals: usize, critics: usize) -> Self {
        Self {
            approvals,
            required: required_approvals(critics),
            critics,
        }
    }

    pub fn from_verdicts(verdicts: &[Verdict], critics: usize) -> Self {
        Self::new(approval_count(verdicts), critics)
    }

    /// Votes missing for a majority (0 when reached).
    pub fn shortfall(&self) -> usize {
        self.required.saturating_sub(self.approvals)
    }
}

/// Strict majority of the configured critic count.
pub fn required_approvals(critics: usize) -> usize {
    critics / 2 + 1
}

/// Tunable part of the decision rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusPolicy {
    /// Largest shortfall that still earns a revision attempt.
    pub near_miss_margin: usize,
}

impl Default for ConsensusPolicy {
    fn default() -> Self {
        Self {
            near_miss_margin: 1,
        }
    }
}

impl ConsensusPolicy {
    /// Apply the decision rule to a tally.
    pub fn decide(&self, tally: Tally, revision_count: u32, max_revisions: u32) -> Decision {
        let shortfall = tally.shortfall();
        if shortfall == 0 {
            Decision::Approved
        } else if shortfall <= self.near_miss_margin && revision_count < max_revisions {
            Decision::ReviseOnce
        } else {
            Decision::Rejected
        }
    }
}

/// Runs every registered critic against a candidate and decides.
pub struct ConsensusEngine {
    critics: Vec<Arc<dyn Critic>>,
    policy: ConsensusPolicy,
    critic_timeout: Duration,
}

impl std::fmt::Debug for ConsensusEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsensusEngine")
            .field("critics", &self.critic_names())
            .field("policy", &self.policy)
            .field("critic_timeout", &self.critic_timeout)
            .finish()
    }
}

impl ConsensusEngine {
    /// Fails with [`PipelineError::NoCritics`] when `critics` is empty.
    pub fn new(
        critics: Vec<Arc<dyn Critic>>,
        policy: ConsensusPolicy,
        critic_timeout: Duration,
    ) -> PipelineResult<Self> {
        if critics.is_empty() {
            return Err(PipelineError::NoCritics);
        }
        Ok(Self {
            critics,
            policy,
            critic_timeout,
        })
    }

    pub fn critic_count(&self) -> usize {
        self.critics.len()
    }

    pub fn critic_names(&self) -> Vec<&str> {
        self.critics.iter().map(|c| c.name()).collect()
    }

    pub fn policy(&self) -> ConsensusPolicy {
        self.policy
    }

    /// Score `candidate` with every critic concurrently.
    ///
    /// Returns exactly one verdict per critic, in registration order. A
    /// critic that errors, times out or panics contributes a synthetic
    /// non-approving verdict; siblings are never cancelled.
    pub async fn collect_verdicts(&self, candidate: &Candidate) -> Vec<Verdict> {
        let calls = self.critics.iter().map(|critic| async move {
            let call = format!("critic {}", critic.name());
            match bounded(&call, self.critic_timeout, critic.evaluate(candidate)).await {
                Ok(verdict) => verdict,
                Err(e) => {
                    warn!(
                        candidate_id = %candidate.id(),
                        critic = critic.name(),
                        kind = %e.kind(),
                        error = %e,
                        "critic failed; counting as non-approving"
                    );
                    Verdict::from_failure(critic.name(), &e)
                }
            }
        });
        join_all(calls).await
    }

    /// Run one validation pass and move the candidate to the decided state.
    ///
    /// A terminal candidate is returned as-is with its existing outcome and
    /// no critic is called. Any other state that cannot enter `Validating`
    /// is a [`PipelineError::Transition`].
    pub async fn validate(&self, candidate: &mut Candidate) -> PipelineResult<Decision> {
        match candidate.state() {
            CandidateState::Approved => return Ok(Decision::Approved),
            CandidateState::Rejected => return Ok(Decision::Rejected),
            _ => {}
        }

        candidate.begin_validation()?;
        let verdicts = self.collect_verdicts(candidate).await;
        for v in &verdicts {
            debug!(
                candidate_id = %candidate.id(),
                critic = v.critic(),
                score = v.score(),
                approved = v.approved(),
                "verdict"
            );
        }

        let tally = Tally::from_verdicts(&verdicts, self.critic_count());
        let decision = self.policy.decide(
            tally,
            candidate.revision_count(),
            candidate.max_revisions(),
        );
        let reason = format!(
            "{}/{} approvals (required {})",
            tally.approvals, tally.critics, tally.required
        );
        candidate.conclude_validation(verdicts, decision.target_state(), &reason)?;

        info!(
            candidate_id = %candidate.id(),
            approvals = tally.approvals,
            required = tally.required,
            revision = candidate.revision_count(),
            decision = %decision,
            "consensus"
        );
        Ok(decision)
    }
}
