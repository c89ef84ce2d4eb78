//! Candidate posts: content, lineage, lifecycle and the current verdict set.
//!
//! A [`Candidate`] is created by a draft producer and then moves through the
//! lifecycle in [`state`]. State and verdicts change only through the
//! consensus engine (and forced rejection); content and lineage change only
//! through [`Candidate::revise`], which consumes the old version.

pub mod state;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use state::{CandidateState, StateTransition, TransitionError};

use crate::revision::Guidance;
use crate::topic::Topic;
use crate::verdict::{self, Verdict};

/// Default cap on revisions per candidate.
pub const DEFAULT_MAX_REVISIONS: u32 = 2;

/// Stable candidate identity, preserved across revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(Uuid);

impl CandidateId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CandidateId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Optional visual attached to a post.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaRef {
    #[default]
    None,
    Image { url: String, prompt: String },
    Video { url: String, prompt: String },
}

impl MediaRef {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// Token and cost metadata accumulated from generation calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub tokens: u64,
    pub estimated_cost: f64,
}

impl Usage {
    pub fn new(tokens: u64, estimated_cost: f64) -> Self {
        Self {
            tokens,
            estimated_cost,
        }
    }
}

impl std::ops::AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.tokens += rhs.tokens;
        self.estimated_cost += rhs.estimated_cost;
    }
}

/// One entry of a candidate's revision history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionEntry {
    /// Revision number (1-indexed).
    pub revision: u32,
    /// Content as it was before this revision.
    pub prior_content: String,
    /// Verdicts that triggered the revision.
    pub verdicts_before: Vec<Verdict>,
    /// Guidance the editor worked from.
    pub guidance: Guidance,
    pub revised_at: DateTime<Utc>,
}

/// Returned by [`Candidate::revise`] when the revision is not allowed.
///
/// Carries the candidate back to the caller. When the revision cap was the
/// reason, the candidate has already been forced to `Rejected`.
#[derive(Debug)]
pub struct RevisionRefused {
    pub candidate: Candidate,
    pub error: TransitionError,
}

impl fmt::Display for RevisionRefused {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "revision of {} refused: {}", self.candidate.id, self.error)
    }
}

impl std::error::Error for RevisionRefused {}

/// One version of a generated post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    id: CandidateId,
    batch_id: Option<Uuid>,
    slot: Option<usize>,
    topic: Option<Topic>,

    content: String,
    media: MediaRef,
    tags: Vec<String>,
    hook: Option<String>,

    original_content: Option<String>,
    revisions: Vec<RevisionEntry>,
    revision_count: u32,
    max_revisions: u32,

    state: CandidateState,
    verdicts: Vec<Verdict>,
    transitions: Vec<StateTransition>,

    usage: Usage,
    created_at: DateTime<Utc>,
}

impl Candidate {
    /// A freshly drafted candidate with a new identity.
    pub fn draft(content: impl Into<String>) -> Self {
        Self {
            id: CandidateId::new(),
            batch_id: None,
            slot: None,
            topic: None,
            content: content.into(),
            media: MediaRef::None,
            tags: Vec::new(),
            hook: None,
            original_content: None,
            revisions: Vec::new(),
            revision_count: 0,
            max_revisions: DEFAULT_MAX_REVISIONS,
            state: CandidateState::Drafted,
            verdicts: Vec::new(),
            transitions: Vec::new(),
            usage: Usage::default(),
            created_at: Utc::now(),
        }
    }

    pub fn with_media(mut self, media: MediaRef) -> Self {
        self.media = media;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_hook(mut self, hook: impl Into<String>) -> Self {
        self.hook = Some(hook.into());
        self
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_max_revisions(mut self, max_revisions: u32) -> Self {
        self.max_revisions = max_revisions;
        self
    }

    // ── accessors ──────────────────────────────────────────────────────

    pub fn id(&self) -> CandidateId {
        self.id
    }

    pub fn batch_id(&self) -> Option<Uuid> {
        self.batch_id
    }

    pub fn slot(&self) -> Option<usize> {
        self.slot
    }

    pub fn topic(&self) -> Option<&Topic> {
        self.topic.as_ref()
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn media(&self) -> &MediaRef {
        &self.media
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Explicit hook if the writer supplied one, else the first non-empty line.
    pub fn hook(&self) -> Option<&str> {
        self.hook
            .as_deref()
            .or_else(|| self.content.lines().map(str::trim).find(|l| !l.is_empty()))
    }

    /// Last non-empty line of the content.
    pub fn ending(&self) -> Option<&str> {
        self.content
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
    }

    pub fn original_content(&self) -> Option<&str> {
        self.original_content.as_deref()
    }

    pub fn revisions(&self) -> &[RevisionEntry] {
        &self.revisions
    }

    pub fn revision_count(&self) -> u32 {
        self.revision_count
    }

    pub fn max_revisions(&self) -> u32 {
        self.max_revisions
    }

    pub fn can_revise(&self) -> bool {
        self.revision_count < self.max_revisions
    }

    pub fn state(&self) -> CandidateState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn verdicts(&self) -> &[Verdict] {
        &self.verdicts
    }

    /// Verdicts from the current set that did not approve.
    pub fn non_approving_verdicts(&self) -> Vec<Verdict> {
        self.verdicts
            .iter()
            .filter(|v| !v.approved())
            .cloned()
            .collect()
    }

    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    pub fn usage(&self) -> Usage {
        self.usage
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Mean score of the current verdict set.
    pub fn average_score(&self) -> f64 {
        verdict::average_score(&self.verdicts)
    }

    /// Approvals in the current verdict set.
    pub fn approval_count(&self) -> usize {
        verdict::approval_count(&self.verdicts)
    }

    // ── mutation ───────────────────────────────────────────────────────

    /// Attach batch bookkeeping. Does not touch content or state.
    pub fn assign_slot(&mut self, batch_id: Uuid, slot: usize, topic: Option<Topic>) {
        self.batch_id = Some(batch_id);
        self.slot = Some(slot);
        self.topic = topic;
    }

    pub fn add_usage(&mut self, usage: Usage) {
        self.usage += usage;
    }

    /// Force the candidate to `Rejected`.
    ///
    /// Returns `false` (and changes nothing) when the candidate is already
    /// terminal.
    pub fn reject(&mut self, reason: &str) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        // Every non-terminal state has an edge to Rejected.
        self.transition(CandidateState::Rejected, reason).is_ok()
    }

    /// Replace the content with `content`, consuming this version.
    ///
    /// Allowed only from `RevisionNeeded` while below the revision cap. The
    /// prior content and verdicts are snapshotted into the history, the
    /// counter is incremented and the verdict set is cleared.
    pub fn revise(
        mut self,
        content: impl Into<String>,
        guidance: Guidance,
    ) -> Result<Candidate, Box<RevisionRefused>> {
        if self.state != CandidateState::RevisionNeeded {
            let error = TransitionError {
                from: self.state,
                to: CandidateState::Revised,
                reason: "revision requires revision_needed".to_string(),
            };
            return Err(Box::new(RevisionRefused {
                candidate: self,
                error,
            }));
        }

        if !self.can_revise() {
            let error = TransitionError {
                from: self.state,
                to: CandidateState::Revised,
                reason: format!(
                    "revision cap reached ({}/{})",
                    self.revision_count, self.max_revisions
                ),
            };
            self.reject("revision cap reached");
            return Err(Box::new(RevisionRefused {
                candidate: self,
                error,
            }));
        }

        let content = content.into();
        let prior_content = std::mem::replace(&mut self.content, content);
        if self.original_content.is_none() {
            self.original_content = Some(prior_content.clone());
        }
        self.revision_count += 1;
        self.revisions.push(RevisionEntry {
            revision: self.revision_count,
            prior_content,
            verdicts_before: std::mem::take(&mut self.verdicts),
            guidance,
            revised_at: Utc::now(),
        });
        // An explicit hook belonged to the prior content.
        self.hook = None;

        let reason = format!("revision {}", self.revision_count);
        if let Err(error) = self.transition(CandidateState::Revised, &reason) {
            return Err(Box::new(RevisionRefused {
                candidate: self,
                error,
            }));
        }
        Ok(self)
    }

    /// Enter `Validating`, clearing the verdict set.
    pub(crate) fn begin_validation(&mut self) -> Result<(), TransitionError> {
        self.transition(CandidateState::Validating, "validation started")?;
        self.verdicts.clear();
        Ok(())
    }

    /// Store the verdicts of the pass that just finished and move to `to`.
    pub(crate) fn conclude_validation(
        &mut self,
        verdicts: Vec<Verdict>,
        to: CandidateState,
        reason: &str,
    ) -> Result<(), TransitionError> {
        if self.state != CandidateState::Validating {
            return Err(TransitionError {
                from: self.state,
                to,
                reason: "verdicts can only be recorded while validating".to_string(),
            });
        }
        self.transition(to, reason)?;
        self.verdicts = verdicts;
        Ok(())
    }

    fn transition(&mut self, to: CandidateState, reason: &str) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(to) {
            return Err(TransitionError {
                from: self.state,
                to,
                reason: format!(
                    "not a valid transition (allowed: {:?})",
                    self.state.valid_transitions()
                ),
            });
        }

        tracing::debug!(
            candidate_id = %self.id,
            from = %self.state,
            to = %to,
            reason,
            "candidate transition"
        );
        self.transitions.push(StateTransition {
            from: self.state,
            to,
            at: Utc::now(),
            reason: reason.to_string(),
        });
        self.state = to;
        Ok(())
    }
}
