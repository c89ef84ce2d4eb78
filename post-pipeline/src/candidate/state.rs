//! Candidate lifecycle states, legal transitions and the transition log.
//!
//! ```text
//! Drafted → Validating → Approved
//!              │   ▲   → Rejected
//!              │   │
//!              ▼   │
//!     RevisionNeeded → Revised
//! ```
//!
//! Any non-terminal state may be forced to `Rejected`. `Approved` and
//! `Rejected` are terminal.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a candidate post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateState {
    /// Produced by the writer, not yet scored.
    Drafted,
    /// Critics are scoring the current content.
    Validating,
    /// Majority approved; ready for the publish queue.
    Approved,
    /// One vote short; eligible for a single revision.
    RevisionNeeded,
    /// Content replaced by the editor, awaiting re-validation.
    Revised,
    /// Discarded.
    Rejected,
}

impl CandidateState {
    /// Whether this is a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    /// Whether validation may start from this state.
    pub fn can_validate(self) -> bool {
        matches!(self, Self::Drafted | Self::Revised)
    }

    /// Valid transitions from this state.
    pub fn valid_transitions(self) -> &'static [CandidateState] {
        match self {
            Self::Drafted => &[Self::Validating, Self::Rejected],
            Self::Validating => &[Self::Approved, Self::RevisionNeeded, Self::Rejected],
            Self::RevisionNeeded => &[Self::Revised, Self::Rejected],
            Self::Revised => &[Self::Validating, Self::Rejected],
            Self::Approved | Self::Rejected => &[],
        }
    }

    pub fn can_transition_to(self, to: CandidateState) -> bool {
        self.valid_transitions().contains(&to)
    }
}

impl fmt::Display for CandidateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drafted => write!(f, "drafted"),
            Self::Validating => write!(f, "validating"),
            Self::Approved => write!(f, "approved"),
            Self::RevisionNeeded => write!(f, "revision_needed"),
            Self::Revised => write!(f, "revised"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// A recorded state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: CandidateState,
    pub to: CandidateState,
    pub at: DateTime<Utc>,
    pub reason: String,
}

/// Error for invalid state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: CandidateState,
    pub to: CandidateState,
    pub reason: String,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid transition {} → {}: {}",
            self.from, self.to, self.reason
        )
    }
}

impl std::error::Error for TransitionError {}
