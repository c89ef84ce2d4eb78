//! Error taxonomy for the draft pipeline.
//!
//! Two layers:
//!
//! | Type            | Raised by                        | Reaches the caller? |
//! |-----------------|----------------------------------|---------------------|
//! | `CallError`     | any external collaborator call   | no, recovered at the candidate boundary |
//! | `PipelineError` | construction / lifecycle misuse  | yes                 |
//!
//! Collaborator failures are downgraded where they happen: a critic failure
//! becomes a synthetic verdict, a writer or editor failure rejects that one
//! candidate. Only structural problems surface as `PipelineError`.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::candidate::TransitionError;

/// Coarse classification of a collaborator failure, recorded in synthetic
/// verdict breakdowns and slot records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The call did not finish within its bound.
    Timeout,
    /// The collaborator reported an error (network, backend, refusal).
    Failed,
    /// The collaborator answered but the answer could not be used.
    Malformed,
    /// The collaborator panicked while being polled.
    Panicked,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Failed => write!(f, "failed"),
            Self::Malformed => write!(f, "malformed"),
            Self::Panicked => write!(f, "panicked"),
        }
    }
}

/// Failure of a single external call (writer, critic, aggregator, editor,
/// topic supplier, publish queue).
#[derive(Debug, Clone, Error)]
pub enum CallError {
    #[error("{call} timed out after {after:?}")]
    Timeout { call: String, after: Duration },

    #[error("{0}")]
    Failed(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("{call} panicked: {message}")]
    Panicked { call: String, message: String },
}

impl CallError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::Failed(_) => FailureKind::Failed,
            Self::Malformed(_) => FailureKind::Malformed,
            Self::Panicked { .. } => FailureKind::Panicked,
        }
    }
}

/// Structural errors: misconfiguration or misuse of the pipeline API.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no critics registered; consensus needs at least one")]
    NoCritics,

    #[error("missing collaborator: {0}")]
    MissingCollaborator(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
