//! Post Pipeline Library
//!
//! Turns raw drafts into publish/reject decisions:
//! - Concurrent critic fan-out with per-call timeouts and panic isolation
//! - Strict-majority consensus with a tunable near-miss margin
//! - At most one feedback-guided revision per pipeline run
//! - Sequential batch controller with a per-batch topic ledger
//!
//! # Flow
//!
//! ```text
//! BatchController ─→ DraftProducer ─→ ConsensusEngine ──→ PublishQueue
//!       │                                 │    ▲
//!   TopicSupplier                 ReviseOnce   │ re-validate
//!   + ledger                          ▼        │
//!                     FeedbackAggregator → RevisionProducer
//! ```
//!
//! Collaborators (writer, critics, editor, topic source, queue) are traits;
//! concrete model-backed adapters live outside this crate.

#![allow(clippy::uninlined_format_args)]

pub mod batch;
pub mod candidate;
pub mod config;
pub mod consensus;
pub mod critic;
pub mod errors;
pub mod producer;
pub mod publish;
pub mod resilience;
pub mod revision;
pub mod topic;
pub mod verdict;

pub use batch::{BatchController, BatchControllerBuilder, BatchMetrics, BatchOutcome, SlotRecord};
pub use candidate::{
    Candidate, CandidateId, CandidateState, MediaRef, RevisionEntry, RevisionRefused,
    StateTransition, TransitionError, Usage,
};
pub use config::PipelineConfig;
pub use consensus::{ConsensusEngine, ConsensusPolicy, Decision, Tally};
pub use critic::{Critic, StyleCritic};
pub use errors::{CallError, FailureKind, PipelineError, PipelineResult};
pub use producer::{AvoidPatterns, Brief, DraftProducer};
pub use publish::{InMemoryPublishQueue, PublishQueue};
pub use revision::{
    FeedbackAggregator, Guidance, RevisionCoordinator, RevisionProducer, RuleBasedAggregator,
};
pub use topic::{CuratedTopicSupplier, Topic, TopicSupplier};
pub use verdict::{Breakdown, Verdict, APPROVAL_THRESHOLD, NEUTRAL_SCORE};
