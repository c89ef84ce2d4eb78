//! Critic contract.
//!
//! A critic scores one candidate and returns a [`Verdict`]. Persona details
//! (prompts, heuristics, extra gates) stay behind the trait; the consensus
//! engine only sees the verdict.

pub mod style;

use async_trait::async_trait;

use crate::candidate::Candidate;
use crate::errors::CallError;
use crate::verdict::Verdict;

pub use style::StyleCritic;

#[async_trait]
pub trait Critic: Send + Sync {
    /// Stable name, used as the verdict's critic identity.
    fn name(&self) -> &str;

    /// Score the candidate's current content. Must not mutate anything the
    /// candidate owns.
    async fn evaluate(&self, candidate: &Candidate) -> Result<Verdict, CallError>;
}
