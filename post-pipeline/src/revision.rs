//! Bounded repair: aggregate critic feedback, rewrite once, re-validate.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::candidate::{Candidate, CandidateState, RevisionRefused, TransitionError};
use crate::consensus::{ConsensusEngine, Decision};
use crate::errors::{CallError, PipelineError, PipelineResult};
use crate::resilience::bounded;
use crate::verdict::Verdict;

/// Structured instructions for the editor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Guidance {
    /// Problems that must be fixed.
    #[serde(default)]
    pub critical_issues: Vec<String>,
    /// Elements that worked and should survive the rewrite.
    #[serde(default)]
    pub preserve_elements: Vec<String>,
    /// The one thing to concentrate on.
    #[serde(default)]
    pub priority_focus: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Turns non-approving verdicts into revision guidance.
#[async_trait]
pub trait FeedbackAggregator: Send + Sync {
    async fn aggregate(
        &self,
        candidate: &Candidate,
        verdicts: &[Verdict],
    ) -> Result<Guidance, CallError>;
}

/// Produces replacement content for a candidate.
#[async_trait]
pub trait RevisionProducer: Send + Sync {
    async fn revise(&self, candidate: &Candidate, guidance: &Guidance)
        -> Result<String, CallError>;
}

/// Aggregator that needs no model call.
///
/// Critical issues are the non-approving critics' feedback, preserved
/// elements come from approving critics, and the priority focus is the
/// weakest numeric criterion seen (or the harshest critic if none).
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleBasedAggregator;

#[async_trait]
impl FeedbackAggregator for RuleBasedAggregator {
    async fn aggregate(
        &self,
        candidate: &Candidate,
        verdicts: &[Verdict],
    ) -> Result<Guidance, CallError> {
        let critical_issues = verdicts
            .iter()
            .filter(|v| !v.feedback().is_empty())
            .map(|v| format!("{}: {}", v.critic(), v.feedback()))
            .collect();

        let preserve_elements = candidate
            .verdicts()
            .iter()
            .filter(|v| v.approved() && !v.feedback().is_empty())
            .map(|v| format!("{}: {}", v.critic(), v.feedback()))
            .collect();

        let weakest = verdicts
            .iter()
            .flat_map(|v| v.numeric_criteria())
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(name, _)| name.to_string());
        let priority_focus = weakest
            .or_else(|| {
                verdicts
                    .iter()
                    .min_by(|a, b| a.score().total_cmp(&b.score()))
                    .map(|v| format!("win over {}", v.critic()))
            })
            .unwrap_or_default();

        Ok(Guidance {
            critical_issues,
            preserve_elements,
            priority_focus,
            notes: None,
        })
    }
}

/// Performs the single revise-and-revalidate step for a near miss.
pub struct RevisionCoordinator {
    aggregator: Arc<dyn FeedbackAggregator>,
    producer: Arc<dyn RevisionProducer>,
    feedback_timeout: Duration,
    revision_timeout: Duration,
}

impl RevisionCoordinator {
    pub fn new(
        aggregator: Arc<dyn FeedbackAggregator>,
        producer: Arc<dyn RevisionProducer>,
        feedback_timeout: Duration,
        revision_timeout: Duration,
    ) -> Self {
        Self {
            aggregator,
            producer,
            feedback_timeout,
            revision_timeout,
        }
    }

    /// Revise a `RevisionNeeded` candidate once and validate it again.
    ///
    /// Never loops: a second `ReviseOnce` becomes `Rejected`. Aggregation,
    /// rewrite or cap failures reject the candidate with its pre-revision
    /// verdicts intact. Terminal candidates come back unchanged.
    pub async fn revise_and_revalidate(
        &self,
        candidate: Candidate,
        engine: &ConsensusEngine,
    ) -> PipelineResult<(Candidate, Decision)> {
        match candidate.state() {
            CandidateState::RevisionNeeded => {}
            CandidateState::Approved => return Ok((candidate, Decision::Approved)),
            CandidateState::Rejected => return Ok((candidate, Decision::Rejected)),
            other => {
                return Err(PipelineError::Transition(TransitionError {
                    from: other,
                    to: CandidateState::Revised,
                    reason: "revision requires revision_needed".to_string(),
                }))
            }
        }

        let failing = candidate.non_approving_verdicts();
        let aggregated = bounded(
            "feedback aggregator",
            self.feedback_timeout,
            self.aggregator.aggregate(&candidate, &failing),
        )
        .await;
        let guidance = match aggregated {
            Ok(g) => g,
            Err(e) => return Ok(fail_closed(candidate, "feedback aggregation", &e)),
        };

        let rewritten = bounded(
            "revision producer",
            self.revision_timeout,
            self.producer.revise(&candidate, &guidance),
        )
        .await;
        let content = match rewritten {
            Ok(text) if text.trim().is_empty() => {
                let e = CallError::malformed("empty revision");
                return Ok(fail_closed(candidate, "revision", &e));
            }
            Ok(text) => text,
            Err(e) => return Ok(fail_closed(candidate, "revision", &e)),
        };

        let mut revised = match candidate.revise(content, guidance) {
            Ok(c) => c,
            Err(refused) => {
                let RevisionRefused {
                    candidate: mut c,
                    error,
                } = *refused;
                warn!(candidate_id = %c.id(), error = %error, "revision refused");
                c.reject("revision refused");
                return Ok((c, Decision::Rejected));
            }
        };

        let decision = engine.validate(&mut revised).await?;
        if decision == Decision::ReviseOnce {
            info!(
                candidate_id = %revised.id(),
                "near miss again after revision; rejecting"
            );
            revised.reject("second near miss in one run");
            return Ok((revised, Decision::Rejected));
        }
        Ok((revised, decision))
    }
}

fn fail_closed(mut candidate: Candidate, step: &str, error: &CallError) -> (Candidate, Decision) {
    warn!(
        candidate_id = %candidate.id(),
        step,
        kind = %error.kind(),
        error = %error,
        "revision step failed; rejecting"
    );
    candidate.reject(&format!("{step} failed: {error}"));
    (candidate, Decision::Rejected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::ConsensusPolicy;
    use crate::critic::Critic;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Approves only content containing "v2".
    struct WantsV2(&'static str);

    #[async_trait]
    impl Critic for WantsV2 {
        fn name(&self) -> &str {
            self.0
        }
        async fn evaluate(&self, c: &Candidate) -> Result<Verdict, CallError> {
            let score = if c.content().contains("v2") { 8.0 } else { 5.0 };
            Ok(Verdict::scored(self.0, score, "needs a sharper ending"))
        }
    }

    struct Always(&'static str, f64);

    #[async_trait]
    impl Critic for Always {
        fn name(&self) -> &str {
            self.0
        }
        async fn evaluate(&self, _c: &Candidate) -> Result<Verdict, CallError> {
            Ok(Verdict::scored(self.0, self.1, "keep the opener").with_criterion("hook", self.1))
        }
    }

    struct Editor {
        text: &'static str,
        calls: AtomicUsize,
    }

    impl Editor {
        fn writing(text: &'static str) -> Arc<Self> {
            Arc::new(Self {
                text,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl RevisionProducer for Editor {
        async fn revise(&self, _c: &Candidate, _g: &Guidance) -> Result<String, CallError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.text.to_string())
        }
    }

    struct BrokenEditor;

    #[async_trait]
    impl RevisionProducer for BrokenEditor {
        async fn revise(&self, _c: &Candidate, _g: &Guidance) -> Result<String, CallError> {
            Err(CallError::failed("editor offline"))
        }
    }

    /// Answers long after any sane revision timeout.
    struct SlowEditor;

    #[async_trait]
    impl RevisionProducer for SlowEditor {
        async fn revise(&self, _c: &Candidate, _g: &Guidance) -> Result<String, CallError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("v2".to_string())
        }
    }

    struct FailingAggregator;

    #[async_trait]
    impl FeedbackAggregator for FailingAggregator {
        async fn aggregate(&self, _c: &Candidate, _v: &[Verdict]) -> Result<Guidance, CallError> {
            Err(CallError::failed("aggregator offline"))
        }
    }

    fn engine(critics: Vec<Arc<dyn Critic>>) -> ConsensusEngine {
        ConsensusEngine::new(critics, ConsensusPolicy::default(), Duration::from_secs(1)).unwrap()
    }

    /// a approves, b wants "v2", c denies: "v1" is one vote short.
    fn near_miss_engine() -> ConsensusEngine {
        engine(vec![
            Arc::new(Always("a", 9.0)),
            Arc::new(WantsV2("b")),
            Arc::new(Always("c", 4.0)),
        ])
    }

    fn coordinator(
        aggregator: Arc<dyn FeedbackAggregator>,
        editor: Arc<dyn RevisionProducer>,
    ) -> RevisionCoordinator {
        RevisionCoordinator::new(
            aggregator,
            editor,
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
    }

    async fn near_miss(engine: &ConsensusEngine) -> Candidate {
        let mut c = Candidate::draft("v1");
        assert_eq!(engine.validate(&mut c).await.unwrap(), Decision::ReviseOnce);
        c
    }

    fn assert_rejected_untouched(c: &Candidate, decision: Decision) {
        assert_eq!(decision, Decision::Rejected);
        assert_eq!(c.state(), CandidateState::Rejected);
        assert_eq!(c.content(), "v1");
        assert_eq!(c.revision_count(), 0);
        assert_eq!(c.verdicts().len(), 3, "pre-revision verdicts are kept");
        assert!(c.revisions().is_empty());
    }

    #[tokio::test]
    async fn test_revision_flips_to_approved() {
        let e = near_miss_engine();
        let editor = Editor::writing("v2");
        let coord = coordinator(Arc::new(RuleBasedAggregator), editor.clone());

        let c = near_miss(&e).await;
        let id = c.id();
        let (c, decision) = coord.revise_and_revalidate(c, &e).await.unwrap();
        assert_eq!(decision, Decision::Approved);
        assert_eq!(c.id(), id);
        assert_eq!(c.revision_count(), 1);
        assert_eq!(c.verdicts().len(), 3);
        assert_eq!(c.revisions()[0].verdicts_before.len(), 3);
        assert_eq!(editor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_second_near_miss_is_rejected() {
        let e = near_miss_engine();
        let editor = Editor::writing("v1 again");
        let coord = coordinator(Arc::new(RuleBasedAggregator), editor.clone());

        let c = near_miss(&e).await;
        let (c, decision) = coord.revise_and_revalidate(c, &e).await.unwrap();
        assert_eq!(decision, Decision::Rejected);
        assert_eq!(c.state(), CandidateState::Rejected);
        assert_eq!(c.revision_count(), 1);
        assert_eq!(editor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_aggregation_failure_is_fail_closed() {
        let e = near_miss_engine();
        let editor = Editor::writing("v2");
        let coord = coordinator(Arc::new(FailingAggregator), editor.clone());

        let c = near_miss(&e).await;
        let (c, decision) = coord.revise_and_revalidate(c, &e).await.unwrap();
        assert_rejected_untouched(&c, decision);
        assert_eq!(editor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_editor_error_is_fail_closed() {
        let e = near_miss_engine();
        let coord = coordinator(Arc::new(RuleBasedAggregator), Arc::new(BrokenEditor));

        let c = near_miss(&e).await;
        let (c, decision) = coord.revise_and_revalidate(c, &e).await.unwrap();
        assert_rejected_untouched(&c, decision);
        let last = c.transitions().last().unwrap();
        assert!(last.reason.contains("editor offline"), "{}", last.reason);
    }

    #[tokio::test(start_paused = true)]
    async fn test_editor_timeout_is_fail_closed() {
        let e = near_miss_engine();
        let coord = coordinator(Arc::new(RuleBasedAggregator), Arc::new(SlowEditor));

        let c = near_miss(&e).await;
        let (c, decision) = coord.revise_and_revalidate(c, &e).await.unwrap();
        assert_rejected_untouched(&c, decision);
        let last = c.transitions().last().unwrap();
        assert!(last.reason.contains("timed out"), "{}", last.reason);
    }

    #[tokio::test]
    async fn test_empty_revision_is_fail_closed() {
        let e = near_miss_engine();
        let coord = coordinator(Arc::new(RuleBasedAggregator), Editor::writing("   "));

        let c = near_miss(&e).await;
        let (c, decision) = coord.revise_and_revalidate(c, &e).await.unwrap();
        assert_rejected_untouched(&c, decision);
    }

    #[tokio::test]
    async fn test_rule_based_guidance() {
        let e = near_miss_engine();
        let c = near_miss(&e).await;
        let g = RuleBasedAggregator
            .aggregate(&c, &c.non_approving_verdicts())
            .await
            .unwrap();
        assert_eq!(
            g.critical_issues,
            vec!["b: needs a sharper ending", "c: keep the opener"]
        );
        assert_eq!(g.preserve_elements, vec!["a: keep the opener"]);
        assert_eq!(g.priority_focus, "hook");
    }

    #[tokio::test]
    async fn test_drafted_candidate_is_structural_error() {
        let e = engine(vec![Arc::new(Always("a", 9.0))]);
        let coord = coordinator(Arc::new(RuleBasedAggregator), Editor::writing("v2"));
        let err = coord
            .revise_and_revalidate(Candidate::draft("v1"), &e)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Transition(_)));
    }
}
