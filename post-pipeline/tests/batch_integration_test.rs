//! Scripted batch integration test. Drives the full controller with
//! deterministic collaborators (no model calls).
//!
//! Covers: draft → consensus → revision → publish, topic ledger, failure
//! downgrades, structural construction errors.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use post_pipeline::{
    AvoidPatterns, BatchController, Brief, CallError, Candidate, CandidateState, Critic,
    CuratedTopicSupplier, DraftProducer, Guidance, InMemoryPublishQueue, PipelineConfig,
    PipelineError, PublishQueue, RevisionProducer, RuleBasedAggregator, Topic, TopicSupplier,
    Verdict, APPROVAL_THRESHOLD,
};

// ── Scripted collaborators ─────────────────────────────────────────

/// Writer that drafts one candidate per brief and remembers what it saw.
#[derive(Default)]
struct ScriptedWriter {
    calls: AtomicUsize,
    fail_on_call: Option<usize>,
    panic_on_call: Option<usize>,
    stall_on_call: Option<usize>,
    seen: Mutex<Vec<(Brief, AvoidPatterns)>>,
}

#[async_trait]
impl DraftProducer for ScriptedWriter {
    async fn generate(
        &self,
        brief: &Brief,
        avoid: &AvoidPatterns,
    ) -> Result<Candidate, CallError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen
            .lock()
            .unwrap()
            .push((brief.clone(), avoid.clone()));
        if self.fail_on_call == Some(call) {
            return Err(CallError::failed("writer backend 503"));
        }
        if self.panic_on_call == Some(call) {
            panic!("writer blew up on call {call}");
        }
        if self.stall_on_call == Some(call) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        let subject = brief
            .topic
            .as_ref()
            .map(|t| t.headline.clone())
            .unwrap_or_else(|| "freeform".to_string());
        Ok(Candidate::draft(format!(
            "Hook {call} about {subject}.\nBody line.\nEnding {call}."
        )))
    }
}

/// Critic with a fixed score.
struct Constant {
    name: &'static str,
    score: f64,
    calls: AtomicUsize,
}

impl Constant {
    fn new(name: &'static str, score: f64) -> Arc<Self> {
        Arc::new(Self {
            name,
            score,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Critic for Constant {
    fn name(&self) -> &str {
        self.name
    }
    async fn evaluate(&self, _c: &Candidate) -> Result<Verdict, CallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let feedback = format!("{} says {}", self.name, self.score);
        Ok(Verdict::scored(self.name, self.score, feedback))
    }
}

/// Denies on odd calls, approves on even calls.
#[derive(Default)]
struct Alternating {
    calls: AtomicUsize,
}

#[async_trait]
impl Critic for Alternating {
    fn name(&self) -> &str {
        "b"
    }
    async fn evaluate(&self, _c: &Candidate) -> Result<Verdict, CallError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let score = if call % 2 == 0 { 8.0 } else { 5.0 };
        Ok(Verdict::scored("b", score, "ending is flat"))
    }
}

struct Sleepy;

#[async_trait]
impl Critic for Sleepy {
    fn name(&self) -> &str {
        "sleepy"
    }
    async fn evaluate(&self, _c: &Candidate) -> Result<Verdict, CallError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Verdict::scored("sleepy", 10.0, ""))
    }
}

struct Panicky;

#[async_trait]
impl Critic for Panicky {
    fn name(&self) -> &str {
        "panicky"
    }
    async fn evaluate(&self, _c: &Candidate) -> Result<Verdict, CallError> {
        panic!("critic bug")
    }
}

#[derive(Default)]
struct SuffixEditor {
    calls: AtomicUsize,
}

#[async_trait]
impl RevisionProducer for SuffixEditor {
    async fn revise(&self, c: &Candidate, _g: &Guidance) -> Result<String, CallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{}\n(tightened)", c.content()))
    }
}

/// Ignores the "unused" contract and hands out every topic twice.
struct Stuttering {
    topics: Mutex<Vec<Topic>>,
}

impl Stuttering {
    fn new(headlines: &[&str]) -> Self {
        let mut topics = Vec::new();
        for h in headlines.iter().rev() {
            topics.push(Topic::new(*h, ""));
            topics.push(Topic::new(*h, ""));
        }
        Self {
            topics: Mutex::new(topics),
        }
    }
}

#[async_trait]
impl TopicSupplier for Stuttering {
    async fn next_unused(&self) -> Result<Option<Topic>, CallError> {
        Ok(self.topics.lock().unwrap().pop())
    }
}

struct BrokenSupplier;

#[async_trait]
impl TopicSupplier for BrokenSupplier {
    async fn next_unused(&self) -> Result<Option<Topic>, CallError> {
        Err(CallError::failed("trend feed down"))
    }
}

struct RefusingQueue;

#[async_trait]
impl PublishQueue for RefusingQueue {
    async fn enqueue(&self, _c: &Candidate) -> Result<(), CallError> {
        Err(CallError::failed("disk full"))
    }
}

fn headlines() -> Vec<&'static str> {
    vec![
        "Coffee prices hit record high",
        "Office return mandates spread",
        "Airline loses luggage again",
        "Quarterly planning season begins",
        "Inbox zero declared impossible",
    ]
}

struct Rig {
    writer: Arc<ScriptedWriter>,
    editor: Arc<SuffixEditor>,
    queue: Arc<InMemoryPublishQueue>,
}

impl Rig {
    fn new(writer: ScriptedWriter) -> Self {
        Self {
            writer: Arc::new(writer),
            editor: Arc::new(SuffixEditor::default()),
            queue: Arc::new(InMemoryPublishQueue::new()),
        }
    }

    fn controller(
        &self,
        critics: Vec<Arc<dyn Critic>>,
        config: PipelineConfig,
    ) -> BatchController {
        BatchController::builder()
            .draft_producer(self.writer.clone())
            .critics(critics)
            .feedback_aggregator(Arc::new(RuleBasedAggregator))
            .revision_producer(self.editor.clone())
            .topic_supplier(Arc::new(CuratedTopicSupplier::from_headlines(headlines())))
            .publish_queue(self.queue.clone())
            .config(config)
            .build()
            .unwrap()
    }
}

// ── End-to-end scenario ────────────────────────────────────────────

#[tokio::test]
async fn test_three_critics_revise_once_then_approve() {
    let _ = tracing_subscriber::fmt().with_env_filter("debug").try_init();

    let rig = Rig::new(ScriptedWriter::default());
    let a = Constant::new("a", 9.0);
    let c = Constant::new("c", 4.0);
    let controller = rig.controller(
        vec![a.clone(), Arc::new(Alternating::default()), c.clone()],
        PipelineConfig::default(),
    );

    let outcome = controller.run(3).await;

    assert_eq!(outcome.requested, 3);
    assert_eq!(outcome.produced(), 3);
    assert_eq!(outcome.records.len(), 3);
    for candidate in &outcome.accepted {
        assert_eq!(candidate.state(), CandidateState::Approved);
        assert_eq!(candidate.revision_count(), 1);
        assert!(candidate.content().ends_with("(tightened)"));
        assert_eq!(candidate.verdicts().len(), 3);
        assert_eq!(candidate.approval_count(), 2);

        // First pass was exactly one vote short.
        let before = &candidate.revisions()[0].verdicts_before;
        assert_eq!(before.iter().filter(|v| v.approved()).count(), 1);
    }

    // Two validation passes per candidate.
    assert_eq!(a.calls.load(Ordering::SeqCst), 6);
    assert_eq!(c.calls.load(Ordering::SeqCst), 6);
    assert_eq!(rig.editor.calls.load(Ordering::SeqCst), 3);
    assert_eq!(rig.queue.len(), 3);

    assert_eq!(outcome.metrics.revised, 3);
    assert!((outcome.metrics.revision_success_rate - 1.0).abs() < 1e-9);
    assert!(outcome.summary().contains("produced 3 of 3"));
}

#[tokio::test]
async fn test_every_verdict_respects_threshold() {
    let rig = Rig::new(ScriptedWriter::default());
    let controller = rig.controller(
        vec![
            Constant::new("a", 9.0),
            Arc::new(Alternating::default()),
            Constant::new("c", 4.0),
        ],
        PipelineConfig::default(),
    );
    let outcome = controller.run(2).await;

    let all = outcome.accepted.iter().flat_map(|c| {
        c.verdicts()
            .iter()
            .chain(c.revisions().iter().flat_map(|r| r.verdicts_before.iter()))
    });
    for v in all {
        assert!(!v.approved() || v.score() >= APPROVAL_THRESHOLD, "{v}");
    }
}

// ── Topic ledger ───────────────────────────────────────────────────

#[tokio::test]
async fn test_topics_are_distinct_within_batch() {
    let rig = Rig::new(ScriptedWriter::default());
    let controller = BatchController::builder()
        .draft_producer(rig.writer.clone())
        .critic(Constant::new("a", 9.0))
        .feedback_aggregator(Arc::new(RuleBasedAggregator))
        .revision_producer(rig.editor.clone())
        .topic_supplier(Arc::new(Stuttering::new(&headlines()[..3])))
        .publish_queue(rig.queue.clone())
        .build()
        .unwrap();

    let outcome = controller.run(3).await;
    let ids: Vec<_> = outcome
        .records
        .iter()
        .map(|r| r.topic_id.clone().unwrap())
        .collect();
    let unique: HashSet<_> = ids.iter().collect();
    assert_eq!(unique.len(), 3, "{ids:?}");

    let assigned: Vec<_> = outcome
        .accepted
        .iter()
        .map(|c| c.topic().unwrap().headline.clone())
        .collect();
    assert_eq!(assigned, headlines()[..3].to_vec());
}

#[tokio::test]
async fn test_rejected_slot_keeps_its_topic() {
    // Slot 1 draft fails; its topic must not be handed to slot 2.
    let rig = Rig::new(ScriptedWriter {
        fail_on_call: Some(1),
        ..ScriptedWriter::default()
    });
    let controller = rig.controller(vec![Constant::new("a", 9.0)], PipelineConfig::default());

    let outcome = controller.run(2).await;
    assert_eq!(outcome.records[0].final_state, CandidateState::Rejected);
    let error = outcome.records[0].error.as_deref().unwrap();
    assert!(error.contains("writer backend 503"), "{error}");
    assert_ne!(outcome.records[0].topic_id, outcome.records[1].topic_id);
    assert_eq!(outcome.produced(), 1);
}

#[tokio::test]
async fn test_supplier_failure_falls_back_to_freeform() {
    let rig = Rig::new(ScriptedWriter::default());
    let controller = BatchController::builder()
        .draft_producer(rig.writer.clone())
        .critic(Constant::new("a", 9.0))
        .feedback_aggregator(Arc::new(RuleBasedAggregator))
        .revision_producer(rig.editor.clone())
        .topic_supplier(Arc::new(BrokenSupplier))
        .publish_queue(rig.queue.clone())
        .build()
        .unwrap();

    let outcome = controller.run(2).await;
    assert_eq!(outcome.produced(), 2);
    let seen = rig.writer.seen.lock().unwrap();
    assert!(seen.iter().all(|(brief, _)| brief.is_freeform()));
}

#[tokio::test]
async fn test_writer_sees_previous_slots_in_avoid_patterns() {
    let rig = Rig::new(ScriptedWriter::default());
    let controller = rig.controller(vec![Constant::new("a", 9.0)], PipelineConfig::default());
    controller.run(2).await;

    let seen = rig.writer.seen.lock().unwrap();
    assert!(seen[0].1.is_empty());
    let second = &seen[1].1;
    assert_eq!(second.topics, vec![headlines()[0]]);
    assert_eq!(second.hooks.len(), 1);
    assert!(second.hooks[0].starts_with("Hook 1"));
    assert_eq!(second.endings, vec!["Ending 1."]);
}

// ── Failure downgrades ─────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_slow_and_panicking_critics_become_verdicts() {
    let rig = Rig::new(ScriptedWriter::default());
    let config = PipelineConfig {
        critic_timeout_secs: 2,
        ..PipelineConfig::default()
    };
    let controller = rig.controller(
        vec![Constant::new("a", 9.0), Arc::new(Sleepy), Arc::new(Panicky)],
        config,
    );

    let outcome = controller.run(1).await;
    // One approval of three: near miss, revision, same result, rejected.
    assert_eq!(outcome.produced(), 0);
    assert_eq!(outcome.records[0].final_state, CandidateState::Rejected);
    assert_eq!(outcome.records[0].revision_count, 1);
    assert_eq!(rig.editor.calls.load(Ordering::SeqCst), 1);

    let mut candidate = Candidate::draft("direct");
    let decision = controller.engine().validate(&mut candidate).await.unwrap();
    assert_eq!(decision, post_pipeline::Decision::ReviseOnce);
    let names: Vec<_> = candidate.verdicts().iter().map(|v| v.critic()).collect();
    assert_eq!(names, vec!["a", "sleepy", "panicky"]);
    assert!(candidate.verdicts()[1].feedback().contains("timed out"));
    assert!(candidate.verdicts()[2].feedback().contains("critic bug"));
    assert!(candidate.verdicts()[1..]
        .iter()
        .all(|v| v.score() == 5.0 && !v.approved() && v.is_failure()));
}

#[tokio::test]
async fn test_panicking_writer_only_loses_its_slot() {
    let rig = Rig::new(ScriptedWriter {
        panic_on_call: Some(2),
        ..ScriptedWriter::default()
    });
    let controller = rig.controller(vec![Constant::new("a", 9.0)], PipelineConfig::default());

    let outcome = controller.run(3).await;
    assert_eq!(outcome.records.len(), 3);
    assert_eq!(outcome.produced(), 2);
    let error = outcome.records[1].error.as_deref().unwrap();
    assert!(error.contains("writer blew up"), "{error}");
    assert_eq!(outcome.metrics.rejected, 1);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_writer_times_out_and_batch_moves_on() {
    let rig = Rig::new(ScriptedWriter {
        stall_on_call: Some(1),
        ..ScriptedWriter::default()
    });
    let config = PipelineConfig {
        draft_timeout_secs: 5,
        ..PipelineConfig::default()
    };
    let controller = rig.controller(vec![Constant::new("a", 9.0)], config);

    let outcome = controller.run(2).await;
    assert_eq!(outcome.records.len(), 2);
    assert_eq!(outcome.records[0].final_state, CandidateState::Rejected);
    let error = outcome.records[0].error.as_deref().unwrap();
    assert!(error.contains("draft producer timed out"), "{error}");

    assert_eq!(outcome.records[1].final_state, CandidateState::Approved);
    assert!(outcome.records[1].error.is_none());
    assert_eq!(rig.writer.calls.load(Ordering::SeqCst), 2);
    assert_eq!(outcome.produced(), 1);
    assert_eq!(rig.queue.len(), 1);
}

#[tokio::test]
async fn test_publish_failure_is_counted_not_fatal() {
    let writer = Arc::new(ScriptedWriter::default());
    let controller = BatchController::builder()
        .draft_producer(writer)
        .critic(Constant::new("a", 9.0))
        .feedback_aggregator(Arc::new(RuleBasedAggregator))
        .revision_producer(Arc::new(SuffixEditor::default()))
        .publish_queue(Arc::new(RefusingQueue))
        .build()
        .unwrap();

    let outcome = controller.run(2).await;
    assert_eq!(outcome.produced(), 2);
    assert_eq!(outcome.publish_failures, 2);
    assert!(outcome.records[0].error.as_deref().unwrap().contains("disk full"));
    assert!(outcome.summary().contains("2 not queued"));
}

// ── Lifecycle properties ───────────────────────────────────────────

#[tokio::test]
async fn test_rejected_candidate_is_never_resurrected() {
    let rig = Rig::new(ScriptedWriter::default());
    let a = Constant::new("a", 9.0);
    let controller = rig.controller(vec![a.clone()], PipelineConfig::default());

    let mut candidate = Candidate::draft("discarded");
    candidate.reject("manual");
    let again = controller.process_candidate(candidate).await.unwrap();
    assert_eq!(again.state(), CandidateState::Rejected);
    assert_eq!(again.transitions().len(), 1);
    assert_eq!(a.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_revision_cap_zero_rejects_near_miss() {
    let rig = Rig::new(ScriptedWriter::default());
    let config = PipelineConfig {
        max_revisions: 0,
        ..PipelineConfig::default()
    };
    let controller = rig.controller(
        vec![
            Constant::new("a", 9.0),
            Arc::new(Alternating::default()),
            Constant::new("c", 4.0),
        ],
        config,
    );

    let outcome = controller.run(1).await;
    assert_eq!(outcome.produced(), 0);
    assert_eq!(outcome.records[0].revision_count, 0);
    assert_eq!(rig.editor.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_wide_miss_skips_revision() {
    let rig = Rig::new(ScriptedWriter::default());
    let controller = rig.controller(
        vec![
            Constant::new("a", 3.0),
            Constant::new("b", 4.0),
            Constant::new("c", 5.0),
        ],
        PipelineConfig::default(),
    );
    let outcome = controller.run(2).await;
    assert_eq!(outcome.produced(), 0);
    assert_eq!(rig.editor.calls.load(Ordering::SeqCst), 0);
    assert_eq!(outcome.metrics.rejected, 2);
}

// ── Construction ───────────────────────────────────────────────────

#[test]
fn test_zero_critics_is_structural_error() {
    let err = BatchController::builder()
        .draft_producer(Arc::new(ScriptedWriter::default()))
        .feedback_aggregator(Arc::new(RuleBasedAggregator))
        .revision_producer(Arc::new(SuffixEditor::default()))
        .publish_queue(Arc::new(InMemoryPublishQueue::new()))
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, PipelineError::NoCritics));
}

#[test]
fn test_missing_writer_is_structural_error() {
    let err = BatchController::builder()
        .critic(Constant::new("a", 9.0))
        .feedback_aggregator(Arc::new(RuleBasedAggregator))
        .revision_producer(Arc::new(SuffixEditor::default()))
        .publish_queue(Arc::new(InMemoryPublishQueue::new()))
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, PipelineError::MissingCollaborator("draft producer")));
}
