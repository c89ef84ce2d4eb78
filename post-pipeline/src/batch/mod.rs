//! Batch controller. Drives K candidate pipelines one slot at a time.
//!
//! ```text
//! for slot in 1..=K:
//!   draw topic (skip ledger hits, ≤ max_topic_draws) ─→ ledger.record
//!   DraftProducer.generate(brief, avoid)
//!   ConsensusEngine.validate ──ReviseOnce──→ RevisionCoordinator (once)
//!   Approved → accepted + PublishQueue      Rejected → dropped
//! ```
//!
//! Slots never fail the batch: draft failures, structural errors and panics
//! inside a slot are logged and recorded as a rejection for that slot.

pub mod ledger;
pub mod report;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::FutureExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use ledger::BatchTopicLedger;
pub use report::{BatchMetrics, BatchOutcome, SlotRecord};

use crate::candidate::{Candidate, CandidateState};
use crate::config::PipelineConfig;
use crate::consensus::{ConsensusEngine, Decision};
use crate::critic::Critic;
use crate::errors::{PipelineError, PipelineResult};
use crate::producer::{AvoidPatterns, Brief, DraftProducer};
use crate::publish::PublishQueue;
use crate::resilience::{bounded, panic_message};
use crate::revision::{FeedbackAggregator, RevisionCoordinator, RevisionProducer};
use crate::topic::{Topic, TopicSupplier};

/// Runs batches of candidate pipelines.
pub struct BatchController {
    producer: Arc<dyn DraftProducer>,
    engine: ConsensusEngine,
    reviser: RevisionCoordinator,
    topics: Option<Arc<dyn TopicSupplier>>,
    queue: Arc<dyn PublishQueue>,
    config: PipelineConfig,
    avoid_seed: Vec<String>,
}

impl BatchController {
    pub fn builder() -> BatchControllerBuilder {
        BatchControllerBuilder::default()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn engine(&self) -> &ConsensusEngine {
        &self.engine
    }

    /// Produce up to `count` approved candidates.
    ///
    /// Always returns an outcome; per-slot failures show up in the records.
    pub async fn run(&self, count: usize) -> BatchOutcome {
        let batch_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut ledger = BatchTopicLedger::new();
        let mut avoid =
            AvoidPatterns::seeded(self.config.avoid_limit, self.avoid_seed.iter().cloned());
        let mut accepted = Vec::new();
        let mut records = Vec::with_capacity(count);
        let mut publish_failures = 0;

        info!(
            %batch_id,
            requested = count,
            critics = self.engine.critic_count(),
            "batch started"
        );

        for slot in 1..=count {
            let clock = Instant::now();
            let topic = self.draw_topic(&mut ledger, slot).await;
            info!(
                %batch_id,
                slot,
                topic = topic.as_ref().map(|t| t.headline.as_str()).unwrap_or("freeform"),
                "slot started"
            );

            let attempt = AssertUnwindSafe(self.run_slot(batch_id, slot, topic.clone(), &avoid))
                .catch_unwind()
                .await;
            let elapsed_ms = clock.elapsed().as_millis() as u64;

            if let Some(t) = &topic {
                avoid.remember_topic(t.headline.clone());
            }

            let candidate = match attempt {
                Ok(Ok(candidate)) => candidate,
                Ok(Err(error)) => {
                    warn!(%batch_id, slot, %error, "slot failed; counting as rejected");
                    records.push(failed_record(slot, topic.as_ref(), error, elapsed_ms));
                    continue;
                }
                Err(payload) => {
                    let error = format!("slot panicked: {}", panic_message(payload.as_ref()));
                    warn!(%batch_id, slot, %error, "slot panicked; counting as rejected");
                    records.push(failed_record(slot, topic.as_ref(), error, elapsed_ms));
                    continue;
                }
            };

            avoid.remember_candidate(&candidate);
            let mut record = SlotRecord::from_candidate(slot, &candidate, elapsed_ms);

            if candidate.state() == CandidateState::Approved {
                let enqueued = bounded(
                    "publish queue",
                    self.config.publish_timeout(),
                    self.queue.enqueue(&candidate),
                )
                .await;
                if let Err(e) = enqueued {
                    warn!(
                        candidate_id = %candidate.id(),
                        slot,
                        error = %e,
                        "publish queue refused approved candidate"
                    );
                    publish_failures += 1;
                    record = record.with_error(format!("enqueue failed: {e}"));
                }
                accepted.push(candidate);
            }

            info!(
                %batch_id,
                slot,
                state = %record.final_state,
                revisions = record.revision_count,
                score = record.average_score,
                "slot finished"
            );
            records.push(record);
        }

        let metrics = BatchMetrics::calculate(&records);
        let outcome = BatchOutcome {
            batch_id,
            requested: count,
            accepted,
            records,
            metrics,
            publish_failures,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            %batch_id,
            requested = count,
            produced = outcome.produced(),
            approval_rate = outcome.metrics.approval_rate,
            "batch finished"
        );
        outcome
    }

    /// Run validation (and at most one revision) on a candidate.
    ///
    /// Terminal candidates are returned untouched.
    pub async fn process_candidate(&self, mut candidate: Candidate) -> PipelineResult<Candidate> {
        if candidate.is_terminal() {
            debug!(candidate_id = %candidate.id(), state = %candidate.state(), "already terminal");
            return Ok(candidate);
        }
        match self.engine.validate(&mut candidate).await? {
            Decision::ReviseOnce => {
                let (revised, _) = self
                    .reviser
                    .revise_and_revalidate(candidate, &self.engine)
                    .await?;
                Ok(revised)
            }
            Decision::Approved | Decision::Rejected => Ok(candidate),
        }
    }

    async fn run_slot(
        &self,
        batch_id: Uuid,
        slot: usize,
        topic: Option<Topic>,
        avoid: &AvoidPatterns,
    ) -> Result<Candidate, String> {
        let brief = match topic.clone() {
            Some(t) => Brief::for_topic(t, slot),
            None => Brief::freeform(slot),
        };

        let drafted = bounded(
            "draft producer",
            self.config.draft_timeout(),
            self.producer.generate(&brief, avoid),
        )
        .await;
        let candidate = drafted.map_err(|e| format!("draft failed: {e}"))?;
        if candidate.state() != CandidateState::Drafted {
            return Err(format!(
                "draft producer returned a candidate in state {}",
                candidate.state()
            ));
        }

        let mut candidate = candidate.with_max_revisions(self.config.max_revisions);
        candidate.assign_slot(batch_id, slot, topic);
        self.process_candidate(candidate)
            .await
            .map_err(|e| e.to_string())
    }

    /// Draw a topic not yet in the ledger and record it.
    ///
    /// `None` means freeform: no supplier, supplier exhausted or failing, or
    /// every draw hit the ledger.
    async fn draw_topic(&self, ledger: &mut BatchTopicLedger, slot: usize) -> Option<Topic> {
        let supplier = self.topics.as_ref()?;
        for _ in 0..self.config.max_topic_draws {
            let drawn = bounded(
                "topic supplier",
                self.config.topic_timeout(),
                supplier.next_unused(),
            )
            .await;
            match drawn {
                Ok(Some(topic)) => {
                    if ledger.record(&topic.id) {
                        return Some(topic);
                    }
                    debug!(
                        slot,
                        topic_id = %topic.id,
                        "topic already assigned in batch; redrawing"
                    );
                }
                Ok(None) => {
                    info!(slot, "topic supplier exhausted; using freeform brief");
                    return None;
                }
                Err(e) => {
                    warn!(slot, error = %e, "topic supplier failed; using freeform brief");
                    return None;
                }
            }
        }
        info!(slot, draws = self.config.max_topic_draws, "no unused topic; using freeform brief");
        None
    }
}

fn failed_record(slot: usize, topic: Option<&Topic>, error: String, elapsed_ms: u64) -> SlotRecord {
    SlotRecord::failed(
        slot,
        topic.map(|t| (t.id.as_str(), t.headline.as_str())),
        error,
        elapsed_ms,
    )
}

/// Collects collaborators for a [`BatchController`].
#[derive(Default)]
pub struct BatchControllerBuilder {
    producer: Option<Arc<dyn DraftProducer>>,
    critics: Vec<Arc<dyn Critic>>,
    aggregator: Option<Arc<dyn FeedbackAggregator>>,
    reviser: Option<Arc<dyn RevisionProducer>>,
    topics: Option<Arc<dyn TopicSupplier>>,
    queue: Option<Arc<dyn PublishQueue>>,
    config: PipelineConfig,
    avoid_seed: Vec<String>,
}

impl BatchControllerBuilder {
    pub fn draft_producer(mut self, producer: Arc<dyn DraftProducer>) -> Self {
        self.producer = Some(producer);
        self
    }

    pub fn critic(mut self, critic: Arc<dyn Critic>) -> Self {
        self.critics.push(critic);
        self
    }

    pub fn critics(mut self, critics: impl IntoIterator<Item = Arc<dyn Critic>>) -> Self {
        self.critics.extend(critics);
        self
    }

    pub fn feedback_aggregator(mut self, aggregator: Arc<dyn FeedbackAggregator>) -> Self {
        self.aggregator = Some(aggregator);
        self
    }

    pub fn revision_producer(mut self, reviser: Arc<dyn RevisionProducer>) -> Self {
        self.reviser = Some(reviser);
        self
    }

    /// Optional; without a supplier every slot gets a freeform brief.
    pub fn topic_supplier(mut self, topics: Arc<dyn TopicSupplier>) -> Self {
        self.topics = Some(topics);
        self
    }

    pub fn publish_queue(mut self, queue: Arc<dyn PublishQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Topics the writer should avoid from the first slot on.
    pub fn avoid_seed(mut self, topics: impl IntoIterator<Item = String>) -> Self {
        self.avoid_seed = topics.into_iter().collect();
        self
    }

    pub fn build(self) -> PipelineResult<BatchController> {
        self.config.validate()?;
        let engine = ConsensusEngine::new(
            self.critics,
            self.config.policy(),
            self.config.critic_timeout(),
        )?;
        let producer = self
            .producer
            .ok_or(PipelineError::MissingCollaborator("draft producer"))?;
        let aggregator = self
            .aggregator
            .ok_or(PipelineError::MissingCollaborator("feedback aggregator"))?;
        let reviser = self
            .reviser
            .ok_or(PipelineError::MissingCollaborator("revision producer"))?;
        let queue = self
            .queue
            .ok_or(PipelineError::MissingCollaborator("publish queue"))?;

        Ok(BatchController {
            producer,
            engine,
            reviser: RevisionCoordinator::new(
                aggregator,
                reviser,
                self.config.feedback_timeout(),
                self.config.revision_timeout(),
            ),
            topics: self.topics,
            queue,
            config: self.config,
            avoid_seed: self.avoid_seed,
        })
    }
}
