//! Draft generation contract: briefs, avoid patterns, and the producer trait.

use std::collections::VecDeque;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::candidate::Candidate;
use crate::errors::CallError;
use crate::topic::Topic;

/// Default cap on remembered topics, hooks, and endings.
pub const DEFAULT_AVOID_LIMIT: usize = 10;

/// What the writer is asked to write about.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Brief {
    /// Topic to react to; `None` means freeform.
    pub topic: Option<Topic>,
    /// Slot number within the batch (1-based).
    pub slot: usize,
    /// Extra instructions passed through to the writer.
    #[serde(default)]
    pub notes: Option<String>,
}

impl Brief {
    pub fn freeform(slot: usize) -> Self {
        Self {
            topic: None,
            slot,
            notes: None,
        }
    }

    pub fn for_topic(topic: Topic, slot: usize) -> Self {
        Self {
            topic: Some(topic),
            slot,
            notes: None,
        }
    }

    pub fn is_freeform(&self) -> bool {
        self.topic.is_none()
    }
}

/// Recent topics, hooks, and endings the writer should not repeat.
///
/// Each list is most-recent-first and capped at `limit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvoidPatterns {
    pub topics: VecDeque<String>,
    pub hooks: VecDeque<String>,
    pub endings: VecDeque<String>,
    limit: usize,
}

impl Default for AvoidPatterns {
    fn default() -> Self {
        Self::with_limit(DEFAULT_AVOID_LIMIT)
    }
}

impl AvoidPatterns {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            topics: VecDeque::new(),
            hooks: VecDeque::new(),
            endings: VecDeque::new(),
            limit,
        }
    }

    /// Seed the topic list, e.g. from configuration.
    pub fn seeded<I, S>(limit: usize, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut patterns = Self::with_limit(limit);
        for topic in topics {
            patterns.remember_topic(topic);
        }
        patterns
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty() && self.hooks.is_empty() && self.endings.is_empty()
    }

    pub fn remember_topic(&mut self, topic: impl Into<String>) {
        push_capped(&mut self.topics, topic.into(), self.limit);
    }

    /// Record the hook and ending of a drafted candidate.
    pub fn remember_candidate(&mut self, candidate: &Candidate) {
        if let Some(hook) = candidate.hook() {
            push_capped(&mut self.hooks, hook.to_string(), self.limit);
        }
        if let Some(ending) = candidate.ending() {
            push_capped(&mut self.endings, ending.to_string(), self.limit);
        }
    }
}

fn push_capped(list: &mut VecDeque<String>, value: String, limit: usize) {
    if value.is_empty() || limit == 0 {
        return;
    }
    list.retain(|v| v != &value);
    list.push_front(value);
    list.truncate(limit);
}

/// Writes a new candidate for a brief.
///
/// Failures are reported, not retried; the caller rejects that slot.
#[async_trait]
pub trait DraftProducer: Send + Sync {
    async fn generate(&self, brief: &Brief, avoid: &AvoidPatterns)
        -> Result<Candidate, CallError>;
}
