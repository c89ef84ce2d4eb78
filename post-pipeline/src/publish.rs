//! Outbound hand-off for approved candidates.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::candidate::Candidate;
use crate::errors::CallError;

/// Receives every approved candidate. Storage format is the implementor's.
#[async_trait]
pub trait PublishQueue: Send + Sync {
    async fn enqueue(&self, candidate: &Candidate) -> Result<(), CallError>;
}

/// Queue that keeps approved candidates in memory.
#[derive(Default)]
pub struct InMemoryPublishQueue {
    items: Mutex<Vec<Candidate>>,
}

impl InMemoryPublishQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of queued candidates in enqueue order.
    pub fn items(&self) -> Vec<Candidate> {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl PublishQueue for InMemoryPublishQueue {
    async fn enqueue(&self, candidate: &Candidate) -> Result<(), CallError> {
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(candidate.clone());
        Ok(())
    }
}
