//! JSON Lines publish queue: one approved post per line.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use post_pipeline::{CallError, Candidate, CandidateId, MediaRef, PublishQueue};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// Line written for each approved candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedPost {
    pub candidate_id: CandidateId,
    pub batch_id: Option<Uuid>,
    pub slot: Option<usize>,
    pub topic: Option<String>,
    pub content: String,
    pub tags: Vec<String>,
    pub media: MediaRef,
    pub average_score: f64,
    pub approvals: usize,
    pub revision_count: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl From<&Candidate> for QueuedPost {
    fn from(c: &Candidate) -> Self {
        Self {
            candidate_id: c.id(),
            batch_id: c.batch_id(),
            slot: c.slot(),
            topic: c.topic().map(|t| t.headline.clone()),
            content: c.content().to_string(),
            tags: c.tags().to_vec(),
            media: c.media().clone(),
            average_score: c.average_score(),
            approvals: c.approval_count(),
            revision_count: c.revision_count(),
            enqueued_at: Utc::now(),
        }
    }
}

/// Appends approved posts to a `.jsonl` file.
pub struct JsonlPublishQueue {
    path: PathBuf,
    // Serialises appends from concurrent callers.
    lock: Mutex<()>,
}

impl JsonlPublishQueue {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back every queued post. A missing file is an empty queue.
    pub fn read_all(&self) -> anyhow::Result<Vec<QueuedPost>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        raw.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(anyhow::Error::from))
            .collect()
    }
}

#[async_trait]
impl PublishQueue for JsonlPublishQueue {
    async fn enqueue(&self, candidate: &Candidate) -> Result<(), CallError> {
        let json = serde_json::to_string(&QueuedPost::from(candidate))
            .map_err(|e| CallError::failed(format!("serialising queued post: {e}")))?;

        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| CallError::failed(format!("creating {}: {e}", parent.display())))?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| CallError::failed(format!("opening {}: {e}", self.path.display())))?;
        writeln!(file, "{json}")
            .map_err(|e| CallError::failed(format!("appending to {}: {e}", self.path.display())))?;

        info!(candidate_id = %candidate.id(), path = %self.path.display(), "queued for publishing");
        Ok(())
    }
}
