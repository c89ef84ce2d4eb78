//! Pipeline tuning: revision cap, near-miss margin, topic draws, timeouts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::consensus::ConsensusPolicy;
use crate::errors::{PipelineError, PipelineResult};
use crate::producer::DEFAULT_AVOID_LIMIT;

/// Tunables for one batch controller.
///
/// Every field has a default, so a partial TOML/JSON table is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Hard cap on revisions per candidate.
    pub max_revisions: u32,
    /// Largest approval shortfall that still earns a revision.
    pub near_miss_margin: usize,
    /// Supplier draws per slot before falling back to a freeform brief.
    pub max_topic_draws: usize,
    /// Remembered topics/hooks/endings per list.
    pub avoid_limit: usize,

    pub critic_timeout_secs: u64,
    pub draft_timeout_secs: u64,
    pub feedback_timeout_secs: u64,
    pub revision_timeout_secs: u64,
    pub topic_timeout_secs: u64,
    pub publish_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_revisions: 2,
            near_miss_margin: 1,
            max_topic_draws: 5,
            avoid_limit: DEFAULT_AVOID_LIMIT,
            critic_timeout_secs: 30,
            draft_timeout_secs: 60,
            feedback_timeout_secs: 30,
            revision_timeout_secs: 60,
            topic_timeout_secs: 10,
            publish_timeout_secs: 10,
        }
    }
}

impl PipelineConfig {
    /// Reject values that would make the pipeline unable to do anything.
    pub fn validate(&self) -> PipelineResult<()> {
        let timeouts = [
            ("critic_timeout_secs", self.critic_timeout_secs),
            ("draft_timeout_secs", self.draft_timeout_secs),
            ("feedback_timeout_secs", self.feedback_timeout_secs),
            ("revision_timeout_secs", self.revision_timeout_secs),
            ("topic_timeout_secs", self.topic_timeout_secs),
            ("publish_timeout_secs", self.publish_timeout_secs),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(PipelineError::InvalidConfig(format!("{name} must be > 0")));
        }
        if self.max_topic_draws == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_topic_draws must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn policy(&self) -> ConsensusPolicy {
        ConsensusPolicy {
            near_miss_margin: self.near_miss_margin,
        }
    }

    pub fn critic_timeout(&self) -> Duration {
        Duration::from_secs(self.critic_timeout_secs)
    }

    pub fn draft_timeout(&self) -> Duration {
        Duration::from_secs(self.draft_timeout_secs)
    }

    pub fn feedback_timeout(&self) -> Duration {
        Duration::from_secs(self.feedback_timeout_secs)
    }

    pub fn revision_timeout(&self) -> Duration {
        Duration::from_secs(self.revision_timeout_secs)
    }

    pub fn topic_timeout(&self) -> Duration {
        Duration::from_secs(self.topic_timeout_secs)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.max_revisions, 2);
        assert_eq!(cfg.near_miss_margin, 1);
        assert_eq!(cfg.critic_timeout(), Duration::from_secs(30));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let cfg: PipelineConfig =
            serde_json::from_str(r#"{"max_revisions": 1, "critic_timeout_secs": 5}"#).unwrap();
        assert_eq!(cfg.max_revisions, 1);
        assert_eq!(cfg.critic_timeout_secs, 5);
        assert_eq!(cfg.draft_timeout_secs, 60);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let cfg = PipelineConfig {
            topic_timeout_secs: 0,
            ..PipelineConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("topic_timeout_secs"));
    }
}
