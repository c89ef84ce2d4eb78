//! Per-batch record of assigned topics.

use std::collections::HashSet;

/// Topic ids already assigned in the current batch.
///
/// Recording happens at assignment time, so a rejected slot still holds
/// its topic.
#[derive(Debug, Clone, Default)]
pub struct BatchTopicLedger {
    assigned: HashSet<String>,
    order: Vec<String>,
}

impl BatchTopicLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, topic_id: &str) -> bool {
        self.assigned.contains(topic_id)
    }

    /// Record an assignment. Returns `false` if the id was already present.
    pub fn record(&mut self, topic_id: &str) -> bool {
        if !self.assigned.insert(topic_id.to_string()) {
            return false;
        }
        self.order.push(topic_id.to_string());
        true
    }

    /// Assigned ids in assignment order.
    pub fn assigned(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_once() {
        let mut ledger = BatchTopicLedger::new();
        assert!(ledger.record("abc"));
        assert!(!ledger.record("abc"));
        assert!(ledger.record("def"));
        assert!(ledger.contains("abc"));
        assert!(!ledger.contains("xyz"));
        assert_eq!(ledger.assigned(), ["abc", "def"]);
        assert_eq!(ledger.len(), 2);
    }
}
