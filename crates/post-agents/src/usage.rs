//! Token and cost accounting across agents.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use post_pipeline::Usage;
use serde::Serialize;

/// USD per one million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rate {
    pub input: f64,
    pub output: f64,
}

impl Rate {
    pub const fn new(input: f64, output: f64) -> Self {
        Self { input, output }
    }

    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 * self.input + output_tokens as f64 * self.output) / 1_000_000.0
    }
}

/// Rate used for models missing from the table.
pub const DEFAULT_RATE: Rate = Rate::new(0.15, 0.60);

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AgentUsage {
    pub calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageSummary {
    pub calls: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub by_agent: BTreeMap<String, AgentUsage>,
}

/// Shared tracker; each agent records its own calls.
#[derive(Debug)]
pub struct CostTracker {
    rates: HashMap<String, Rate>,
    agents: Mutex<BTreeMap<String, AgentUsage>>,
}

impl Default for CostTracker {
    fn default() -> Self {
        let rates = [
            ("gpt-4o-mini", DEFAULT_RATE),
            ("gpt-4o", Rate::new(5.00, 15.00)),
            ("gpt-4-turbo", Rate::new(10.00, 30.00)),
        ]
        .into_iter()
        .map(|(m, r)| (m.to_string(), r))
        .collect();
        Self {
            rates,
            agents: Mutex::new(BTreeMap::new()),
        }
    }
}

impl CostTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(mut self, model: impl Into<String>, rate: Rate) -> Self {
        self.rates.insert(model.into(), rate);
        self
    }

    /// Rate for `model`; dated snapshots (`gpt-4o-2024-08-06`) match their base name.
    pub fn rate_for(&self, model: &str) -> Rate {
        if let Some(rate) = self.rates.get(model) {
            return *rate;
        }
        self.rates
            .iter()
            .filter(|(name, _)| model.starts_with(name.as_str()))
            .max_by_key(|(name, _)| name.len())
            .map(|(_, rate)| *rate)
            .unwrap_or(DEFAULT_RATE)
    }

    /// Record one call and return its usage for the candidate.
    pub fn record(&self, agent: &str, model: &str, input_tokens: u64, output_tokens: u64) -> Usage {
        let cost = self.rate_for(model).cost(input_tokens, output_tokens);
        let mut agents = self.agents.lock().unwrap_or_else(|e| e.into_inner());
        let entry = agents.entry(agent.to_string()).or_default();
        entry.calls += 1;
        entry.input_tokens += input_tokens;
        entry.output_tokens += output_tokens;
        entry.cost += cost;
        Usage::new(input_tokens + output_tokens, cost)
    }

    pub fn summary(&self) -> UsageSummary {
        let agents = self.agents.lock().unwrap_or_else(|e| e.into_inner());
        let mut summary = UsageSummary {
            by_agent: agents.clone(),
            ..UsageSummary::default()
        };
        for usage in agents.values() {
            summary.calls += usage.calls;
            summary.total_tokens += usage.input_tokens + usage.output_tokens;
            summary.total_cost += usage.cost;
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_and_unknown_rates() {
        let tracker = CostTracker::new();
        assert_eq!(tracker.rate_for("gpt-4o"), Rate::new(5.0, 15.0));
        assert_eq!(tracker.rate_for("gpt-4o-mini-2024-07-18"), DEFAULT_RATE);
        assert_eq!(tracker.rate_for("gpt-4o-2024-08-06"), Rate::new(5.0, 15.0));
        assert_eq!(tracker.rate_for("local-llama"), DEFAULT_RATE);
    }

    #[test]
    fn test_record_and_summary() {
        let tracker = CostTracker::new();
        let usage = tracker.record("writer", "gpt-4o", 1_000_000, 0);
        assert_eq!(usage.tokens, 1_000_000);
        assert!((usage.estimated_cost - 5.0).abs() < 1e-9);

        tracker.record("critic:customer", "gpt-4o-mini", 0, 1_000_000);
        tracker.record("critic:customer", "gpt-4o-mini", 100, 0);

        let summary = tracker.summary();
        assert_eq!(summary.calls, 3);
        assert_eq!(summary.total_tokens, 2_000_100);
        assert_eq!(summary.by_agent["critic:customer"].calls, 2);
        assert!((summary.total_cost - 5.60).abs() < 1e-3);
    }
}
