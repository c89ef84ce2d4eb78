//! Topics to react to, and the supplier contract.
//!
//! Topics are identified by a content fingerprint so that two headlines
//! phrased slightly differently about the same story collapse to one id.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::CallError;

/// Words that carry no topical signal in a headline.
const STOPWORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "could", "should", "may", "might", "must", "shall",
    "to", "of", "in", "for", "on", "with", "at", "by", "from", "as", "into", "through",
    "during", "before", "after", "above", "below", "between", "under", "again", "further",
    "then", "once", "and", "but", "or", "nor", "so", "yet", "both", "either", "neither", "not",
    "only", "own", "same", "than", "too", "very", "just", "about", "also", "now", "new", "says",
    "said", "news", "today", "report", "reports", "latest", "breaking", "trending",
];

/// Number of key words that make up a fingerprint.
const FINGERPRINT_WORDS: usize = 8;

/// Something to react to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    /// Fingerprint of headline + summary.
    pub id: String,
    pub headline: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl Topic {
    pub fn new(headline: impl Into<String>, summary: impl Into<String>) -> Self {
        let headline = headline.into();
        let summary = summary.into();
        Self {
            id: Self::fingerprint(&headline, &summary),
            headline,
            summary,
            category: None,
            source: None,
            url: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>, url: Option<String>) -> Self {
        self.source = Some(source.into());
        self.url = url;
        self
    }

    /// Order-insensitive fingerprint of the key words in a headline/summary.
    ///
    /// Lowercases, splits on non-alphanumerics, drops stopwords and words of
    /// two characters or fewer, then hashes the first eight distinct words in
    /// sorted order. Returns 16 hex characters.
    pub fn fingerprint(headline: &str, summary: &str) -> String {
        let text = format!("{headline} {summary}").to_lowercase();
        let mut words: Vec<&str> = text
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| w.len() > 2 && !STOPWORDS.contains(w))
            .collect();
        words.sort_unstable();
        words.dedup();
        words.truncate(FINGERPRINT_WORDS);

        let hash = blake3::hash(words.join(" ").as_bytes());
        hash.to_hex()[..16].to_string()
    }
}

/// Source of topics for batch slots.
///
/// `next_unused` returns a topic this supplier has not handed out before, or
/// `None` when it has nothing left.
#[async_trait]
pub trait TopicSupplier: Send + Sync {
    async fn next_unused(&self) -> Result<Option<Topic>, CallError>;
}

/// In-memory supplier over a fixed, ordered topic list.
///
/// Topics whose fingerprint was already handed out (including duplicates
/// within the list itself) are skipped.
pub struct CuratedTopicSupplier {
    inner: Mutex<CuratedState>,
}

struct CuratedState {
    pending: VecDeque<Topic>,
    handed_out: HashSet<String>,
}

impl CuratedTopicSupplier {
    pub fn new(topics: impl IntoIterator<Item = Topic>) -> Self {
        Self {
            inner: Mutex::new(CuratedState {
                pending: topics.into_iter().collect(),
                handed_out: HashSet::new(),
            }),
        }
    }

    /// Build from bare headlines.
    pub fn from_headlines<I, S>(headlines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(headlines.into_iter().map(|h| Topic::new(h.as_ref(), "")))
    }

    /// Topics not yet handed out.
    pub fn remaining(&self) -> usize {
        let state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state
            .pending
            .iter()
            .filter(|t| !state.handed_out.contains(&t.id))
            .count()
    }
}

#[async_trait]
impl TopicSupplier for CuratedTopicSupplier {
    async fn next_unused(&self) -> Result<Option<Topic>, CallError> {
        // Draw and record under one lock.
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        while let Some(topic) = state.pending.pop_front() {
            if state.handed_out.insert(topic.id.clone()) {
                return Ok(Some(topic));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_ignores_order_case_and_stopwords() {
        let a = Topic::fingerprint("Apple launches the new Vision headset", "");
        let b = Topic::fingerprint("BREAKING: headset Vision launches, Apple says", "");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_distinguishes_topics() {
        let a = Topic::fingerprint("Coffee prices hit record high", "");
        let b = Topic::fingerprint("Tea prices hit record high", "");
        assert_ne!(a, b);
    }

    #[test]
    fn test_fingerprint_uses_first_eight_sorted_words() {
        // Words past the eighth (alphabetically) do not change the id.
        let base = "alpha bravo charlie delta echo foxtrot golf hotel";
        assert_eq!(
            Topic::fingerprint(base, ""),
            Topic::fingerprint(base, "zulu yankee")
        );
    }

    #[tokio::test]
    async fn test_curated_supplier_skips_duplicates() {
        let supplier = CuratedTopicSupplier::from_headlines([
            "Remote work is here to stay",
            "Remote work here to stay",
            "Four day week pilot results",
        ]);
        assert_eq!(supplier.remaining(), 3);

        let first = supplier.next_unused().await.unwrap().unwrap();
        let second = supplier.next_unused().await.unwrap().unwrap();
        assert_eq!(first.headline, "Remote work is here to stay");
        assert_eq!(second.headline, "Four day week pilot results");
        assert!(supplier.next_unused().await.unwrap().is_none());
        assert_eq!(supplier.remaining(), 0);
    }
}
