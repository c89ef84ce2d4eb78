//! Rule-based style critic.
//!
//! Scores deterministically, without a model call:
//!
//! | Criterion   | Points | Signal                                        |
//! |-------------|--------|-----------------------------------------------|
//! | specificity | 0–3    | digits, capitalised names mid-sentence        |
//! | brevity     | 0–2    | total word count, longest line                |
//! | voice       | 0–3    | rhetorical questions cost a point each        |
//! | ending      | 0–2    | short closing line                            |
//!
//! Each warning phrase costs 0.5. Any banned phrase short-circuits to a
//! fixed 4.0 with the secondary gate failed.

use async_trait::async_trait;
use serde_json::json;

use crate::candidate::Candidate;
use crate::errors::CallError;
use crate::verdict::{Breakdown, Verdict};

use super::Critic;

/// Score assigned when a banned phrase is present.
pub const BANNED_PHRASE_SCORE: f64 = 4.0;

/// Penalty per warning phrase.
pub const WARNING_PENALTY: f64 = 0.5;

const DEFAULT_BANNED: &[&str] = &[
    "in a world where",
    "in a world obsessed",
    "don't forget to",
    "remember to",
    "it's okay to",
    "you deserve",
    "self-care is",
    "take a moment to",
    "radical act",
    "rebellion against",
    "invest in yourself",
    "you're not alone",
    "in this together",
    "checking in on your",
    "who's taking time",
    "deserves it",
    "digital chaos",
    "slow down",
];

const DEFAULT_WARNINGS: &[&str] = &[
    "take care of",
    "self care",
    "wellness",
    "mindful",
    "breathe",
    "pause and",
    "moment for",
];

pub struct StyleCritic {
    name: String,
    banned: Vec<String>,
    warnings: Vec<String>,
}

impl Default for StyleCritic {
    fn default() -> Self {
        Self::new()
    }
}

impl StyleCritic {
    pub fn new() -> Self {
        Self {
            name: "style".to_string(),
            banned: DEFAULT_BANNED.iter().map(|s| s.to_string()).collect(),
            warnings: DEFAULT_WARNINGS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add brand-specific banned phrases (matched case-insensitively).
    pub fn with_banned_phrases<I, S>(mut self, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.banned
            .extend(phrases.into_iter().map(|p| p.as_ref().to_lowercase()));
        self
    }

    pub fn with_warning_phrases<I, S>(mut self, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.warnings
            .extend(phrases.into_iter().map(|p| p.as_ref().to_lowercase()));
        self
    }

    /// Score `content` without going through the trait.
    pub fn assess(&self, content: &str) -> Verdict {
        let lowered = content.to_lowercase();

        let banned: Vec<&str> = self
            .banned
            .iter()
            .filter(|p| lowered.contains(p.as_str()))
            .map(String::as_str)
            .collect();
        if !banned.is_empty() {
            let feedback = format!(
                "banned phrasing: {}",
                banned.iter().take(3).copied().collect::<Vec<_>>().join("; ")
            );
            let mut breakdown = Breakdown::new();
            breakdown.insert("banned_phrases".to_string(), json!(banned));
            return Verdict::new(&self.name, BANNED_PHRASE_SCORE, false, feedback, breakdown);
        }

        let warnings: Vec<&str> = self
            .warnings
            .iter()
            .filter(|p| lowered.contains(p.as_str()))
            .map(String::as_str)
            .collect();

        let specificity = specificity_points(content);
        let brevity = brevity_points(content);
        let voice = voice_points(content);
        let ending = ending_points(content);
        let raw = specificity + brevity + voice + ending;
        let score = (raw - WARNING_PENALTY * warnings.len() as f64).max(0.0);

        let mut notes = Vec::new();
        if specificity < 2.0 {
            notes.push("name a real company, person, or number");
        }
        if brevity < 2.0 {
            notes.push("cut it down to short lines");
        }
        if voice < 3.0 {
            notes.push("drop the rhetorical questions");
        }
        if ending < 2.0 {
            notes.push("land the ending in one short line");
        }
        if !warnings.is_empty() {
            notes.push("wellness vocabulary creeping in");
        }
        let feedback = if notes.is_empty() {
            "specific, short, deadpan".to_string()
        } else {
            notes.join("; ")
        };

        Verdict::new(&self.name, score, true, feedback, Breakdown::new())
            .with_criterion("specificity", specificity)
            .with_criterion("brevity", brevity)
            .with_criterion("voice", voice)
            .with_criterion("ending", ending)
            .with_criterion("warnings", json!(warnings))
    }
}

#[async_trait]
impl Critic for StyleCritic {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, candidate: &Candidate) -> Result<Verdict, CallError> {
        Ok(self.assess(candidate.content()))
    }
}

fn specificity_points(content: &str) -> f64 {
    let mut points: f64 = 0.0;
    if content.chars().any(|c| c.is_ascii_digit()) {
        points += 1.5;
    }
    if has_proper_noun(content) {
        points += 1.5;
    }
    if points == 0.0 && content.contains('"') {
        // Quoted detail is at least concrete.
        points = 1.0;
    }
    points.min(3.0)
}

/// A capitalised word that does not start a sentence or a line.
fn has_proper_noun(content: &str) -> bool {
    content.lines().any(|line| {
        let mut sentence_start = true;
        for token in line.split_whitespace() {
            let word = token.trim_matches(|c: char| !c.is_alphanumeric());
            let capitalised = word.chars().next().is_some_and(char::is_uppercase);
            if capitalised && !sentence_start && word != "I" {
                return true;
            }
            sentence_start = token.ends_with(['.', '!', '?', ':']);
        }
        false
    })
}

fn brevity_points(content: &str) -> f64 {
    let words = content.split_whitespace().count();
    let longest_line = content
        .lines()
        .map(|l| l.split_whitespace().count())
        .max()
        .unwrap_or(0);
    match (words, longest_line) {
        (w, l) if w <= 100 && l <= 25 => 2.0,
        (w, _) if w <= 180 => 1.0,
        _ => 0.0,
    }
}

fn voice_points(content: &str) -> f64 {
    let questions = content
        .lines()
        .filter(|l| l.trim_end().ends_with('?'))
        .count();
    (3.0 - questions as f64).max(0.0)
}

fn ending_points(content: &str) -> f64 {
    let last = content.lines().rev().map(str::trim).find(|l| !l.is_empty());
    match last.map(|l| l.split_whitespace().count()) {
        Some(n) if n <= 12 => 2.0,
        Some(_) => 1.0,
        None => 0.0,
    }
}
