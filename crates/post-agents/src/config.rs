//! Application configuration for the post agents binary.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Environment variable overrides (e.g. `POST_LLM_MODEL`)
//! 2. Values in the TOML file (`--config`, else `post-agents.toml` if present)
//! 3. Built-in defaults
//!
//! | Variable            | Field              | Default                      |
//! |---------------------|--------------------|------------------------------|
//! | `POST_LLM_BASE_URL` | `llm.base_url`     | `https://api.openai.com/v1`  |
//! | `POST_LLM_API_KEY`  | `llm.api_key`      | unset                        |
//! | `POST_LLM_MODEL`    | `llm.model`        | `gpt-4o-mini`                |
//! | `POST_QUEUE_PATH`   | `output.queue_path`| `publish-queue.jsonl`        |

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use post_pipeline::{PipelineConfig, Topic};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const DEFAULT_CONFIG_FILE: &str = "post-agents.toml";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_QUEUE_PATH: &str = "publish-queue.jsonl";

const ENV_BASE_URL: &str = "POST_LLM_BASE_URL";
const ENV_API_KEY: &str = "POST_LLM_API_KEY";
const ENV_MODEL: &str = "POST_LLM_MODEL";
const ENV_QUEUE_PATH: &str = "POST_QUEUE_PATH";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
    pub brand: BrandConfig,
    pub topics: TopicsConfig,
    pub output: OutputConfig,
}

/// Model endpoint and sampling settings shared by every agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub request_timeout_secs: u64,
    pub writer_temperature: f32,
    pub critic_temperature: f32,
    pub editor_temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            request_timeout_secs: 90,
            writer_temperature: 0.9,
            critic_temperature: 0.3,
            editor_temperature: 0.7,
        }
    }
}

/// Voice the writer aims for and the phrases the style critic polices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrandConfig {
    pub name: String,
    pub voice: String,
    pub audience: String,
    pub banned_phrases: Vec<String>,
    pub warning_phrases: Vec<String>,
    /// Topics to keep out of every batch.
    pub avoid_topics: Vec<String>,
    /// Add the rule-based style critic to the three personas.
    pub style_critic: bool,
}

impl Default for BrandConfig {
    fn default() -> Self {
        Self {
            name: "Jesse A. Eisenbalm".to_string(),
            voice: "deadpan, self-aware, a little absurd; calm about chaos".to_string(),
            audience: "burned-out professionals scrolling LinkedIn between meetings".to_string(),
            banned_phrases: vec![
                "synergy".to_string(),
                "game-changer".to_string(),
                "thought leader".to_string(),
            ],
            warning_phrases: vec![
                "hustle".to_string(),
                "grindset".to_string(),
                "wellness".to_string(),
            ],
            avoid_topics: Vec::new(),
            style_critic: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicsConfig {
    pub curated: Vec<TopicEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicEntry {
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

impl From<&TopicEntry> for Topic {
    fn from(entry: &TopicEntry) -> Self {
        let mut topic = Topic::new(entry.headline.clone(), entry.summary.clone());
        if let Some(category) = &entry.category {
            topic = topic.with_category(category.clone());
        }
        if let Some(source) = &entry.source {
            topic = topic.with_source(source.clone(), entry.url.clone());
        }
        topic
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// JSON Lines file approved posts are appended to.
    pub queue_path: PathBuf,
    /// Where `run --report` writes the batch outcome.
    pub report_path: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            queue_path: PathBuf::from(DEFAULT_QUEUE_PATH),
            report_path: None,
        }
    }
}

impl AppConfig {
    /// Load configuration, then apply process environment overrides.
    ///
    /// An explicit `path` must exist. Without one, `post-agents.toml` in the
    /// working directory is used when present, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => {
                debug!("no config file; using defaults");
                Self::default()
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self =
            toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
        info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Apply overrides from `lookup` (the process environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_BASE_URL) {
            self.llm.base_url = url;
        }
        if let Some(key) = lookup(ENV_API_KEY) {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = lookup(ENV_MODEL) {
            self.llm.model = model;
        }
        if let Some(path) = lookup(ENV_QUEUE_PATH) {
            self.output.queue_path = PathBuf::from(path);
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.pipeline
            .validate()
            .context("invalid [pipeline] section")?;
        anyhow::ensure!(!self.llm.model.is_empty(), "llm.model must not be empty");
        anyhow::ensure!(
            self.llm.request_timeout_secs > 0,
            "llm.request_timeout_secs must be > 0"
        );
        Ok(())
    }

    pub fn curated_topics(&self) -> Vec<Topic> {
        self.topics.curated.iter().map(Topic::from).collect()
    }
}
