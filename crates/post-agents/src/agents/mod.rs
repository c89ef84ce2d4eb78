//! Model-backed pipeline collaborators.
//!
//! Each agent wraps a shared [`ChatBackend`]. The `AgentFactory` ties them
//! together from an `AppConfig` and assembles a ready-to-run controller.

pub mod critics;
pub mod editor;
pub mod writer;

use std::sync::Arc;

use anyhow::{Context, Result};
use post_pipeline::{BatchController, Critic, CuratedTopicSupplier, PublishQueue, StyleCritic};

use crate::config::AppConfig;
use crate::llm::{ChatBackend, OpenAiChatClient};
use crate::queue::JsonlPublishQueue;
use crate::usage::CostTracker;
pub use critics::{Persona, PersonaCritic};
pub use editor::{LlmEditor, LlmFeedbackAggregator};
pub use writer::LlmWriter;

/// Factory that builds every agent from an `AppConfig`.
pub struct AgentFactory {
    pub backend: Arc<dyn ChatBackend>,
    pub costs: Arc<CostTracker>,
    pub config: AppConfig,
}

impl AgentFactory {
    /// Factory talking to the configured OpenAI-compatible endpoint.
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = OpenAiChatClient::new(&config.llm).context("building chat client")?;
        Ok(Self::with_backend(config, Arc::new(client)))
    }

    pub fn with_backend(config: &AppConfig, backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            backend,
            costs: Arc::new(CostTracker::new()),
            config: config.clone(),
        }
    }

    pub fn build_writer(&self) -> LlmWriter {
        LlmWriter::new(
            self.backend.clone(),
            self.costs.clone(),
            &self.config.llm.model,
            &self.config.brand,
            self.config.llm.writer_temperature,
        )
    }

    /// Three persona critics, plus the rule-based style critic unless
    /// `brand.style_critic` is off.
    pub fn build_critics(&self) -> Vec<Arc<dyn Critic>> {
        let mut critics: Vec<Arc<dyn Critic>> = Persona::ALL
            .into_iter()
            .map(|persona| {
                Arc::new(PersonaCritic::new(
                    persona,
                    self.backend.clone(),
                    self.costs.clone(),
                    &self.config.llm.model,
                    self.config.llm.critic_temperature,
                )) as Arc<dyn Critic>
            })
            .collect();
        if self.config.brand.style_critic {
            let brand = &self.config.brand;
            critics.push(Arc::new(
                StyleCritic::new()
                    .with_banned_phrases(brand.banned_phrases.iter().cloned())
                    .with_warning_phrases(brand.warning_phrases.iter().cloned()),
            ));
        }
        critics
    }

    pub fn build_aggregator(&self) -> LlmFeedbackAggregator {
        LlmFeedbackAggregator::new(
            self.backend.clone(),
            self.costs.clone(),
            &self.config.llm.model,
            self.config.llm.critic_temperature,
        )
    }

    pub fn build_editor(&self) -> LlmEditor {
        LlmEditor::new(
            self.backend.clone(),
            self.costs.clone(),
            &self.config.llm.model,
            &self.config.brand,
            self.config.llm.editor_temperature,
        )
    }

    pub fn build_queue(&self) -> Arc<dyn PublishQueue> {
        Arc::new(JsonlPublishQueue::new(&self.config.output.queue_path))
    }

    /// Wire every agent into a batch controller.
    ///
    /// Curated topics from the config become the topic supplier; with none
    /// configured every slot gets a freeform brief.
    pub fn build_controller(&self) -> Result<BatchController> {
        let mut builder = BatchController::builder()
            .config(self.config.pipeline.clone())
            .draft_producer(Arc::new(self.build_writer()))
            .critics(self.build_critics())
            .feedback_aggregator(Arc::new(self.build_aggregator()))
            .revision_producer(Arc::new(self.build_editor()))
            .publish_queue(self.build_queue())
            .avoid_seed(self.config.brand.avoid_topics.iter().cloned());
        let topics = self.config.curated_topics();
        if !topics.is_empty() {
            builder = builder.topic_supplier(Arc::new(CuratedTopicSupplier::new(topics)));
        }
        builder.build().context("assembling batch controller")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockChatBackend;

    fn factory(config: &AppConfig) -> AgentFactory {
        AgentFactory::with_backend(config, Arc::new(MockChatBackend::new()))
    }

    fn critic_names(factory: &AgentFactory) -> Vec<String> {
        factory
            .build_critics()
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    #[test]
    fn test_factory_builds_four_critics() {
        let names = critic_names(&factory(&AppConfig::default()));
        assert_eq!(names, ["customer", "creative_director", "strategist", "style"]);
    }

    #[test]
    fn test_factory_builds_controller() {
        let controller = factory(&AppConfig::default()).build_controller().unwrap();
        assert_eq!(controller.engine().critic_count(), 4);
    }

    #[test]
    fn test_personas_only_without_style_critic() {
        let mut config = AppConfig::default();
        config.brand.style_critic = false;
        let factory = factory(&config);
        assert_eq!(
            critic_names(&factory),
            ["customer", "creative_director", "strategist"]
        );
        let controller = factory.build_controller().unwrap();
        assert_eq!(controller.engine().critic_count(), 3);
    }
}
