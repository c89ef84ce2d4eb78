//! Model-backed collaborators for `post-pipeline`.
//!
//! - [`llm`]: OpenAI-compatible chat client behind the `ChatBackend` trait
//! - [`agents`]: writer, persona critics, feedback aggregator, editor
//! - [`queue`]: JSON Lines publish queue
//! - [`usage`]: per-agent token and cost accounting
//! - [`config`]: TOML configuration with environment overrides

pub mod agents;
pub mod config;
pub mod llm;
pub mod prompts;
pub mod queue;
pub mod usage;

pub use agents::AgentFactory;
pub use config::AppConfig;
