use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use post_agents::{AgentFactory, AppConfig};
use tracing::{info, warn};

/// Generate, critique and queue LinkedIn posts.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file (defaults to ./post-agents.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one batch
    Run {
        /// Number of posts to produce
        #[arg(long, short = 'n', default_value_t = 3)]
        count: usize,

        /// Write the batch outcome as JSON to this path (overrides output.report_path)
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Validate the configuration and print the effective settings
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref())?;

    match args.command {
        Command::Check => check(&config),
        Command::Run { count, report } => run(&config, count, report).await,
    }
}

fn check(config: &AppConfig) -> Result<()> {
    let factory = AgentFactory::new(config)?;
    let controller = factory.build_controller()?;
    info!(
        model = %config.llm.model,
        base_url = %config.llm.base_url,
        critics = ?controller.engine().critic_names(),
        curated_topics = config.topics.curated.len(),
        queue = %config.output.queue_path.display(),
        "configuration ok"
    );
    let mut shown = config.clone();
    if shown.llm.api_key.is_some() {
        shown.llm.api_key = Some("<redacted>".into());
    }
    println!("{}", toml::to_string_pretty(&shown).context("rendering config")?);
    Ok(())
}

async fn run(config: &AppConfig, count: usize, report: Option<PathBuf>) -> Result<()> {
    if config.llm.api_key.is_none() {
        warn!("no API key configured; set POST_LLM_API_KEY unless the endpoint needs none");
    }
    let factory = AgentFactory::new(config)?;
    let controller = factory.build_controller()?;

    let outcome = controller.run(count).await;
    let usage = factory.costs.summary();
    info!(
        calls = usage.calls,
        tokens = usage.total_tokens,
        cost = %format!("${:.4}", usage.total_cost),
        "model usage"
    );

    if let Some(path) = report.or_else(|| config.output.report_path.clone()) {
        let json = serde_json::to_string_pretty(&serde_json::json!({
            "outcome": outcome,
            "usage": usage,
        }))?;
        std::fs::write(&path, json).with_context(|| format!("writing report {}", path.display()))?;
        info!(path = %path.display(), "batch report written");
    }

    println!("{}", outcome.summary());
    Ok(())
}
