use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use maple_core::{AgentConfig, ShoppingAgent, ToolRegistry};
use maple_providers::OpenAIProvider;
use maple_tools::{create_web_tools, Toolset};

mod chat;
mod config;
mod prompt;
mod render;
mod setup;

use config::Config;
use prompt::{system_prompt, thinking_message};
use render::{run_turn, TerminalRenderer};

/// Log level for tracing output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Most verbose: all tracing including streamed chunks
    Trace,
    /// Verbose: requests, tool calls and cache hits
    Debug,
    /// Standard: one line per batch with timings
    Info,
    /// Quiet: only warnings and errors
    Warn,
    /// Minimal: only errors
    Error,
}

impl LogLevel {
    fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Parser)]
#[command(name = "maple")]
#[command(author, version, about = "Maple: find Canadian products, brands and gifts", long_about = None)]
pub struct Cli {
    /// Question to answer once, then exit
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Model to use (overrides config)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Base URL of an OpenAI-compatible API (overrides config)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Temperature (0.0-2.0)
    #[arg(short, long)]
    pub temperature: Option<f32>,

    /// Print only the answer, without tool activity
    #[arg(long)]
    pub hide_tool_calls: bool,

    /// Config file (defaults to ~/.config/maple/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_enum, default_value = "warn")]
    pub log_level: LogLevel,

    /// Enable debug logging (shorthand for --log-level debug)
    #[arg(short, long)]
    pub debug: bool,

    /// Write logs to file (JSON-lines format)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show current configuration
    Config,
    /// Write a config template to ~/.config/maple
    Setup,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        LogLevel::Debug
    } else {
        cli.log_level
    };

    let filter = EnvFilter::new(log_level.as_filter());

    if let Some(log_path) = &cli.log_file {
        let file = std::fs::File::create(log_path)
            .with_context(|| format!("Failed to create log file: {:?}", log_path))?;
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::sync::Mutex::new(file)))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    // Setup must work before any config exists
    if matches!(&cli.command, Some(Commands::Setup)) {
        return setup::run();
    }

    let config = Config::load(cli.config.as_deref())?;

    match &cli.command {
        Some(Commands::Config) => show_config(&config, cli.config.as_deref()),
        Some(Commands::Setup) => Ok(()),
        None => {
            let agent = build_agent(&cli, &config)?;
            let show_tool_calls = config.chat.show_tool_calls && !cli.hide_tool_calls;

            if let Some(prompt) = &cli.prompt {
                completion_mode(&agent, prompt, show_tool_calls).await
            } else {
                chat::run_chat(&agent, config.chat.history_turns, show_tool_calls).await
            }
        }
    }
}

fn build_agent(cli: &Cli, config: &Config) -> Result<ShoppingAgent> {
    let api_key = config
        .provider
        .api_key
        .clone()
        .filter(|key| !key.is_empty())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "No API key configured. Set OPENAI_API_KEY or add api_key under [provider] (see `maple setup`)"
            )
        })?;

    let model = cli.model.clone().unwrap_or_else(|| config.provider.model.clone());
    let mut provider = OpenAIProvider::new(api_key).with_default_model(model.as_str());
    if let Some(base_url) = cli.base_url.as_ref().or(config.provider.base_url.as_ref()) {
        provider = provider.with_base_url(base_url.as_str());
    }

    let toolset = Toolset::new(config.toolset.clone()).context("Failed to create web toolset")?;
    let mut tools = ToolRegistry::new();
    for tool in create_web_tools(Arc::new(toolset)) {
        tools.register(tool);
    }

    let system = system_prompt(config.chat.system_prompt.as_deref(), chrono::Local::now());
    let agent_config = AgentConfig::new("maple")
        .with_system_prompt(system)
        .with_model(Some(model))
        .with_temperature(cli.temperature.or(config.provider.temperature))
        .with_max_iterations(config.chat.max_iterations)
        .with_parameters(config.provider.parameters.clone());

    tracing::debug!(
        model = %agent_config.model.as_deref().unwrap_or_default(),
        tools = tools.len(),
        "Agent ready"
    );

    Ok(ShoppingAgent::new(
        Arc::new(provider),
        Arc::new(tools),
        agent_config,
    ))
}

async fn completion_mode(agent: &ShoppingAgent, prompt: &str, show_tool_calls: bool) -> Result<()> {
    let mut renderer = TerminalRenderer::stdio(show_tool_calls);
    run_turn(agent, Vec::new(), prompt, thinking_message(), &mut renderer).await?;
    Ok(())
}

fn show_config(config: &Config, path: Option<&std::path::Path>) -> Result<()> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => Config::config_path()?,
    };
    println!("# {}", path.display());
    let rendered = toml::to_string_pretty(&config.redacted()).context("Failed to render config")?;
    print!("{}", rendered);
    Ok(())
}
