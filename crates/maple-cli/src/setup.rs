use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

use crate::config::Config;

const CONFIG_TEMPLATE: &str = r#"# maple configuration
#
# API keys are read from environment variables by default:
#   OPENAI_API_KEY, PUREMD_API_KEY
# Any setting can also be overridden with MAPLE_<SECTION>__<KEY>,
# e.g. MAPLE_TOOLSET__MAX_PARALLEL=10

# ── Model ────────────────────────────────────────────────────────
[provider]
# api_key = "sk-..."              # or set OPENAI_API_KEY env var
# base_url = "http://localhost:11434/v1"
model = "gpt-5-mini"
# temperature = 0.7

# [provider.parameters]
# reasoning_effort = "low"

# ── Web tools ────────────────────────────────────────────────────
[toolset]
base_url = "https://pure.md"
# api_key = "..."                 # or set PUREMD_API_KEY env var
max_parallel = 5
max_urls = 50
max_queries = 3
max_chars_per_result = 4000
timeout_secs = 5
cache_ttl_secs = 3600
max_connections = 20
# fetch_failure = "swallow"       # swallow | propagate
# search_failure = "propagate"

# ── Chat ─────────────────────────────────────────────────────────
[chat]
history_turns = 5
show_tool_calls = true
max_iterations = 20
# system_prompt = "..."           # replaces the built-in shopping instructions
"#;

pub fn run() -> Result<()> {
    let config_dir = Config::config_dir()?;
    let config_path = Config::config_path()?;

    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;

    if config_path.exists() {
        println!("Existing config file found:");
        println!("  {}", config_path.display());
        print!("\nOverwrite? (The existing file will be backed up) [y/N] ");
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Setup cancelled.");
            return Ok(());
        }

        backup_file(&config_path)?;
    }

    std::fs::write(&config_path, CONFIG_TEMPLATE)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    println!("Created {}", config_path.display());

    println!("\nNext steps:");
    println!("  1. Set your API key:  export OPENAI_API_KEY=\"sk-...\"");
    println!("  2. Start chatting:    maple");
    println!("  3. Or ask directly:   maple -p \"waterproof boots made in Canada\"");

    Ok(())
}

/// Back up a file to <name>.bak, appending a timestamp if .bak already exists.
fn backup_file(path: &Path) -> Result<()> {
    let mut backup = path.with_extension("toml.bak");

    if backup.exists() {
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        backup = path.with_extension(format!("toml.bak.{}", timestamp));
    }

    std::fs::rename(path, &backup)
        .with_context(|| format!("Failed to back up {} to {}", path.display(), backup.display()))?;
    println!("  Backed up to {}", backup.display());

    Ok(())
}
