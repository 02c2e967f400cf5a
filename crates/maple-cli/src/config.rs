use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use maple_tools::ToolsetConfig;

pub const DEFAULT_MODEL: &str = "gpt-5-mini";

/// Application configuration.
///
/// Sources, lowest to highest priority: built-in defaults, the TOML file,
/// `OPENAI_API_KEY` / `PUREMD_API_KEY` (also with a `MAPLE_` prefix), then
/// `MAPLE_`-prefixed variables (`MAPLE_TOOLSET__MAX_PARALLEL=10`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub toolset: ToolsetConfig,
    pub chat: ChatConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_key: Option<String>,

    /// OpenAI-compatible endpoint; the OpenAI API when unset.
    pub base_url: Option<String>,

    pub model: String,

    pub temperature: Option<f32>,

    /// Extra parameters to pass to the API (e.g., reasoning_effort)
    pub parameters: HashMap<String, serde_json::Value>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: None,
            parameters: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Previous question/answer pairs sent along with each prompt.
    pub history_turns: usize,

    /// Show status lines for tool calls while the agent works.
    pub show_tool_calls: bool,

    pub max_iterations: usize,

    /// Replaces the built-in shopping instructions.
    pub system_prompt: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_turns: 5,
            show_tool_calls: true,
            max_iterations: 20,
            system_prompt: None,
        }
    }
}

impl Config {
    /// Load from `path`, or from the default location when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        Self::figment(&path)
            .extract()
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(
                Env::raw()
                    .only(&["OPENAI_API_KEY", "MAPLE_OPENAI_API_KEY"])
                    .map(|_| "provider.api_key".into()),
            )
            .merge(
                Env::raw()
                    .only(&["PUREMD_API_KEY", "MAPLE_PUREMD_API_KEY"])
                    .map(|_| "toolset.api_key".into()),
            )
            .merge(Env::prefixed("MAPLE_").split("__"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("maple"))
    }

    /// A copy that is safe to print.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        let mask = |key: &mut Option<String>| {
            if key.is_some() {
                *key = Some("(configured)".to_string());
            }
        };
        mask(&mut config.provider.api_key);
        mask(&mut config.toolset.api_key);
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maple_tools::FailurePolicy;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.provider.model, DEFAULT_MODEL);
        assert_eq!(config.chat.history_turns, 5);
        assert!(config.chat.show_tool_calls);
        assert_eq!(config.toolset.max_queries, 3);
    }

    #[test]
    fn test_load_partial_file() {
        let file = write_config(
            r#"
            [provider]
            model = "gpt-4.1"
            base_url = "http://localhost:11434/v1"

            [toolset]
            max_parallel = 8
            search_failure = "swallow"

            [chat]
            show_tool_calls = false
            "#,
        );

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.provider.model, "gpt-4.1");
        assert_eq!(config.provider.base_url.as_deref(), Some("http://localhost:11434/v1"));
        assert_eq!(config.toolset.max_parallel, 8);
        assert_eq!(config.toolset.max_urls, 50);
        assert_eq!(config.toolset.search_failure, FailurePolicy::Swallow);
        assert!(!config.chat.show_tool_calls);
        assert_eq!(config.chat.history_turns, 5);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.chat.max_iterations, 20);
    }

    #[test]
    fn test_invalid_value_is_error() {
        let file = write_config("[toolset]\nmax_parallel = \"lots\"\n");
        assert!(Config::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_redacted_hides_keys() {
        let mut config = Config::default();
        config.provider.api_key = Some("sk-secret".into());
        let shown = config.redacted();
        assert_eq!(shown.provider.api_key.as_deref(), Some("(configured)"));
        assert!(shown.toolset.api_key.is_none());
    }
}
