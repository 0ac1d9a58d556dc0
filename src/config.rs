use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub execution: ExecutionConfig,
    pub history: HistoryConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    // OpenAI-compatible endpoint
    pub api_base: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
    // Never written to disk; filled from OPENAI_API_KEY.
    #[serde(skip)]
    pub api_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ExecutionConfig {
    // Seconds before a running command is killed
    pub command_timeout: u64,
    pub auto_confirm: bool,
    pub dangerous_command_check: bool,
    pub allow_destructive_commands: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct HistoryConfig {
    pub max_records: usize,
    // Defaults to ~/.nlsh/history.json
    pub file: Option<PathBuf>,
    // Prior turns handed to the translator
    pub context_size: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DisplayConfig {
    pub language: String,
    pub show_warnings: bool,
    pub color_output: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.3,
            max_tokens: 1000,
            request_timeout_secs: 60,
            api_key: None,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            command_timeout: 30,
            auto_confirm: false,
            dangerous_command_check: true,
            allow_destructive_commands: false,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_records: 100,
            file: None,
            context_size: 5,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            language: "auto".to_string(),
            show_warnings: true,
            color_output: true,
        }
    }
}

impl Config {
    /// Load the config at `path`, writing the defaults there on first run.
    /// Environment overrides are applied before validation.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            Self::load(path)?
        } else {
            let config = Config::default();
            if let Err(err) = config.save_to(path) {
                warn!(path = %path.display(), error = %err, "could not write default config");
            }
            config
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.llm.api_key = Some(key);
        }
        if let Some(base) = lookup("OPENAI_API_BASE").filter(|b| !b.trim().is_empty()) {
            self.llm.api_base = base;
        }
        if let Some(model) = lookup("NLSH_MODEL").filter(|m| !m.trim().is_empty()) {
            self.llm.model = model;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.execution.command_timeout == 0 {
            bail!("execution.command_timeout must be greater than 0");
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            bail!("llm.temperature must be between 0 and 2");
        }
        if self.history.max_records == 0 {
            bail!("history.max_records must be greater than 0");
        }
        if self.llm.request_timeout_secs == 0 {
            bail!("llm.request_timeout_secs must be greater than 0");
        }
        Ok(())
    }

    pub fn base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".nlsh")
    }

    pub fn default_config_path() -> PathBuf {
        Self::base_dir().join("config.toml")
    }

    pub fn history_path(&self) -> PathBuf {
        self.history
            .file
            .clone()
            .unwrap_or_else(|| Self::base_dir().join("history.json"))
    }

    pub fn get_effective_language(&self) -> String {
        if self.display.language == "auto" {
            std::env::var("LANG")
                .unwrap_or_else(|_| "en_US".to_string())
                .split('.')
                .next()
                .unwrap_or("en")
                .to_string()
        } else {
            self.display.language.clone()
        }
    }
}
