use crate::config::LlmConfig;
use crate::error::TranslateError;
use crate::types::{ExecutionStatus, GeneratedCommand, HistoryRecord};
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, warn};

/// How many prior turns make it into the prompt.
const PROMPT_CONTEXT_TURNS: usize = 3;

static JSON_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("static regex must compile"));

/// Turns a natural-language request into a shell command.
///
/// Implementations never fail: problems are reported through
/// `GeneratedCommand::translation_error`.
pub trait Translator {
    fn translate(&self, input: &str, context: &[HistoryRecord], system: &SystemInfo) -> GeneratedCommand;
}

/// Facts about the host that shape the generated command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemInfo {
    pub platform: String,
    pub shell: String,
    pub current_dir: String,
    pub arch: String,
}

impl SystemInfo {
    pub fn detect() -> Self {
        let current_dir = std::env::current_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            platform: platform_name().to_string(),
            shell: detect_shell(|key| std::env::var(key).ok()),
            current_dir,
            arch: std::env::consts::ARCH.to_string(),
        }
    }
}

fn platform_name() -> &'static str {
    match std::env::consts::OS {
        "windows" => "Windows",
        "macos" => "Darwin",
        "linux" => "Linux",
        other => other,
    }
}

fn detect_shell(env: impl Fn(&str) -> Option<String>) -> String {
    if cfg!(windows) {
        return if env("PSModulePath").is_some() {
            "PowerShell".to_string()
        } else {
            "cmd".to_string()
        };
    }
    let shell = env("SHELL").unwrap_or_default();
    ["bash", "zsh", "fish"]
        .into_iter()
        .find(|name| shell.contains(name))
        .unwrap_or("sh")
        .to_string()
}

/// Talks to an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiTranslator {
    client: reqwest::blocking::Client,
    config: LlmConfig,
    language: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ModelReply {
    command: String,
    #[serde(default)]
    explanation: String,
    #[serde(default)]
    warnings: Vec<String>,
}

impl OpenAiTranslator {
    pub fn new(config: &LlmConfig, language: &str) -> Result<Self, TranslateError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            config: config.clone(),
            language: language.to_string(),
        })
    }

    fn request(&self, input: &str, context: &[HistoryRecord], system: &SystemInfo) -> Result<GeneratedCommand, TranslateError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(TranslateError::MissingApiKey)?;
        let url = format!("{}/chat/completions", self.config.api_base.trim_end_matches('/'));
        let body = json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": build_system_prompt(system, &self.language) },
                { "role": "user", "content": build_user_prompt(input, context) },
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });

        debug!(url = %url, model = %self.config.model, "requesting translation");
        let response = self.client.post(&url).bearer_auth(api_key).json(&body).send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(TranslateError::Api {
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }

        let chat: ChatResponse = response.json()?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| TranslateError::Parse("reply has no choices".to_string()))?;
        parse_reply(&content)
    }
}

impl Translator for OpenAiTranslator {
    fn translate(&self, input: &str, context: &[HistoryRecord], system: &SystemInfo) -> GeneratedCommand {
        match self.request(input, context, system) {
            Ok(generated) => generated,
            Err(err) => {
                warn!(error = %err, "translation failed");
                GeneratedCommand::failed(err.to_string())
            }
        }
    }
}

/// Pull the first `{...}` object out of a model reply, tolerating code
/// fences and chatter around it.
pub fn parse_reply(content: &str) -> Result<GeneratedCommand, TranslateError> {
    let object = JSON_OBJECT
        .find(content)
        .ok_or_else(|| TranslateError::Parse("no JSON object in reply".to_string()))?;
    let reply: ModelReply =
        serde_json::from_str(object.as_str()).map_err(|e| TranslateError::Parse(e.to_string()))?;
    let command = reply.command.trim();
    if command.is_empty() {
        return Err(TranslateError::EmptyCommand);
    }
    Ok(GeneratedCommand::new(command, reply.explanation).with_warnings(reply.warnings))
}

pub fn build_system_prompt(system: &SystemInfo, language: &str) -> String {
    let (example_cmd, example_explanation) = match system.shell.as_str() {
        "PowerShell" => ("Get-ChildItem", "List files and folders in the current directory"),
        "cmd" => ("dir", "Show files and folders in the current directory"),
        _ => ("ls -la", "List all files, including hidden ones, with details"),
    };
    let explain_in = if language.starts_with("zh") {
        "Chinese"
    } else {
        "English"
    };

    format!(
        r#"You are a shell command expert. Translate the user's request into one precise shell command.

System:
- OS: {platform}
- Shell: {shell}
- Current directory: {cwd}
- Architecture: {arch}

Rules:
1. Return only the command itself in "command", with no commentary inside it.
2. The command must run in {shell} on {platform}.
3. For PowerShell use cmdlets (Get-ChildItem, Get-Process); for cmd use cmd built-ins (dir, tasklist); for bash/zsh/sh use Unix tools (ls, ps).
4. If the request is ambiguous, return the most common command for it.
5. If the command could be destructive (deleting, overwriting, killing), say so in "warnings".
6. Write the explanation in {explain_in}.
7. Reply with JSON only:
   {{"command": "...", "explanation": "...", "warnings": ["..."]}}

Example:
User: "show all files in the current directory"
Reply: {{"command": "{example_cmd}", "explanation": "{example_explanation}", "warnings": []}}
"#,
        platform = system.platform,
        shell = system.shell,
        cwd = system.current_dir,
        arch = system.arch,
    )
}

pub fn build_user_prompt(input: &str, context: &[HistoryRecord]) -> String {
    let mut prompt = String::new();
    let start = context.len().saturating_sub(PROMPT_CONTEXT_TURNS);
    let recent = &context[start..];
    if !recent.is_empty() {
        prompt.push_str("Recent commands, for reference:\n");
        for (i, record) in recent.iter().enumerate() {
            let outcome = if record.status == ExecutionStatus::Success {
                "succeeded"
            } else {
                "failed"
            };
            prompt.push_str(&format!(
                "{}. Request: {}\n   Command: {}\n   Result: {}\n",
                i + 1,
                record.user_input,
                record.command,
                outcome
            ));
        }
        prompt.push('\n');
    }
    prompt.push_str(&format!("Current request: {input}\nReply with the JSON command."));
    prompt
}
