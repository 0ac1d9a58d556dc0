use std::path::PathBuf;
use thiserror::Error;

/// Why a command did not run to a clean exit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("command must not be empty")]
    EmptyCommand,
    #[error("command timed out after {0} seconds")]
    TimedOut(u64),
    #[error("command not found: {program} ({detail})")]
    SpawnFailed { program: String, detail: String },
    #[error("permission denied, insufficient privilege to run the command: {0}")]
    PermissionDenied(String),
    #[error("command exited with status {0}")]
    NonZeroExit(i32),
    #[error("execution failed: {0}")]
    Other(String),
}

/// Failures inside the natural-language translator. These never cross the
/// `Translator` boundary; they end up in `GeneratedCommand::translation_error`.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("API key is not set, export OPENAI_API_KEY")]
    MissingApiKey,
    #[error("request to the language model failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("language model API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("could not parse the language model reply: {0}")]
    Parse(String),
    #[error("language model returned an empty command")]
    EmptyCommand,
}

/// History persistence failures. Callers log these and keep going with the
/// in-memory view.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("failed to read history file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("history file {path} is corrupt: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to write history file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to encode history: {0}")]
    Encode(#[from] serde_json::Error),
}
