use crate::error::ExecutionError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Upper bound on the command output kept in a history record.
pub const MAX_RECORDED_OUTPUT: usize = 500;

/// One natural-language request from the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    raw_text: String,
}

impl CommandRequest {
    pub fn new(raw_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
        }
    }

    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }
}

/// What the translator produced for a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedCommand {
    pub text: String,
    pub explanation: String,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub translation_error: Option<String>,
}

impl GeneratedCommand {
    pub fn new(text: impl Into<String>, explanation: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            explanation: explanation.into(),
            warnings: Vec::new(),
            translation_error: None,
        }
    }

    /// A failed translation. `text` is a harmless placeholder that is never
    /// executed.
    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            text: "echo \"translation failed\"".to_string(),
            explanation: error.clone(),
            warnings: Vec::new(),
            translation_error: Some(error),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Failure,
    Cancelled,
    TimedOut,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failure => "failure",
            ExecutionStatus::Cancelled => "cancelled",
            ExecutionStatus::TimedOut => "timed_out",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one execution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub command: String,
    pub error: Option<ExecutionError>,
}

impl ExecutionResult {
    /// Result for a process that exited on its own.
    pub fn exited(command: &str, exit_code: i32, stdout: &str, stderr: &str) -> Self {
        let (status, error) = if exit_code == 0 {
            (ExecutionStatus::Success, None)
        } else {
            (ExecutionStatus::Failure, Some(ExecutionError::NonZeroExit(exit_code)))
        };
        Self {
            status,
            stdout: stdout.trim().to_string(),
            stderr: stderr.trim().to_string(),
            exit_code,
            command: command.to_string(),
            error,
        }
    }

    /// Result for an attempt that never produced an exit code.
    pub fn failed(command: &str, error: ExecutionError) -> Self {
        let status = match error {
            ExecutionError::TimedOut(_) => ExecutionStatus::TimedOut,
            _ => ExecutionStatus::Failure,
        };
        Self {
            status,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: -1,
            command: command.to_string(),
            error: Some(error),
        }
    }

    pub fn cancelled(command: &str) -> Self {
        Self {
            status: ExecutionStatus::Cancelled,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: -1,
            command: command.to_string(),
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }

    /// Human-readable error text: the typed error if there is one, then
    /// whatever the process wrote to stderr.
    pub fn error_text(&self) -> String {
        match (&self.error, self.stderr.is_empty()) {
            (Some(ExecutionError::NonZeroExit(_)), false) => self.stderr.clone(),
            (Some(err), true) => err.to_string(),
            (Some(err), false) => format!("{}: {}", err, self.stderr),
            (None, _) => self.stderr.clone(),
        }
    }
}

/// One line of the history log.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HistoryRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub user_input: String,
    pub command: String,
    pub status: ExecutionStatus,
    pub output: String,
    pub error: String,
    pub exit_code: i32,
}

impl HistoryRecord {
    pub fn from_result(user_input: &str, result: &ExecutionResult) -> Self {
        let timestamp = Utc::now();
        let normalized = normalize_command(&result.command);
        Self {
            id: format!("{}_{}", &command_hash(&normalized)[..12], timestamp.timestamp_millis()),
            timestamp,
            user_input: user_input.to_string(),
            command: result.command.clone(),
            status: result.status,
            output: truncate_chars(&result.stdout, MAX_RECORDED_OUTPUT),
            error: if result.is_success() {
                String::new()
            } else {
                result.error_text()
            },
            exit_code: result.exit_code,
        }
    }
}

/// Collapse whitespace runs and drop spaces around pipes so that
/// `ls  -la |grep x` and `ls -la | grep x` compare equal.
pub fn normalize_command(command: &str) -> String {
    let chars: Vec<char> = command.trim().chars().collect();
    let mut result = String::with_capacity(chars.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() || c == '|' {
            let mut saw_pipe = false;
            while i < chars.len() && (chars[i].is_whitespace() || chars[i] == '|') {
                if chars[i] == '|' {
                    if saw_pipe {
                        break;
                    }
                    saw_pipe = true;
                }
                i += 1;
            }
            result.push(if saw_pipe { '|' } else { ' ' });
        } else {
            result.push(c);
            i += 1;
        }
    }

    result.trim().to_string()
}

pub fn command_hash(command: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(command.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
