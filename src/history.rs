use crate::error::HistoryError;
use crate::fuzzy_matcher::FzfMatcher;
use crate::types::{normalize_command, ExecutionStatus, HistoryRecord};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryStats {
    pub total: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub success_rate: f64,
    /// Most frequently executed commands, `(command, count)`, busiest first.
    pub top_commands: Vec<(String, usize)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Json,
    Txt,
    Csv,
}

/// Bounded, append-only log of executed turns, oldest first.
///
/// The log is mutated only through `&mut self`, so whoever owns it is the
/// single writer.
#[derive(Debug)]
pub struct HistoryLog {
    path: Option<PathBuf>,
    max_records: usize,
    records: Vec<HistoryRecord>,
}

impl HistoryLog {
    /// Open the log backed by `path`. A missing file is an empty log; an
    /// unreadable or corrupt one is logged and also treated as empty.
    pub fn open(path: impl Into<PathBuf>, max_records: usize) -> Self {
        let path = path.into();
        let mut records = match Self::load(&path) {
            Ok(records) => records,
            Err(err) => {
                warn!(error = %err, "starting with an empty history");
                Vec::new()
            }
        };
        evict(&mut records, max_records);
        debug!(path = %path.display(), count = records.len(), "history loaded");
        Self {
            path: Some(path),
            max_records,
            records,
        }
    }

    /// A log that never touches disk.
    pub fn in_memory(max_records: usize) -> Self {
        Self {
            path: None,
            max_records,
            records: Vec::new(),
        }
    }

    fn load(path: &Path) -> Result<Vec<HistoryRecord>, HistoryError> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(path).map_err(|source| HistoryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content).map_err(|source| HistoryError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn save(&self) -> Result<(), HistoryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let write_err = |source: std::io::Error| HistoryError::Write {
            path: path.clone(),
            source,
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(write_err)?;
        }
        let content = serde_json::to_string_pretty(&self.records)?;
        fs::write(path, content).map_err(write_err)
    }

    /// Append a record, evicting the oldest ones beyond the cap. The
    /// in-memory log is updated even when persisting fails.
    pub fn append(&mut self, record: HistoryRecord) -> Result<(), HistoryError> {
        self.records.push(record);
        evict(&mut self.records, self.max_records);
        self.save()
    }

    /// The last `n` records, most recent last.
    pub fn recent(&self, n: usize) -> &[HistoryRecord] {
        let start = self.records.len().saturating_sub(n);
        &self.records[start..]
    }

    pub fn all(&self) -> &[HistoryRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) -> Result<(), HistoryError> {
        self.records.clear();
        self.save()
    }

    pub fn statistics(&self) -> HistoryStats {
        let total = self.records.len();
        let success_count = self
            .records
            .iter()
            .filter(|r| r.status == ExecutionStatus::Success)
            .count();

        let mut counts: HashMap<String, usize> = HashMap::new();
        for record in &self.records {
            *counts.entry(normalize_command(&record.command)).or_default() += 1;
        }
        let mut top_commands: Vec<(String, usize)> = counts.into_iter().collect();
        top_commands.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_commands.truncate(5);

        HistoryStats {
            total,
            success_count,
            error_count: total - success_count,
            success_rate: if total == 0 {
                0.0
            } else {
                success_count as f64 / total as f64
            },
            top_commands,
        }
    }

    /// Fuzzy search over the request text and the command, best match first.
    pub fn search(&self, query: &str) -> Vec<&HistoryRecord> {
        let matcher = FzfMatcher::new();
        let items = self
            .records
            .iter()
            .map(|r| (r, format!("{} {}", r.user_input, r.command)))
            .collect();
        matcher
            .match_and_sort(query.trim(), items)
            .into_iter()
            .map(|(record, _, _)| record)
            .collect()
    }

    pub fn export(&self, output: &Path, format: ExportFormat) -> Result<()> {
        let file = fs::File::create(output)
            .with_context(|| format!("failed to create {}", output.display()))?;
        match format {
            ExportFormat::Json => {
                serde_json::to_writer_pretty(file, &self.records)?;
            }
            ExportFormat::Txt => {
                let mut out = std::io::BufWriter::new(file);
                for (i, r) in self.records.iter().enumerate() {
                    writeln!(out, "=== Record {} ===", i + 1)?;
                    writeln!(out, "Time: {}", r.timestamp.to_rfc3339())?;
                    writeln!(out, "Input: {}", r.user_input)?;
                    writeln!(out, "Command: {}", r.command)?;
                    writeln!(out, "Status: {}", r.status)?;
                    writeln!(out, "Exit code: {}", r.exit_code)?;
                    writeln!(out, "Output: {}", r.output)?;
                    if !r.error.is_empty() {
                        writeln!(out, "Error: {}", r.error)?;
                    }
                    writeln!(out)?;
                }
                out.flush()?;
            }
            ExportFormat::Csv => {
                let mut writer = csv::Writer::from_writer(file);
                for r in &self.records {
                    writer.serialize(r)?;
                }
                writer.flush()?;
            }
        }
        Ok(())
    }
}

fn evict(records: &mut Vec<HistoryRecord>, max: usize) {
    if records.len() > max {
        let excess = records.len() - max;
        records.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExecutionResult;

    fn record(input: &str, command: &str, exit_code: i32) -> HistoryRecord {
        HistoryRecord::from_result(input, &ExecutionResult::exited(command, exit_code, "out", ""))
    }

    #[test]
    fn cap_evicts_oldest_first() {
        let mut log = HistoryLog::in_memory(3);
        for i in 0..5 {
            log.append(record(&format!("req {i}"), &format!("echo {i}"), 0)).unwrap();
        }
        assert_eq!(log.len(), 3);
        let commands: Vec<_> = log.all().iter().map(|r| r.command.as_str()).collect();
        assert_eq!(commands, vec!["echo 2", "echo 3", "echo 4"]);
    }

    #[test]
    fn recent_returns_most_recent_last() {
        let mut log = HistoryLog::in_memory(10);
        for i in 0..4 {
            log.append(record("r", &format!("echo {i}"), 0)).unwrap();
        }
        let recent: Vec<_> = log.recent(2).iter().map(|r| r.command.as_str()).collect();
        assert_eq!(recent, vec!["echo 2", "echo 3"]);
        assert_eq!(log.recent(100).len(), 4);
        assert!(HistoryLog::in_memory(5).recent(3).is_empty());
    }

    #[test]
    fn persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        {
            let mut log = HistoryLog::open(&path, 10);
            log.append(record("list", "ls", 0)).unwrap();
            log.append(record("fail", "false", 1)).unwrap();
        }
        let log = HistoryLog::open(&path, 10);
        assert_eq!(log.len(), 2);
        assert_eq!(log.all()[1].status, ExecutionStatus::Failure);

        // A smaller cap on reload keeps only the newest.
        let log = HistoryLog::open(&path, 1);
        assert_eq!(log.all()[0].command, "false");
    }

    #[test]
    fn corrupt_file_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "{ not json").unwrap();
        let log = HistoryLog::open(&path, 10);
        assert!(log.is_empty());
    }

    #[test]
    fn write_failure_keeps_in_memory_record() {
        let dir = tempfile::tempdir().unwrap();
        // The "file" is a directory, so writing it fails.
        let path = dir.path().join("history.json");
        fs::create_dir(&path).unwrap();
        let mut log = HistoryLog::open(&path, 10);
        let err = log.append(record("list", "ls", 0)).unwrap_err();
        assert!(matches!(err, HistoryError::Write { .. }));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn clear_empties_the_log_and_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let mut log = HistoryLog::open(&path, 10);
        log.append(record("list", "ls", 0)).unwrap();
        log.clear().unwrap();
        assert!(log.is_empty());
        assert!(HistoryLog::open(&path, 10).is_empty());
    }

    #[test]
    fn statistics_count_successes_and_errors() {
        let mut log = HistoryLog::in_memory(10);
        assert_eq!(log.statistics().success_rate, 0.0);

        log.append(record("a", "ls  -la", 0)).unwrap();
        log.append(record("b", "ls -la", 0)).unwrap();
        log.append(record("c", "cat missing", 1)).unwrap();
        log.append(record("d", "pwd", 0)).unwrap();

        let stats = log.statistics();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.success_count, 3);
        assert_eq!(stats.error_count, 1);
        assert!((stats.success_rate - 0.75).abs() < f64::EPSILON);
        assert_eq!(stats.top_commands[0], ("ls -la".to_string(), 2));
    }

    #[test]
    fn search_matches_input_and_command() {
        let mut log = HistoryLog::in_memory(10);
        log.append(record("show disk usage", "df -h", 0)).unwrap();
        log.append(record("list files", "ls -la", 0)).unwrap();
        log.append(record("who am i", "whoami", 0)).unwrap();

        let hits = log.search("disk");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].command, "df -h");

        let hits = log.search("ls -la");
        assert_eq!(hits[0].command, "ls -la");
    }

    #[test]
    fn export_formats() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = HistoryLog::in_memory(10);
        log.append(record("list files", "ls -la", 0)).unwrap();
        log.append(record("quote, please", "echo \"hi\"", 2)).unwrap();

        let json = dir.path().join("h.json");
        log.export(&json, ExportFormat::Json).unwrap();
        let parsed: Vec<HistoryRecord> =
            serde_json::from_str(&fs::read_to_string(&json).unwrap()).unwrap();
        assert_eq!(parsed, log.all());

        let txt = dir.path().join("h.txt");
        log.export(&txt, ExportFormat::Txt).unwrap();
        let text = fs::read_to_string(&txt).unwrap();
        assert!(text.contains("=== Record 2 ==="));
        assert!(text.contains("Command: ls -la"));

        let csv_path = dir.path().join("h.csv");
        log.export(&csv_path, ExportFormat::Csv).unwrap();
        let mut reader = csv::Reader::from_path(&csv_path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert!(headers.iter().any(|h| h == "user_input"));
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[1][2], "quote, please");
    }
}
