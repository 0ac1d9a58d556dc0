use crate::fuzzy_matcher::FzfMatcher;
use crate::history::HistoryStats;
use crate::i18n::I18n;
use crate::orchestrator::TurnState;
use crate::safety::{tips, RiskAssessment, RiskLevel};
use crate::types::{ExecutionResult, ExecutionStatus, GeneratedCommand, HistoryRecord};
use colored::*;
use std::fmt::Write;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Column budget for one-line history entries.
const LINE_WIDTH: usize = 100;

fn hex_rgb(hex: &str) -> Option<(u8, u8, u8)> {
    let hex = hex.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some((channel(0)?, channel(2)?, channel(4)?))
}

fn paint_risk(text: &str, risk: &RiskAssessment) -> ColoredString {
    match hex_rgb(risk.color_hint) {
        Some((r, g, b)) => text.truecolor(r, g, b).bold(),
        None => text.normal(),
    }
}

/// Cut `text` to at most `max` terminal columns, ending with an ellipsis
/// when something was dropped.
pub fn fit_width(text: &str, max: usize) -> String {
    let text = text.replace('\n', " ");
    if text.width() <= max {
        return text;
    }
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w + 1 > max {
            break;
        }
        used += w;
        out.push(c);
    }
    out.push('…');
    out
}

fn risk_label(i18n: &I18n, level: RiskLevel) -> String {
    match level {
        RiskLevel::Low => i18n.t("risk_low"),
        RiskLevel::Medium => i18n.t("risk_medium"),
        RiskLevel::High => i18n.t("risk_high"),
    }
}

pub fn render_generated(
    i18n: &I18n,
    generated: &GeneratedCommand,
    risk: Option<&RiskAssessment>,
    show_warnings: bool,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} {}", i18n.t("generated_command").cyan().bold(), generated.text.bold());
    if !generated.explanation.is_empty() {
        let _ = writeln!(out, "{} {}", i18n.t("explanation").cyan(), generated.explanation);
    }
    if let Some(risk) = risk {
        let label = format!("{} ({})", risk_label(i18n, risk.level), risk.description);
        let _ = writeln!(out, "{} {}", i18n.t("risk").cyan(), paint_risk(&label, risk));
        if risk.level != RiskLevel::Low {
            let _ = writeln!(out, "  {}", tips(risk.level).dimmed());
        }
    }
    if show_warnings && !generated.warnings.is_empty() {
        let _ = writeln!(out, "{}", i18n.t("warnings").yellow().bold());
        for warning in &generated.warnings {
            let _ = writeln!(out, "  - {}", warning.yellow());
        }
    }
    out
}

pub fn render_result(i18n: &I18n, result: &ExecutionResult) -> String {
    let mut out = String::new();
    match result.status {
        ExecutionStatus::Success => {
            let _ = writeln!(out, "{}", i18n.t("success").green().bold());
        }
        ExecutionStatus::Failure => {
            let _ = writeln!(
                out,
                "{}",
                i18n.t_format("failure", &[&result.exit_code.to_string()]).red().bold()
            );
        }
        ExecutionStatus::TimedOut => {
            let _ = writeln!(out, "{}", i18n.t("timed_out").red().bold());
        }
        ExecutionStatus::Cancelled => {
            let _ = writeln!(out, "{}", i18n.t("cancelled").yellow());
            return out;
        }
    }
    if !result.stdout.is_empty() {
        let _ = writeln!(out, "{}", i18n.t("stdout").cyan().bold());
        let _ = writeln!(out, "{}", result.stdout);
    }
    if !result.is_success() {
        let error = result.error_text();
        if !error.is_empty() {
            let _ = writeln!(out, "{}", i18n.t("stderr").red().bold());
            let _ = writeln!(out, "{}", error.red());
        }
    }
    out
}

fn status_mark(status: ExecutionStatus) -> ColoredString {
    match status {
        ExecutionStatus::Success => "✓".green(),
        ExecutionStatus::Failure | ExecutionStatus::TimedOut => "✗".red(),
        ExecutionStatus::Cancelled => "-".yellow(),
    }
}

fn record_line(index: usize, record: &HistoryRecord, command: String) -> String {
    let time = record
        .timestamp
        .with_timezone(&chrono::Local)
        .format("%Y-%m-%d %H:%M:%S");
    let head = format!("{:>3}. {} ", index + 1, time);
    let budget = LINE_WIDTH.saturating_sub(head.width() + 2);
    format!(
        "{}{} {}  {}",
        head.dimmed(),
        status_mark(record.status),
        command,
        fit_width(&record.user_input, budget.saturating_sub(record.command.width())).dimmed()
    )
}

pub fn render_history(i18n: &I18n, records: &[HistoryRecord]) -> String {
    if records.is_empty() {
        return format!("{}\n", i18n.t("no_records").yellow());
    }
    let mut out = String::new();
    let _ = writeln!(out, "{}", i18n.t("history_records").cyan().bold());
    for (i, record) in records.iter().enumerate() {
        let command = fit_width(&record.command, LINE_WIDTH / 2).green().to_string();
        let _ = writeln!(out, "{}", record_line(i, record, command));
    }
    out
}

pub fn render_search(i18n: &I18n, query: &str, hits: &[&HistoryRecord]) -> String {
    if hits.is_empty() {
        return format!("{}\n", i18n.t("no_matches").yellow());
    }
    let matcher = FzfMatcher::new();
    let mut out = String::new();
    let _ = writeln!(out, "{}", i18n.t_format("search_results", &[query]).cyan().bold());
    for (i, record) in hits.iter().enumerate() {
        let command = match matcher.comprehensive_match(query.trim(), &record.command) {
            Some(m) if !m.indices.is_empty() => {
                matcher.highlight_matches(&record.command, &m.indices, |c| c.to_string().yellow().bold().to_string())
            }
            _ => record.command.green().to_string(),
        };
        let _ = writeln!(out, "{}", record_line(i, record, command));
    }
    out
}

pub fn render_stats(i18n: &I18n, stats: &HistoryStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", i18n.t("stats_title").cyan().bold());
    let _ = writeln!(out, "  {}", i18n.t_format("stats_total", &[&stats.total.to_string()]));
    let _ = writeln!(
        out,
        "  {}",
        i18n.t_format("stats_success", &[&stats.success_count.to_string()]).green()
    );
    let _ = writeln!(
        out,
        "  {}",
        i18n.t_format("stats_error", &[&stats.error_count.to_string()]).red()
    );
    let rate = format!("{:.1}", stats.success_rate * 100.0);
    let _ = writeln!(out, "  {}", i18n.t_format("stats_rate", &[&rate]));
    if !stats.top_commands.is_empty() {
        let _ = writeln!(out, "{}", i18n.t("stats_top").cyan());
        for (command, count) in &stats.top_commands {
            let _ = writeln!(out, "  {:>4}  {}", count, fit_width(command, LINE_WIDTH - 8).green());
        }
    }
    out
}

/// Progress line for states the user should see; quiet states yield `None`.
pub fn render_state(i18n: &I18n, state: TurnState) -> Option<String> {
    match state {
        TurnState::Translating => Some(i18n.t("translating").dimmed().to_string()),
        TurnState::Executing => Some(i18n.t("executing").dimmed().to_string()),
        _ => None,
    }
}

pub fn confirm_prompt(i18n: &I18n, risk: Option<&RiskAssessment>) -> String {
    match risk {
        Some(risk) if risk.level == RiskLevel::High => paint_risk(&i18n.t("confirm_high_prompt"), risk).to_string(),
        _ => i18n.t("confirm_prompt").yellow().to_string(),
    }
}

/// A High-risk command needs a literal "yes"; anything else takes y/yes.
pub fn parse_confirmation(answer: &str, risk: Option<&RiskAssessment>) -> bool {
    let answer = answer.trim().to_lowercase();
    match risk {
        Some(risk) if risk.level == RiskLevel::High => answer == "yes",
        _ => answer == "y" || answer == "yes",
    }
}
