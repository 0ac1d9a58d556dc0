//! Pattern-based risk classification for generated shell commands.
//!
//! This is a heuristic, not a semantic guarantee: commands are matched as
//! text against fixed rule tiers and no attempt is made to parse the shell
//! grammar. Obfuscated or indirect commands (variables, `eval`, aliases,
//! encoded payloads) can slip through, which is why anything unrecognised
//! falls back to Medium rather than Low.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::debug;

pub const COLOR_HIGH: &str = "#ff0000";
pub const COLOR_MEDIUM: &str = "#ff9800";
pub const COLOR_LOW: &str = "#4caf50";

pub const UNKNOWN_COMMAND: &str = "unrecognized command, exercise caution";
pub const READ_ONLY_COMMAND: &str = "read-only command";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub description: String,
    pub color_hint: &'static str,
}

struct Rule {
    pattern: Regex,
    description: &'static str,
}

// (pattern, description); order matters, first match wins.
const HIGH_RISK: &[(&str, &str)] = &[
    (r"rm\s+-rf\s+/", "deletes the root directory"),
    (r"rm\s+-rf\s+\*", "recursively deletes every file"),
    (r"mkfs", "formats a disk"),
    (r"dd\s+if=.*of=/dev", "writes directly to a device"),
    (r":\(\)\s*\{.*\}", "fork bomb"),
    (r"chmod\s+-R\s+777", "makes every file world-writable"),
    (r"chown\s+-R", "recursively changes file ownership"),
    (r"format\s+c:", "formats the C: drive"),
    (r"del\s+/[fs]\s+\*", "force-deletes every file"),
];

const MEDIUM_RISK: &[(&str, &str)] = &[
    (r"rm\s+", "deletes files"),
    (r"del\s+", "deletes files"),
    (r"move\s+", "moves files"),
    (r"mv\s+", "moves files"),
    (r"chmod\s+", "changes file permissions"),
    (r"chown\s+", "changes file ownership"),
    (r"kill\s+-9", "force-kills a process"),
    (r"taskkill\s+/f", "force-kills a process"),
    (r"shutdown", "shuts down or restarts the machine"),
    (r"reboot", "restarts the machine"),
    (r"sudo\s+", "runs with administrator privileges"),
];

// Anchored at the start of the trimmed command.
const LOW_RISK: &[&str] = &[
    r"^ls\s*",
    r"^dir\s*",
    r"^pwd\s*",
    r"^cd\s+",
    r"^echo\s+",
    r"^cat\s+",
    r"^type\s+",
    r"^grep\s+",
    r"^find\s+",
    r"^ps\s*",
    r"^top\s*",
    r"^df\s*",
    r"^du\s*",
    r"^whoami\s*",
    r"^date\s*",
    // PowerShell read-only verbs
    r"^get-",
    r"^show-",
];

fn compile(pattern: &str) -> Regex {
    // Built-in patterns are constants; a failure here is a bug in the table above.
    Regex::new(&format!("(?i){pattern}")).expect("built-in risk pattern must compile")
}

fn compile_rules(table: &[(&str, &'static str)]) -> Vec<Rule> {
    table
        .iter()
        .map(|(pattern, description)| Rule {
            pattern: compile(pattern),
            description,
        })
        .collect()
}

static RULES: LazyLock<(Vec<Rule>, Vec<Rule>, Vec<Regex>)> = LazyLock::new(|| {
    (
        compile_rules(HIGH_RISK),
        compile_rules(MEDIUM_RISK),
        LOW_RISK.iter().map(|p| compile(p)).collect(),
    )
});

/// Stateless classifier over the built-in rule tiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskClassifier;

impl RiskClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Tiers are checked High, then Medium, then Low, never reordered: a
    /// destructive command may still start with a harmless-looking prefix.
    pub fn classify(&self, command: &str) -> RiskAssessment {
        let command = command.trim();
        let (high, medium, low) = &*RULES;

        if let Some(rule) = high.iter().find(|r| r.pattern.is_match(command)) {
            debug!(command, rule = rule.description, "high-risk pattern matched");
            return RiskAssessment {
                level: RiskLevel::High,
                description: format!("high risk: {}", rule.description),
                color_hint: COLOR_HIGH,
            };
        }

        if let Some(rule) = medium.iter().find(|r| r.pattern.is_match(command)) {
            debug!(command, rule = rule.description, "medium-risk pattern matched");
            return RiskAssessment {
                level: RiskLevel::Medium,
                description: format!("use caution: {}", rule.description),
                color_hint: COLOR_MEDIUM,
            };
        }

        if low.iter().any(|p| p.is_match(command)) {
            return RiskAssessment {
                level: RiskLevel::Low,
                description: READ_ONLY_COMMAND.to_string(),
                color_hint: COLOR_LOW,
            };
        }

        debug!(command, "no risk pattern matched, defaulting to medium");
        RiskAssessment {
            level: RiskLevel::Medium,
            description: UNKNOWN_COMMAND.to_string(),
            color_hint: COLOR_MEDIUM,
        }
    }
}

/// Fixed caution message for a risk level.
pub fn tips(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::High => "This command can cause serious damage. Do not run it unless you are certain.",
        RiskLevel::Medium => "This command changes system state. Review it before running.",
        RiskLevel::Low => "This command only reads state and is safe to run.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(cmd: &str) -> RiskAssessment {
        RiskClassifier::new().classify(cmd)
    }

    #[test]
    fn high_risk_patterns_use_their_own_description() {
        let cases = [
            ("rm -rf /", "high risk: deletes the root directory"),
            ("rm -rf *", "high risk: recursively deletes every file"),
            ("mkfs.ext4 /dev/sda1", "high risk: formats a disk"),
            ("dd if=/dev/zero of=/dev/sda", "high risk: writes directly to a device"),
            (":(){ :|:& };:", "high risk: fork bomb"),
            ("chmod -R 777 /var", "high risk: makes every file world-writable"),
            ("chown -R nobody /home", "high risk: recursively changes file ownership"),
            ("format C:", "high risk: formats the C: drive"),
            ("del /f *.*", "high risk: force-deletes every file"),
            ("del /s *", "high risk: force-deletes every file"),
        ];
        for (cmd, description) in cases {
            let a = classify(cmd);
            assert_eq!(a.level, RiskLevel::High, "{cmd}");
            assert_eq!(a.description, description, "{cmd}");
            assert_eq!(a.color_hint, COLOR_HIGH);
        }
    }

    #[test]
    fn high_risk_ignores_case_and_surrounding_whitespace() {
        for cmd in ["RM -RF /", "  rm -rf /tmp  ", "\tMKFS /dev/sdb\n", "sudo rm -rf /"] {
            let a = classify(cmd);
            assert_eq!(a.level, RiskLevel::High, "{cmd}");
        }
        assert_eq!(classify("  RM -RF /  ").description, "high risk: deletes the root directory");
    }

    #[test]
    fn high_tier_wins_over_low_prefix() {
        let a = classify("ls -la && rm -rf /");
        assert_eq!(a.level, RiskLevel::High);
        assert_eq!(a.description, "high risk: deletes the root directory");

        let a = classify("echo done; chown -R me /srv");
        assert_eq!(a.level, RiskLevel::High);
    }

    #[test]
    fn medium_tier_beats_low_prefix() {
        let a = classify("find . -name '*.tmp' -exec rm {} +");
        assert_eq!(a.level, RiskLevel::Medium);
        assert_eq!(a.description, "use caution: deletes files");
    }

    #[test]
    fn medium_risk_patterns() {
        let cases = [
            ("rm file.txt", "use caution: deletes files"),
            ("mv a b", "use caution: moves files"),
            ("chmod 644 file", "use caution: changes file permissions"),
            ("kill -9 1234", "use caution: force-kills a process"),
            ("taskkill /F /IM app.exe", "use caution: force-kills a process"),
            ("shutdown -h now", "use caution: shuts down or restarts the machine"),
            ("reboot", "use caution: restarts the machine"),
            ("sudo apt update", "use caution: runs with administrator privileges"),
        ];
        for (cmd, description) in cases {
            let a = classify(cmd);
            assert_eq!(a.level, RiskLevel::Medium, "{cmd}");
            assert_eq!(a.description, description, "{cmd}");
            assert_eq!(a.color_hint, COLOR_MEDIUM);
        }
    }

    #[test]
    fn low_risk_prefixes() {
        for cmd in ["ls -la", "pwd", "echo hello", "cat README.md", "grep -r foo .", "ps aux", "df -h", "whoami", "date", "Get-ChildItem", "  du -sh ."] {
            let a = classify(cmd);
            assert_eq!(a.level, RiskLevel::Low, "{cmd}");
            assert_eq!(a.description, READ_ONLY_COMMAND);
            assert_eq!(a.color_hint, COLOR_LOW);
        }
    }

    #[test]
    fn low_prefix_must_be_at_start() {
        assert_eq!(classify("xargs echo hi").level, RiskLevel::Medium);
        assert_eq!(classify("xargs echo hi").description, UNKNOWN_COMMAND);
    }

    #[test]
    fn patterns_match_inside_words() {
        // Patterns are unanchored, so a match inside a longer word counts.
        let a = classify("echo confirm this");
        assert_eq!(a.level, RiskLevel::Medium);
        assert_eq!(a.description, "use caution: deletes files");
        assert_eq!(classify("/sbin/reboot").level, RiskLevel::Medium);
        assert_eq!(classify("xmkfs /dev/sdb").level, RiskLevel::High);
    }

    #[test]
    fn empty_and_blank_default_to_medium() {
        for cmd in ["", "   "] {
            let a = classify(cmd);
            assert_eq!(a.level, RiskLevel::Medium);
            assert_eq!(a.description, UNKNOWN_COMMAND);
            assert_eq!(a.color_hint, COLOR_MEDIUM);
        }
    }

    #[test]
    fn unknown_commands_default_to_medium() {
        let a = classify("cargo build --release");
        assert_eq!(a.level, RiskLevel::Medium);
        assert_eq!(a.description, UNKNOWN_COMMAND);
    }

    #[test]
    fn classification_is_idempotent() {
        let c = RiskClassifier::new();
        for cmd in ["rm -rf /", "ls", "mv a b", "unknown-tool --flag", ""] {
            assert_eq!(c.classify(cmd), c.classify(cmd));
        }
    }

    #[test]
    fn every_level_has_a_tip() {
        assert!(tips(RiskLevel::High).contains("serious"));
        assert!(tips(RiskLevel::Medium).contains("Review"));
        assert!(tips(RiskLevel::Low).contains("safe"));
    }
}
