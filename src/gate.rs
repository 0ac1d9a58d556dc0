use crate::config::Config;
use crate::executor::CommandRunner;
use crate::safety::{RiskAssessment, RiskClassifier, RiskLevel};
use crate::types::{ExecutionResult, GeneratedCommand};
use std::time::Duration;
use tracing::{debug, info};

/// Asked before a command runs. Returning `false` cancels the execution.
pub trait Confirm {
    /// Called once the command has been assessed, whether or not it needs
    /// confirmation.
    fn review(&mut self, _generated: &GeneratedCommand, _risk: Option<&RiskAssessment>) {}

    fn confirm(&mut self, generated: &GeneratedCommand, risk: Option<&RiskAssessment>) -> bool;

    /// Called right before the runner starts.
    fn executing(&mut self, _generated: &GeneratedCommand) {}
}

impl<F> Confirm for F
where
    F: FnMut(&GeneratedCommand, Option<&RiskAssessment>) -> bool,
{
    fn confirm(&mut self, generated: &GeneratedCommand, risk: Option<&RiskAssessment>) -> bool {
        self(generated, risk)
    }
}

/// Knobs the gate reads from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatePolicy {
    pub timeout: Duration,
    pub risk_check: bool,
    /// When false, High-risk commands are always confirmed, even under auto-confirm.
    pub allow_destructive: bool,
}

impl GatePolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: Duration::from_secs(config.execution.command_timeout),
            risk_check: config.execution.dangerous_command_check,
            allow_destructive: config.execution.allow_destructive_commands,
        }
    }
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            risk_check: true,
            allow_destructive: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Nothing usable to run: the translator failed or produced an empty command.
    Rejected { reason: String },
    Cancelled {
        assessment: Option<RiskAssessment>,
        result: ExecutionResult,
    },
    Executed {
        assessment: Option<RiskAssessment>,
        result: ExecutionResult,
    },
}

/// Decides whether a generated command gets to run.
pub struct ExecutionGate {
    classifier: RiskClassifier,
    runner: Box<dyn CommandRunner + Send>,
    policy: GatePolicy,
}

impl ExecutionGate {
    pub fn new(runner: Box<dyn CommandRunner + Send>, policy: GatePolicy) -> Self {
        Self {
            classifier: RiskClassifier::new(),
            runner,
            policy,
        }
    }

    /// Classification for display, honouring `risk_check`.
    pub fn assess(&self, command: &str) -> Option<RiskAssessment> {
        self.policy
            .risk_check
            .then(|| self.classifier.classify(command))
    }

    pub fn gate<C>(&self, generated: &GeneratedCommand, auto_confirm: bool, confirm: &mut C) -> GateOutcome
    where
        C: Confirm + ?Sized,
    {
        if let Some(error) = &generated.translation_error {
            debug!(error = %error, "translation failed, nothing to run");
            return GateOutcome::Rejected {
                reason: error.clone(),
            };
        }
        if generated.text.trim().is_empty() {
            return GateOutcome::Rejected {
                reason: "the translator returned an empty command".to_string(),
            };
        }

        let assessment = self.assess(&generated.text);
        confirm.review(generated, assessment.as_ref());

        let high_risk = matches!(&assessment, Some(a) if a.level == RiskLevel::High);
        let must_confirm = !auto_confirm || (high_risk && !self.policy.allow_destructive);

        if must_confirm && !confirm.confirm(generated, assessment.as_ref()) {
            info!(command = %generated.text, "execution cancelled by user");
            return GateOutcome::Cancelled {
                assessment,
                result: ExecutionResult::cancelled(&generated.text),
            };
        }

        confirm.executing(generated);
        let result = self.runner.run(&generated.text, self.policy.timeout);
        GateOutcome::Executed { assessment, result }
    }
}
