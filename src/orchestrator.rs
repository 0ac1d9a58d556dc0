use crate::config::Config;
use crate::executor::{CommandRunner, ShellRunner};
use crate::gate::{Confirm, ExecutionGate, GateOutcome, GatePolicy};
use crate::history::HistoryLog;
use crate::safety::RiskAssessment;
use crate::translator::{SystemInfo, Translator};
use crate::types::{CommandRequest, ExecutionResult, GeneratedCommand, HistoryRecord};
use tracing::{debug, info_span, warn};

/// Where a turn currently is. `TranslationFailed` and `Cancelled` are
/// terminal; every turn ends back in `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Translating,
    Classifying,
    AwaitingConfirmation,
    Executing,
    Recording,
    TranslationFailed,
    Cancelled,
}

/// Front-end hooks for one turn. Confirmation comes from [`Confirm`]; the
/// state callback is optional.
pub trait TurnHandler: Confirm {
    fn on_state(&mut self, _state: TurnState) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    TranslationFailed {
        generated: GeneratedCommand,
        error: String,
    },
    Cancelled {
        generated: GeneratedCommand,
        assessment: Option<RiskAssessment>,
    },
    Completed {
        generated: GeneratedCommand,
        assessment: Option<RiskAssessment>,
        result: ExecutionResult,
    },
}

/// Adapts a `TurnHandler` to the gate, turning its callbacks into state
/// transitions.
struct GateBridge<'a, H: TurnHandler + ?Sized> {
    handler: &'a mut H,
    state: &'a mut TurnState,
}

impl<H: TurnHandler + ?Sized> GateBridge<'_, H> {
    fn enter(&mut self, state: TurnState) {
        debug!(from = ?*self.state, to = ?state, "turn state");
        *self.state = state;
        self.handler.on_state(state);
    }
}

impl<H: TurnHandler + ?Sized> Confirm for GateBridge<'_, H> {
    fn review(&mut self, generated: &GeneratedCommand, risk: Option<&RiskAssessment>) {
        self.handler.review(generated, risk);
    }

    fn confirm(&mut self, generated: &GeneratedCommand, risk: Option<&RiskAssessment>) -> bool {
        self.enter(TurnState::AwaitingConfirmation);
        self.handler.confirm(generated, risk)
    }

    fn executing(&mut self, generated: &GeneratedCommand) {
        self.enter(TurnState::Executing);
        self.handler.executing(generated);
    }
}

/// Glues one user turn together: translate, classify, gate, execute, record.
pub struct Orchestrator {
    translator: Box<dyn Translator + Send>,
    gate: ExecutionGate,
    history: HistoryLog,
    system: SystemInfo,
    context_size: usize,
    auto_confirm: bool,
    state: TurnState,
}

impl Orchestrator {
    pub fn new(
        translator: Box<dyn Translator + Send>,
        runner: Box<dyn CommandRunner + Send>,
        history: HistoryLog,
        config: &Config,
    ) -> Self {
        Self {
            translator,
            gate: ExecutionGate::new(runner, GatePolicy::from_config(config)),
            history,
            system: SystemInfo::detect(),
            context_size: config.history.context_size,
            auto_confirm: config.execution.auto_confirm,
            state: TurnState::Idle,
        }
    }

    /// Production wiring: the host shell and the on-disk history.
    pub fn with_shell(translator: Box<dyn Translator + Send>, config: &Config) -> Self {
        let history = HistoryLog::open(config.history_path(), config.history.max_records);
        Self::new(translator, Box::new(ShellRunner::new()), history, config)
    }

    pub fn set_auto_confirm(&mut self, auto_confirm: bool) {
        self.auto_confirm = auto_confirm;
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut HistoryLog {
        &mut self.history
    }

    fn enter<H: TurnHandler + ?Sized>(&mut self, handler: &mut H, state: TurnState) {
        debug!(from = ?self.state, to = ?state, "turn state");
        self.state = state;
        handler.on_state(state);
    }

    /// Run one turn to completion. Nothing escapes as an error: every
    /// failure is folded into the returned outcome.
    pub fn run_turn<H: TurnHandler + ?Sized>(&mut self, request: &CommandRequest, handler: &mut H) -> TurnOutcome {
        let span = info_span!("turn", request = %request.raw_text());
        let _guard = span.enter();

        self.enter(handler, TurnState::Translating);
        let context = self.history.recent(self.context_size);
        let generated = self
            .translator
            .translate(request.raw_text(), context, &self.system);

        self.enter(handler, TurnState::Classifying);
        let mut state = self.state;
        let outcome = self.gate.gate(
            &generated,
            self.auto_confirm,
            &mut GateBridge {
                handler: &mut *handler,
                state: &mut state,
            },
        );
        self.state = state;

        let outcome = match outcome {
            GateOutcome::Rejected { reason } => {
                self.enter(handler, TurnState::TranslationFailed);
                TurnOutcome::TranslationFailed {
                    generated,
                    error: reason,
                }
            }
            GateOutcome::Cancelled { assessment, .. } => {
                // Cancelled turns never ran, so they are not recorded.
                self.enter(handler, TurnState::Cancelled);
                TurnOutcome::Cancelled {
                    generated,
                    assessment,
                }
            }
            GateOutcome::Executed { assessment, result } => {
                self.enter(handler, TurnState::Recording);
                let record = HistoryRecord::from_result(request.raw_text(), &result);
                if let Err(err) = self.history.append(record) {
                    warn!(error = %err, "could not persist history, keeping it in memory");
                }
                TurnOutcome::Completed {
                    generated,
                    assessment,
                    result,
                }
            }
        };

        self.enter(handler, TurnState::Idle);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::tests::SpyRunner;
    use crate::safety::RiskLevel;
    use crate::translator::tests::StubTranslator;
    use crate::types::ExecutionStatus;

    struct ScriptedHandler {
        answer: bool,
        asked: usize,
        states: Vec<TurnState>,
    }

    impl ScriptedHandler {
        fn answering(answer: bool) -> Self {
            Self {
                answer,
                asked: 0,
                states: Vec::new(),
            }
        }
    }

    impl Confirm for ScriptedHandler {
        fn confirm(&mut self, _generated: &GeneratedCommand, _risk: Option<&RiskAssessment>) -> bool {
            self.asked += 1;
            self.answer
        }
    }

    impl TurnHandler for ScriptedHandler {
        fn on_state(&mut self, state: TurnState) {
            self.states.push(state);
        }
    }

    fn config(auto_confirm: bool) -> Config {
        let mut config = Config::default();
        config.execution.auto_confirm = auto_confirm;
        config.execution.command_timeout = 10;
        config
    }

    fn orchestrator(reply: GeneratedCommand, runner: Box<dyn CommandRunner + Send>, auto_confirm: bool) -> Orchestrator {
        Orchestrator::new(
            Box::new(StubTranslator::returning(reply)),
            runner,
            HistoryLog::in_memory(50),
            &config(auto_confirm),
        )
    }

    #[cfg(unix)]
    #[test]
    fn list_files_end_to_end() {
        let mut orch = orchestrator(
            GeneratedCommand::new("ls -la", "list all files"),
            Box::new(ShellRunner::new()),
            true,
        );
        let mut handler = ScriptedHandler::answering(false);
        let before = orch.history().len();

        let outcome = orch.run_turn(&CommandRequest::new("list files"), &mut handler);

        match outcome {
            TurnOutcome::Completed { assessment, result, .. } => {
                assert_eq!(assessment.unwrap().level, RiskLevel::Low);
                assert_eq!(result.status, ExecutionStatus::Success);
                assert_eq!(result.exit_code, 0);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(handler.asked, 0);
        assert_eq!(orch.history().len(), before + 1);
        let record = &orch.history().all()[0];
        assert_eq!(record.user_input, "list files");
        assert_eq!(record.command, "ls -la");
        assert_eq!(
            handler.states,
            vec![
                TurnState::Translating,
                TurnState::Classifying,
                TurnState::Executing,
                TurnState::Recording,
                TurnState::Idle
            ]
        );
    }

    #[test]
    fn destructive_command_denied_end_to_end() {
        let spy = SpyRunner::default();
        let mut orch = orchestrator(
            GeneratedCommand::new("rm -rf /", "wipe everything"),
            Box::new(spy.clone()),
            false,
        );
        let mut handler = ScriptedHandler::answering(false);

        let outcome = orch.run_turn(&CommandRequest::new("clean up"), &mut handler);

        match outcome {
            TurnOutcome::Cancelled { assessment, generated } => {
                assert_eq!(assessment.unwrap().level, RiskLevel::High);
                assert_eq!(generated.text, "rm -rf /");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(spy.count(), 0);
        assert!(orch.history().is_empty());
        assert_eq!(handler.asked, 1);
        assert_eq!(
            handler.states,
            vec![
                TurnState::Translating,
                TurnState::Classifying,
                TurnState::AwaitingConfirmation,
                TurnState::Cancelled,
                TurnState::Idle
            ]
        );
    }

    #[test]
    fn translation_failure_touches_nothing() {
        let spy = SpyRunner::default();
        let mut orch = orchestrator(GeneratedCommand::failed("API down"), Box::new(spy.clone()), true);
        let mut handler = ScriptedHandler::answering(true);

        let outcome = orch.run_turn(&CommandRequest::new("anything"), &mut handler);

        assert!(matches!(
            outcome,
            TurnOutcome::TranslationFailed { ref error, .. } if error == "API down"
        ));
        assert_eq!(spy.count(), 0);
        assert_eq!(handler.asked, 0);
        assert!(orch.history().is_empty());
        assert_eq!(handler.states[2], TurnState::TranslationFailed);
    }

    #[test]
    fn confirmed_failure_is_recorded() {
        let spy = SpyRunner {
            exit_code: 2,
            ..SpyRunner::default()
        };
        let mut orch = orchestrator(GeneratedCommand::new("cat missing.txt", "show"), Box::new(spy.clone()), false);
        let mut handler = ScriptedHandler::answering(true);

        let outcome = orch.run_turn(&CommandRequest::new("show missing"), &mut handler);

        assert!(matches!(outcome, TurnOutcome::Completed { ref result, .. } if result.status == ExecutionStatus::Failure));
        assert_eq!(spy.count(), 1);
        let record = &orch.history().all()[0];
        assert_eq!(record.status, ExecutionStatus::Failure);
        assert_eq!(record.exit_code, 2);
        assert!(handler.states.contains(&TurnState::AwaitingConfirmation));
    }

    #[test]
    fn history_is_passed_as_context() {
        let translator = StubTranslator::returning(GeneratedCommand::new("pwd", "where am i"));
        let spy = SpyRunner::default();
        let mut config = config(true);
        config.history.context_size = 2;
        let mut orch = Orchestrator::new(Box::new(translator.clone()), Box::new(spy), HistoryLog::in_memory(10), &config);
        let mut handler = ScriptedHandler::answering(true);

        for _ in 0..4 {
            orch.run_turn(&CommandRequest::new("where"), &mut handler);
        }
        assert_eq!(orch.history().len(), 4);
        assert_eq!(translator.seen_context(), vec![0, 1, 2, 2]);
    }

    #[test]
    fn persistence_failure_does_not_break_the_turn() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::create_dir(&path).unwrap();
        let spy = SpyRunner::default();
        let mut orch = Orchestrator::new(
            Box::new(StubTranslator::returning(GeneratedCommand::new("date", "time"))),
            Box::new(spy),
            HistoryLog::open(&path, 10),
            &config(true),
        );
        let mut handler = ScriptedHandler::answering(true);

        let outcome = orch.run_turn(&CommandRequest::new("what time"), &mut handler);
        assert!(matches!(outcome, TurnOutcome::Completed { .. }));
        assert_eq!(orch.history().len(), 1);
    }
}
