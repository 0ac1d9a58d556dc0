use crate::gate::Confirm;
use crate::history::HistoryStats;
use crate::orchestrator::{Orchestrator, TurnHandler, TurnOutcome, TurnState};
use crate::safety::RiskAssessment;
use crate::types::{CommandRequest, GeneratedCommand, HistoryRecord};
use anyhow::{anyhow, Result};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Requests from the front end to the worker thread.
enum WorkerCommand {
    Turn(CommandRequest),
    SetAutoConfirm(bool),
    History {
        limit: usize,
        reply: Sender<Vec<HistoryRecord>>,
    },
    Statistics {
        reply: Sender<HistoryStats>,
    },
    ClearHistory {
        reply: Sender<Result<(), String>>,
    },
}

/// What the worker reports back while a turn is in flight.
#[derive(Debug)]
pub enum WorkerEvent {
    State(TurnState),
    Review {
        generated: GeneratedCommand,
        risk: Option<RiskAssessment>,
    },
    /// The turn is blocked until a verdict is sent on `reply`. Dropping
    /// `reply` counts as a denial.
    ConfirmRequest {
        generated: GeneratedCommand,
        risk: Option<RiskAssessment>,
        reply: Sender<bool>,
    },
    Finished(TurnOutcome),
}

/// Forwards turn callbacks over the event channel.
struct ChannelHandler {
    events: Sender<WorkerEvent>,
}

impl Confirm for ChannelHandler {
    fn review(&mut self, generated: &GeneratedCommand, risk: Option<&RiskAssessment>) {
        let _ = self.events.send(WorkerEvent::Review {
            generated: generated.clone(),
            risk: risk.cloned(),
        });
    }

    fn confirm(&mut self, generated: &GeneratedCommand, risk: Option<&RiskAssessment>) -> bool {
        let (reply, verdict) = mpsc::channel();
        let request = WorkerEvent::ConfirmRequest {
            generated: generated.clone(),
            risk: risk.cloned(),
            reply,
        };
        if self.events.send(request).is_err() {
            return false;
        }
        verdict.recv().unwrap_or(false)
    }
}

impl TurnHandler for ChannelHandler {
    fn on_state(&mut self, state: TurnState) {
        let _ = self.events.send(WorkerEvent::State(state));
    }
}

/// Runs turns on a background thread that owns the orchestrator, and with
/// it the only writer of the history log.
pub struct TurnWorker {
    commands: Option<Sender<WorkerCommand>>,
    events: Receiver<WorkerEvent>,
    handle: Option<JoinHandle<()>>,
}

impl TurnWorker {
    pub fn spawn(orchestrator: Orchestrator) -> Result<Self> {
        let (command_tx, command_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("nlsh-turn".to_string())
            .spawn(move || run(orchestrator, command_rx, event_tx))?;
        Ok(Self {
            commands: Some(command_tx),
            events: event_rx,
            handle: Some(handle),
        })
    }

    fn send(&self, command: WorkerCommand) -> Result<()> {
        self.commands
            .as_ref()
            .ok_or_else(|| anyhow!("turn worker has shut down"))?
            .send(command)
            .map_err(|_| anyhow!("turn worker has stopped"))
    }

    /// Queue a turn. Progress arrives on [`events`](Self::events), ending
    /// with `WorkerEvent::Finished`.
    pub fn submit(&self, request: CommandRequest) -> Result<()> {
        self.send(WorkerCommand::Turn(request))
    }

    pub fn events(&self) -> &Receiver<WorkerEvent> {
        &self.events
    }

    pub fn set_auto_confirm(&self, auto_confirm: bool) -> Result<()> {
        self.send(WorkerCommand::SetAutoConfirm(auto_confirm))
    }

    pub fn history(&self, limit: usize) -> Result<Vec<HistoryRecord>> {
        let (reply, rx) = mpsc::channel();
        self.send(WorkerCommand::History { limit, reply })?;
        rx.recv().map_err(|_| anyhow!("turn worker has stopped"))
    }

    pub fn statistics(&self) -> Result<HistoryStats> {
        let (reply, rx) = mpsc::channel();
        self.send(WorkerCommand::Statistics { reply })?;
        rx.recv().map_err(|_| anyhow!("turn worker has stopped"))
    }

    pub fn clear_history(&self) -> Result<()> {
        let (reply, rx) = mpsc::channel();
        self.send(WorkerCommand::ClearHistory { reply })?;
        rx.recv()
            .map_err(|_| anyhow!("turn worker has stopped"))?
            .map_err(|e| anyhow!(e))
    }
}

impl Drop for TurnWorker {
    fn drop(&mut self) {
        // Closing the command channel ends the worker loop. Dropping the
        // event receiver drops any unanswered reply senders, so a turn
        // blocked on confirmation sees a denial.
        self.commands.take();
        drop(std::mem::replace(&mut self.events, mpsc::channel().1));
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("turn worker panicked");
            }
        }
    }
}

fn run(mut orchestrator: Orchestrator, commands: Receiver<WorkerCommand>, events: Sender<WorkerEvent>) {
    let mut handler = ChannelHandler {
        events: events.clone(),
    };
    for command in commands {
        match command {
            WorkerCommand::Turn(request) => {
                let outcome = orchestrator.run_turn(&request, &mut handler);
                if events.send(WorkerEvent::Finished(outcome)).is_err() {
                    debug!("front end went away, dropping turn outcome");
                }
            }
            WorkerCommand::SetAutoConfirm(auto_confirm) => orchestrator.set_auto_confirm(auto_confirm),
            WorkerCommand::History { limit, reply } => {
                let _ = reply.send(orchestrator.history().recent(limit).to_vec());
            }
            WorkerCommand::Statistics { reply } => {
                let _ = reply.send(orchestrator.history().statistics());
            }
            WorkerCommand::ClearHistory { reply } => {
                let result = orchestrator.history_mut().clear().map_err(|e| e.to_string());
                let _ = reply.send(result);
            }
        }
    }
    debug!("turn worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::gate::tests::SpyRunner;
    use crate::history::HistoryLog;
    use crate::translator::tests::StubTranslator;
    use crate::types::ExecutionStatus;

    fn worker(reply: GeneratedCommand, spy: &SpyRunner, auto_confirm: bool) -> TurnWorker {
        let mut config = Config::default();
        config.execution.auto_confirm = auto_confirm;
        let orchestrator = Orchestrator::new(
            Box::new(StubTranslator::returning(reply)),
            Box::new(spy.clone()),
            HistoryLog::in_memory(10),
            &config,
        );
        TurnWorker::spawn(orchestrator).unwrap()
    }

    /// Drive one turn, answering every confirmation with `answer`.
    fn drive(worker: &TurnWorker, answer: Option<bool>) -> (Vec<TurnState>, TurnOutcome) {
        let mut states = Vec::new();
        for event in worker.events().iter() {
            match event {
                WorkerEvent::State(state) => states.push(state),
                WorkerEvent::Review { .. } => {}
                WorkerEvent::ConfirmRequest { reply, .. } => {
                    if let Some(answer) = answer {
                        reply.send(answer).unwrap();
                    }
                }
                WorkerEvent::Finished(outcome) => return (states, outcome),
            }
        }
        panic!("worker stopped without finishing the turn");
    }

    #[test]
    fn confirmed_turn_runs_and_is_recorded() {
        let spy = SpyRunner::default();
        let worker = worker(GeneratedCommand::new("mv a b", "rename"), &spy, false);

        worker.submit(CommandRequest::new("rename a to b")).unwrap();
        let (states, outcome) = drive(&worker, Some(true));

        assert!(matches!(outcome, TurnOutcome::Completed { ref result, .. } if result.status == ExecutionStatus::Success));
        assert!(states.contains(&TurnState::AwaitingConfirmation));
        assert_eq!(states.last(), Some(&TurnState::Idle));
        assert_eq!(spy.count(), 1);

        let history = worker.history(10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].user_input, "rename a to b");
        assert_eq!(worker.statistics().unwrap().total, 1);
    }

    #[test]
    fn dropped_reply_counts_as_denial() {
        let spy = SpyRunner::default();
        let worker = worker(GeneratedCommand::new("rm -rf /", "wipe"), &spy, true);

        worker.submit(CommandRequest::new("wipe it")).unwrap();
        let (_, outcome) = drive(&worker, None);

        assert!(matches!(outcome, TurnOutcome::Cancelled { .. }));
        assert_eq!(spy.count(), 0);
        assert!(worker.history(10).unwrap().is_empty());
    }

    #[test]
    fn auto_confirm_toggle_and_clear() {
        let spy = SpyRunner::default();
        let worker = worker(GeneratedCommand::new("touch x", "create"), &spy, false);
        worker.set_auto_confirm(true).unwrap();

        worker.submit(CommandRequest::new("make x")).unwrap();
        let (states, _) = drive(&worker, Some(false));
        assert!(!states.contains(&TurnState::AwaitingConfirmation));
        assert_eq!(spy.count(), 1);

        worker.clear_history().unwrap();
        assert!(worker.history(10).unwrap().is_empty());
    }

    #[test]
    fn drop_while_confirmation_is_pending_denies_it() {
        let spy = SpyRunner::default();
        let worker = worker(GeneratedCommand::new("mv a b", "rename"), &spy, false);
        worker.submit(CommandRequest::new("rename a to b")).unwrap();
        // Wait until the turn is blocked on the unanswered question.
        thread::sleep(std::time::Duration::from_millis(200));

        let (done_tx, done_rx) = mpsc::channel();
        thread::spawn(move || {
            drop(worker);
            let _ = done_tx.send(());
        });

        assert!(done_rx.recv_timeout(std::time::Duration::from_secs(5)).is_ok());
        assert_eq!(spy.count(), 0);
    }

    #[test]
    fn drop_joins_the_thread() {
        let spy = SpyRunner::default();
        let worker = worker(GeneratedCommand::new("ls", "list"), &spy, true);
        worker.submit(CommandRequest::new("list")).unwrap();
        drop(worker);
        // The queued turn completes before the thread exits.
        assert_eq!(spy.count(), 1);
    }
}
