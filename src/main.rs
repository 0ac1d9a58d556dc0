mod config;
mod display;
mod error;
mod executor;
mod fuzzy_matcher;
mod gate;
mod history;
mod i18n;
mod orchestrator;
mod safety;
mod translator;
mod types;
mod worker;

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use history::{ExportFormat, HistoryLog};
use i18n::I18n;
use orchestrator::{Orchestrator, TurnOutcome};
use safety::RiskAssessment;
use translator::OpenAiTranslator;
use types::CommandRequest;
use worker::{TurnWorker, WorkerEvent};

#[derive(Parser)]
#[command(name = "nlsh", version)]
#[command(about = "Translate plain-language requests into shell commands and run them")]
struct Cli {
    /// What you want to do, in plain language. Omit to start interactive mode.
    input: Vec<String>,
    /// Run without asking for confirmation (dangerous commands still ask)
    #[arg(short = 'y', long = "yes")]
    yes: bool,
    /// Show recent history
    #[arg(long)]
    history: bool,
    /// Verbose logging to stderr
    #[arg(short, long)]
    debug: bool,
    /// Fuzzy-search the history
    #[arg(long, value_name = "QUERY")]
    search: Option<String>,
    /// Show history statistics
    #[arg(long)]
    stats: bool,
    /// Delete all history records
    #[arg(long)]
    clear_history: bool,
    /// Export the history to a file
    #[arg(long, value_name = "PATH")]
    export: Option<PathBuf>,
    /// Export format
    #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
    format: ExportFormat,
    /// Print the effective configuration
    #[arg(long)]
    show_config: bool,
    /// Config file [default: ~/.nlsh/config.toml]
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Number of history records to show
    #[arg(short = 'n', long, default_value_t = 10)]
    limit: usize,
}

impl Cli {
    fn wants_maintenance(&self) -> bool {
        self.history
            || self.stats
            || self.clear_history
            || self.show_config
            || self.search.is_some()
            || self.export.is_some()
    }
}

fn init_logging(debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let config_path = cli.config.clone().unwrap_or_else(Config::default_config_path);
    let config = Config::load_or_init(&config_path)?;
    if !config.display.color_output {
        colored::control::set_override(false);
    }
    let i18n = I18n::new(&config.get_effective_language());
    debug!(config = %config_path.display(), lang = i18n.lang(), "starting");

    if cli.wants_maintenance() {
        return maintenance(&cli, &config, &config_path, &i18n);
    }

    if config.llm.api_key.is_none() {
        println!("{}", i18n.t("api_key_missing").yellow());
    }
    let translator = OpenAiTranslator::new(&config.llm, i18n.lang())?;
    let mut orchestrator = Orchestrator::with_shell(Box::new(translator), &config);
    orchestrator.set_auto_confirm(cli.yes || config.execution.auto_confirm);
    let worker = TurnWorker::spawn(orchestrator)?;

    // Commands run in their own process group and never see the terminal's
    // SIGINT, so Ctrl-C must not kill nlsh before the runner reaps them.
    let interrupted = install_interrupt_flag();

    if cli.input.is_empty() {
        interactive(&worker, &i18n, &config, cli.limit, &interrupted)
    } else {
        let request = CommandRequest::new(cli.input.join(" "));
        worker.submit(request)?;
        drive_turn(&worker, &i18n, config.display.show_warnings)?;
        if interrupted.load(Ordering::SeqCst) {
            println!("{}", i18n.t("interrupted").yellow());
        }
        Ok(())
    }
}

/// Replace the default SIGINT action with a flag the front end polls
/// between turns.
fn install_interrupt_flag() -> Arc<AtomicBool> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    if let Err(err) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        warn!(error = %err, "could not install the Ctrl-C handler");
    }
    interrupted
}

fn maintenance(cli: &Cli, config: &Config, config_path: &std::path::Path, i18n: &I18n) -> Result<()> {
    if cli.show_config {
        println!("{}", i18n.t_format("config_path", &[&config_path.display().to_string()]).cyan());
        println!("{}", toml::to_string_pretty(config)?);
    }

    let mut log = HistoryLog::open(config.history_path(), config.history.max_records);
    if cli.clear_history {
        log.clear()?;
        println!("{}", i18n.t("history_cleared").green());
    }
    if let Some(path) = &cli.export {
        log.export(path, cli.format)
            .with_context(|| format!("failed to export history to {}", path.display()))?;
        println!(
            "{}",
            i18n.t_format("exported", &[&log.len().to_string(), &path.display().to_string()]).green()
        );
    }
    if let Some(query) = &cli.search {
        let hits: Vec<_> = log.search(query).into_iter().take(cli.limit).collect();
        print!("{}", display::render_search(i18n, query, &hits));
    }
    if cli.stats {
        print!("{}", display::render_stats(i18n, &log.statistics()));
    }
    if cli.history {
        print!("{}", display::render_history(i18n, log.recent(cli.limit)));
    }
    Ok(())
}

fn interactive(
    worker: &TurnWorker,
    i18n: &I18n,
    config: &Config,
    limit: usize,
    interrupted: &AtomicBool,
) -> Result<()> {
    println!("{}", i18n.t("welcome").cyan().bold());
    println!("{}", i18n.t("interactive_hint").dimmed());

    let stdin = io::stdin();
    loop {
        if interrupted.load(Ordering::SeqCst) {
            println!("{}", i18n.t("interrupted").yellow());
            break;
        }
        print!("{}", i18n.t("prompt").green().bold());
        io::stdout().flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            println!();
            break;
        }
        if interrupted.load(Ordering::SeqCst) {
            println!("{}", i18n.t("interrupted").yellow());
            break;
        }

        match line.trim() {
            "" => continue,
            "exit" | "quit" => break,
            "history" => print!("{}", display::render_history(i18n, &worker.history(limit)?)),
            "stats" => print!("{}", display::render_stats(i18n, &worker.statistics()?)),
            "clear" => {
                worker.clear_history()?;
                println!("{}", i18n.t("history_cleared").green());
            }
            input => {
                worker.submit(CommandRequest::new(input))?;
                drive_turn(worker, i18n, config.display.show_warnings)?;
            }
        }
        println!();
    }

    println!("{}", i18n.t("goodbye").cyan());
    Ok(())
}

/// Print progress for the submitted turn and answer confirmations from
/// stdin until the worker reports the outcome.
fn drive_turn(worker: &TurnWorker, i18n: &I18n, show_warnings: bool) -> Result<()> {
    for event in worker.events().iter() {
        match event {
            WorkerEvent::State(state) => {
                if let Some(line) = display::render_state(i18n, state) {
                    println!("{line}");
                }
            }
            WorkerEvent::Review { generated, risk } => {
                print!("{}", display::render_generated(i18n, &generated, risk.as_ref(), show_warnings));
            }
            WorkerEvent::ConfirmRequest { risk, reply, .. } => {
                let approved = ask_confirmation(i18n, risk.as_ref());
                let _ = reply.send(approved);
            }
            WorkerEvent::Finished(outcome) => {
                print_outcome(i18n, &outcome);
                return Ok(());
            }
        }
    }
    anyhow::bail!("turn worker stopped unexpectedly")
}

fn ask_confirmation(i18n: &I18n, risk: Option<&RiskAssessment>) -> bool {
    print!("{}", display::confirm_prompt(i18n, risk));
    io::stdout().flush().ok();
    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_err() {
        return false;
    }
    display::parse_confirmation(&input, risk)
}

fn print_outcome(i18n: &I18n, outcome: &TurnOutcome) {
    match outcome {
        TurnOutcome::TranslationFailed { error, .. } => {
            println!("{}", i18n.t_format("translation_failed", &[error.as_str()]).red().bold());
        }
        TurnOutcome::Cancelled { .. } => {
            println!("{}", i18n.t("cancelled").yellow());
        }
        TurnOutcome::Completed { result, .. } => {
            print!("{}", display::render_result(i18n, result));
        }
    }
}
