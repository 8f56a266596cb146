//! AgentFlow - multi-agent task planning and execution
//!
//! CLI entry point for planning, running and editing plans.

use std::fs;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use planstore::{EditContext, FileKvStore, LockManager, PlanStore, Scope, render_markdown};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use agentflow::cli::{Cli, Command, OutputFormat, PlansCommand, get_log_path};
use agentflow::config::{Config, PlannerKind};
use agentflow::llm::{LlmClient, create_client};
use agentflow::{
    ExecutionJournal, EventBus, ExecutionOrchestrator, ExecutionReport, HeuristicPlanner, LlmAgentExecutor,
    LlmPlanner, OrchestratorEvent, PlanEditEngine, PlanEditor, PromptLoader, StepExecutor, StoreJournal, TaskPlan,
    TaskPlanner, WorkspaceContext,
};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Plan {
            task,
            save,
            scope,
            format,
        } => cmd_plan(&config, &task, save, scope, format).await,
        Command::Run {
            task,
            plan,
            scope,
            format,
        } => cmd_run(&config, task.as_deref(), plan.as_deref(), scope, format).await,
        Command::Resume { plan_id, scope, format } => cmd_resume(&config, &plan_id, scope, format).await,
        Command::Plans { command } => cmd_plans(&config, command),
        Command::Edit { plan_id, scope } => cmd_edit(&config, &plan_id, scope).await,
    }
}

/// Plan store rooted at the current directory
fn open_store(config: &Config) -> Result<Arc<PlanStore>> {
    debug!(global_path = ?config.storage.global_path, "open_store: called");
    let workspace = std::env::current_dir().ok();
    let kv = FileKvStore::open(&config.storage.global_path).context("Failed to open global plan store")?;
    Ok(Arc::new(
        PlanStore::open(workspace, Arc::new(kv)).with_project_dir(config.storage.project_dir.clone()),
    ))
}

fn prompt_loader(config: &Config) -> PromptLoader {
    let workspace = std::env::current_dir().ok();
    PromptLoader::for_workspace(workspace.as_deref(), &config.storage.project_dir)
}

/// LLM client; fails fast when the API key is missing
fn llm_client(config: &Config, model: &str) -> Result<Arc<dyn LlmClient>> {
    config.validate()?;
    create_client(&config.llm, model).context("Failed to create LLM client")
}

fn require_model(model: &Option<String>, role: &str) -> Result<String> {
    model
        .clone()
        .ok_or_else(|| eyre::eyre!("No model selected for the {role} role; set models.{role} in the config"))
}

fn build_planner(config: &Config) -> Result<Arc<dyn TaskPlanner>> {
    match config.execution.planner {
        PlannerKind::Heuristic => Ok(Arc::new(HeuristicPlanner::new())),
        PlannerKind::Llm => {
            let model = require_model(&config.models.planner, "planner")?;
            let llm = llm_client(config, &model)?;
            let planner = LlmPlanner::new(
                llm,
                Arc::new(prompt_loader(config)),
                Some(model),
                config.retry.to_policy(),
            )
            .with_max_tokens(config.llm.max_tokens);
            Ok(Arc::new(planner))
        }
    }
}

fn print_plan(config: &Config, plan: &TaskPlan) {
    println!("{} {}", "Plan".bold(), plan.plan_id.dimmed());
    println!("  Task: {}", plan.original_task);
    println!("  Complexity: {}  Impact: {}", plan.complexity, plan.estimated_impact);
    println!();
    for (i, step) in plan.steps.iter().enumerate() {
        let gate = match (step.requires_approval, config.execution.auto_approve) {
            (true, true) => format!(" {}", "[auto-approved]".green()),
            (true, false) => format!(" {}", "[approval required]".yellow()),
            _ => String::new(),
        };
        println!("  {}. [{}] {}{}", i + 1, step.agent_role.to_string().cyan(), step.description, gate);
        if !step.context_step_ids.is_empty() {
            println!("       uses: {}", step.context_step_ids.join(", ").dimmed());
        }
    }
}

fn print_report(report: &ExecutionReport, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!();
    if !report.success {
        println!("{} {}", "✗".red(), report.summary);
        return Ok(());
    }
    for output in &report.outputs {
        if output.is_failure() {
            println!("  {} {}: {}", "✗".red(), output.step_id, output.error().unwrap_or_default());
        } else {
            println!("  {} {}: {}", "✓".green(), output.step_id, output.summary);
        }
    }
    println!();
    println!("{} ({})", report.summary.bold(), report.status);
    if !report.files_written.is_empty() {
        println!("Files written: {}", report.files_written.join(", "));
    }
    println!("Tokens: {}", report.token_usage.total());
    for action in &report.next_actions {
        println!("  → {}", action);
    }
    Ok(())
}

/// Print orchestrator events as they arrive
fn spawn_progress_printer(bus: &EventBus) -> tokio::task::JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(OrchestratorEvent::StepStarted {
                    step_id,
                    agent_role,
                    description,
                    ..
                }) => println!("{} {} [{}] {}", "▶".blue(), step_id, agent_role, description),
                Ok(OrchestratorEvent::StepFailed { step_id, error, .. }) => {
                    println!("{} {} failed: {}", "!".red(), step_id, error)
                }
                Ok(OrchestratorEvent::PlanCompleted { .. }) => break,
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "Progress printer lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

async fn cmd_plan(config: &Config, task: &str, save: bool, scope: Scope, format: OutputFormat) -> Result<()> {
    debug!(%task, save, %scope, "cmd_plan: called");
    let planner = build_planner(config)?;
    let workspace = WorkspaceContext::from_cwd();
    let (plan, saved) = if save {
        let (plan, saved) = planner.plan_for_saving(task, &workspace).await?;
        (plan, Some(saved))
    } else {
        (planner.plan(task, &workspace).await?, None)
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
        OutputFormat::Text => print_plan(config, &plan),
    }

    if let Some(saved) = saved {
        let store = open_store(config)?;
        let saved = store.save_plan(saved, scope)?;
        println!();
        println!("Saved plan {} ({})", saved.plan_id.green(), scope);
    }
    Ok(())
}

/// Orchestrator wired to the configured executor model, journal and progress bus
fn build_orchestrator(config: &Config, store: Arc<PlanStore>, scope: Scope, bus: Arc<EventBus>) -> Result<ExecutionOrchestrator> {
    let model = require_model(&config.models.executor, "executor")?;
    let llm = llm_client(config, &model)?;
    let executor = Arc::new(LlmAgentExecutor::new(llm, config.retry.to_policy(), config.llm.max_tokens));
    let steps = StepExecutor::new(executor, Arc::new(prompt_loader(config)))
        .with_model(Some(model))
        .with_workspace(WorkspaceContext::from_cwd());

    Ok(ExecutionOrchestrator::new(build_planner(config)?, steps)
        .with_events(bus)
        .with_journal(Arc::new(StoreJournal::new(store, scope)))
        .with_max_parallel_steps(config.execution.max_parallel_steps))
}

async fn cmd_run(
    config: &Config,
    task: Option<&str>,
    plan_id: Option<&str>,
    scope: Scope,
    format: OutputFormat,
) -> Result<()> {
    debug!(?task, ?plan_id, %scope, "cmd_run: called");
    let store = open_store(config)?;
    let bus = Arc::new(EventBus::with_default_capacity());
    let orchestrator = build_orchestrator(config, store.clone(), scope, bus.clone())?;
    let printer = (format == OutputFormat::Text).then(|| spawn_progress_printer(&bus));

    let report = match (task, plan_id) {
        (_, Some(id)) => {
            let saved = store
                .load_plan(id, scope)?
                .ok_or_else(|| eyre::eyre!("Plan not found: {}", id))?;
            let plan = TaskPlan::from_saved(&saved);
            if format == OutputFormat::Text {
                print_plan(config, &plan);
                println!();
            }
            orchestrator.execute_plan(plan).await
        }
        (Some(task), None) => orchestrator.run(task).await,
        (None, None) => return Err(eyre::eyre!("Give a task or --plan <id>")),
    };

    // Closing the bus ends the printer even when no plan ever started
    drop(orchestrator);
    drop(bus);
    if let Some(printer) = printer {
        if let Err(e) = printer.await {
            warn!(error = %e, "Progress printer ended abnormally");
        }
    }
    print_report(&report, format)?;
    if !report.success {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_resume(config: &Config, plan_id: &str, scope: Scope, format: OutputFormat) -> Result<()> {
    debug!(%plan_id, %scope, "cmd_resume: called");
    let store = open_store(config)?;
    let record = StoreJournal::new(store.clone(), scope)
        .load(plan_id)?
        .ok_or_else(|| eyre::eyre!("No execution record for plan {}", plan_id))?;
    println!(
        "Resuming {} ({} of {} steps completed)",
        plan_id.bold(),
        record.state.completed_steps.len(),
        record.plan.steps.len()
    );

    let bus = Arc::new(EventBus::with_default_capacity());
    let orchestrator = build_orchestrator(config, store, scope, bus.clone())?;
    let printer = (format == OutputFormat::Text).then(|| spawn_progress_printer(&bus));
    let report = orchestrator.resume(record).await;

    // Closing the bus ends the printer even when no plan ever started
    drop(orchestrator);
    drop(bus);
    if let Some(printer) = printer {
        if let Err(e) = printer.await {
            warn!(error = %e, "Progress printer ended abnormally");
        }
    }
    print_report(&report, format)
}

fn cmd_plans(config: &Config, command: PlansCommand) -> Result<()> {
    debug!(?command, "cmd_plans: called");
    let store = open_store(config)?;
    match command {
        PlansCommand::List { scope, all } => {
            let plans = store.list_plans(scope, all)?;
            if plans.is_empty() {
                println!("No plans saved ({})", scope);
                return Ok(());
            }
            for plan in plans {
                println!(
                    "{}  {}  {} steps  {}",
                    plan.plan_id.cyan(),
                    plan.title.bold(),
                    plan.steps.len(),
                    plan.last_edited_at
                        .unwrap_or(plan.created_at)
                        .format("%Y-%m-%d %H:%M")
                        .to_string()
                        .dimmed()
                );
            }
        }
        PlansCommand::Show { plan_id, scope } => {
            let plan = store
                .load_plan(&plan_id, scope)?
                .ok_or_else(|| eyre::eyre!("Plan not found: {}", plan_id))?;
            println!("{}", render_markdown(&plan));
        }
        PlansCommand::Delete { plan_id, scope } => {
            if store.delete_plan(&plan_id, scope)? {
                println!("Deleted {}", plan_id);
            } else {
                println!("Plan not found: {}", plan_id);
            }
        }
        PlansCommand::Archive { plan_id, scope } => match store.archive_plan(&plan_id, scope) {
            Ok(_) => println!("Archived {}", plan_id),
            Err(e) if e.is_not_found() => println!("Plan not found: {}", plan_id),
            Err(e) => return Err(e.into()),
        },
        PlansCommand::Unarchive { plan_id, scope } => match store.unarchive_plan(&plan_id, scope) {
            Ok(_) => println!("Unarchived {}", plan_id),
            Err(e) if e.is_not_found() => println!("Plan not found: {}", plan_id),
            Err(e) => return Err(e.into()),
        },
        PlansCommand::Undo { plan_id, scope } => match store.restore_snapshot(&plan_id, scope)? {
            Some(plan) => println!("Restored {} to version {}", plan_id, plan.version.unwrap_or_default()),
            None => println!("No snapshot to restore for {}", plan_id),
        },
        PlansCommand::LockStatus { plan_id, scope } => {
            let status = LockManager::new(&store).is_locked(&plan_id, scope)?;
            match (status.locked, status.locked_at, status.expires_at) {
                (true, Some(at), Some(until)) => println!(
                    "{} locked since {} (expires {})",
                    plan_id.yellow(),
                    at.to_rfc3339(),
                    until.to_rfc3339()
                ),
                (true, _, _) => println!("{} locked", plan_id.yellow()),
                (false, _, _) => println!("{} unlocked", plan_id.green()),
            }
        }
        PlansCommand::Unlock { plan_id, scope } => {
            LockManager::new(&store).release(&plan_id, scope)?;
            println!("Released lock on {}", plan_id);
        }
    }
    Ok(())
}

async fn cmd_edit(config: &Config, plan_id: &str, scope: Scope) -> Result<()> {
    debug!(%plan_id, %scope, "cmd_edit: called");
    let model = require_model(&config.models.editor, "editor")?;
    let llm = llm_client(config, &model)?;
    let store = open_store(config)?;
    let engine = Arc::new(
        PlanEditEngine::new(llm, store, prompt_loader(config), Some(model), config.retry.to_policy())
            .with_max_tokens(config.llm.max_tokens),
    );
    let mut editor = PlanEditor::open(engine, plan_id, scope, EditContext::new())?;

    println!("{}", render_markdown(editor.plan()));
    println!("{}", "Describe a change, /undo to revert the last edit, /done to finish.".dimmed());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/done" | "/quit" => break,
            "/undo" => match editor.undo() {
                Ok(Some(plan)) => println!("{}\n{}", "Reverted.".yellow(), render_markdown(&plan)),
                Ok(None) => println!("Nothing to undo."),
                Err(e) => println!("{} {}", "Undo failed:".red(), e),
            },
            message => match editor.send(message).await {
                Ok(outcome) => {
                    println!("{}", outcome.reply);
                    if outcome.changed() {
                        println!("\n{}\n{}", "Plan updated.".green(), render_markdown(&outcome.plan));
                    }
                }
                Err(e) => println!("{} {}", "Error:".red(), e),
            },
        }
    }

    if let Some(session) = editor.finish()? {
        info!(session_id = %session.session_id, "Edit session saved");
        println!("Saved edit session: {}", session.changes_summary);
    }
    Ok(())
}
