//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use planstore::Scope;
use std::path::PathBuf;
use tracing::debug;

/// AgentFlow - multi-agent task planning and execution
#[derive(Parser)]
#[command(
    name = "af",
    about = "Plan coding tasks, run them with role-specialised agents, edit saved plans",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Produce a plan for a task without executing it
    Plan {
        /// Task description
        task: String,

        /// Save the plan so it can be edited or run later
        #[arg(short, long)]
        save: bool,

        /// Where to save (project, global)
        #[arg(long, default_value = "project")]
        scope: Scope,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Plan and execute a task, or execute a saved plan
    Run {
        /// Task description
        #[arg(required_unless_present = "plan", conflicts_with = "plan")]
        task: Option<String>,

        /// ID of a saved plan to execute instead
        #[arg(short, long)]
        plan: Option<String>,

        /// Scope the saved plan and execution record live in
        #[arg(long, default_value = "project")]
        scope: Scope,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Resume an interrupted execution from its record
    Resume {
        /// Plan ID of the execution
        plan_id: String,

        #[arg(long, default_value = "project")]
        scope: Scope,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Manage saved plans
    Plans {
        #[command(subcommand)]
        command: PlansCommand,
    },

    /// Edit a saved plan conversationally
    Edit {
        /// Plan ID to edit
        plan_id: String,

        #[arg(long, default_value = "project")]
        scope: Scope,
    },
}

/// Saved plan subcommands
#[derive(Debug, Subcommand)]
pub enum PlansCommand {
    /// List saved plans, newest edit first
    List {
        #[arg(long, default_value = "project")]
        scope: Scope,

        /// Include archived plans
        #[arg(short, long)]
        all: bool,
    },

    /// Show a plan as markdown
    Show {
        plan_id: String,

        #[arg(long, default_value = "project")]
        scope: Scope,
    },

    /// Delete a plan
    Delete {
        plan_id: String,

        #[arg(long, default_value = "project")]
        scope: Scope,
    },

    /// Archive a plan
    Archive {
        plan_id: String,

        #[arg(long, default_value = "project")]
        scope: Scope,
    },

    /// Unarchive a plan
    Unarchive {
        plan_id: String,

        #[arg(long, default_value = "project")]
        scope: Scope,
    },

    /// Restore the plan from its pre-edit snapshot
    Undo {
        plan_id: String,

        #[arg(long, default_value = "project")]
        scope: Scope,
    },

    /// Show whether a plan is locked for editing
    LockStatus {
        plan_id: String,

        #[arg(long, default_value = "project")]
        scope: Scope,
    },

    /// Force-release an edit lock
    Unlock {
        plan_id: String,

        #[arg(long, default_value = "project")]
        scope: Scope,
    },
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("agentflow")
        .join("logs")
        .join("agentflow.log")
}

/// Output format for plan and report commands
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_plan() {
        let cli = Cli::parse_from(["af", "plan", "fix the login bug"]);
        match cli.command {
            Command::Plan {
                task,
                save,
                scope,
                format,
            } => {
                assert_eq!(task, "fix the login bug");
                assert!(!save);
                assert_eq!(scope, Scope::Project);
                assert_eq!(format, OutputFormat::Text);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_parse_plan_save_global_json() {
        let cli = Cli::parse_from(["af", "plan", "x", "--save", "--scope", "global", "-f", "json"]);
        assert!(matches!(
            cli.command,
            Command::Plan {
                save: true,
                scope: Scope::Global,
                format: OutputFormat::Json,
                ..
            }
        ));
    }

    #[test]
    fn test_cli_parse_run_saved_plan() {
        let cli = Cli::parse_from(["af", "run", "--plan", "task_abc"]);
        match cli.command {
            Command::Run { task, plan, .. } => {
                assert!(task.is_none());
                assert_eq!(plan.as_deref(), Some("task_abc"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_run_needs_task_or_plan() {
        assert!(Cli::try_parse_from(["af", "run"]).is_err());
        assert!(Cli::try_parse_from(["af", "run", "task", "--plan", "p"]).is_err());
    }

    #[test]
    fn test_cli_parse_plans_subcommands() {
        let cli = Cli::parse_from(["af", "plans", "list", "--all"]);
        assert!(matches!(
            cli.command,
            Command::Plans {
                command: PlansCommand::List { all: true, .. }
            }
        ));

        let cli = Cli::parse_from(["af", "plans", "lock-status", "p1", "--scope", "global"]);
        assert!(matches!(
            cli.command,
            Command::Plans {
                command: PlansCommand::LockStatus {
                    scope: Scope::Global,
                    ..
                }
            }
        ));
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::parse_from(["af", "plans", "show", "p1", "-l", "debug", "-c", "af.yml"]);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.config, Some(PathBuf::from("af.yml")));
    }

    #[test]
    fn test_cli_bad_scope_rejected() {
        assert!(Cli::try_parse_from(["af", "plans", "list", "--scope", "galaxy"]).is_err());
    }
}
