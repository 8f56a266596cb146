//! AgentFlow - multi-agent task planning and execution
//!
//! A task description is turned into a plan of role-specialised steps, the
//! steps run one after another (or in small parallel batches) against an
//! agent executor, and the outputs are folded into a report. Saved plans can
//! be refined conversationally through the plan edit engine.
//!
//! # Modules
//!
//! - [`planning`] - heuristic and model-backed planners
//! - [`execution`] - step executor, orchestrator and execution journal
//! - [`edit`] - plan edit engine and editing sessions
//! - [`agents`] - role profiles and the agent executor capability
//! - [`llm`] - LLM client trait and OpenAI-compatible implementation
//! - [`events`] - progress events for hosts
//! - [`retry`] - exponential-backoff retry
//! - [`extract`] - JSON extraction from model output
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod agents;
pub mod cli;
pub mod config;
pub mod domain;
pub mod edit;
pub mod events;
pub mod execution;
pub mod extract;
pub mod llm;
pub mod planning;
pub mod prompts;
pub mod retry;

// Re-export commonly used types
pub use agents::{AgentExecutor, AgentProfile, ExecuteRequest, ExecutorError, LlmAgentExecutor, WorkspaceContext};
pub use config::{Config, LlmConfig, PlannerKind};
pub use domain::{
    AgentRole, Complexity, ExecutionRecord, ExecutionState, ExecutionStatus, Impact, PlanValidationError, Step,
    StepOutput, TaskPlan,
};
pub use edit::{EditError, EditOutcome, Operation, PlanEditEngine, PlanEditor, PlanUpdate, Section, apply_update};
pub use events::{EventBus, EventEmitter, OrchestratorEvent};
pub use execution::{ExecutionJournal, ExecutionOrchestrator, ExecutionReport, StepExecutor, StoreJournal};
pub use extract::{MalformedResponse, extract_json, parse_json_response};
pub use llm::{CompletionRequest, CompletionResponse, LlmClient, LlmError, OpenAIClient, create_client};
pub use planning::{HeuristicPlanner, LlmPlanner, PlannerError, TaskPlanner};
pub use prompts::PromptLoader;
pub use retry::RetryPolicy;
