//! Agents: role profiles and the executor capability steps run against

mod executor;
mod llm_executor;
mod profile;
mod workspace;

pub use executor::{AgentExecutor, ExecuteRequest, ExecutorError, ThreadMessage, ThreadRole, ToolInvocation};
pub use llm_executor::LlmAgentExecutor;
pub use profile::{AgentProfile, READ_TOOLS, ToolProfile, WRITE_TOOLS, is_read_tool, is_write_tool};
pub use workspace::WorkspaceContext;

#[cfg(test)]
pub use executor::mock;
