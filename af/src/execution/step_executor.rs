//! StepExecutor - runs one step inside an ephemeral agent thread
//!
//! Every failure, including a panic inside the executor, comes back as a
//! failed [`StepOutput`]. The thread is cleaned up on every exit path.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::agents::{
    AgentExecutor, AgentProfile, ExecuteRequest, ExecutorError, ThreadMessage, ThreadRole, WorkspaceContext,
    is_read_tool, is_write_tool,
};
use crate::domain::{Step, StepOutput};
use crate::llm::TokenUsage;
use crate::prompts::PromptLoader;

/// Longest summary taken from the first paragraph of a reply
pub const SUMMARY_MAX_CHARS: usize = 200;

#[derive(Debug, Error)]
enum StepError {
    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error("No assistant response in thread {0}")]
    NoAssistantMessage(String),

    #[error("Step panicked: {0}")]
    Panicked(String),
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// First paragraph, capped at `SUMMARY_MAX_CHARS`
pub fn summarize(text: &str) -> String {
    let first = text
        .trim()
        .split("\n\n")
        .next()
        .unwrap_or_default()
        .trim();
    first.chars().take(SUMMARY_MAX_CHARS).collect()
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

/// Build a step output from the thread's messages
fn extract_output(step_id: &str, thread_id: &str, messages: &[ThreadMessage]) -> Result<StepOutput, StepError> {
    let last = messages
        .iter()
        .rev()
        .find(|m| m.role == ThreadRole::Assistant)
        .ok_or_else(|| StepError::NoAssistantMessage(thread_id.to_string()))?;

    let mut output = StepOutput {
        step_id: step_id.to_string(),
        summary: summarize(&last.content),
        detailed_text: last.content.clone(),
        reasoning: last.reasoning.clone(),
        ..Default::default()
    };

    let mut usage: Option<TokenUsage> = None;
    for message in messages.iter().filter(|m| m.role == ThreadRole::Assistant) {
        for call in &message.tool_calls {
            push_unique(&mut output.tools_used, &call.name);
            if let Some(path) = call.path() {
                if is_read_tool(&call.name) {
                    push_unique(&mut output.files_read, path);
                } else if is_write_tool(&call.name) {
                    push_unique(&mut output.files_written, path);
                }
            }
        }
        if let Some(u) = message.usage {
            *usage.get_or_insert_with(TokenUsage::default) += u;
        }
    }
    output.token_usage = usage;
    Ok(output)
}

pub struct StepExecutor {
    executor: Arc<dyn AgentExecutor>,
    prompts: Arc<PromptLoader>,
    model: Option<String>,
    workspace: WorkspaceContext,
}

impl StepExecutor {
    pub fn new(executor: Arc<dyn AgentExecutor>, prompts: Arc<PromptLoader>) -> Self {
        Self {
            executor,
            prompts,
            model: None,
            workspace: WorkspaceContext::default(),
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_workspace(mut self, workspace: WorkspaceContext) -> Self {
        self.workspace = workspace;
        self
    }

    pub fn workspace(&self) -> &WorkspaceContext {
        &self.workspace
    }

    fn system_prompt(&self, step: &Step) -> Result<String, StepError> {
        let profile = AgentProfile::for_role(step.agent_role);
        let workspace = (!self.workspace.is_empty()).then_some(&self.workspace);
        let ctx = json!({
            "role": step.agent_role.to_string(),
            "goal": profile.goal,
            "backstory": profile.backstory,
            "tools": profile.tools(),
            "can_write": step.agent_role.is_write_capable(),
            "workspace": workspace,
        });
        self.prompts
            .render("step-system", &ctx)
            .map_err(|e| StepError::Prompt(e.to_string()))
    }

    fn user_prompt(&self, step: &Step, context: &str) -> Result<String, StepError> {
        let template = if context.trim().is_empty() {
            "step-user"
        } else {
            "step-user-context"
        };
        let ctx = json!({
            "description": step.description,
            "expected_output": step.expected_output,
            "context": context,
        });
        self.prompts
            .render(template, &ctx)
            .map_err(|e| StepError::Prompt(e.to_string()))
    }

    async fn run_in_thread(&self, step: &Step, context: &str, thread_id: &str) -> Result<StepOutput, StepError> {
        let request = ExecuteRequest {
            thread_id: thread_id.to_string(),
            system_prompt: self.system_prompt(step)?,
            user_message: self.user_prompt(step, context)?,
            model: self.model.clone(),
        };
        self.executor.execute(request).await?;
        let messages = self.executor.thread_messages(thread_id).await?;
        extract_output(&step.id, thread_id, &messages)
    }

    /// Run one step; never fails, a failure is returned as a failed output
    pub async fn execute(&self, step: &Step, context: &str) -> StepOutput {
        debug!(step_id = %step.id, role = %step.agent_role, context_len = context.len(), "StepExecutor::execute: called");
        let start = Instant::now();

        let thread_id = match self.executor.create_thread().await {
            Ok(id) => id,
            Err(e) => {
                warn!(step_id = %step.id, error = %e, "Could not create agent thread");
                return StepOutput::failed(&step.id, e.to_string(), start.elapsed().as_millis() as u64);
            }
        };

        let result = AssertUnwindSafe(self.run_in_thread(step, context, &thread_id))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(StepError::Panicked(panic_message(payload))));

        if let Err(e) = self.executor.cleanup_thread(&thread_id).await {
            warn!(step_id = %step.id, %thread_id, error = %e, "Failed to clean up agent thread");
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        match result {
            Ok(mut output) => {
                output.duration_ms = duration_ms;
                info!(step_id = %step.id, duration_ms, tools = output.tools_used.len(), "Step completed");
                output
            }
            Err(e) => {
                warn!(step_id = %step.id, error = %e, "Step failed");
                StepOutput::failed(&step.id, e.to_string(), duration_ms)
            }
        }
    }
}
