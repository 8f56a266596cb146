//! AgentExecutor trait: the host capability that runs one agent conversation

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::{LlmError, TokenUsage};

/// Who wrote a thread message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool call made by the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

impl ToolInvocation {
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// The `path` argument, if the call has one
    pub fn path(&self) -> Option<&str> {
        self.arguments.get("path").and_then(|v| v.as_str())
    }
}

/// One message in an executor thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadMessage {
    pub role: ThreadRole,
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolInvocation>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

impl ThreadMessage {
    pub fn new(role: ThreadRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            reasoning: None,
            usage: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ThreadRole::Assistant, content)
    }

    pub fn with_tool_call(mut self, call: ToolInvocation) -> Self {
        self.tool_calls.push(call);
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// What to run inside a thread
#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    pub thread_id: String,
    pub system_prompt: String,
    pub user_message: String,
    /// Model selection; the executor's default when absent
    pub model: Option<String>,
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Thread not found: {0}")]
    ThreadNotFound(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Execution failed: {0}")]
    Execution(String),
}

/// Runs agent conversations in ephemeral threads
///
/// A thread is created per step, executed once, read back and cleaned up.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    /// Create an empty thread and return its id
    async fn create_thread(&self) -> Result<String, ExecutorError>;

    /// Run the agent to completion inside the thread
    async fn execute(&self, request: ExecuteRequest) -> Result<(), ExecutorError>;

    /// All messages currently in the thread
    async fn thread_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, ExecutorError>;

    /// Discard the thread
    async fn cleanup_thread(&self, thread_id: &str) -> Result<(), ExecutorError>;
}
