//! In-process AgentExecutor backed by a single model completion per execute
//!
//! There is no tool loop here: the agent answers from the prompt alone. Hosts
//! with a real tool-calling agent implement `AgentExecutor` themselves.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::executor::{AgentExecutor, ExecuteRequest, ExecutorError, ThreadMessage, ThreadRole};
use crate::llm::{CompletionRequest, LlmClient, LlmError, Message};
use crate::retry::RetryPolicy;

pub struct LlmAgentExecutor {
    llm: Arc<dyn LlmClient>,
    retry: RetryPolicy,
    max_tokens: u32,
    threads: Mutex<HashMap<String, Vec<ThreadMessage>>>,
}

impl LlmAgentExecutor {
    pub fn new(llm: Arc<dyn LlmClient>, retry: RetryPolicy, max_tokens: u32) -> Self {
        Self {
            llm,
            retry,
            max_tokens,
            threads: Mutex::new(HashMap::new()),
        }
    }

    fn to_messages(thread: &[ThreadMessage]) -> Vec<Message> {
        thread
            .iter()
            .filter_map(|m| match m.role {
                ThreadRole::User => Some(Message::user(m.content.clone())),
                ThreadRole::Assistant => Some(Message::assistant(m.content.clone())),
                ThreadRole::System | ThreadRole::Tool => None,
            })
            .collect()
    }
}

#[async_trait]
impl AgentExecutor for LlmAgentExecutor {
    async fn create_thread(&self) -> Result<String, ExecutorError> {
        let id = format!("thread-{}", uuid::Uuid::now_v7().simple());
        debug!(thread_id = %id, "LlmAgentExecutor::create_thread: called");
        self.threads.lock().await.insert(id.clone(), Vec::new());
        Ok(id)
    }

    async fn execute(&self, request: ExecuteRequest) -> Result<(), ExecutorError> {
        debug!(thread_id = %request.thread_id, model = ?request.model, "LlmAgentExecutor::execute: called");
        let messages = {
            let mut threads = self.threads.lock().await;
            let thread = threads
                .get_mut(&request.thread_id)
                .ok_or_else(|| ExecutorError::ThreadNotFound(request.thread_id.clone()))?;
            thread.push(ThreadMessage::new(ThreadRole::System, request.system_prompt.clone()));
            thread.push(ThreadMessage::new(ThreadRole::User, request.user_message.clone()));
            Self::to_messages(thread)
        };

        let completion = CompletionRequest {
            system_prompt: request.system_prompt.clone(),
            messages,
            max_tokens: self.max_tokens,
            model: request.model.clone(),
        };

        let response = self
            .retry
            .run_when(|| self.llm.complete(completion.clone()), LlmError::is_retryable)
            .await?;

        let content = response
            .content
            .ok_or_else(|| ExecutorError::Execution("model returned no content".to_string()))?;

        let mut threads = self.threads.lock().await;
        let thread = threads
            .get_mut(&request.thread_id)
            .ok_or_else(|| ExecutorError::ThreadNotFound(request.thread_id.clone()))?;
        thread.push(ThreadMessage::assistant(content).with_usage(response.usage));
        debug!(thread_id = %request.thread_id, "LlmAgentExecutor::execute: done");
        Ok(())
    }

    async fn thread_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, ExecutorError> {
        self.threads
            .lock()
            .await
            .get(thread_id)
            .cloned()
            .ok_or_else(|| ExecutorError::ThreadNotFound(thread_id.to_string()))
    }

    async fn cleanup_thread(&self, thread_id: &str) -> Result<(), ExecutorError> {
        debug!(%thread_id, "LlmAgentExecutor::cleanup_thread: called");
        match self.threads.lock().await.remove(thread_id) {
            Some(_) => Ok(()),
            None => Err(ExecutorError::ThreadNotFound(thread_id.to_string())),
        }
    }
}
