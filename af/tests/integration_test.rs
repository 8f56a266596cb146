//! Integration tests for AgentFlow
//!
//! These tests drive the public API end to end with an in-memory executor
//! and a temp-dir plan store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use agentflow::agents::{ThreadMessage, ThreadRole};
use agentflow::edit::{Operation, PlanUpdate, Section};
use agentflow::{
    AgentExecutor, AgentRole, Complexity, ExecuteRequest, ExecutionJournal, ExecutionOrchestrator, ExecutionStatus,
    ExecutorError, HeuristicPlanner, PromptLoader, StepExecutor, StoreJournal, TaskPlanner, WorkspaceContext,
    apply_update,
};
use async_trait::async_trait;
use planstore::{EditContext, LockManager, MemoryKvStore, PlanStore, SavedPlan, Scope};
use tempfile::TempDir;

const LOGIN_TASK: &str = "fix the bug where login fails";

/// Replies to every step, except those whose prompt contains `fail_on`
struct ScriptedExecutor {
    fail_on: Option<&'static str>,
    threads: Mutex<HashMap<String, Vec<ThreadMessage>>>,
    prompts: Mutex<Vec<String>>,
    next_id: Mutex<u32>,
}

impl ScriptedExecutor {
    fn new(fail_on: Option<&'static str>) -> Self {
        Self {
            fail_on,
            threads: Mutex::new(HashMap::new()),
            prompts: Mutex::new(Vec::new()),
            next_id: Mutex::new(0),
        }
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentExecutor for ScriptedExecutor {
    async fn create_thread(&self) -> Result<String, ExecutorError> {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        let id = format!("thread-{}", next);
        self.threads.lock().unwrap().insert(id.clone(), Vec::new());
        Ok(id)
    }

    async fn execute(&self, request: ExecuteRequest) -> Result<(), ExecutorError> {
        self.prompts.lock().unwrap().push(request.user_message.clone());
        if let Some(marker) = self.fail_on
            && request.user_message.contains(marker)
        {
            return Err(ExecutorError::Execution("agent refused".to_string()));
        }
        let mut threads = self.threads.lock().unwrap();
        let thread = threads
            .get_mut(&request.thread_id)
            .ok_or_else(|| ExecutorError::ThreadNotFound(request.thread_id.clone()))?;
        thread.push(ThreadMessage::new(ThreadRole::User, request.user_message));
        thread.push(ThreadMessage::assistant("Looked into it.\n\nThe session check compares the wrong field."));
        Ok(())
    }

    async fn thread_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, ExecutorError> {
        self.threads
            .lock()
            .unwrap()
            .get(thread_id)
            .cloned()
            .ok_or_else(|| ExecutorError::ThreadNotFound(thread_id.to_string()))
    }

    async fn cleanup_thread(&self, thread_id: &str) -> Result<(), ExecutorError> {
        self.threads.lock().unwrap().remove(thread_id);
        Ok(())
    }
}

fn temp_store() -> (TempDir, Arc<PlanStore>) {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let store = PlanStore::open(Some(temp.path().to_path_buf()), Arc::new(MemoryKvStore::new()));
    (temp, Arc::new(store))
}

fn orchestrator(executor: Arc<ScriptedExecutor>) -> ExecutionOrchestrator {
    let steps = StepExecutor::new(executor, Arc::new(PromptLoader::embedded_only()));
    ExecutionOrchestrator::new(Arc::new(HeuristicPlanner::new()), steps)
}

// =============================================================================
// Planning
// =============================================================================

#[tokio::test]
async fn test_heuristic_plan_for_bug_fix() {
    let plan = HeuristicPlanner::new()
        .plan(LOGIN_TASK, &WorkspaceContext::default())
        .await
        .expect("plan");

    let roles: Vec<AgentRole> = plan.steps.iter().map(|s| s.agent_role).collect();
    assert_eq!(roles, vec![AgentRole::Researcher, AgentRole::Developer, AgentRole::Reviewer]);
    assert!(plan.steps[1].requires_approval);
    assert_eq!(plan.complexity, Complexity::Simple);
}

// =============================================================================
// Execution
// =============================================================================

#[tokio::test]
async fn test_failed_step_does_not_stop_the_run() {
    let executor = Arc::new(ScriptedExecutor::new(Some("Implement:")));
    let report = orchestrator(executor.clone()).run(LOGIN_TASK).await;

    assert!(report.success);
    assert_eq!(report.outputs.len(), 3);
    assert!(!report.outputs[0].is_failure());
    assert!(report.outputs[1].is_failure());
    assert!(!report.outputs[2].is_failure());
    assert_eq!(report.status, ExecutionStatus::Failed);

    // The reviewer still sees what happened to the developer step
    let prompts = executor.prompts();
    assert_eq!(prompts.len(), 3);
    assert!(prompts[2].contains("agent refused"));
}

#[tokio::test]
async fn test_journal_then_resume_reruns_only_failed_steps() {
    let (_temp, store) = temp_store();
    let journal = Arc::new(StoreJournal::new(store.clone(), Scope::Project));

    let first = orchestrator(Arc::new(ScriptedExecutor::new(Some("Implement:"))))
        .with_journal(journal.clone())
        .run(LOGIN_TASK)
        .await;
    let plan_id = first.plan_id.clone().expect("plan id");

    let record = journal.load(&plan_id).unwrap().expect("journaled record");
    assert_eq!(record.state.completed_steps, vec!["step-1", "step-3"]);
    assert_eq!(record.state.failed_steps.len(), 1);

    let retry = Arc::new(ScriptedExecutor::new(None));
    let report = orchestrator(retry.clone()).with_journal(journal.clone()).resume(record).await;

    assert!(report.success);
    assert_eq!(report.status, ExecutionStatus::Completed);
    assert_eq!(report.failed_count(), 0);
    assert_eq!(retry.prompts().len(), 1);
    assert!(retry.prompts()[0].contains("Implement:"));
}

// =============================================================================
// Editing and locking
// =============================================================================

#[test]
fn test_append_tags_update() {
    let plan = SavedPlan::new("Login fix", "Repair the session check").with_tags(vec!["x".to_string()]);
    let update = PlanUpdate::new(Section::Tags, "a, b, c".into(), Operation::Append);

    let next = apply_update(&plan, &update).unwrap();
    assert_eq!(next.tags, vec!["x", "a", "b", "c"]);
}

#[test]
fn test_second_session_locked_out_until_release() {
    let (_temp, store) = temp_store();
    let saved = store
        .save_plan(SavedPlan::new("Login fix", "Repair the session check"), Scope::Project)
        .unwrap();
    let locks = LockManager::new(&store);
    let (a, b) = (EditContext::new(), EditContext::new());

    assert!(locks.acquire(&saved.plan_id, Scope::Project, &a).unwrap().success);

    let denied = locks.acquire(&saved.plan_id, Scope::Project, &b).unwrap();
    assert!(!denied.success);
    assert!(denied.error.unwrap().contains("being edited in another session"));

    locks.release(&saved.plan_id, Scope::Project).unwrap();
    assert!(locks.acquire(&saved.plan_id, Scope::Project, &b).unwrap().success);
}
