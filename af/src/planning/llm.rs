//! Model-backed planner
//!
//! Asks the planner model for a JSON plan in the persisted shape, checks the
//! required fields and converts the result into an executable plan.

use std::sync::Arc;

use async_trait::async_trait;
use planstore::{PlanStep, SavedPlan};
use serde_json::{Value, json};
use tracing::{debug, info};

use super::{PlannerError, TaskPlanner};
use crate::agents::WorkspaceContext;
use crate::domain::{Complexity, TaskPlan};
use crate::edit::{normalize_step, parse_tags};
use crate::extract::{MalformedResponse, parse_json_response};
use crate::llm::{CompletionRequest, LlmClient, LlmError, Message};
use crate::prompts::PromptLoader;
use crate::retry::RetryPolicy;

pub struct LlmPlanner {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLoader>,
    model: Option<String>,
    retry: RetryPolicy,
    max_tokens: u32,
}

impl LlmPlanner {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>, model: Option<String>, retry: RetryPolicy) -> Self {
        Self {
            llm,
            prompts,
            model,
            retry,
            max_tokens: 4096,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Ask the model for a plan in the persisted, editable shape
    pub async fn plan_saved(&self, task: &str, workspace: &WorkspaceContext) -> Result<SavedPlan, PlannerError> {
        debug!(%task, "LlmPlanner::plan_saved: called");
        let model = self.model.clone().ok_or_else(|| PlannerError::NoModelSelected {
            role: "planner".to_string(),
        })?;

        let system_prompt = self
            .prompts
            .render("planner", &json!({ "task": task, "workspace_root": workspace.root }))
            .map_err(|e| PlannerError::Prompt(e.to_string()))?;

        let request = CompletionRequest {
            system_prompt,
            messages: vec![Message::user(format!("Plan this task:\n\n{}", task))],
            max_tokens: self.max_tokens,
            model: Some(model),
        };

        let response = self
            .retry
            .run_when(|| self.llm.complete(request.clone()), LlmError::is_retryable)
            .await?;
        let raw = response.content.unwrap_or_default();

        let saved = parse_plan(&raw)?;
        info!(plan_id = %saved.plan_id, steps = saved.steps.len(), "Model produced a plan");
        Ok(saved)
    }
}

/// Validate and convert the model's JSON into a saved plan
fn parse_plan(raw: &str) -> Result<SavedPlan, MalformedResponse> {
    let value: Value = parse_json_response(raw)?;

    let title = value
        .get("title")
        .and_then(Value::as_str)
        .ok_or_else(|| MalformedResponse::new("missing required string field 'title'", raw))?;
    let summary = value
        .get("summary")
        .and_then(Value::as_str)
        .ok_or_else(|| MalformedResponse::new("missing required string field 'summary'", raw))?;
    let steps = value
        .get("steps")
        .and_then(Value::as_array)
        .ok_or_else(|| MalformedResponse::new("'steps' must be an array", raw))?;

    // Full-shape steps keep their dependencies; loose ones are normalized
    let steps: Vec<PlanStep> = steps
        .iter()
        .map(|s| serde_json::from_value::<PlanStep>(s.clone()).unwrap_or_else(|_| normalize_step(s)))
        .collect();
    let tags = value.get("tags").map(parse_tags).unwrap_or_default();

    let mut plan = SavedPlan::new(title, summary).with_steps(steps).with_tags(tags);
    if let Some(plan_type) = value.get("planType").and_then(Value::as_str) {
        plan.plan_type = plan_type.to_string();
    }
    Ok(plan)
}

/// Executable view of a model plan
fn to_task_plan(saved: &SavedPlan, task: &str) -> Result<TaskPlan, PlannerError> {
    let mut plan = TaskPlan::from_saved(saved);
    plan.original_task = task.to_string();
    plan.complexity = Complexity::classify(task);
    plan.validate()?;
    Ok(plan)
}

#[async_trait]
impl TaskPlanner for LlmPlanner {
    async fn plan(&self, task: &str, workspace: &WorkspaceContext) -> Result<TaskPlan, PlannerError> {
        let saved = self.plan_saved(task, workspace).await?;
        to_task_plan(&saved, task)
    }

    async fn plan_for_saving(
        &self,
        task: &str,
        workspace: &WorkspaceContext,
    ) -> Result<(TaskPlan, SavedPlan), PlannerError> {
        let saved = self.plan_saved(task, workspace).await?;
        let plan = to_task_plan(&saved, task)?;
        Ok((plan, saved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AgentRole;
    use crate::llm::client::mock::MockLlmClient;
    use crate::llm::CompletionResponse;
    use std::time::Duration;

    const GOOD: &str = r#"Here you go:
```json
{
  "title": "Add retry flag",
  "summary": "Expose retries on the CLI",
  "steps": [
    {"stepId": "s1", "description": "Find where retries are configured", "agentRole": "researcher", "dependencies": []},
    {"stepId": "s2", "description": "Add the flag", "agentRole": "developer", "dependencies": ["s1"]},
    {"id": 3, "title": "Review the flag handling"}
  ],
  "tags": ["cli"]
}
```"#;

    fn planner(llm: Arc<MockLlmClient>, model: Option<&str>) -> LlmPlanner {
        LlmPlanner::new(
            llm,
            Arc::new(PromptLoader::embedded_only()),
            model.map(str::to_string),
            RetryPolicy::default(),
        )
    }

    #[tokio::test]
    async fn test_plan_from_model() {
        let llm = Arc::new(MockLlmClient::replying(&[GOOD]));
        let plan = planner(llm.clone(), Some("gpt-4o"))
            .plan("add a retry flag", &WorkspaceContext::default())
            .await
            .unwrap();

        assert_eq!(plan.steps.len(), 3);
        assert_eq!(plan.steps[1].context_step_ids, vec!["s1".to_string()]);
        assert_eq!(plan.steps[2].id, "3");
        assert_eq!(plan.steps[2].agent_role, AgentRole::Reviewer);
        assert_eq!(plan.original_task, "add a retry flag");
        assert_eq!(llm.requests()[0].model.as_deref(), Some("gpt-4o"));
        assert!(llm.requests()[0].system_prompt.contains("add a retry flag"));
    }

    #[tokio::test]
    async fn test_plan_saved_keeps_tags() {
        let llm = Arc::new(MockLlmClient::replying(&[GOOD]));
        let saved = planner(llm, Some("m"))
            .plan_saved("x", &WorkspaceContext::default())
            .await
            .unwrap();
        assert_eq!(saved.title, "Add retry flag");
        assert_eq!(saved.tags, vec!["cli"]);
    }

    #[tokio::test]
    async fn test_saved_form_keeps_model_fields() {
        let reply = r#"{"title": "Add retry flag", "summary": "Expose retries", "tags": ["cli"],
            "steps": [{"stepId": "s1", "description": "Edit args", "riskLevel": "risky", "toolsToUse": ["write_file"]}]}"#;
        let llm = Arc::new(MockLlmClient::replying(&[reply]));
        let (plan, saved) = planner(llm, Some("m"))
            .plan_for_saving("add a retry flag to the CLI", &WorkspaceContext::default())
            .await
            .unwrap();
        assert_eq!(plan.plan_id, saved.plan_id);
        assert!(plan.steps[0].requires_approval);

        let temp = tempfile::TempDir::new().unwrap();
        let store = planstore::PlanStore::open(
            Some(temp.path().to_path_buf()),
            Arc::new(planstore::MemoryKvStore::new()),
        );
        store.save_plan(saved, planstore::Scope::Project).unwrap();
        let stored = store.load_plan(&plan.plan_id, planstore::Scope::Project).unwrap().unwrap();
        assert_eq!(stored.title, "Add retry flag");
        assert_eq!(stored.summary, "Expose retries");
        assert_eq!(stored.tags, vec!["cli"]);
        assert_eq!(stored.steps[0].risk_level, planstore::RiskLevel::Risky);
        assert_eq!(stored.steps[0].tools_to_use, vec!["write_file"]);
    }

    #[tokio::test]
    async fn test_missing_fields_are_malformed() {
        for reply in [
            r#"{"summary": "s", "steps": []}"#,
            r#"{"title": "t", "steps": []}"#,
            r#"{"title": "t", "summary": "s", "steps": "one then two"}"#,
            "I cannot help with that.",
        ] {
            let llm = Arc::new(MockLlmClient::replying(&[reply]));
            let err = planner(llm.clone(), Some("m"))
                .plan("x", &WorkspaceContext::default())
                .await
                .unwrap_err();
            assert!(matches!(err, PlannerError::MalformedResponse(_)), "{}: {:?}", reply, err);
            // Malformed replies are not retried
            assert_eq!(llm.call_count(), 1);
        }
    }

    #[tokio::test]
    async fn test_empty_steps_is_invalid_plan() {
        let llm = Arc::new(MockLlmClient::replying(&[r#"{"title": "t", "summary": "s", "steps": []}"#]));
        let err = planner(llm, Some("m")).plan("x", &WorkspaceContext::default()).await.unwrap_err();
        assert!(matches!(err, PlannerError::InvalidPlan(_)));
    }

    #[tokio::test]
    async fn test_no_model_selected() {
        let llm = Arc::new(MockLlmClient::replying(&[GOOD]));
        let err = planner(llm.clone(), None).plan("x", &WorkspaceContext::default()).await.unwrap_err();
        assert!(matches!(err, PlannerError::NoModelSelected { .. }));
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_retried() {
        let llm = Arc::new(MockLlmClient::with_results(vec![
            Err(LlmError::ApiError {
                status: 503,
                message: "overloaded".to_string(),
            }),
            Err(LlmError::Timeout(Duration::from_secs(5))),
            Ok(CompletionResponse::text(GOOD)),
        ]));
        let plan = planner(llm.clone(), Some("m")).plan("x", &WorkspaceContext::default()).await;
        assert!(plan.is_ok());
        assert_eq!(llm.call_count(), 3);
    }
}
