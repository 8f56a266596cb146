//! Final report of a run

use serde::{Deserialize, Serialize};

use crate::domain::{ExecutionState, ExecutionStatus, Step, StepOutput, TaskPlan};
use crate::llm::TokenUsage;

/// Words suggesting the task adds new functionality
const NEW_FUNCTIONALITY_WORDS: &[&str] = &["add", "implement", "create", "new", "build", "feature"];

pub const NEXT_REVIEW_FAILURES: &str = "Review the failed steps and retry";
pub const NEXT_REVIEW_CHANGES: &str = "Review the changes and run the test suite";
pub const NEXT_ADD_TESTS: &str = "Add tests for the new functionality";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub task: String,
    /// False only when no plan could be built
    pub success: bool,
    pub plan_id: Option<String>,
    pub steps: Vec<Step>,
    pub outputs: Vec<StepOutput>,
    pub status: ExecutionStatus,
    pub summary: String,
    pub next_actions: Vec<String>,
    pub files_written: Vec<String>,
    pub token_usage: TokenUsage,
    pub error: Option<String>,
}

impl ExecutionReport {
    /// Report for a run that never got a valid plan
    pub fn plan_failed(task: &str, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            task: task.to_string(),
            success: false,
            plan_id: None,
            steps: Vec::new(),
            outputs: Vec::new(),
            status: ExecutionStatus::Failed,
            summary: format!("Planning failed: {}", error),
            next_actions: Vec::new(),
            files_written: Vec::new(),
            token_usage: TokenUsage::default(),
            error: Some(error),
        }
    }

    /// Summarise a finished run
    pub fn synthesize(plan: &TaskPlan, state: &ExecutionState, outputs: Vec<StepOutput>) -> Self {
        let mut files_written: Vec<String> = Vec::new();
        for file in outputs.iter().flat_map(|o| &o.files_written) {
            if !files_written.contains(file) {
                files_written.push(file.clone());
            }
        }
        let token_usage: TokenUsage = outputs.iter().filter_map(|o| o.token_usage).sum();

        Self {
            task: plan.original_task.clone(),
            success: true,
            plan_id: Some(plan.plan_id.clone()),
            steps: plan.steps.clone(),
            summary: summary(plan, &outputs),
            next_actions: next_actions(&plan.original_task, &outputs, &files_written),
            outputs,
            status: state.status,
            files_written,
            token_usage,
            error: None,
        }
    }

    pub fn failed_count(&self) -> usize {
        self.outputs.iter().filter(|o| o.is_failure()).count()
    }
}

fn summary(plan: &TaskPlan, outputs: &[StepOutput]) -> String {
    let failed = outputs.iter().filter(|o| o.is_failure()).count();
    let mut lines = vec![format!(
        "Executed {} of {} steps: {} succeeded, {} failed",
        outputs.len(),
        plan.steps.len(),
        outputs.len() - failed,
        failed
    )];
    for step in &plan.steps {
        let status = match outputs.iter().rev().find(|o| o.step_id == step.id) {
            Some(o) if o.is_failure() => "failed",
            Some(_) => "completed",
            None => "not run",
        };
        lines.push(format!("- {} [{}]: {}", step.id, step.agent_role, status));
    }
    lines.join("\n")
}

fn implies_new_functionality(task: &str) -> bool {
    task.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| NEW_FUNCTIONALITY_WORDS.contains(&word))
}

fn next_actions(task: &str, outputs: &[StepOutput], files_written: &[String]) -> Vec<String> {
    let mut actions = Vec::new();
    if outputs.iter().any(StepOutput::is_failure) {
        actions.push(NEXT_REVIEW_FAILURES.to_string());
    }
    if !files_written.is_empty() && !outputs.iter().any(StepOutput::has_lint_error) {
        actions.push(NEXT_REVIEW_CHANGES.to_string());
    }
    if implies_new_functionality(task) {
        actions.push(NEXT_ADD_TESTS.to_string());
    }
    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AgentRole;

    fn plan(task: &str) -> TaskPlan {
        TaskPlan::new(
            task,
            vec![
                Step::new("step-1", AgentRole::Researcher, "look"),
                Step::new("step-2", AgentRole::Developer, "change").with_context(&["step-1"]),
            ],
        )
    }

    fn ok(id: &str, written: &[&str], usage: TokenUsage) -> StepOutput {
        StepOutput {
            step_id: id.to_string(),
            summary: "ok".to_string(),
            detailed_text: "ok".to_string(),
            files_written: written.iter().map(|s| s.to_string()).collect(),
            token_usage: Some(usage),
            ..Default::default()
        }
    }

    #[test]
    fn test_synthesize_success() {
        let plan = plan("Add a retry flag");
        let mut state = ExecutionState::new(&plan.plan_id);
        state.finish();
        let outputs = vec![
            ok("step-1", &["a.rs"], TokenUsage::new(10, 1)),
            ok("step-2", &["a.rs", "b.rs"], TokenUsage::new(20, 2)),
        ];
        let report = ExecutionReport::synthesize(&plan, &state, outputs);

        assert!(report.success);
        assert_eq!(report.files_written, vec!["a.rs", "b.rs"]);
        assert_eq!(report.token_usage, TokenUsage::new(30, 3));
        assert_eq!(report.next_actions, vec![NEXT_REVIEW_CHANGES, NEXT_ADD_TESTS]);
        assert!(report.summary.starts_with("Executed 2 of 2 steps: 2 succeeded, 0 failed"));
        assert!(report.summary.contains("- step-2 [developer]: completed"));
    }

    #[test]
    fn test_failure_and_lint() {
        let plan = plan("fix the crash");
        let state = ExecutionState::new(&plan.plan_id);
        let mut linted = ok("step-1", &["a.rs"], TokenUsage::default());
        linted.warnings.push("clippy lint: needless borrow".to_string());
        let outputs = vec![linted, StepOutput::failed("step-2", "boom", 0)];
        let report = ExecutionReport::synthesize(&plan, &state, outputs);

        assert!(report.success);
        assert_eq!(report.failed_count(), 2);
        assert_eq!(report.next_actions, vec![NEXT_REVIEW_FAILURES]);
        assert!(report.summary.contains("- step-2 [developer]: failed"));
    }

    #[test]
    fn test_new_functionality_is_word_based() {
        assert!(implies_new_functionality("Implement caching"));
        assert!(implies_new_functionality("build: the thing"));
        assert!(!implies_new_functionality("Fix the address parser"));
    }

    #[test]
    fn test_plan_failed() {
        let report = ExecutionReport::plan_failed("t", "no steps");
        assert!(!report.success);
        assert!(report.steps.is_empty());
        assert!(report.outputs.is_empty());
        assert_eq!(report.error.as_deref(), Some("no steps"));
    }
}
