//! PlanEditEngine - one chat turn against a plan

use std::sync::Arc;

use planstore::{EditMessage, EditRole, PlanStore, SavedPlan, Scope};
use serde_json::json;
use tracing::{debug, info, warn};

use super::parse::{PlanUpdate, parse_update};
use super::{EditError, apply_update};
use crate::llm::{CompletionRequest, LlmClient, LlmError, Message};
use crate::prompts::PromptLoader;
use crate::retry::RetryPolicy;

/// Result of one chat turn
#[derive(Debug, Clone)]
pub struct EditOutcome {
    /// The model's reply, shown to the user as-is
    pub reply: String,
    /// The plan after the turn; unchanged when no update applied
    pub plan: SavedPlan,
    /// The applied update, if any
    pub update: Option<PlanUpdate>,
}

impl EditOutcome {
    pub fn changed(&self) -> bool {
        self.update.is_some()
    }
}

pub struct PlanEditEngine {
    llm: Arc<dyn LlmClient>,
    store: Arc<PlanStore>,
    prompts: PromptLoader,
    model: Option<String>,
    retry: RetryPolicy,
    max_tokens: u32,
}

impl PlanEditEngine {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        store: Arc<PlanStore>,
        prompts: PromptLoader,
        model: Option<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            llm,
            store,
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

    pub fn store(&self) -> &Arc<PlanStore> {
        &self.store
    }

    fn system_prompt(&self, plan: &SavedPlan) -> Result<String, EditError> {
        let ctx = json!({
            "title": plan.title,
            "summary": plan.summary,
            "steps": plan.steps,
            "tags": plan.tags,
        });
        self.prompts
            .render("editor", &ctx)
            .map_err(|e| EditError::Prompt(e.to_string()))
    }

    /// Send `message` about `plan`, apply any update in the reply and persist it
    ///
    /// The pre-edit plan is written as the undo snapshot just before the
    /// updated plan is saved.
    pub async fn process_message(
        &self,
        plan: &SavedPlan,
        scope: Scope,
        message: &str,
        history: &[EditMessage],
    ) -> Result<EditOutcome, EditError> {
        debug!(plan_id = %plan.plan_id, %scope, history_len = history.len(), "process_message: called");
        let model = self.model.clone().ok_or(EditError::NoModelSelected)?;

        let mut messages: Vec<Message> = history
            .iter()
            .map(|m| match m.role {
                EditRole::User => Message::user(m.content.clone()),
                EditRole::Assistant => Message::assistant(m.content.clone()),
            })
            .collect();
        messages.push(Message::user(message));

        let request = CompletionRequest {
            system_prompt: self.system_prompt(plan)?,
            messages,
            max_tokens: self.max_tokens,
            model: Some(model),
        };

        let response = self
            .retry
            .run_when(|| self.llm.complete(request.clone()), LlmError::is_retryable)
            .await?;

        let reply = response.content.unwrap_or_default();
        if reply.trim().is_empty() {
            return Err(LlmError::InvalidResponse("empty reply from editor model".to_string()).into());
        }

        let Some(update) = parse_update(&reply) else {
            debug!("process_message: no update in reply");
            return Ok(EditOutcome {
                reply,
                plan: plan.clone(),
                update: None,
            });
        };

        let next = match apply_update(plan, &update) {
            Ok(next) => next,
            Err(e) => {
                warn!(plan_id = %plan.plan_id, error = %e, "Discarding update that could not be applied");
                return Ok(EditOutcome {
                    reply,
                    plan: plan.clone(),
                    update: None,
                });
            }
        };

        self.store.save_snapshot(plan, scope)?;
        let saved = self.store.save_plan(next, scope)?;
        info!(plan_id = %saved.plan_id, section = %update.section, version = ?saved.version, "Applied plan update");

        Ok(EditOutcome {
            reply,
            plan: saved,
            update: Some(update),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit::Section;
    use crate::llm::client::mock::MockLlmClient;
    use planstore::MemoryKvStore;
    use tempfile::TempDir;

    fn setup(replies: &[&str], model: Option<&str>) -> (TempDir, Arc<MockLlmClient>, PlanEditEngine, SavedPlan) {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(PlanStore::open(Some(temp.path().to_path_buf()), Arc::new(MemoryKvStore::new())));
        let plan = store
            .save_plan(
                SavedPlan::new("Add caching", "Cache responses").with_tags(vec!["x".to_string()]),
                Scope::Project,
            )
            .unwrap();
        let llm = Arc::new(MockLlmClient::replying(replies));
        let engine = PlanEditEngine::new(
            llm.clone(),
            store,
            PromptLoader::embedded_only(),
            model.map(str::to_string),
            RetryPolicy::default(),
        );
        (temp, llm, engine, plan)
    }

    #[tokio::test]
    async fn test_update_applied_snapshotted_and_saved() {
        let reply = "Added them.\n```json\n{\"section\": \"tags\", \"newContent\": \"a, b, c\", \"operation\": \"append\"}\n```";
        let (_temp, llm, engine, plan) = setup(&[reply], Some("gpt-4o-mini"));

        let outcome = engine
            .process_message(&plan, Scope::Project, "add tags a, b and c", &[])
            .await
            .unwrap();

        assert!(outcome.changed());
        assert_eq!(outcome.update.as_ref().unwrap().section, Section::Tags);
        assert_eq!(outcome.plan.tags, vec!["x", "a", "b", "c"]);

        let stored = engine.store().load_plan(&plan.plan_id, Scope::Project).unwrap().unwrap();
        assert_eq!(stored.tags, vec!["x", "a", "b", "c"]);
        let snapshot = engine.store().load_snapshot(&plan.plan_id, Scope::Project).unwrap().unwrap();
        assert_eq!(snapshot.tags, vec!["x"]);

        let sent = &llm.requests()[0];
        assert_eq!(sent.model.as_deref(), Some("gpt-4o-mini"));
        assert!(sent.system_prompt.contains("Add caching"));
    }

    #[tokio::test]
    async fn test_reply_without_update_changes_nothing() {
        let (_temp, _llm, engine, plan) = setup(&["Step two depends on step one."], Some("m"));
        let history = vec![EditMessage::user("hi"), EditMessage::assistant("hello")];
        let outcome = engine
            .process_message(&plan, Scope::Project, "why this order?", &history)
            .await
            .unwrap();
        assert!(!outcome.changed());
        assert_eq!(outcome.plan, plan);
        assert!(engine.store().load_snapshot(&plan.plan_id, Scope::Project).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_history_forwarded() {
        let (_temp, llm, engine, plan) = setup(&["ok"], Some("m"));
        let history = vec![EditMessage::user("first"), EditMessage::assistant("reply")];
        engine.process_message(&plan, Scope::Project, "second", &history).await.unwrap();
        let sent = &llm.requests()[0];
        assert_eq!(sent.messages.len(), 3);
        assert_eq!(sent.messages[2].content, "second");
    }

    #[tokio::test]
    async fn test_missing_editor_model() {
        let (_temp, llm, engine, plan) = setup(&["unused"], None);
        let err = engine.process_message(&plan, Scope::Project, "x", &[]).await.unwrap_err();
        assert!(matches!(err, EditError::NoModelSelected));
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unappliable_update_is_discarded() {
        let reply = "```json\n{\"section\": \"title\", \"newContent\": \"\"}\n```";
        let (_temp, _llm, engine, plan) = setup(&[reply], Some("m"));
        let outcome = engine.process_message(&plan, Scope::Project, "blank it", &[]).await.unwrap();
        assert!(!outcome.changed());
        assert_eq!(outcome.plan.title, "Add caching");
    }
}
