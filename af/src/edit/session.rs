//! PlanEditor - one locked editing session over a plan

use std::sync::Arc;
use std::time::Duration;

use planstore::{
    EditContext, EditMessage, EditSession, LOCK_TTL_SECS, LockManager, PlanStore, SavedPlan, Scope, ToolCallRecord,
};
use tracing::{debug, info, warn};

use super::{EditError, EditOutcome, PlanEditEngine};

/// Tool name recorded on assistant messages that changed the plan
const UPDATE_TOOL: &str = "update_plan";

/// Holds the plan's edit lock from `open` until `finish`
pub struct PlanEditor {
    engine: Arc<PlanEditEngine>,
    locks: LockManager,
    ctx: EditContext,
    scope: Scope,
    plan: SavedPlan,
    messages: Vec<EditMessage>,
    changes: Vec<String>,
}

impl PlanEditor {
    /// Load the plan and take its lock for `ctx`'s session
    pub fn open(engine: Arc<PlanEditEngine>, plan_id: &str, scope: Scope, ctx: EditContext) -> Result<Self, EditError> {
        Self::open_with_lock_ttl(engine, plan_id, scope, ctx, Duration::from_secs(LOCK_TTL_SECS))
    }

    /// Like [`open`](Self::open), with a lock lifetime other than the default
    pub fn open_with_lock_ttl(
        engine: Arc<PlanEditEngine>,
        plan_id: &str,
        scope: Scope,
        ctx: EditContext,
        ttl: Duration,
    ) -> Result<Self, EditError> {
        debug!(%plan_id, %scope, session_id = %ctx.session_id, ?ttl, "PlanEditor::open: called");
        let store: &PlanStore = engine.store();
        let plan = store
            .load_plan(plan_id, scope)?
            .ok_or_else(|| EditError::PlanNotFound(plan_id.to_string()))?;

        let locks = LockManager::new(store).with_ttl(ttl);
        let outcome = locks.acquire(plan_id, scope, &ctx)?;
        if !outcome.success {
            return Err(EditError::Locked(outcome.error.unwrap_or_else(|| "Plan is locked".to_string())));
        }

        info!(%plan_id, %scope, session_id = %ctx.session_id, "Edit session opened");
        Ok(Self {
            engine,
            locks,
            ctx,
            scope,
            plan,
            messages: Vec::new(),
            changes: Vec::new(),
        })
    }

    pub fn plan(&self) -> &SavedPlan {
        &self.plan
    }

    pub fn session_id(&self) -> &str {
        &self.ctx.session_id
    }

    pub fn messages(&self) -> &[EditMessage] {
        &self.messages
    }

    fn refresh_lock(&self) -> Result<(), EditError> {
        let outcome = self.locks.acquire(&self.plan.plan_id, self.scope, &self.ctx)?;
        if outcome.success {
            Ok(())
        } else {
            Err(EditError::Locked(outcome.error.unwrap_or_else(|| "Plan is locked".to_string())))
        }
    }

    /// One chat turn; refreshes the lock first
    pub async fn send(&mut self, message: &str) -> Result<EditOutcome, EditError> {
        debug!(plan_id = %self.plan.plan_id, "PlanEditor::send: called");
        self.refresh_lock()?;

        let outcome = self
            .engine
            .process_message(&self.plan, self.scope, message, &self.messages)
            .await?;

        self.messages.push(EditMessage::user(message));
        let mut reply = EditMessage::assistant(outcome.reply.clone());
        if let Some(update) = &outcome.update {
            match serde_json::to_value(update) {
                Ok(arguments) => reply = reply.with_tool_call(ToolCallRecord::new(UPDATE_TOOL, arguments)),
                Err(e) => warn!(error = %e, "Could not record plan update on the session"),
            }
        }
        self.messages.push(reply);
        if let Some(update) = &outcome.update {
            let mut change = format!("{} ({:?})", update.section, update.operation).to_lowercase();
            if !update.reason.is_empty() {
                change.push_str(": ");
                change.push_str(&update.reason);
            }
            self.changes.push(change);
            self.plan = outcome.plan.clone();
        }
        Ok(outcome)
    }

    /// Restore the plan from its snapshot; `None` when there is nothing to undo
    pub fn undo(&mut self) -> Result<Option<SavedPlan>, EditError> {
        debug!(plan_id = %self.plan.plan_id, "PlanEditor::undo: called");
        self.refresh_lock()?;
        let restored = self.engine.store().restore_snapshot(&self.plan.plan_id, self.scope)?;
        if let Some(plan) = &restored {
            self.plan = plan.clone();
            self.changes.push("undo".to_string());
        }
        Ok(restored)
    }

    /// Record the session (when anything was said) and release the lock
    pub fn finish(self) -> Result<Option<EditSession>, EditError> {
        debug!(plan_id = %self.plan.plan_id, "PlanEditor::finish: called");
        let result = if self.messages.is_empty() {
            Ok(None)
        } else {
            let summary = if self.changes.is_empty() {
                "No changes".to_string()
            } else {
                self.changes.join("; ")
            };
            let session = EditSession::new(
                self.ctx.session_id.clone(),
                self.plan.plan_id.clone(),
                self.messages.clone(),
                summary,
                self.scope,
            );
            self.engine
                .store()
                .save_edit_session(&session)
                .map(|_| Some(session))
                .map_err(EditError::from)
        };

        if let Err(e) = self.locks.release_held(&self.plan.plan_id, self.scope, &self.ctx) {
            warn!(plan_id = %self.plan.plan_id, error = %e, "Failed to release edit lock");
        }
        info!(plan_id = %self.plan.plan_id, "Edit session finished");
        result
    }
}
