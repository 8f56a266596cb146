//! Where the orchestrator records progress so a run can be resumed

use std::sync::Arc;

use planstore::{PlanStore, Scope, StoreError};
use tracing::debug;

use crate::domain::ExecutionRecord;

/// Persistence hook for execution progress
pub trait ExecutionJournal: Send + Sync {
    /// Overwrite the stored record for the record's plan
    fn record(&self, record: &ExecutionRecord) -> Result<(), StoreError>;

    /// Stored record for a plan, if any
    fn load(&self, plan_id: &str) -> Result<Option<ExecutionRecord>, StoreError>;
}

/// Journal backed by the plan store
pub struct StoreJournal {
    store: Arc<PlanStore>,
    scope: Scope,
}

impl StoreJournal {
    pub fn new(store: Arc<PlanStore>, scope: Scope) -> Self {
        Self { store, scope }
    }
}

impl ExecutionJournal for StoreJournal {
    fn record(&self, record: &ExecutionRecord) -> Result<(), StoreError> {
        debug!(plan_id = %record.plan.plan_id, status = %record.state.status, "StoreJournal::record: called");
        self.store.save_execution(&record.plan.plan_id, record, self.scope)
    }

    fn load(&self, plan_id: &str) -> Result<Option<ExecutionRecord>, StoreError> {
        self.store.load_execution(plan_id, self.scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AgentRole, ExecutionState, Step, TaskPlan};
    use planstore::MemoryKvStore;

    #[test]
    fn test_record_and_load_both_scopes() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = Arc::new(PlanStore::open(Some(temp.path().to_path_buf()), Arc::new(MemoryKvStore::new())));
        let plan = TaskPlan::new("explain x", vec![Step::new("step-1", AgentRole::Researcher, "look")]);

        for scope in [Scope::Project, Scope::Global] {
            let journal = StoreJournal::new(store.clone(), scope);
            assert!(journal.load(&plan.plan_id).unwrap().is_none());

            let record = ExecutionRecord::new(plan.clone(), ExecutionState::new(&plan.plan_id), vec![]);
            journal.record(&record).unwrap();
            let loaded = journal.load(&plan.plan_id).unwrap().unwrap();
            assert_eq!(loaded.plan, plan);
        }
    }
}
