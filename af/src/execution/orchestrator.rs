//! ExecutionOrchestrator - runs a whole plan
//!
//! ```text
//! plan -> validate -> for each batch: context -> execute -> record -> synthesize
//! ```
//!
//! A failed step never stops the run. The only fatal path is failing to
//! produce a valid plan.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use super::batches::plan_batches;
use super::context::aggregate_context;
use super::journal::ExecutionJournal;
use super::report::ExecutionReport;
use super::step_executor::StepExecutor;
use crate::domain::{ExecutionRecord, ExecutionState, ExecutionStatus, StepOutput, TaskPlan};
use crate::events::{EventBus, EventEmitter};
use crate::planning::TaskPlanner;

pub struct ExecutionOrchestrator {
    planner: Arc<dyn TaskPlanner>,
    steps: StepExecutor,
    events: Option<Arc<EventBus>>,
    journal: Option<Arc<dyn ExecutionJournal>>,
    max_parallel_steps: usize,
}

impl ExecutionOrchestrator {
    pub fn new(planner: Arc<dyn TaskPlanner>, steps: StepExecutor) -> Self {
        Self {
            planner,
            steps,
            events: None,
            journal: None,
            max_parallel_steps: 1,
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_journal(mut self, journal: Arc<dyn ExecutionJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Steps allowed to run at once; 1 keeps execution strictly sequential
    pub fn with_max_parallel_steps(mut self, max: usize) -> Self {
        self.max_parallel_steps = max.max(1);
        self
    }

    /// Plan `task` and execute the plan
    pub async fn run(&self, task: &str) -> ExecutionReport {
        debug!(%task, "ExecutionOrchestrator::run: called");
        match self.planner.plan(task, self.steps.workspace()).await {
            Ok(plan) => self.execute_plan(plan).await,
            Err(e) => {
                warn!(error = %e, "Planning failed");
                ExecutionReport::plan_failed(task, e.to_string())
            }
        }
    }

    /// Execute an already built plan from the start
    pub async fn execute_plan(&self, plan: TaskPlan) -> ExecutionReport {
        debug!(plan_id = %plan.plan_id, steps = plan.steps.len(), "ExecutionOrchestrator::execute_plan: called");
        if let Err(e) = plan.validate() {
            warn!(plan_id = %plan.plan_id, error = %e, "Refusing to execute invalid plan");
            return ExecutionReport::plan_failed(&plan.original_task, e.to_string());
        }
        let state = ExecutionState::new(&plan.plan_id);
        self.drive(plan, state, Vec::new()).await
    }

    /// Continue a recorded execution
    ///
    /// Completed steps are skipped and their recorded outputs seed the context;
    /// failed and unattempted steps run again.
    pub async fn resume(&self, record: ExecutionRecord) -> ExecutionReport {
        let ExecutionRecord { plan, state, outputs, .. } = record;
        debug!(plan_id = %plan.plan_id, completed = state.completed_steps.len(), "ExecutionOrchestrator::resume: called");
        if let Err(e) = plan.validate() {
            warn!(plan_id = %plan.plan_id, error = %e, "Refusing to resume invalid plan");
            return ExecutionReport::plan_failed(&plan.original_task, e.to_string());
        }

        // Latest recorded output of each completed step, in plan order
        let seed: Vec<StepOutput> = plan
            .steps
            .iter()
            .filter(|s| state.is_completed(&s.id))
            .filter_map(|s| outputs.iter().rev().find(|o| o.step_id == s.id && !o.is_failure()).cloned())
            .collect();

        self.drive(plan, state, seed).await
    }

    fn journal(&self, plan: &TaskPlan, state: &ExecutionState, outputs: &[StepOutput]) {
        if let Some(journal) = &self.journal {
            let record = ExecutionRecord::new(plan.clone(), state.clone(), outputs.to_vec());
            if let Err(e) = journal.record(&record) {
                warn!(plan_id = %plan.plan_id, error = %e, "Failed to journal execution state");
            }
        }
    }

    async fn drive(&self, plan: TaskPlan, mut state: ExecutionState, mut outputs: Vec<StepOutput>) -> ExecutionReport {
        let emitter: Option<EventEmitter> = self.events.as_ref().map(|bus| bus.emitter_for(&plan.plan_id));
        info!(plan_id = %plan.plan_id, steps = plan.steps.len(), max_parallel = self.max_parallel_steps, "Executing plan");

        state.status = ExecutionStatus::Executing;
        self.journal(&plan, &state, &outputs);
        if let Some(em) = &emitter {
            em.plan_started(&plan.original_task, plan.steps.len());
        }

        let pending: Vec<usize> = (0..plan.steps.len())
            .filter(|&i| !state.is_completed(&plan.steps[i].id))
            .collect();

        for batch in plan_batches(&plan.steps, &pending, self.max_parallel_steps) {
            for &i in &batch {
                let step = &plan.steps[i];
                if let Some(em) = &emitter {
                    em.step_started(i, &step.id, step.agent_role, &step.description);
                }
            }

            let results: Vec<StepOutput> = if batch.len() == 1 {
                let step = &plan.steps[batch[0]];
                let context = aggregate_context(step, &outputs);
                vec![self.steps.execute(step, &context).await]
            } else {
                debug!(batch = ?batch, "drive: running batch concurrently");
                let contexts: Vec<String> = batch
                    .iter()
                    .map(|&i| aggregate_context(&plan.steps[i], &outputs))
                    .collect();
                join_all(
                    batch
                        .iter()
                        .zip(&contexts)
                        .map(|(&i, context)| self.steps.execute(&plan.steps[i], context)),
                )
                .await
            };

            for (&i, output) in batch.iter().zip(results) {
                let step = &plan.steps[i];
                match output.error() {
                    Some(error) => state.mark_failed(&step.id, error),
                    None => state.mark_completed(&step.id),
                }
                state.current_step_index = i + 1;
                if let Some(em) = &emitter {
                    em.step_finished(&output);
                }
                outputs.push(output);
                self.journal(&plan, &state, &outputs);
            }
        }

        state.finish();
        // Resumed runs append retried steps after the seeded ones
        outputs.sort_by_key(|o| plan.steps.iter().position(|s| s.id == o.step_id));
        self.journal(&plan, &state, &outputs);

        let failed = outputs.iter().filter(|o| o.is_failure()).count();
        if let Some(em) = &emitter {
            em.plan_completed(outputs.len() - failed, failed);
        }
        info!(plan_id = %plan.plan_id, status = %state.status, failed, "Plan finished");

        ExecutionReport::synthesize(&plan, &state, outputs)
    }
}
