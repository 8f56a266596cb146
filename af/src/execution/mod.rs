//! Plan execution: context aggregation, single-step execution and orchestration

mod batches;
mod context;
mod journal;
mod orchestrator;
mod report;
mod step_executor;

pub use batches::plan_batches;
pub use context::{CONTEXT_DELIMITER, aggregate_context};
pub use journal::{ExecutionJournal, StoreJournal};
pub use orchestrator::ExecutionOrchestrator;
pub use report::{ExecutionReport, NEXT_ADD_TESTS, NEXT_REVIEW_CHANGES, NEXT_REVIEW_FAILURES};
pub use step_executor::{SUMMARY_MAX_CHARS, StepExecutor, summarize};
