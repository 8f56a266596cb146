//! PlanStore - two-scope persistence for editable plans
//!
//! Stores plans, undo snapshots, edit-session history, execution records and
//! edit locks. Project scope lives on disk under the workspace; global scope is
//! a set of JSON blobs under fixed keys in a key-value store.
//!
//! # Layout
//!
//! ```text
//! <workspace>/.agentflow/
//! └── plans/
//!     ├── 2026-01-14-add-oauth-login.json
//!     ├── 2026-01-14-add-oauth-login.md
//!     ├── edit-sessions/{session_id}.json
//!     ├── snapshots/{plan_id}.json
//!     ├── executions/{plan_id}.json
//!     └── locks/{plan_id}.lock
//! ```
//!
//! # Example
//!
//! ```ignore
//! use planstore::{PlanStore, SavedPlan, Scope};
//!
//! let store = PlanStore::open(Some(workspace), kv);
//! let plan = store.save_plan(SavedPlan::new("Add OAuth", "Login via GitHub"), Scope::Project)?;
//! let again = store.load_plan(&plan.plan_id, Scope::Project)?;
//! ```

mod error;
mod kv;
mod lock;
mod markdown;
mod model;
mod store;

pub use error::StoreError;
pub use kv::{FileKvStore, KvStore, MemoryKvStore};
pub use lock::{EditContext, LOCK_TTL_SECS, LockManager, LockOutcome, LockStatus};
pub use markdown::render_markdown;
pub use model::{
    ARCHIVED_TAG, EditMessage, EditRole, EditSession, LockRecord, PlanStep, RiskLevel, SavedPlan, Scope, ToolCallRecord,
    generate_id, new_step_id,
};
pub use store::{PlanStore, sanitize_title};

/// Name of the hidden per-workspace directory
pub const PROJECT_DIR: &str = ".agentflow";

/// Key holding the array of all global plans
pub const GLOBAL_PLANS_KEY: &str = "agentflow.plans";

/// Key holding the array of recent global edit sessions
pub const GLOBAL_SESSIONS_KEY: &str = "agentflow.editSessions";

/// Number of global edit sessions retained
pub const MAX_GLOBAL_SESSIONS: usize = 50;

/// Current time in UTC
pub fn now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}
