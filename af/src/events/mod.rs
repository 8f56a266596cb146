//! Event bus for orchestrator progress
//!
//! ```rust,ignore
//! let bus = Arc::new(EventBus::with_default_capacity());
//! let mut rx = bus.subscribe();
//! let orchestrator = ExecutionOrchestrator::new(planner, executor).with_events(bus.clone());
//! ```

mod bus;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventEmitter};
pub use types::OrchestratorEvent;
