//! Event Bus - pub/sub for orchestrator progress
//!
//! Uses a tokio broadcast channel so any number of consumers (CLI progress
//! output, tests) see every event emitted after they subscribe.

use tokio::sync::broadcast;
use tracing::debug;

use super::types::OrchestratorEvent;
use crate::domain::{AgentRole, StepOutput};

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

pub struct EventBus {
    tx: broadcast::Sender<OrchestratorEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Emit an event to all subscribers
    ///
    /// Fire-and-forget: with no subscribers the event is dropped.
    pub fn emit(&self, event: OrchestratorEvent) {
        debug!(event_type = event.event_type(), plan_id = event.plan_id(), "EventBus::emit");
        let _ = self.tx.send(event);
    }

    /// Receive every event emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Emitter bound to one plan execution
    pub fn emitter_for(&self, plan_id: impl Into<String>) -> EventEmitter {
        EventEmitter {
            tx: self.tx.clone(),
            plan_id: plan_id.into(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Cheap-to-clone handle that stamps every event with its plan id
#[derive(Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<OrchestratorEvent>,
    plan_id: String,
}

impl EventEmitter {
    pub fn plan_id(&self) -> &str {
        &self.plan_id
    }

    pub fn emit(&self, event: OrchestratorEvent) {
        debug!(event_type = event.event_type(), "EventEmitter::emit");
        let _ = self.tx.send(event);
    }

    pub fn plan_started(&self, task: &str, total_steps: usize) {
        self.emit(OrchestratorEvent::PlanStarted {
            plan_id: self.plan_id.clone(),
            task: task.to_string(),
            total_steps,
        });
    }

    pub fn step_started(&self, step_index: usize, step_id: &str, agent_role: AgentRole, description: &str) {
        self.emit(OrchestratorEvent::StepStarted {
            plan_id: self.plan_id.clone(),
            step_id: step_id.to_string(),
            step_index,
            agent_role,
            description: description.to_string(),
        });
    }

    /// StepCompleted for a clean output, StepFailed otherwise
    pub fn step_finished(&self, output: &StepOutput) {
        let event = if output.is_failure() {
            OrchestratorEvent::StepFailed {
                plan_id: self.plan_id.clone(),
                step_id: output.step_id.clone(),
                error: output.warnings.join("; "),
            }
        } else {
            OrchestratorEvent::StepCompleted {
                plan_id: self.plan_id.clone(),
                step_id: output.step_id.clone(),
                summary: output.summary.clone(),
                duration_ms: output.duration_ms,
                token_usage: output.token_usage,
            }
        };
        self.emit(event);
    }

    pub fn plan_completed(&self, succeeded: usize, failed: usize) {
        self.emit(OrchestratorEvent::PlanCompleted {
            plan_id: self.plan_id.clone(),
            succeeded,
            failed,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers_is_ok() {
        let bus = EventBus::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        bus.emitter_for("p").plan_started("t", 1);
    }

    #[tokio::test]
    async fn test_subscriber_receives_in_order() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let emitter = bus.emitter_for("plan-1");

        emitter.plan_started("task", 2);
        emitter.step_started(0, "step-1", AgentRole::Researcher, "look");
        emitter.step_finished(&StepOutput::failed("step-1", "boom", 0));
        emitter.plan_completed(0, 1);

        let types: Vec<_> = (0..4).map(|_| rx.try_recv().unwrap().event_type()).collect();
        assert_eq!(types, vec!["plan_started", "step_started", "step_failed", "plan_completed"]);
    }

    #[test]
    fn test_step_finished_success() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();
        let output = StepOutput {
            step_id: "s".to_string(),
            summary: "did it".to_string(),
            ..Default::default()
        };
        bus.emitter_for("p").step_finished(&output);
        match rx.try_recv().unwrap() {
            OrchestratorEvent::StepCompleted { summary, plan_id, .. } => {
                assert_eq!(summary, "did it");
                assert_eq!(plan_id, "p");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
