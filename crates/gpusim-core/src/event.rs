//! Structured scheduler events and the sinks that receive them

use serde::{Deserialize, Serialize};

use crate::{AdmissionDecision, DecisionReason, DurationClass, GpuId, TaskId, UserId};

/// Kind of scheduler event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Task was placed on a GPU
    Dispatch,
    /// Task stays pending until a later wave
    Defer,
    /// Task was dropped permanently
    Reject,
}

impl From<DecisionReason> for EventKind {
    fn from(reason: DecisionReason) -> Self {
        match reason {
            DecisionReason::Admitted => EventKind::Dispatch,
            DecisionReason::TemporaryMemoryPressure => EventKind::Defer,
            DecisionReason::ExceedsGpuCapacity => EventKind::Reject,
        }
    }
}

/// A flat event record emitted once per decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerEvent {
    pub event: EventKind,
    pub policy: String,
    pub time: f64,
    pub task_id: TaskId,
    pub user_id: UserId,
    pub arrival_time: f64,
    pub est_duration: f64,
    pub est_mem_gb: f64,
    pub duration_class: DurationClass,
    pub reason: DecisionReason,
    pub gpu_id: Option<GpuId>,
}

impl SchedulerEvent {
    /// Build the event describing `decision` under `policy`
    pub fn from_decision(policy: &str, decision: &AdmissionDecision) -> Self {
        let task = &decision.task;
        Self {
            event: decision.reason.into(),
            policy: policy.to_string(),
            time: decision.time,
            task_id: task.id,
            user_id: task.user_id,
            arrival_time: task.arrival_time,
            est_duration: task.est_duration,
            est_mem_gb: task.est_mem_gb,
            duration_class: task.duration_class,
            reason: decision.reason,
            gpu_id: decision.gpu_id,
        }
    }
}

/// Receiver of scheduler events
///
/// Sinks are fire-and-forget: they must swallow their own failures, and
/// nothing they do can influence scheduling.
pub trait EventSink: Send {
    /// Record a single event
    fn record(&mut self, event: &SchedulerEvent);

    /// Flush buffered events, if any
    fn flush(&mut self) {}
}

/// Sink that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn record(&mut self, _event: &SchedulerEvent) {}
}

/// Sink that keeps events in memory
#[derive(Debug, Default, Clone)]
pub struct MemoryEventSink {
    events: std::sync::Arc<std::sync::Mutex<Vec<SchedulerEvent>>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far (shared across clones)
    pub fn events(&self) -> Vec<SchedulerEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl EventSink for MemoryEventSink {
    fn record(&mut self, event: &SchedulerEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
