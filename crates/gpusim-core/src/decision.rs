//! Admission decisions and the outcome record of a run

use serde::{Deserialize, Serialize};

use crate::{GpuId, Task};

/// Why a task was or was not admitted in a wave
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// Task was placed on a GPU
    Admitted,
    /// No GPU currently has enough free memory; retried next wave
    TemporaryMemoryPressure,
    /// Task needs more memory than any GPU has; dropped for good
    ExceedsGpuCapacity,
}

impl DecisionReason {
    /// Wire name of the reason code
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionReason::Admitted => "admitted",
            DecisionReason::TemporaryMemoryPressure => "temporary_memory_pressure",
            DecisionReason::ExceedsGpuCapacity => "exceeds_gpu_capacity",
        }
    }

    /// Whether the task will not be considered again
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DecisionReason::TemporaryMemoryPressure)
    }
}

impl std::fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One admission attempt for one task in one wave
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionDecision {
    /// Task considered
    pub task: Task,
    /// Whether the task was admitted
    pub admitted: bool,
    /// Reason code
    pub reason: DecisionReason,
    /// GPU chosen, when admitted
    pub gpu_id: Option<GpuId>,
    /// Simulated time of the wave
    pub time: f64,
}

impl AdmissionDecision {
    pub fn admitted(task: Task, gpu_id: GpuId, time: f64) -> Self {
        Self {
            task,
            admitted: true,
            reason: DecisionReason::Admitted,
            gpu_id: Some(gpu_id),
            time,
        }
    }

    pub fn deferred(task: Task, time: f64) -> Self {
        Self {
            task,
            admitted: false,
            reason: DecisionReason::TemporaryMemoryPressure,
            gpu_id: None,
            time,
        }
    }

    pub fn rejected(task: Task, time: f64) -> Self {
        Self {
            task,
            admitted: false,
            reason: DecisionReason::ExceedsGpuCapacity,
            gpu_id: None,
            time,
        }
    }
}

/// Execution record of an admitted task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Task executed
    pub task: Task,
    /// GPU it ran on
    pub gpu_id: GpuId,
    /// Start time
    pub start_time: f64,
    /// End time
    pub end_time: f64,
    /// start - arrival
    pub wait_time: f64,
}

impl TaskResult {
    /// end - arrival
    pub fn turnaround(&self) -> f64 {
        self.end_time - self.task.arrival_time
    }
}

/// Everything a single scheduling run produced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleOutcome {
    /// Decisions in chronological order
    pub decisions: Vec<AdmissionDecision>,
    /// Results in admission order
    pub results: Vec<TaskResult>,
}

impl ScheduleOutcome {
    /// Decisions that did not admit their task
    pub fn rejected_decisions(&self) -> impl Iterator<Item = &AdmissionDecision> {
        self.decisions.iter().filter(|d| !d.admitted)
    }

    /// Tasks permanently rejected for exceeding every GPU's capacity
    pub fn capacity_rejections(&self) -> impl Iterator<Item = &Task> {
        self.decisions
            .iter()
            .filter(|d| d.reason == DecisionReason::ExceedsGpuCapacity)
            .map(|d| &d.task)
    }
}
