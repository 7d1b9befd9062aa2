//! Simulated GPU state

use serde::{Deserialize, Serialize};

use crate::Task;

/// Identifier of a simulated GPU
pub type GpuId = u32;

/// A task bound to its reserved execution window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunningTask {
    /// The task being executed
    pub task: Task,
    /// Start of the reservation
    pub start_time: f64,
    /// End of the reservation (exclusive)
    pub end_time: f64,
}

/// Memory accounting for a single simulated GPU
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuState {
    /// Device id
    pub id: GpuId,
    /// Total memory in GB
    pub total_mem_gb: f64,
    /// Tasks currently holding memory on this device
    pub running: Vec<RunningTask>,
}

impl GpuState {
    /// Create an idle GPU
    pub fn new(id: GpuId, total_mem_gb: f64) -> Self {
        Self {
            id,
            total_mem_gb,
            running: Vec::new(),
        }
    }

    /// Memory held by running tasks
    pub fn used_mem_gb(&self) -> f64 {
        self.running.iter().map(|rt| rt.task.est_mem_gb).sum()
    }

    /// Memory still available, floored at zero
    pub fn free_mem_gb(&self) -> f64 {
        (self.total_mem_gb - self.used_mem_gb()).max(0.0)
    }

    /// Whether `mem_gb` fits into the currently free memory
    pub fn fits(&self, mem_gb: f64) -> bool {
        self.free_mem_gb() >= mem_gb
    }

    /// Earliest end time among running tasks
    pub fn next_completion(&self) -> Option<f64> {
        self.running
            .iter()
            .map(|rt| rt.end_time)
            .min_by(|a, b| a.total_cmp(b))
    }

    /// Display name used in logs and reports
    pub fn name(&self) -> String {
        gpu_name(self.id)
    }
}

/// Display name of a GPU id (e.g. `gpu0`)
pub fn gpu_name(id: GpuId) -> String {
    format!("gpu{}", id)
}
