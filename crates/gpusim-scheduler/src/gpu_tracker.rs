//! GPU tracker for memory accounting and reservation lifecycle

use gpusim_core::{GpuId, GpuState, RunningTask, SimError, SimResult, Task};
use tracing::{debug, info};

/// Tracks per-GPU memory reservations for one simulation run
#[derive(Debug, Clone)]
pub struct GpuTracker {
    /// Simulated devices, ordered by id
    gpus: Vec<GpuState>,
}

impl GpuTracker {
    /// Create a tracker from per-GPU capacities in GB; GPU ids follow the slice order
    pub fn new(capacities: &[f64]) -> SimResult<Self> {
        if capacities.is_empty() {
            return Err(SimError::Config(
                "at least one GPU is required".to_string(),
            ));
        }

        let mut gpus = Vec::with_capacity(capacities.len());
        for (index, &capacity) in capacities.iter().enumerate() {
            if !capacity.is_finite() || capacity <= 0.0 {
                return Err(SimError::Config(format!(
                    "gpu{} must have positive memory, got {}",
                    index, capacity
                )));
            }
            gpus.push(GpuState::new(index as GpuId, capacity));
        }

        info!(
            gpus = gpus.len(),
            max_capacity_gb = gpus.iter().map(|g| g.total_mem_gb).fold(0.0, f64::max),
            "GPU tracker initialized"
        );

        Ok(Self { gpus })
    }

    /// Create a tracker with `count` identical GPUs
    pub fn uniform(count: u32, mem_gb: f64) -> SimResult<Self> {
        Self::new(&vec![mem_gb; count as usize])
    }

    /// Get the total number of GPUs
    pub fn gpu_count(&self) -> usize {
        self.gpus.len()
    }

    /// All GPUs in id order
    pub fn gpus(&self) -> &[GpuState] {
        &self.gpus
    }

    /// Largest single-GPU capacity in the fleet
    pub fn max_capacity(&self) -> f64 {
        self.gpus
            .iter()
            .map(|g| g.total_mem_gb)
            .fold(0.0, f64::max)
    }

    /// Whether no GPU could ever hold `mem_gb`, even when idle
    pub fn exceeds_capacity(&self, mem_gb: f64) -> bool {
        mem_gb > self.max_capacity()
    }

    /// GPUs with at least `mem_gb` free right now, in id order
    pub fn feasible(&self, mem_gb: f64) -> Vec<&GpuState> {
        self.gpus.iter().filter(|g| g.fits(mem_gb)).collect()
    }

    /// Drop every reservation whose end time is at or before `now`
    ///
    /// Returns the number of released reservations
    pub fn release_completed(&mut self, now: f64) -> usize {
        let mut released = 0;
        for gpu in &mut self.gpus {
            let before = gpu.running.len();
            gpu.running.retain(|rt| rt.end_time > now);
            let dropped = before - gpu.running.len();
            if dropped > 0 {
                debug!(gpu = gpu.id, released = dropped, now, "Released reservations");
            }
            released += dropped;
        }
        released
    }

    /// Reserve `task`'s memory on `gpu_id` for [start, start + duration)
    pub fn reserve(&mut self, gpu_id: GpuId, task: Task, start: f64) -> SimResult<RunningTask> {
        let gpu = self
            .gpus
            .iter_mut()
            .find(|g| g.id == gpu_id)
            .ok_or_else(|| SimError::Policy(format!("unknown GPU id {}", gpu_id)))?;

        if !gpu.fits(task.est_mem_gb) {
            return Err(SimError::Policy(format!(
                "task {} needs {} GB but {} has {} GB free",
                task.id,
                task.est_mem_gb,
                gpu.name(),
                gpu.free_mem_gb()
            )));
        }

        let running = RunningTask {
            task,
            start_time: start,
            end_time: start + task.est_duration,
        };
        gpu.running.push(running);
        debug_assert!(gpu.used_mem_gb() <= gpu.total_mem_gb);

        Ok(running)
    }

    /// Earliest end time of any running reservation
    pub fn next_completion(&self) -> Option<f64> {
        self.gpus
            .iter()
            .filter_map(GpuState::next_completion)
            .min_by(|a, b| a.total_cmp(b))
    }

    /// Whether any GPU still holds a reservation
    pub fn is_busy(&self) -> bool {
        self.gpus.iter().any(|g| !g.running.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: u64, mem: f64, duration: f64) -> Task {
        Task::new(id, 1, 0.0, duration, mem, 60.0).unwrap()
    }

    #[test]
    fn test_tracker_requires_gpus() {
        assert!(matches!(GpuTracker::new(&[]), Err(SimError::Config(_))));
        assert!(matches!(
            GpuTracker::uniform(0, 24.0),
            Err(SimError::Config(_))
        ));
        assert!(matches!(
            GpuTracker::new(&[24.0, 0.0]),
            Err(SimError::Config(_))
        ));
    }

    #[test]
    fn test_max_capacity() {
        let tracker = GpuTracker::new(&[16.0, 24.0, 8.0]).unwrap();
        assert_eq!(tracker.gpu_count(), 3);
        assert_eq!(tracker.max_capacity(), 24.0);
        assert!(tracker.exceeds_capacity(30.0));
        assert!(!tracker.exceeds_capacity(24.0));
    }

    #[test]
    fn test_reserve_and_release() {
        let mut tracker = GpuTracker::uniform(2, 24.0).unwrap();

        let rt = tracker.reserve(0, task(1, 16.0, 30.0), 10.0).unwrap();
        assert_eq!(rt.end_time, 40.0);
        assert_eq!(tracker.gpus()[0].free_mem_gb(), 8.0);
        assert_eq!(tracker.next_completion(), Some(40.0));
        assert!(tracker.is_busy());

        assert_eq!(tracker.release_completed(39.9), 0);
        assert_eq!(tracker.release_completed(40.0), 1);
        assert_eq!(tracker.gpus()[0].free_mem_gb(), 24.0);
        assert!(tracker.next_completion().is_none());
        assert!(!tracker.is_busy());
    }

    #[test]
    fn test_feasible_filters_by_free_memory() {
        let mut tracker = GpuTracker::uniform(3, 24.0).unwrap();
        tracker.reserve(1, task(1, 20.0, 30.0), 0.0).unwrap();

        let ids: Vec<u32> = tracker.feasible(10.0).iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![0, 2]);

        let ids: Vec<u32> = tracker.feasible(4.0).iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_reserve_rejects_overcommit() {
        let mut tracker = GpuTracker::uniform(1, 10.0).unwrap();
        tracker.reserve(0, task(1, 6.0, 20.0), 0.0).unwrap();

        let result = tracker.reserve(0, task(2, 8.0, 20.0), 0.0);
        assert!(matches!(result, Err(SimError::Policy(_))));
        assert_eq!(tracker.gpus()[0].used_mem_gb(), 6.0);
    }

    #[test]
    fn test_reserve_unknown_gpu() {
        let mut tracker = GpuTracker::uniform(1, 10.0).unwrap();
        assert!(tracker.reserve(5, task(1, 1.0, 1.0), 0.0).is_err());
    }
}
