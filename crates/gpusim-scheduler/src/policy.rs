//! Admission ordering and GPU placement policies

use std::cmp::Ordering;
use std::sync::Arc;

use gpusim_core::{GpuId, GpuState, PolicyKind, SchedulerConfig, SimResult, Task};

/// Strategy deciding which pending tasks go first and where they land
///
/// Both the capacity pre-check and the reservation mechanics live in the
/// engine; a policy only orders tasks and picks among feasible GPUs.
pub trait SchedulingPolicy: Send + Sync {
    /// Policy name used in events and reports
    fn name(&self) -> &'static str;

    /// Order the pending set for admission at time `now`
    fn order(&self, pending: &[Task], now: f64) -> Vec<Task>;

    /// Pick a GPU among `feasible`, which holds only GPUs with enough free memory
    fn pick_gpu(&self, feasible: &[&GpuState], task: &Task) -> Option<GpuId>;
}

/// Build the policy for `kind` from scheduler settings
pub fn build_policy(
    kind: PolicyKind,
    config: &SchedulerConfig,
) -> SimResult<Arc<dyn SchedulingPolicy>> {
    config.validate()?;
    Ok(match kind {
        PolicyKind::Memory => Arc::new(MemoryAwarePolicy::new(config)?),
        PolicyKind::Fifo => Arc::new(FifoPolicy),
    })
}

fn by_arrival(a: &Task, b: &Task) -> Ordering {
    a.arrival_time
        .total_cmp(&b.arrival_time)
        .then_with(|| a.id.cmp(&b.id))
}

/// Short-first ordering with aging, placed on the GPU with the most free memory
#[derive(Debug, Clone)]
pub struct MemoryAwarePolicy {
    short_threshold: f64,
    aging_window: f64,
    prefer_short: bool,
}

impl MemoryAwarePolicy {
    /// Fails with a config error on a non-positive threshold or aging window
    pub fn new(config: &SchedulerConfig) -> SimResult<Self> {
        config.validate()?;
        Ok(Self {
            short_threshold: config.short_threshold,
            aging_window: config.aging_window,
            prefer_short: config.prefer_short,
        })
    }

    fn is_aged(&self, task: &Task, now: f64) -> bool {
        task.wait_at(now) >= self.aging_window
    }

    fn cmp_aged(a: &Task, b: &Task, now: f64) -> Ordering {
        b.wait_at(now)
            .total_cmp(&a.wait_at(now))
            .then_with(|| by_arrival(a, b))
    }

    fn cmp_normal(&self, a: &Task, b: &Task) -> Ordering {
        if !self.prefer_short {
            return by_arrival(a, b);
        }
        let a_long = a.est_duration > self.short_threshold;
        let b_long = b.est_duration > self.short_threshold;
        a_long
            .cmp(&b_long)
            .then_with(|| a.est_duration.total_cmp(&b.est_duration))
            .then_with(|| by_arrival(a, b))
    }
}

impl SchedulingPolicy for MemoryAwarePolicy {
    fn name(&self) -> &'static str {
        PolicyKind::Memory.as_str()
    }

    fn order(&self, pending: &[Task], now: f64) -> Vec<Task> {
        let (mut aged, mut normal): (Vec<Task>, Vec<Task>) =
            pending.iter().partition(|t| self.is_aged(t, now));

        aged.sort_by(|a, b| Self::cmp_aged(a, b, now));
        normal.sort_by(|a, b| self.cmp_normal(a, b));

        aged.extend(normal);
        aged
    }

    fn pick_gpu(&self, feasible: &[&GpuState], _task: &Task) -> Option<GpuId> {
        feasible
            .iter()
            .min_by(|a, b| {
                b.free_mem_gb()
                    .total_cmp(&a.free_mem_gb())
                    .then_with(|| a.id.cmp(&b.id))
            })
            .map(|g| g.id)
    }
}

/// Arrival-order baseline, placed on the first GPU that fits
#[derive(Debug, Clone, Copy, Default)]
pub struct FifoPolicy;

impl SchedulingPolicy for FifoPolicy {
    fn name(&self) -> &'static str {
        PolicyKind::Fifo.as_str()
    }

    fn order(&self, pending: &[Task], _now: f64) -> Vec<Task> {
        let mut ordered = pending.to_vec();
        ordered.sort_by(by_arrival);
        ordered
    }

    fn pick_gpu(&self, feasible: &[&GpuState], _task: &Task) -> Option<GpuId> {
        feasible.iter().map(|g| g.id).min()
    }
}
