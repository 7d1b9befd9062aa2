//! Aggregate statistics over a completed simulation

use std::collections::BTreeMap;

use gpusim_core::{GpuId, ScheduleOutcome, TaskResult, UserId};
use serde::{Deserialize, Serialize};

/// Headline metrics of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub completed_tasks: usize,
    pub avg_wait_time: f64,
    pub p95_wait_time: f64,
    pub avg_turnaround: f64,
    pub makespan: f64,
    pub throughput: f64,
    pub utilization: f64,
    pub fairness_wait_std: f64,
    pub oom_events: usize,
}

/// Wait statistics of a single user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserWaitStats {
    pub user_id: UserId,
    pub avg_wait: f64,
    pub max_wait: f64,
    pub task_count: usize,
}

/// Busy time of a single GPU, with overlapping reservations merged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuBusyStats {
    pub gpu_id: GpuId,
    pub busy_time: f64,
    pub task_count: usize,
}

/// Compute the summary of `outcome` for a fleet of `gpu_count` GPUs
pub fn summarize(outcome: &ScheduleOutcome, gpu_count: usize) -> MetricsSummary {
    let results = &outcome.results;
    if results.is_empty() {
        return MetricsSummary::default();
    }

    let completed = results.len();
    let n = completed as f64;
    let waits: Vec<f64> = results.iter().map(|r| r.wait_time).collect();

    let avg_wait_time = waits.iter().sum::<f64>() / n;
    let avg_turnaround = results.iter().map(TaskResult::turnaround).sum::<f64>() / n;
    let makespan = makespan(results);
    let throughput = if makespan > 0.0 { n / makespan } else { 0.0 };

    let utilization = if makespan > 0.0 && gpu_count > 0 {
        let busy: f64 = gpu_busy_stats(outcome).iter().map(|g| g.busy_time).sum();
        busy / (gpu_count as f64 * makespan)
    } else {
        0.0
    };

    let user_means: Vec<f64> = user_wait_stats(outcome).iter().map(|u| u.avg_wait).collect();
    let fairness_wait_std = if user_means.len() < 2 {
        0.0
    } else {
        population_std(&user_means)
    };

    MetricsSummary {
        completed_tasks: completed,
        avg_wait_time,
        p95_wait_time: percentile_nearest_rank(&waits, 0.95),
        avg_turnaround,
        makespan,
        throughput,
        utilization,
        fairness_wait_std,
        oom_events: outcome.rejected_decisions().count(),
    }
}

/// Per-user wait statistics, ordered by user id
pub fn user_wait_stats(outcome: &ScheduleOutcome) -> Vec<UserWaitStats> {
    let mut by_user: BTreeMap<UserId, Vec<f64>> = BTreeMap::new();
    for r in &outcome.results {
        by_user.entry(r.task.user_id).or_default().push(r.wait_time);
    }

    by_user
        .into_iter()
        .map(|(user_id, waits)| UserWaitStats {
            user_id,
            avg_wait: waits.iter().sum::<f64>() / waits.len() as f64,
            max_wait: waits.iter().copied().fold(f64::MIN, f64::max),
            task_count: waits.len(),
        })
        .collect()
}

/// Per-GPU merged busy time, ordered by GPU id; GPUs that ran nothing are omitted
pub fn gpu_busy_stats(outcome: &ScheduleOutcome) -> Vec<GpuBusyStats> {
    let mut by_gpu: BTreeMap<GpuId, Vec<(f64, f64)>> = BTreeMap::new();
    for r in &outcome.results {
        by_gpu
            .entry(r.gpu_id)
            .or_default()
            .push((r.start_time, r.end_time));
    }

    by_gpu
        .into_iter()
        .map(|(gpu_id, intervals)| GpuBusyStats {
            gpu_id,
            task_count: intervals.len(),
            busy_time: merged_length(intervals),
        })
        .collect()
}

/// Span from the first arrival to the last completion
fn makespan(results: &[TaskResult]) -> f64 {
    let first_arrival = results
        .iter()
        .map(|r| r.task.arrival_time)
        .fold(f64::INFINITY, f64::min);
    let last_end = results
        .iter()
        .map(|r| r.end_time)
        .fold(f64::NEG_INFINITY, f64::max);

    if first_arrival.is_finite() && last_end.is_finite() {
        (last_end - first_arrival).max(0.0)
    } else {
        0.0
    }
}

/// Total length covered by half-open intervals, counting overlaps once
pub fn merged_length(mut intervals: Vec<(f64, f64)>) -> f64 {
    intervals.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.total_cmp(&b.1)));

    let mut total = 0.0;
    let mut current: Option<(f64, f64)> = None;
    for (start, end) in intervals {
        current = match current {
            Some((s, e)) if start <= e => Some((s, e.max(end))),
            Some((s, e)) => {
                total += e - s;
                Some((start, end))
            }
            None => Some((start, end)),
        };
    }
    if let Some((s, e)) = current {
        total += e - s;
    }
    total
}

/// Nearest-rank percentile: element at floor(q * (n - 1)) of the sorted values
pub fn percentile_nearest_rank(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let last = sorted.len() - 1;
    let index = ((q * last as f64).floor().max(0.0) as usize).min(last);
    sorted[index]
}

/// Population standard deviation
pub fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

/// Metrics averaged over several runs (e.g. one per seed)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeanMetrics {
    pub runs: usize,
    pub completed_tasks: f64,
    pub avg_wait_time: f64,
    pub p95_wait_time: f64,
    pub avg_turnaround: f64,
    pub makespan: f64,
    pub throughput: f64,
    pub utilization: f64,
    pub fairness_wait_std: f64,
    pub oom_events: f64,
}

impl MeanMetrics {
    /// Field-wise mean of `summaries`; all zero when empty
    pub fn from_summaries(summaries: &[MetricsSummary]) -> Self {
        if summaries.is_empty() {
            return Self::default();
        }
        let n = summaries.len() as f64;
        let mean = |f: fn(&MetricsSummary) -> f64| summaries.iter().map(f).sum::<f64>() / n;

        Self {
            runs: summaries.len(),
            completed_tasks: mean(|s| s.completed_tasks as f64),
            avg_wait_time: mean(|s| s.avg_wait_time),
            p95_wait_time: mean(|s| s.p95_wait_time),
            avg_turnaround: mean(|s| s.avg_turnaround),
            makespan: mean(|s| s.makespan),
            throughput: mean(|s| s.throughput),
            utilization: mean(|s| s.utilization),
            fairness_wait_std: mean(|s| s.fairness_wait_std),
            oom_events: mean(|s| s.oom_events as f64),
        }
    }
}
