//! Discrete-event scheduling loop

use std::sync::Arc;

use gpusim_core::{
    AdmissionDecision, EventSink, NoopEventSink, ScheduleOutcome, SchedulerEvent, SimError,
    SimResult, Task, TaskResult,
};
use tracing::{debug, error, info};

use crate::gpu_tracker::GpuTracker;
use crate::policy::SchedulingPolicy;

/// Scheduler drives one simulation run over a fresh GPU fleet
///
/// A scheduler is consumed by [`Scheduler::run`], so GPU state is never
/// shared between runs.
pub struct Scheduler {
    /// GPU memory accounting
    tracker: GpuTracker,
    /// Ordering and placement strategy
    policy: Arc<dyn SchedulingPolicy>,
    /// Receiver of dispatch/defer/reject events
    sink: Box<dyn EventSink>,
}

/// Mutable state of a run in progress
struct RunState {
    now: f64,
    pending: Vec<Task>,
    outcome: ScheduleOutcome,
}

impl Scheduler {
    /// Create a new scheduler
    pub fn new(tracker: GpuTracker, policy: Arc<dyn SchedulingPolicy>) -> Self {
        Self {
            tracker,
            policy,
            sink: Box::new(NoopEventSink),
        }
    }

    /// Replace the event sink
    pub fn with_sink(mut self, sink: Box<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Name of the configured policy
    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Number of simulated GPUs
    pub fn gpu_count(&self) -> usize {
        self.tracker.gpu_count()
    }

    /// Run the simulation to completion and return the outcome record
    pub fn run(mut self, tasks: &[Task]) -> SimResult<ScheduleOutcome> {
        for task in tasks {
            task.validate()?;
        }

        let mut tasks = tasks.to_vec();
        tasks.sort_by(|a, b| {
            a.arrival_time
                .total_cmp(&b.arrival_time)
                .then_with(|| a.id.cmp(&b.id))
        });

        info!(
            policy = self.policy.name(),
            tasks = tasks.len(),
            gpus = self.tracker.gpu_count(),
            "Starting simulation"
        );

        let mut state = RunState {
            now: 0.0,
            pending: Vec::new(),
            outcome: ScheduleOutcome::default(),
        };
        let mut next = 0;

        while next < tasks.len() || !state.pending.is_empty() {
            if let Some(task) = tasks.get(next) {
                state.now = state.now.max(task.arrival_time);
            }
            self.tracker.release_completed(state.now);

            while let Some(task) = tasks.get(next) {
                if task.arrival_time > state.now {
                    break;
                }
                state.pending.push(*task);
                next += 1;
            }

            let admitted_any = self.run_wave(&mut state)?;

            if !admitted_any && !state.pending.is_empty() {
                let next_arrival = tasks.get(next).map(|t| t.arrival_time);
                let next_event = match (next_arrival, self.tracker.next_completion()) {
                    (Some(a), Some(c)) => Some(a.min(c)),
                    (a, c) => a.or(c),
                };

                match next_event {
                    Some(at) => {
                        debug_assert!(at > state.now);
                        state.now = state.now.max(at);
                    }
                    None => {
                        error!(
                            policy = self.policy.name(),
                            now = state.now,
                            pending = state.pending.len(),
                            "No admissible task and no future event; stopping"
                        );
                        break;
                    }
                }
            }
        }

        self.sink.flush();

        info!(
            policy = self.policy.name(),
            completed = state.outcome.results.len(),
            decisions = state.outcome.decisions.len(),
            end_time = state.now,
            "Simulation finished"
        );

        Ok(state.outcome)
    }

    /// One admission wave at `state.now`; returns whether any task was admitted
    fn run_wave(&mut self, state: &mut RunState) -> SimResult<bool> {
        let now = state.now;
        let ordered = self.policy.order(&state.pending, now);
        let mut remaining = Vec::with_capacity(ordered.len());
        let mut admitted_any = false;

        debug!(now, pending = ordered.len(), "Admission wave");

        for task in ordered {
            if self.tracker.exceeds_capacity(task.est_mem_gb) {
                debug!(
                    task_id = task.id,
                    mem_gb = task.est_mem_gb,
                    "Task exceeds every GPU's capacity"
                );
                self.decide(state, AdmissionDecision::rejected(task, now));
                continue;
            }

            let choice = {
                let feasible = self.tracker.feasible(task.est_mem_gb);
                if feasible.is_empty() {
                    None
                } else {
                    let gpu_id = self.policy.pick_gpu(&feasible, &task).ok_or_else(|| {
                        SimError::Policy(format!(
                            "{} declined every feasible GPU for task {}",
                            self.policy.name(),
                            task.id
                        ))
                    })?;
                    if !feasible.iter().any(|g| g.id == gpu_id) {
                        return Err(SimError::Policy(format!(
                            "{} chose infeasible gpu{} for task {}",
                            self.policy.name(),
                            gpu_id,
                            task.id
                        )));
                    }
                    Some(gpu_id)
                }
            };

            match choice {
                None => {
                    remaining.push(task);
                    self.decide(state, AdmissionDecision::deferred(task, now));
                }
                Some(gpu_id) => {
                    let running = self.tracker.reserve(gpu_id, task, now)?;
                    debug!(task_id = task.id, gpu = gpu_id, end = running.end_time, "Admitted");

                    self.decide(state, AdmissionDecision::admitted(task, gpu_id, now));
                    state.outcome.results.push(TaskResult {
                        task,
                        gpu_id,
                        start_time: running.start_time,
                        end_time: running.end_time,
                        wait_time: now - task.arrival_time,
                    });
                    admitted_any = true;
                }
            }
        }

        state.pending = remaining;
        Ok(admitted_any)
    }

    fn decide(&mut self, state: &mut RunState, decision: AdmissionDecision) {
        self.sink
            .record(&SchedulerEvent::from_decision(self.policy.name(), &decision));
        state.outcome.decisions.push(decision);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{FifoPolicy, MemoryAwarePolicy};
    use gpusim_core::{
        DecisionReason, EventKind, GpuId, GpuState, MemoryEventSink, SchedulerConfig,
        WorkloadProfile,
    };
    use gpusim_workload::{WorkloadGenerator, WorkloadParams};
    use std::collections::HashSet;

    fn task(id: u64, arrival: f64, duration: f64, mem: f64) -> Task {
        Task::new(id, (id % 3) as u32 + 1, arrival, duration, mem, 60.0).unwrap()
    }

    fn fifo(capacities: &[f64]) -> Scheduler {
        Scheduler::new(GpuTracker::new(capacities).unwrap(), Arc::new(FifoPolicy))
    }

    fn memory(capacities: &[f64], config: &SchedulerConfig) -> Scheduler {
        Scheduler::new(
            GpuTracker::new(capacities).unwrap(),
            Arc::new(MemoryAwarePolicy::new(config).unwrap()),
        )
    }

    fn generated(seed: u64, count: usize) -> Vec<Task> {
        WorkloadGenerator::new(seed)
            .generate(&WorkloadParams {
                count,
                users: 5,
                short_threshold: 60.0,
                profile: WorkloadProfile::Mixed,
            })
            .unwrap()
    }

    /// Replays results and checks per-GPU usage at every start instant
    fn assert_capacity_respected(outcome: &ScheduleOutcome, capacities: &[f64]) {
        for r in &outcome.results {
            let used: f64 = outcome
                .results
                .iter()
                .filter(|o| o.gpu_id == r.gpu_id)
                .filter(|o| o.start_time <= r.start_time && r.start_time < o.end_time)
                .map(|o| o.task.est_mem_gb)
                .sum();
            assert!(
                used <= capacities[r.gpu_id as usize] + 1e-9,
                "gpu{} over capacity at t={}",
                r.gpu_id,
                r.start_time
            );
        }
    }

    #[test]
    fn test_fifo_defers_until_memory_frees() {
        let tasks = vec![task(1, 0.0, 20.0, 6.0), task(2, 0.0, 20.0, 8.0)];
        let outcome = fifo(&[10.0]).run(&tasks).unwrap();

        let reasons: Vec<(u64, DecisionReason, f64)> = outcome
            .decisions
            .iter()
            .map(|d| (d.task.id, d.reason, d.time))
            .collect();
        assert_eq!(
            reasons,
            vec![
                (1, DecisionReason::Admitted, 0.0),
                (2, DecisionReason::TemporaryMemoryPressure, 0.0),
                (2, DecisionReason::TemporaryMemoryPressure, 0.0),
                (2, DecisionReason::Admitted, 20.0),
            ]
        );

        assert_eq!(outcome.results.len(), 2);
        let second = &outcome.results[1];
        assert_eq!(second.task.id, 2);
        assert_eq!(second.start_time, 20.0);
        assert_eq!(second.wait_time, 20.0);
    }

    #[test]
    fn test_memory_aware_runs_short_task_first() {
        let config = SchedulerConfig {
            short_threshold: 60.0,
            ..SchedulerConfig::default()
        };
        let tasks = vec![task(1, 0.0, 300.0, 6.0), task(2, 0.0, 30.0, 6.0)];
        let outcome = memory(&[6.0], &config).run(&tasks).unwrap();

        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.results[0].task.id, 2);
        assert_eq!(outcome.results[0].start_time, 0.0);
        assert_eq!(outcome.results[1].task.id, 1);
        assert_eq!(outcome.results[1].start_time, 30.0);
        assert_eq!(outcome.results[1].wait_time, 30.0);
    }

    #[test]
    fn test_oversized_task_rejected_once() {
        let tasks = vec![task(1, 0.0, 30.0, 30.0), task(2, 5.0, 30.0, 8.0)];
        let outcome = fifo(&[24.0, 16.0]).run(&tasks).unwrap();

        let rejections: Vec<&AdmissionDecision> = outcome
            .decisions
            .iter()
            .filter(|d| d.task.id == 1)
            .collect();
        assert_eq!(rejections.len(), 1);
        assert_eq!(rejections[0].reason, DecisionReason::ExceedsGpuCapacity);
        assert!(!rejections[0].admitted);
        assert!(outcome.results.iter().all(|r| r.task.id != 1));
        assert_eq!(outcome.results.len(), 1);
    }

    #[test]
    fn test_aged_long_task_promoted() {
        let config = SchedulerConfig {
            short_threshold: 60.0,
            aging_window: 100.0,
            prefer_short: true,
        };
        // The GPU fits one task at a time. A stream of short tasks keeps arriving.
        let mut tasks = vec![task(0, 0.0, 50.0, 10.0), task(1, 1.0, 400.0, 10.0)];
        for i in 0..10 {
            tasks.push(task(2 + i, 2.0 + 10.0 * i as f64, 50.0, 10.0));
        }

        let outcome = memory(&[10.0], &config).run(&tasks).unwrap();

        let long = outcome
            .results
            .iter()
            .find(|r| r.task.id == 1)
            .unwrap();
        // Task 0 frees the GPU by the t=52 wave, where short task 2 still wins
        // (the long task has waited 51s). At t=102 it has waited 101s and is
        // promoted ahead of the nine short tasks queued behind it.
        assert_eq!(long.start_time, 102.0);
        let started_before: Vec<u64> = outcome
            .results
            .iter()
            .filter(|r| r.start_time < long.start_time)
            .map(|r| r.task.id)
            .collect();
        assert_eq!(started_before, vec![0, 2]);
        let next_short = outcome
            .results
            .iter()
            .find(|r| r.task.id == 3)
            .unwrap();
        assert_eq!(next_short.start_time, 502.0);
        assert_eq!(outcome.results.len(), tasks.len());
    }

    #[test]
    fn test_exactly_one_terminal_outcome_per_task() {
        let mut tasks = generated(11, 150);
        tasks.push(task(10_000, 40.0, 100.0, 64.0));
        let outcome = fifo(&[24.0, 24.0]).run(&tasks).unwrap();

        let admitted: HashSet<u64> = outcome.results.iter().map(|r| r.task.id).collect();
        let rejected: HashSet<u64> = outcome.capacity_rejections().map(|t| t.id).collect();

        assert_eq!(admitted.len(), outcome.results.len());
        assert!(admitted.is_disjoint(&rejected));
        assert_eq!(admitted.len() + rejected.len(), tasks.len());
        assert!(rejected.contains(&10_000));
    }

    #[test]
    fn test_capacity_never_exceeded() {
        let tasks = generated(23, 200);
        let capacities = [24.0, 16.0, 40.0];
        let config = SchedulerConfig::default();

        let outcome = memory(&capacities, &config).run(&tasks).unwrap();
        assert_capacity_respected(&outcome, &capacities);

        let outcome = fifo(&capacities).run(&tasks).unwrap();
        assert_capacity_respected(&outcome, &capacities);
    }

    #[test]
    fn test_clock_non_decreasing() {
        let tasks = generated(7, 200);
        let outcome = memory(&[24.0, 24.0], &SchedulerConfig::default())
            .run(&tasks)
            .unwrap();

        assert!(outcome
            .decisions
            .windows(2)
            .all(|w| w[0].time <= w[1].time));
        assert!(outcome
            .results
            .windows(2)
            .all(|w| w[0].start_time <= w[1].start_time));
    }

    #[test]
    fn test_identical_inputs_identical_outcome() {
        let config = SchedulerConfig::default();
        let first = memory(&[24.0, 24.0], &config)
            .run(&generated(31, 150))
            .unwrap();
        let second = memory(&[24.0, 24.0], &config)
            .run(&generated(31, 150))
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let tasks = generated(19, 80);
        let mut reversed = tasks.clone();
        reversed.reverse();

        let a = fifo(&[24.0, 24.0]).run(&tasks).unwrap();
        let b = fifo(&[24.0, 24.0]).run(&reversed).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_events_mirror_decisions() {
        let sink = MemoryEventSink::new();
        let tasks = vec![
            task(1, 0.0, 20.0, 6.0),
            task(2, 0.0, 20.0, 8.0),
            task(3, 1.0, 20.0, 12.0),
        ];
        let outcome = fifo(&[10.0])
            .with_sink(Box::new(sink.clone()))
            .run(&tasks)
            .unwrap();

        let events = sink.events();
        assert_eq!(events.len(), outcome.decisions.len());
        assert!(events.iter().all(|e| e.policy == "fifo"));
        assert_eq!(events[0].event, EventKind::Dispatch);
        assert!(events.iter().any(|e| e.event == EventKind::Defer));
        assert!(events
            .iter()
            .any(|e| e.event == EventKind::Reject && e.task_id == 3));
    }

    #[test]
    fn test_empty_input() {
        let outcome = fifo(&[24.0]).run(&[]).unwrap();
        assert!(outcome.decisions.is_empty());
        assert!(outcome.results.is_empty());
    }

    #[test]
    fn test_nan_memory_task_is_an_error() {
        let mut bad = task(1, 0.0, 20.0, 8.0);
        bad.est_mem_gb = f64::NAN;
        let result = fifo(&[24.0]).run(&[bad, task(2, 1.0, 20.0, 8.0)]);
        assert!(matches!(result, Err(SimError::InvalidTask(_))));
    }

    #[test]
    fn test_negative_duration_task_is_an_error() {
        let mut bad = task(1, 0.0, 20.0, 8.0);
        bad.est_duration = -50.0;
        let result = memory(&[24.0], &SchedulerConfig::default()).run(&[bad]);
        assert!(matches!(result, Err(SimError::InvalidTask(_))));
    }

    struct WrongGpuPolicy;

    impl SchedulingPolicy for WrongGpuPolicy {
        fn name(&self) -> &'static str {
            "wrong"
        }

        fn order(&self, pending: &[Task], _now: f64) -> Vec<Task> {
            pending.to_vec()
        }

        fn pick_gpu(&self, _feasible: &[&GpuState], _task: &Task) -> Option<GpuId> {
            Some(42)
        }
    }

    #[test]
    fn test_infeasible_pick_is_an_error() {
        let scheduler = Scheduler::new(GpuTracker::uniform(1, 24.0).unwrap(), Arc::new(WrongGpuPolicy));
        let result = scheduler.run(&[task(1, 0.0, 10.0, 8.0)]);
        assert!(matches!(result, Err(SimError::Policy(_))));
    }
}
