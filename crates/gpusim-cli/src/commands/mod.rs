//! CLI commands implementation

use anyhow::Result;
use gpusim_core::{
    EventSink, PolicyKind, ScheduleOutcome, SimResult, SimulationConfig, Task, WorkloadProfile,
};
use gpusim_scheduler::{build_policy, summarize, GpuTracker, MeanMetrics, MetricsSummary, Scheduler};
use gpusim_store::{ExperimentStore, JsonlEventSink, RunInfo};
use gpusim_workload::{WorkloadGenerator, WorkloadParams};
use serde::Serialize;
use std::path::Path;
use tracing::info;
use uuid::Uuid;

/// Generate the task stream for `seed` using the workload settings in `config`
pub fn generate_tasks(config: &SimulationConfig, seed: u64) -> SimResult<Vec<Task>> {
    let params = WorkloadParams {
        count: config.workload.tasks,
        users: config.workload.users,
        short_threshold: config.scheduler.short_threshold,
        profile: config.workload.profile,
    };
    WorkloadGenerator::new(seed).generate(&params)
}

/// Run `tasks` under one policy on a fresh cluster
pub fn run_policy(
    config: &SimulationConfig,
    kind: PolicyKind,
    tasks: &[Task],
    sink: Option<Box<dyn EventSink>>,
) -> SimResult<ScheduleOutcome> {
    let tracker = GpuTracker::uniform(config.cluster.gpus, config.cluster.gpu_mem_gb)?;
    let mut scheduler = Scheduler::new(tracker, build_policy(kind, &config.scheduler)?);
    if let Some(sink) = sink {
        scheduler = scheduler.with_sink(sink);
    }
    scheduler.run(tasks)
}

fn run_summary(config: &SimulationConfig, kind: PolicyKind, seed: u64) -> SimResult<MetricsSummary> {
    let tasks = generate_tasks(config, seed)?;
    let outcome = run_policy(config, kind, &tasks, None)?;
    Ok(summarize(&outcome, config.cluster.gpus as usize))
}

/// Simulate one workload under each of `policies`
pub async fn simulate(config: &SimulationConfig, policies: &[PolicyKind]) -> Result<()> {
    let seed = config.workload.seed;
    let tasks = generate_tasks(config, seed)?;

    let store = match &config.output.store_path {
        Some(path) => {
            let store = ExperimentStore::new(path.clone());
            store.init().await?;
            Some(store)
        }
        None => None,
    };

    println!(
        "Workload: {} tasks, {} users, profile {}, seed {}",
        tasks.len(),
        config.workload.users,
        config.workload.profile,
        seed
    );
    println!(
        "Cluster: {} GPUs x {} GB",
        config.cluster.gpus, config.cluster.gpu_mem_gb
    );

    let mut summaries = Vec::new();
    for &kind in policies {
        let sink: Option<Box<dyn EventSink>> = match &config.output.log_dir {
            Some(dir) => {
                let path = dir.join(format!("{}_seed{}.jsonl", kind, seed));
                Some(Box::new(JsonlEventSink::create(&path)?))
            }
            None => None,
        };

        let outcome = run_policy(config, kind, &tasks, sink)?;
        let summary = summarize(&outcome, config.cluster.gpus as usize);

        println!();
        print_summary(kind, &summary);

        if let Some(store) = &store {
            let run_id = store.record_outcome(run_info(config, kind), &outcome).await?;
            println!("  Run ID: {}", run_id);
        }

        summaries.push((kind, summary));
    }

    if summaries.len() > 1 {
        println!();
        print_comparison(&summaries);
    }

    Ok(())
}

fn run_info(config: &SimulationConfig, kind: PolicyKind) -> RunInfo {
    RunInfo {
        policy: kind,
        workload: config.workload.profile,
        seed: config.workload.seed,
        gpus: config.cluster.gpus,
        gpu_mem_gb: config.cluster.gpu_mem_gb,
        tasks: config.workload.tasks,
    }
}

fn print_summary(kind: PolicyKind, summary: &MetricsSummary) {
    println!("Policy: {}", kind);
    println!("  Completed tasks:   {}", summary.completed_tasks);
    println!("  Avg wait (s):      {:.2}", summary.avg_wait_time);
    println!("  P95 wait (s):      {:.2}", summary.p95_wait_time);
    println!("  Avg turnaround (s): {:.2}", summary.avg_turnaround);
    println!("  Makespan (s):      {:.2}", summary.makespan);
    println!("  Throughput (t/s):  {:.4}", summary.throughput);
    println!("  Utilization:       {:.3}", summary.utilization);
    println!("  Fairness wait std: {:.2}", summary.fairness_wait_std);
    println!("  OOM events:        {}", summary.oom_events);
}

fn print_comparison(summaries: &[(PolicyKind, MetricsSummary)]) {
    println!(
        "{:<10} {:>12} {:>12} {:>12} {:>12} {:>10}",
        "POLICY", "AVG WAIT", "P95 WAIT", "MAKESPAN", "UTIL", "OOM"
    );
    println!("{}", "-".repeat(73));
    for (kind, s) in summaries {
        println!(
            "{:<10} {:>12.2} {:>12.2} {:>12.2} {:>12.3} {:>10}",
            kind.as_str(),
            s.avg_wait_time,
            s.p95_wait_time,
            s.makespan,
            s.utilization,
            s.oom_events
        );
    }
}

/// One line of the experiment CSV
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentRow {
    pub policy: PolicyKind,
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

impl ExperimentRow {
    fn new(policy: PolicyKind, m: MeanMetrics) -> Self {
        Self {
            policy,
            runs: m.runs,
            completed_tasks: m.completed_tasks,
            avg_wait_time: m.avg_wait_time,
            p95_wait_time: m.p95_wait_time,
            avg_turnaround: m.avg_turnaround,
            makespan: m.makespan,
            throughput: m.throughput,
            utilization: m.utilization,
            fairness_wait_std: m.fairness_wait_std,
            oom_events: m.oom_events,
        }
    }
}

/// Mean metrics of every policy over `seeds`
pub fn experiment_rows(config: &SimulationConfig, seeds: &[u64]) -> SimResult<Vec<ExperimentRow>> {
    let mut rows = Vec::with_capacity(PolicyKind::ALL.len());
    for kind in PolicyKind::ALL {
        let summaries = seeds
            .iter()
            .map(|&seed| run_summary(config, kind, seed))
            .collect::<SimResult<Vec<_>>>()?;
        rows.push(ExperimentRow::new(kind, MeanMetrics::from_summaries(&summaries)));
    }
    Ok(rows)
}

/// Compare both policies averaged over several seeds
pub fn experiment(config: &SimulationConfig, seeds: &[u64], out_csv: Option<&Path>) -> Result<()> {
    if seeds.is_empty() {
        anyhow::bail!("At least one seed is required");
    }
    info!(seeds = seeds.len(), tasks = config.workload.tasks, "Running experiment");

    let rows = experiment_rows(config, seeds)?;

    println!(
        "Experiment: {} seeds, {} tasks, profile {}",
        seeds.len(),
        config.workload.tasks,
        config.workload.profile
    );
    println!();
    println!(
        "{:<10} {:>10} {:>10} {:>12} {:>10} {:>8} {:>10} {:>8}",
        "POLICY", "AVG WAIT", "P95 WAIT", "TURNAROUND", "MAKESPAN", "UTIL", "FAIRNESS", "OOM"
    );
    println!("{}", "-".repeat(84));
    for row in &rows {
        println!(
            "{:<10} {:>10.2} {:>10.2} {:>12.2} {:>10.2} {:>8.3} {:>10.2} {:>8.1}",
            row.policy.as_str(),
            row.avg_wait_time,
            row.p95_wait_time,
            row.avg_turnaround,
            row.makespan,
            row.utilization,
            row.fairness_wait_std,
            row.oom_events
        );
    }

    if let Some(path) = out_csv {
        write_csv(path, &rows)?;
        println!();
        println!("Wrote {}", path.display());
    }

    Ok(())
}

/// One cell of the parameter sweep
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepRow {
    pub short_threshold: f64,
    pub aging_window: f64,
    pub avg_wait_time: f64,
    pub p95_wait_time: f64,
    pub fairness_wait_std: f64,
    pub utilization: f64,
    pub oom_events: f64,
}

/// Memory-aware mean metrics for every (short_threshold, aging_window) pair
pub fn sweep_rows(
    config: &SimulationConfig,
    seeds: &[u64],
    short_thresholds: &[f64],
    aging_windows: &[f64],
) -> SimResult<Vec<SweepRow>> {
    let mut rows = Vec::with_capacity(short_thresholds.len() * aging_windows.len());
    for &short_threshold in short_thresholds {
        for &aging_window in aging_windows {
            let mut cell = config.clone();
            cell.scheduler.short_threshold = short_threshold;
            cell.scheduler.aging_window = aging_window;
            cell.validate()?;

            let summaries = seeds
                .iter()
                .map(|&seed| run_summary(&cell, PolicyKind::Memory, seed))
                .collect::<SimResult<Vec<_>>>()?;
            let mean = MeanMetrics::from_summaries(&summaries);

            rows.push(SweepRow {
                short_threshold,
                aging_window,
                avg_wait_time: mean.avg_wait_time,
                p95_wait_time: mean.p95_wait_time,
                fairness_wait_std: mean.fairness_wait_std,
                utilization: mean.utilization,
                oom_events: mean.oom_events,
            });
        }
    }
    Ok(rows)
}

/// Sweep the memory-aware policy's tuning knobs
pub fn sweep(
    config: &SimulationConfig,
    seeds: &[u64],
    short_thresholds: &[f64],
    aging_windows: &[f64],
    out_csv: Option<&Path>,
) -> Result<()> {
    if seeds.is_empty() {
        anyhow::bail!("At least one seed is required");
    }
    info!(
        cells = short_thresholds.len() * aging_windows.len(),
        seeds = seeds.len(),
        "Running sweep"
    );

    let rows = sweep_rows(config, seeds, short_thresholds, aging_windows)?;

    println!(
        "{:>10} {:>8} {:>10} {:>10} {:>10} {:>8} {:>8}",
        "THRESHOLD", "AGING", "AVG WAIT", "P95 WAIT", "FAIRNESS", "UTIL", "OOM"
    );
    println!("{}", "-".repeat(70));
    for row in &rows {
        println!(
            "{:>10.0} {:>8.0} {:>10.2} {:>10.2} {:>10.2} {:>8.3} {:>8.1}",
            row.short_threshold,
            row.aging_window,
            row.avg_wait_time,
            row.p95_wait_time,
            row.fairness_wait_std,
            row.utilization,
            row.oom_events
        );
    }

    if let Some(best) = rows
        .iter()
        .min_by(|a, b| a.avg_wait_time.total_cmp(&b.avg_wait_time))
    {
        println!();
        println!(
            "Lowest avg wait: short_threshold={} aging_window={} ({:.2} s)",
            best.short_threshold, best.aging_window, best.avg_wait_time
        );
    }

    if let Some(path) = out_csv {
        write_csv(path, &rows)?;
        println!("Wrote {}", path.display());
    }

    Ok(())
}

/// Write `rows` as CSV with a header line
pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// List recorded runs, or show the breakdowns of one run
pub async fn runs(
    store_path: &Path,
    policy: Option<PolicyKind>,
    workload: Option<WorkloadProfile>,
    run: Option<Uuid>,
) -> Result<()> {
    let store = ExperimentStore::new(store_path.to_path_buf());
    store.init().await?;

    if let Some(run_id) = run {
        return show_run(&store, run_id).await;
    }

    let rows = store.query_runs(policy, workload).await;
    if rows.is_empty() {
        println!("No runs found");
        return Ok(());
    }

    println!(
        "{:<36} {:<8} {:<10} {:>6} {:>5} {:>8} {:>6}  {}",
        "RUN ID", "POLICY", "WORKLOAD", "SEED", "GPUS", "MEM GB", "TASKS", "CREATED"
    );
    println!("{}", "-".repeat(110));
    for row in rows {
        println!(
            "{:<36} {:<8} {:<10} {:>6} {:>5} {:>8} {:>6}  {}",
            row.run_id,
            row.policy.as_str(),
            row.workload.as_str(),
            row.seed,
            row.gpus,
            row.gpu_mem_gb,
            row.tasks,
            row.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }

    Ok(())
}

async fn show_run(store: &ExperimentStore, run_id: Uuid) -> Result<()> {
    let stored = store.get_run(run_id).await?;
    let run = &stored.run;

    println!("Run: {}", run.run_id);
    println!("  Policy: {}", run.policy);
    println!("  Workload: {} (seed {})", run.workload, run.seed);
    println!("  Cluster: {} GPUs x {} GB", run.gpus, run.gpu_mem_gb);
    println!(
        "  Decisions: {}, results: {}",
        stored.decisions.len(),
        stored.results.len()
    );

    let users = store.per_user_wait_stats(run_id).await?;
    println!();
    println!("{:<8} {:>8} {:>12} {:>12}", "USER", "TASKS", "AVG WAIT", "MAX WAIT");
    println!("{}", "-".repeat(43));
    for u in users {
        println!(
            "{:<8} {:>8} {:>12.2} {:>12.2}",
            u.user_id, u.task_count, u.avg_wait, u.max_wait
        );
    }

    let gpus = store.per_gpu_utilization(run_id).await?;
    println!();
    println!("{:<8} {:>8} {:>12}", "GPU", "TASKS", "BUSY (s)");
    println!("{}", "-".repeat(30));
    for g in gpus {
        println!(
            "{:<8} {:>8} {:>12.2}",
            gpusim_core::gpu_name(g.gpu_id),
            g.task_count,
            g.busy_time
        );
    }

    Ok(())
}
