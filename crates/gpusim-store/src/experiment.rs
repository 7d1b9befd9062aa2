//! File-backed store for simulation runs, decisions and results

use chrono::{DateTime, Utc};
use gpusim_core::{
    AdmissionDecision, DecisionReason, DurationClass, GpuId, PolicyKind, ScheduleOutcome,
    SimError, SimResult, Task, TaskId, TaskResult, UserId, WorkloadProfile,
};
use gpusim_scheduler::metrics::{gpu_busy_stats, user_wait_stats};
use gpusim_scheduler::{GpuBusyStats, UserWaitStats};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Parameters describing a run, as supplied by the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunInfo {
    pub policy: PolicyKind,
    pub workload: WorkloadProfile,
    pub seed: u64,
    pub gpus: u32,
    pub gpu_mem_gb: f64,
    pub tasks: usize,
}

/// Stored run metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRow {
    pub run_id: Uuid,
    pub policy: PolicyKind,
    pub workload: WorkloadProfile,
    pub seed: u64,
    pub gpus: u32,
    pub gpu_mem_gb: f64,
    pub tasks: usize,
    pub created_at: DateTime<Utc>,
}

/// Stored admission decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRow {
    pub task_id: TaskId,
    pub user_id: UserId,
    pub arrival_time: f64,
    pub est_duration: f64,
    pub est_mem_gb: f64,
    pub duration_class: DurationClass,
    pub admitted: bool,
    pub reason: DecisionReason,
    pub gpu_id: Option<GpuId>,
    pub time: f64,
}

impl From<&AdmissionDecision> for DecisionRow {
    fn from(d: &AdmissionDecision) -> Self {
        Self {
            task_id: d.task.id,
            user_id: d.task.user_id,
            arrival_time: d.task.arrival_time,
            est_duration: d.task.est_duration,
            est_mem_gb: d.task.est_mem_gb,
            duration_class: d.task.duration_class,
            admitted: d.admitted,
            reason: d.reason,
            gpu_id: d.gpu_id,
            time: d.time,
        }
    }
}

/// Stored task result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub task_id: TaskId,
    pub user_id: UserId,
    pub gpu_id: GpuId,
    pub arrival_time: f64,
    pub est_duration: f64,
    pub est_mem_gb: f64,
    pub duration_class: DurationClass,
    pub start_time: f64,
    pub end_time: f64,
    pub wait_time: f64,
    pub turnaround: f64,
}

impl From<&TaskResult> for ResultRow {
    fn from(r: &TaskResult) -> Self {
        Self {
            task_id: r.task.id,
            user_id: r.task.user_id,
            gpu_id: r.gpu_id,
            arrival_time: r.task.arrival_time,
            est_duration: r.task.est_duration,
            est_mem_gb: r.task.est_mem_gb,
            duration_class: r.task.duration_class,
            start_time: r.start_time,
            end_time: r.end_time,
            wait_time: r.wait_time,
            turnaround: r.turnaround(),
        }
    }
}

impl ResultRow {
    /// Rebuild the task result this row was taken from
    pub fn to_task_result(&self) -> TaskResult {
        TaskResult {
            task: Task {
                id: self.task_id,
                user_id: self.user_id,
                arrival_time: self.arrival_time,
                est_duration: self.est_duration,
                est_mem_gb: self.est_mem_gb,
                duration_class: self.duration_class,
            },
            gpu_id: self.gpu_id,
            start_time: self.start_time,
            end_time: self.end_time,
            wait_time: self.wait_time,
        }
    }
}

/// Everything persisted for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRun {
    pub run: RunRow,
    pub decisions: Vec<DecisionRow>,
    pub results: Vec<ResultRow>,
}

impl StoredRun {
    /// Outcome view of the stored results (decisions are not rebuilt)
    fn results_outcome(&self) -> ScheduleOutcome {
        ScheduleOutcome {
            decisions: Vec::new(),
            results: self.results.iter().map(ResultRow::to_task_result).collect(),
        }
    }
}

/// Experiment store keeping one JSON document per run
pub struct ExperimentStore {
    /// Directory holding run documents
    base_path: PathBuf,
    /// Runs indexed by id
    runs: RwLock<HashMap<Uuid, StoredRun>>,
}

impl ExperimentStore {
    /// Create a new store rooted at `base_path`
    pub fn new(base_path: PathBuf) -> Self {
        Self {
            base_path,
            runs: RwLock::new(HashMap::new()),
        }
    }

    /// Create the store directory if needed and load existing runs
    pub async fn init(&self) -> SimResult<()> {
        if !self.base_path.exists() {
            tokio::fs::create_dir_all(&self.base_path).await?;
            info!(path = %self.base_path.display(), "Created experiment store directory");
        }

        let mut loaded = HashMap::new();
        let mut entries = tokio::fs::read_dir(&self.base_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map_or(true, |e| e != "json") {
                continue;
            }
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable run document");
                    continue;
                }
            };
            match serde_json::from_slice::<StoredRun>(&bytes) {
                Ok(run) => {
                    loaded.insert(run.run.run_id, run);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable run document");
                }
            }
        }

        debug!(runs = loaded.len(), "Loaded experiment store");
        *self.runs.write().await = loaded;
        Ok(())
    }

    /// Record a new run and return its id
    pub async fn insert_run(&self, info: RunInfo) -> SimResult<Uuid> {
        let run = StoredRun {
            run: RunRow {
                run_id: Uuid::new_v4(),
                policy: info.policy,
                workload: info.workload,
                seed: info.seed,
                gpus: info.gpus,
                gpu_mem_gb: info.gpu_mem_gb,
                tasks: info.tasks,
                created_at: Utc::now(),
            },
            decisions: Vec::new(),
            results: Vec::new(),
        };
        let run_id = run.run.run_id;

        self.persist(&run).await?;
        self.runs.write().await.insert(run_id, run);

        info!(run_id = %run_id, policy = %info.policy, seed = info.seed, "Inserted run");
        Ok(run_id)
    }

    /// Append admission decisions to a run
    pub async fn insert_decisions(
        &self,
        run_id: Uuid,
        decisions: &[AdmissionDecision],
    ) -> SimResult<()> {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(&run_id)
            .ok_or_else(|| SimError::RunNotFound(run_id.to_string()))?;
        run.decisions.extend(decisions.iter().map(DecisionRow::from));
        self.persist(run).await
    }

    /// Append task results to a run
    pub async fn insert_results(&self, run_id: Uuid, results: &[TaskResult]) -> SimResult<()> {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(&run_id)
            .ok_or_else(|| SimError::RunNotFound(run_id.to_string()))?;
        run.results.extend(results.iter().map(ResultRow::from));
        self.persist(run).await
    }

    /// Record a run together with its full outcome
    pub async fn record_outcome(&self, info: RunInfo, outcome: &ScheduleOutcome) -> SimResult<Uuid> {
        let run_id = self.insert_run(info).await?;
        self.insert_decisions(run_id, &outcome.decisions).await?;
        self.insert_results(run_id, &outcome.results).await?;
        Ok(run_id)
    }

    /// Get a stored run
    pub async fn get_run(&self, run_id: Uuid) -> SimResult<StoredRun> {
        self.runs
            .read()
            .await
            .get(&run_id)
            .cloned()
            .ok_or_else(|| SimError::RunNotFound(run_id.to_string()))
    }

    /// List runs, optionally filtered, oldest first
    pub async fn query_runs(
        &self,
        policy: Option<PolicyKind>,
        workload: Option<WorkloadProfile>,
    ) -> Vec<RunRow> {
        let runs = self.runs.read().await;
        let mut rows: Vec<RunRow> = runs
            .values()
            .map(|r| &r.run)
            .filter(|r| policy.map_or(true, |p| r.policy == p))
            .filter(|r| workload.map_or(true, |w| r.workload == w))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.run_id.cmp(&b.run_id))
        });
        rows
    }

    /// Average and maximum wait per user for a run
    pub async fn per_user_wait_stats(&self, run_id: Uuid) -> SimResult<Vec<UserWaitStats>> {
        let run = self.get_run(run_id).await?;
        Ok(user_wait_stats(&run.results_outcome()))
    }

    /// Merged busy time per GPU for a run
    pub async fn per_gpu_utilization(&self, run_id: Uuid) -> SimResult<Vec<GpuBusyStats>> {
        let run = self.get_run(run_id).await?;
        Ok(gpu_busy_stats(&run.results_outcome()))
    }

    /// Path of the document for `run_id`
    pub fn run_path(&self, run_id: Uuid) -> PathBuf {
        self.base_path.join(format!("{}.json", run_id))
    }

    /// Store root
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    async fn persist(&self, run: &StoredRun) -> SimResult<()> {
        let bytes = serde_json::to_vec_pretty(run)?;
        tokio::fs::write(self.run_path(run.run.run_id), bytes)
            .await
            .map_err(|e| SimError::Store(format!("Failed to write run {}: {}", run.run.run_id, e)))
    }
}
