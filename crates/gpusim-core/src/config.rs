//! Configuration types for gpusim

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::{SimError, SimResult};

/// Complete simulation configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Simulated cluster
    pub cluster: ClusterConfig,
    /// Scheduling policy knobs
    pub scheduler: SchedulerConfig,
    /// Synthetic workload settings
    pub workload: WorkloadConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Output locations
    pub output: OutputConfig,
}

impl SimulationConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> SimResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SimError::Config(format!("Failed to read config file: {}", e)))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| SimError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section
    pub fn validate(&self) -> SimResult<()> {
        self.cluster.validate()?;
        self.scheduler.validate()?;
        self.workload.validate()
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// Simulated GPU fleet
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Number of GPUs
    pub gpus: u32,
    /// Memory per GPU in GB
    pub gpu_mem_gb: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            gpus: 2,
            gpu_mem_gb: 24.0,
        }
    }
}

impl ClusterConfig {
    pub fn validate(&self) -> SimResult<()> {
        if self.gpus == 0 {
            return Err(SimError::Config(
                "at least one GPU is required".to_string(),
            ));
        }
        if !is_positive(self.gpu_mem_gb) {
            return Err(SimError::Config(format!(
                "GPU memory must be positive, got {}",
                self.gpu_mem_gb
            )));
        }
        Ok(())
    }
}

/// Scheduling policy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Durations at or below this many seconds are "short"
    pub short_threshold: f64,
    /// Wait in seconds after which a task is promoted
    pub aging_window: f64,
    /// Prefer short tasks among non-aged ones (memory-aware only)
    pub prefer_short: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            short_threshold: 60.0,
            aging_window: 180.0,
            prefer_short: true,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> SimResult<()> {
        if !is_positive(self.short_threshold) {
            return Err(SimError::Config(format!(
                "short_threshold must be positive, got {}",
                self.short_threshold
            )));
        }
        if !is_positive(self.aging_window) {
            return Err(SimError::Config(format!(
                "aging_window must be positive, got {}",
                self.aging_window
            )));
        }
        Ok(())
    }
}

/// Synthetic workload settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Number of tasks to generate
    pub tasks: usize,
    /// Number of distinct users
    pub users: u32,
    /// Generator seed
    pub seed: u64,
    /// Workload profile
    pub profile: WorkloadProfile,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            tasks: 100,
            users: 5,
            seed: 7,
            profile: WorkloadProfile::Mixed,
        }
    }
}

impl WorkloadConfig {
    pub fn validate(&self) -> SimResult<()> {
        if self.users == 0 {
            return Err(SimError::Config("at least one user is required".to_string()));
        }
        Ok(())
    }
}

/// Shape of the generated task mix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadProfile {
    /// 40% long tasks
    Mixed,
    /// 20% long tasks
    LlmHeavy,
    /// 80% long tasks
    VlmHeavy,
}

impl WorkloadProfile {
    pub const ALL: [WorkloadProfile; 3] = [
        WorkloadProfile::Mixed,
        WorkloadProfile::LlmHeavy,
        WorkloadProfile::VlmHeavy,
    ];

    /// Probability that a generated task is long
    pub fn long_probability(&self) -> f64 {
        match self {
            WorkloadProfile::Mixed => 0.4,
            WorkloadProfile::LlmHeavy => 0.2,
            WorkloadProfile::VlmHeavy => 0.8,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadProfile::Mixed => "mixed",
            WorkloadProfile::LlmHeavy => "llm_heavy",
            WorkloadProfile::VlmHeavy => "vlm_heavy",
        }
    }
}

impl std::fmt::Display for WorkloadProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkloadProfile {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| SimError::Config(format!("unknown workload profile: {}", s)))
    }
}

/// Available scheduling policies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    /// Memory-aware with aging
    Memory,
    /// First-in first-out baseline
    Fifo,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 2] = [PolicyKind::Memory, PolicyKind::Fifo];

    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::Memory => "memory",
            PolicyKind::Fifo => "fifo",
        }
    }
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyKind {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| SimError::Config(format!("unknown policy: {}", s)))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

/// Where run artifacts are written
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for JSON-lines event logs
    pub log_dir: Option<PathBuf>,
    /// Directory of the experiment store
    pub store_path: Option<PathBuf>,
}
