//! gpusim-scheduler: Discrete-event GPU scheduling engine
//!
//! This crate provides the simulation core:
//! - GPU memory tracking and reservations
//! - Admission ordering and placement policies (memory-aware, FIFO)
//! - The wave-based scheduling loop
//! - Metrics over a completed run

pub mod gpu_tracker;
pub mod metrics;
pub mod policy;
pub mod scheduler;

pub use gpu_tracker::GpuTracker;
pub use metrics::{summarize, GpuBusyStats, MeanMetrics, MetricsSummary, UserWaitStats};
pub use policy::{build_policy, FifoPolicy, MemoryAwarePolicy, SchedulingPolicy};
pub use scheduler::Scheduler;
