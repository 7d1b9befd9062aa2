//! gpusim-store: Persistence for gpusim
//!
//! This crate provides:
//! - A file-backed experiment store (runs, decisions, results, queries)
//! - A JSON-lines event sink for scheduler events

pub mod experiment;
pub mod jsonl;

pub use experiment::{DecisionRow, ExperimentStore, ResultRow, RunInfo, RunRow, StoredRun};
pub use jsonl::JsonlEventSink;
