//! gpusim-core: Core types and traits for the gpusim scheduling simulator
//!
//! This crate provides the fundamental types used throughout gpusim:
//! - Tasks and simulated GPU state
//! - Admission decisions, task results and the run outcome record
//! - Scheduler events and event sinks
//! - Configuration types
//! - Error handling

pub mod config;
pub mod decision;
pub mod error;
pub mod event;
pub mod gpu;
pub mod task;

pub use config::*;
pub use decision::*;
pub use error::*;
pub use event::*;
pub use gpu::*;
pub use task::*;
