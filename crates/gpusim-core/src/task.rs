//! Task type definitions

use serde::{Deserialize, Serialize};

use crate::{SimError, SimResult};

/// Unique identifier for tasks
pub type TaskId = u64;

/// Identifier of the user submitting a task
pub type UserId = u32;

/// Short/long label derived from a task's estimated duration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationClass {
    Short,
    Long,
}

impl DurationClass {
    /// Classify a duration against the short-task threshold (inclusive)
    pub fn classify(duration: f64, short_threshold: f64) -> Self {
        if duration <= short_threshold {
            DurationClass::Short
        } else {
            DurationClass::Long
        }
    }
}

impl std::fmt::Display for DurationClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DurationClass::Short => write!(f, "short"),
            DurationClass::Long => write!(f, "long"),
        }
    }
}

/// A unit of GPU work submitted to the cluster
///
/// Tasks are immutable once built. A task that is deferred keeps its
/// original arrival time, so its accumulated wait is never reset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier
    pub id: TaskId,
    /// Submitting user
    pub user_id: UserId,
    /// Arrival time in simulated seconds
    pub arrival_time: f64,
    /// Estimated run time in seconds
    pub est_duration: f64,
    /// Estimated GPU memory requirement in GB
    pub est_mem_gb: f64,
    /// Duration class assigned at creation
    pub duration_class: DurationClass,
}

impl Task {
    /// Create a validated task, classifying its duration against `short_threshold`
    pub fn new(
        id: TaskId,
        user_id: UserId,
        arrival_time: f64,
        est_duration: f64,
        est_mem_gb: f64,
        short_threshold: f64,
    ) -> SimResult<Self> {
        let task = Self {
            id,
            user_id,
            arrival_time,
            est_duration,
            est_mem_gb,
            duration_class: DurationClass::classify(est_duration, short_threshold),
        };
        task.validate()?;
        Ok(task)
    }

    /// Check arrival, duration and memory
    ///
    /// Fields are public, so tasks built without [`Task::new`] are checked
    /// again before they enter a simulation.
    pub fn validate(&self) -> SimResult<()> {
        if !self.arrival_time.is_finite() || self.arrival_time < 0.0 {
            return Err(SimError::InvalidTask(format!(
                "task {} has invalid arrival time {}",
                self.id, self.arrival_time
            )));
        }
        if !self.est_duration.is_finite() || self.est_duration <= 0.0 {
            return Err(SimError::InvalidTask(format!(
                "task {} has non-positive duration {}",
                self.id, self.est_duration
            )));
        }
        if !self.est_mem_gb.is_finite() || self.est_mem_gb <= 0.0 {
            return Err(SimError::InvalidTask(format!(
                "task {} has non-positive memory {}",
                self.id, self.est_mem_gb
            )));
        }
        Ok(())
    }

    /// Time the task has waited since arrival
    pub fn wait_at(&self, now: f64) -> f64 {
        now - self.arrival_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_new_classifies_duration() {
        let short = Task::new(1, 1, 0.0, 60.0, 8.0, 60.0).unwrap();
        assert_eq!(short.duration_class, DurationClass::Short);

        let long = Task::new(2, 1, 0.0, 60.5, 8.0, 60.0).unwrap();
        assert_eq!(long.duration_class, DurationClass::Long);
    }

    #[test]
    fn test_task_new_rejects_invalid_values() {
        assert!(matches!(
            Task::new(1, 1, 0.0, 0.0, 8.0, 60.0),
            Err(SimError::InvalidTask(_))
        ));
        assert!(matches!(
            Task::new(1, 1, 0.0, 30.0, -1.0, 60.0),
            Err(SimError::InvalidTask(_))
        ));
        assert!(matches!(
            Task::new(1, 1, f64::NAN, 30.0, 8.0, 60.0),
            Err(SimError::InvalidTask(_))
        ));
    }

    #[test]
    fn test_validate_catches_hand_built_tasks() {
        let mut task = Task::new(1, 1, 0.0, 30.0, 8.0, 60.0).unwrap();
        assert!(task.validate().is_ok());

        task.est_mem_gb = f64::NAN;
        assert!(matches!(task.validate(), Err(SimError::InvalidTask(_))));

        task.est_mem_gb = 8.0;
        task.est_duration = -50.0;
        assert!(matches!(task.validate(), Err(SimError::InvalidTask(_))));
    }

    #[test]
    fn test_wait_at() {
        let task = Task::new(1, 1, 12.5, 30.0, 8.0, 60.0).unwrap();
        assert_eq!(task.wait_at(20.0), 7.5);
    }

    #[test]
    fn test_duration_class_display() {
        assert_eq!(DurationClass::Short.to_string(), "short");
        assert_eq!(DurationClass::Long.to_string(), "long");
    }
}
