//! gpusim-workload: Seeded synthetic task streams
//!
//! The generator owns its RNG, so two generators built from the same seed
//! produce identical task sequences regardless of what else runs in the
//! process.

use gpusim_core::{SimError, SimResult, Task, TaskId, WorkloadProfile};
use rand::prelude::*;
use rand::rngs::SmallRng;
use rand_distr::{Distribution, Exp};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Mean seconds between consecutive arrivals
pub const MEAN_INTER_ARRIVAL_S: f64 = 8.0;

/// Duration range (seconds) of short tasks
pub const SHORT_DURATION_S: (f64, f64) = (10.0, 80.0);

/// Duration range (seconds) of long tasks
pub const LONG_DURATION_S: (f64, f64) = (120.0, 900.0);

/// Memory choices (GB) of short tasks
pub const SHORT_MEM_GB: [f64; 4] = [6.0, 8.0, 10.0, 12.0];

/// Memory choices (GB) of long tasks
pub const LONG_MEM_GB: [f64; 4] = [14.0, 16.0, 20.0, 24.0];

/// Parameters of one generated stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadParams {
    /// Number of tasks
    pub count: usize,
    /// Number of users; ids are drawn uniformly from 1..=users
    pub users: u32,
    /// Threshold used to label each task's duration class
    pub short_threshold: f64,
    /// Long/short mix
    pub profile: WorkloadProfile,
}

/// Seeded task generator
pub struct WorkloadGenerator {
    /// Random number generator with fixed seed for reproducibility
    rng: SmallRng,
}

impl WorkloadGenerator {
    /// Create a new generator with the given seed
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Generate `params.count` tasks in ascending arrival order
    pub fn generate(&mut self, params: &WorkloadParams) -> SimResult<Vec<Task>> {
        if params.users == 0 {
            return Err(SimError::Config(
                "at least one user is required".to_string(),
            ));
        }
        let inter_arrival = Exp::new(1.0 / MEAN_INTER_ARRIVAL_S)
            .map_err(|e| SimError::Config(format!("invalid arrival rate: {}", e)))?;
        let long_prob = params.profile.long_probability();

        let mut tasks = Vec::with_capacity(params.count);
        let mut now = 0.0;
        for i in 0..params.count {
            now += inter_arrival.sample(&mut self.rng);

            let (duration, mem_gb) = if self.rng.gen::<f64>() < long_prob {
                (
                    self.rng.gen_range(LONG_DURATION_S.0..LONG_DURATION_S.1),
                    self.pick(&LONG_MEM_GB),
                )
            } else {
                (
                    self.rng.gen_range(SHORT_DURATION_S.0..SHORT_DURATION_S.1),
                    self.pick(&SHORT_MEM_GB),
                )
            };
            let user_id = self.rng.gen_range(1..=params.users);

            tasks.push(Task::new(
                i as TaskId,
                user_id,
                now,
                duration,
                mem_gb,
                params.short_threshold,
            )?);
        }

        debug!(
            tasks = tasks.len(),
            profile = %params.profile,
            last_arrival = now,
            "Generated workload"
        );

        Ok(tasks)
    }

    fn pick(&mut self, choices: &[f64]) -> f64 {
        choices[self.rng.gen_range(0..choices.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpusim_core::DurationClass;

    fn params(count: usize, profile: WorkloadProfile) -> WorkloadParams {
        WorkloadParams {
            count,
            users: 5,
            short_threshold: 60.0,
            profile,
        }
    }

    #[test]
    fn test_same_seed_same_tasks() {
        let a = WorkloadGenerator::new(7)
            .generate(&params(100, WorkloadProfile::Mixed))
            .unwrap();
        let b = WorkloadGenerator::new(7)
            .generate(&params(100, WorkloadProfile::Mixed))
            .unwrap();
        assert_eq!(a, b);

        let c = WorkloadGenerator::new(8)
            .generate(&params(100, WorkloadProfile::Mixed))
            .unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_tasks_are_well_formed() {
        let tasks = WorkloadGenerator::new(11)
            .generate(&params(300, WorkloadProfile::VlmHeavy))
            .unwrap();
        assert_eq!(tasks.len(), 300);

        for (i, task) in tasks.iter().enumerate() {
            assert_eq!(task.id, i as u64);
            assert!((1..=5).contains(&task.user_id));
            assert!(task.arrival_time > 0.0);

            let short = SHORT_MEM_GB.contains(&task.est_mem_gb)
                && task.est_duration >= SHORT_DURATION_S.0
                && task.est_duration < SHORT_DURATION_S.1;
            let long = LONG_MEM_GB.contains(&task.est_mem_gb)
                && task.est_duration >= LONG_DURATION_S.0
                && task.est_duration < LONG_DURATION_S.1;
            assert!(short || long, "unexpected task shape: {:?}", task);

            let expected = DurationClass::classify(task.est_duration, 60.0);
            assert_eq!(task.duration_class, expected);
        }

        assert!(tasks
            .windows(2)
            .all(|w| w[0].arrival_time <= w[1].arrival_time));
    }

    #[test]
    fn test_profiles_shift_the_mix() {
        let long_count = |profile| {
            WorkloadGenerator::new(3)
                .generate(&params(2000, profile))
                .unwrap()
                .iter()
                .filter(|t| t.est_duration >= LONG_DURATION_S.0)
                .count()
        };

        let llm = long_count(WorkloadProfile::LlmHeavy);
        let mixed = long_count(WorkloadProfile::Mixed);
        let vlm = long_count(WorkloadProfile::VlmHeavy);
        assert!(llm < mixed && mixed < vlm);
    }

    #[test]
    fn test_zero_users_rejected() {
        let mut p = params(10, WorkloadProfile::Mixed);
        p.users = 0;
        assert!(matches!(
            WorkloadGenerator::new(1).generate(&p),
            Err(SimError::Config(_))
        ));
    }

    #[test]
    fn test_empty_stream() {
        let tasks = WorkloadGenerator::new(1)
            .generate(&params(0, WorkloadProfile::Mixed))
            .unwrap();
        assert!(tasks.is_empty());
    }
}
