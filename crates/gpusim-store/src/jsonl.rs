//! JSON-lines event log

use gpusim_core::{EventSink, SchedulerEvent, SimResult};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Event sink writing one JSON object per line
///
/// Write failures are logged once and further events are dropped; the
/// scheduler never sees them.
pub struct JsonlEventSink {
    path: PathBuf,
    writer: BufWriter<File>,
    failed: bool,
}

impl JsonlEventSink {
    /// Create (or truncate) the log file, creating parent directories
    pub fn create(path: &Path) -> SimResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)?;
        info!(path = %path.display(), "Writing scheduler events");

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            failed: false,
        })
    }

    /// Log file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_event(&mut self, event: &SchedulerEvent) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")
    }
}

impl EventSink for JsonlEventSink {
    fn record(&mut self, event: &SchedulerEvent) {
        if self.failed {
            return;
        }
        if let Err(e) = self.write_event(event) {
            warn!(path = %self.path.display(), error = %e, "Event log write failed; dropping further events");
            self.failed = true;
        }
    }

    fn flush(&mut self) {
        if let Err(e) = self.writer.flush() {
            warn!(path = %self.path.display(), error = %e, "Event log flush failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpusim_core::{AdmissionDecision, EventKind, Task};

    #[test]
    fn test_writes_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("fifo_seed7.jsonl");

        let mut sink = JsonlEventSink::create(&path).unwrap();
        let task = Task::new(1, 2, 0.0, 20.0, 8.0, 60.0).unwrap();
        sink.record(&SchedulerEvent::from_decision(
            "fifo",
            &AdmissionDecision::deferred(task, 0.0),
        ));
        sink.record(&SchedulerEvent::from_decision(
            "fifo",
            &AdmissionDecision::admitted(task, 0, 20.0),
        ));
        sink.flush();

        let content = std::fs::read_to_string(&path).unwrap();
        let events: Vec<SchedulerEvent> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, EventKind::Defer);
        assert_eq!(events[1].event, EventKind::Dispatch);
        assert_eq!(events[1].gpu_id, Some(0));
    }

    #[test]
    fn test_create_fails_on_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(JsonlEventSink::create(dir.path()).is_err());
    }

    #[cfg(target_os = "linux")]
    fn workload(count: u64) -> Vec<Task> {
        (0..count)
            .map(|i| {
                let mem = if i % 5 == 0 {
                    30.0
                } else {
                    6.0 + (i % 4) as f64 * 4.0
                };
                let duration = 15.0 + (i % 7) as f64 * 20.0;
                Task::new(i, (i % 3) as u32 + 1, i as f64 * 2.0, duration, mem, 60.0).unwrap()
            })
            .collect()
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_write_failure_stops_logging() {
        let mut sink = JsonlEventSink::create(Path::new("/dev/full")).unwrap();
        let task = Task::new(1, 2, 0.0, 20.0, 8.0, 60.0).unwrap();
        let event = SchedulerEvent::from_decision("fifo", &AdmissionDecision::deferred(task, 0.0));

        for _ in 0..10_000 {
            sink.record(&event);
            if sink.failed {
                break;
            }
        }
        assert!(sink.failed);

        let buffered = sink.writer.buffer().len();
        sink.record(&event);
        sink.record(&event);
        assert_eq!(sink.writer.buffer().len(), buffered);
        sink.flush();
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_write_failure_leaves_outcome_unchanged() {
        use gpusim_core::{PolicyKind, SchedulerConfig};
        use gpusim_scheduler::{build_policy, GpuTracker, Scheduler};

        let tasks = workload(400);
        let run = |sink: Option<JsonlEventSink>| {
            let policy = build_policy(PolicyKind::Memory, &SchedulerConfig::default()).unwrap();
            let mut scheduler = Scheduler::new(GpuTracker::uniform(2, 24.0).unwrap(), policy);
            if let Some(sink) = sink {
                scheduler = scheduler.with_sink(Box::new(sink));
            }
            scheduler.run(&tasks).unwrap()
        };

        let baseline = run(None);
        let failing = run(Some(JsonlEventSink::create(Path::new("/dev/full")).unwrap()));

        assert!(baseline.decisions.len() > 400);
        assert_eq!(failing, baseline);
    }
}
