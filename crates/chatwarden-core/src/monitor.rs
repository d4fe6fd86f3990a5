//! Scoped timing of named operations

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Records kept by an [`OperationHistory`]
pub const OPERATION_HISTORY_CAPACITY: usize = 32;

/// How one monitored operation went
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub name: String,
    pub duration: Duration,
    pub threshold: Duration,
    pub exceeded: bool,
    /// The scope was left by unwinding
    pub panicked: bool,
}

/// Receives each finished [`OperationRecord`]
pub type RecordSink = Arc<dyn Fn(&OperationRecord) + Send + Sync>;

/// Entry point for monitored scopes
pub struct OperationMonitor;

impl OperationMonitor {
    /// Start timing `name`. The returned guard reports when it is dropped or
    /// [`finish`](OperationGuard::finish)ed.
    pub fn begin(name: impl Into<String>, threshold: Duration) -> OperationGuard {
        OperationGuard::new(name.into(), threshold, None)
    }

    /// Like [`begin`](Self::begin), also handing the record to `sink`
    pub fn begin_with_sink(
        name: impl Into<String>,
        threshold: Duration,
        sink: RecordSink,
    ) -> OperationGuard {
        OperationGuard::new(name.into(), threshold, Some(sink))
    }
}

/// Timing scope for one operation
///
/// Dropping the guard (normal exit, early `?` return, or unwinding) logs the
/// duration. It never affects the wrapped operation's result.
#[must_use = "the operation is timed until the guard is dropped"]
pub struct OperationGuard {
    name: String,
    threshold: Duration,
    started: Instant,
    sink: Option<RecordSink>,
    done: bool,
}

impl OperationGuard {
    fn new(name: String, threshold: Duration, sink: Option<RecordSink>) -> Self {
        info!(operation = %name, "Operation started");
        Self {
            name,
            threshold,
            started: Instant::now(),
            sink,
            done: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// End the scope now and return its record
    pub fn finish(mut self) -> OperationRecord {
        self.complete()
    }

    fn complete(&mut self) -> OperationRecord {
        self.done = true;

        let duration = self.started.elapsed();
        let record = OperationRecord {
            name: self.name.clone(),
            duration,
            threshold: self.threshold,
            exceeded: duration > self.threshold,
            panicked: std::thread::panicking(),
        };

        if record.exceeded {
            warn!(
                operation = %record.name,
                duration = %chatwarden_util::format_duration(duration),
                threshold = %chatwarden_util::format_duration(self.threshold),
                "Operation exceeded its time threshold"
            );
        } else {
            info!(
                operation = %record.name,
                duration = %chatwarden_util::format_duration(duration),
                "Operation completed"
            );
        }

        if let Some(sink) = &self.sink {
            sink(&record);
        }

        record
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        if !self.done {
            self.complete();
        }
    }
}

/// Bounded, oldest-first log of finished operations
#[derive(Debug)]
pub struct OperationHistory {
    records: Mutex<VecDeque<OperationRecord>>,
    capacity: usize,
}

impl OperationHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn push(&self, record: OperationRecord) {
        let mut records = self.records.lock().unwrap();
        while records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    pub fn recent(&self) -> Vec<OperationRecord> {
        self.records.lock().unwrap().iter().cloned().collect()
    }
}

impl Default for OperationHistory {
    fn default() -> Self {
        Self::new(OPERATION_HISTORY_CAPACITY)
    }
}
