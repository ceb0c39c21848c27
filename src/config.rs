//! Configuration for the job manager's worker pool.

use serde::{Deserialize, Serialize};

/// Strategy for pinning worker threads to CPU cores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PinningStrategy {
    /// No pinning (standard OS scheduling).
    #[default]
    None,
    /// Linear pinning (worker i -> logical processor i).
    Linear,
    /// Pin to physical cores only (even-numbered logical processors), avoiding SMT contention.
    AvoidSmt,
}

impl PinningStrategy {
    /// Returns the logical processor a worker should be pinned to, if any.
    pub fn core_for_worker(self, worker_id: usize) -> Option<usize> {
        match self {
            PinningStrategy::None => None,
            PinningStrategy::Linear => Some(worker_id),
            PinningStrategy::AvoidSmt => Some(worker_id * 2),
        }
    }
}

/// What a worker does when a job payload panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PanicPolicy {
    /// Log the panic and abort the process.
    #[default]
    Abort,
    /// Record the failure on the manager and keep the worker alive.
    ///
    /// The failing job still signals completion and releases its successor,
    /// so graphs waiting on it finish instead of deadlocking.
    Poison,
}

/// Configuration for a [`JobManager`](crate::JobManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobManagerConfig {
    /// Number of worker threads. Zero is treated as one.
    pub num_threads: usize,
    /// Core pinning for the workers.
    pub pinning: PinningStrategy,
    /// Behavior when a payload panics.
    pub panic_policy: PanicPolicy,
    /// Prefix of the worker thread names; workers are named `{thread_name}-{index}`.
    pub thread_name: String,
    /// Record a Chrome trace span for every executed job.
    pub record_trace: bool,
}

impl Default for JobManagerConfig {
    fn default() -> Self {
        Self {
            num_threads: num_cpus::get(),
            pinning: PinningStrategy::None,
            panic_policy: PanicPolicy::Abort,
            thread_name: "jobgraph-worker".to_string(),
            record_trace: false,
        }
    }
}

impl JobManagerConfig {
    /// Default configuration with an explicit worker count.
    pub fn with_threads(num_threads: usize) -> Self {
        Self {
            num_threads,
            ..Self::default()
        }
    }

    /// Worker count after normalization.
    pub(crate) fn worker_count(&self) -> usize {
        self.num_threads.max(1)
    }
}
