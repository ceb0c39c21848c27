#[cfg(feature = "metrics")]
use std::sync::atomic::{AtomicU64, Ordering};
#[cfg(feature = "metrics")]
use std::time::{Duration, Instant};

/// Optional counters for the job manager.
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct Metrics {
    /// Jobs accepted into the run queue.
    pub jobs_submitted: AtomicU64,
    /// Jobs executed by a worker, including ones whose payload panicked.
    pub jobs_executed: AtomicU64,
    /// Jobs dropped from the queue at shutdown.
    pub jobs_abandoned: AtomicU64,
    /// Payload panics caught at the worker-loop boundary.
    pub payload_panics: AtomicU64,
    /// Total time spent executing jobs, in nanoseconds.
    pub busy_nanos: AtomicU64,
    /// Time when metrics collection started.
    pub start_time: Instant,
}

#[cfg(feature = "metrics")]
impl Metrics {
    /// Creates a new metrics instance.
    pub fn new() -> Self {
        Self {
            jobs_submitted: AtomicU64::new(0),
            jobs_executed: AtomicU64::new(0),
            jobs_abandoned: AtomicU64::new(0),
            payload_panics: AtomicU64::new(0),
            busy_nanos: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub(crate) fn record_submitted(&self) {
        self.jobs_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_executed(&self, elapsed: Duration) {
        self.jobs_executed.fetch_add(1, Ordering::Relaxed);
        self.busy_nanos
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_abandoned(&self, count: u64) {
        self.jobs_abandoned.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_panic(&self) {
        self.payload_panics.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of current metrics values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_submitted: self.jobs_submitted.load(Ordering::Relaxed),
            jobs_executed: self.jobs_executed.load(Ordering::Relaxed),
            jobs_abandoned: self.jobs_abandoned.load(Ordering::Relaxed),
            payload_panics: self.payload_panics.load(Ordering::Relaxed),
            busy_seconds: Duration::from_nanos(self.busy_nanos.load(Ordering::Relaxed))
                .as_secs_f64(),
            elapsed_seconds: self.start_time.elapsed().as_secs_f64(),
        }
    }
}

#[cfg(feature = "metrics")]
impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time.
#[cfg(feature = "metrics")]
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub jobs_submitted: u64,
    pub jobs_executed: u64,
    pub jobs_abandoned: u64,
    pub payload_panics: u64,
    pub busy_seconds: f64,
    pub elapsed_seconds: f64,
}

#[cfg(feature = "metrics")]
impl MetricsSnapshot {
    /// Calculates jobs per second throughput.
    pub fn jobs_per_second(&self) -> f64 {
        if self.elapsed_seconds > 0.0 {
            self.jobs_executed as f64 / self.elapsed_seconds
        } else {
            0.0
        }
    }

    /// Approximates the run queue depth (submitted minus executed).
    pub fn queue_depth(&self) -> i64 {
        self.jobs_submitted as i64 - self.jobs_executed as i64
    }
}

#[cfg(all(test, feature = "metrics"))]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.jobs_submitted, 0);
        assert_eq!(snapshot.jobs_executed, 0);
        assert_eq!(snapshot.jobs_abandoned, 0);
        assert_eq!(snapshot.payload_panics, 0);
        assert!(snapshot.elapsed_seconds >= 0.0);
    }

    #[test]
    fn test_metrics_updates() {
        let metrics = Metrics::new();

        for _ in 0..10 {
            metrics.record_submitted();
        }
        for _ in 0..8 {
            metrics.record_executed(Duration::from_micros(5));
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.jobs_submitted, 10);
        assert_eq!(snapshot.jobs_executed, 8);
        assert_eq!(snapshot.queue_depth(), 2);
        assert!(snapshot.busy_seconds > 0.0);
    }

    #[test]
    fn test_throughput_calculation() {
        let metrics = Metrics::new();
        metrics.jobs_executed.fetch_add(100, Ordering::Relaxed);

        thread::sleep(Duration::from_millis(10));
        let snapshot = metrics.snapshot();

        assert!(snapshot.jobs_per_second() > 0.0);
    }
}
