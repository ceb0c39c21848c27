//! Thread pool that executes runnable jobs.
//!
//! The manager owns the worker threads and a FIFO run queue guarded by a
//! mutex/condvar pair. It never owns jobs: callers keep their `Arc<Job>`
//! handles alive and the queue only holds clones while a job is pending.

use crate::config::{JobManagerConfig, PanicPolicy};
use crate::error::JobError;
use crate::job::Job;
use crate::lock;
#[cfg(feature = "metrics")]
use crate::metrics::Metrics;
use crate::worker::Worker;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, PoisonError};

struct QueueState {
    jobs: VecDeque<Arc<Job>>,
    shutting_down: bool,
}

/// Run queue shared between the manager, its workers, and the jobs bound to it.
pub(crate) struct RunQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    panic_policy: PanicPolicy,
    poison: Mutex<Option<(&'static str, String)>>,
    #[cfg(feature = "metrics")]
    pub(crate) metrics: Metrics,
}

impl RunQueue {
    fn new(panic_policy: PanicPolicy) -> Self {
        RunQueue {
            state: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                shutting_down: false,
            }),
            available: Condvar::new(),
            panic_policy,
            poison: Mutex::new(None),
            #[cfg(feature = "metrics")]
            metrics: Metrics::new(),
        }
    }

    /// Appends a job and wakes one worker.
    pub(crate) fn push(&self, job: Arc<Job>) {
        {
            let mut state = lock(&self.state);
            if state.shutting_down {
                log::warn!("job '{}' submitted after shutdown; dropping it", job.name());
                #[cfg(feature = "metrics")]
                self.metrics.record_abandoned(1);
                return;
            }
            // Marked under the queue lock so no worker can pop and complete it first.
            job.mark_in_flight();
            state.jobs.push_back(job);
        }
        #[cfg(feature = "metrics")]
        self.metrics.record_submitted();
        self.available.notify_one();
    }

    /// Blocks until a job is available. Returns `None` once shutdown was requested.
    pub(crate) fn pop(&self) -> Option<Arc<Job>> {
        let mut state = lock(&self.state);
        loop {
            if let Some(job) = state.jobs.pop_front() {
                return Some(job);
            }
            if state.shutting_down {
                return None;
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Drops every pending job, flags shutdown, and wakes all workers.
    /// Returns the number of abandoned jobs.
    fn begin_shutdown(&self) -> usize {
        let abandoned = {
            let mut state = lock(&self.state);
            state.shutting_down = true;
            std::mem::take(&mut state.jobs)
        };
        self.available.notify_all();
        for job in &abandoned {
            job.mark_abandoned();
        }
        #[cfg(feature = "metrics")]
        self.metrics.record_abandoned(abandoned.len() as u64);
        abandoned.len()
    }

    fn len(&self) -> usize {
        lock(&self.state).jobs.len()
    }

    fn is_shutting_down(&self) -> bool {
        lock(&self.state).shutting_down
    }

    /// Applies the panic policy to a failed payload.
    pub(crate) fn handle_panic(&self, job: &'static str, message: String) {
        log::error!("job '{}' panicked: {}", job, message);
        #[cfg(feature = "metrics")]
        self.metrics.record_panic();
        match self.panic_policy {
            PanicPolicy::Abort => std::process::abort(),
            PanicPolicy::Poison => {
                let mut poison = lock(&self.poison);
                if poison.is_none() {
                    *poison = Some((job, message));
                }
            }
        }
    }

    fn take_poison(&self) -> Option<JobError> {
        lock(&self.poison)
            .take()
            .map(|(job, message)| JobError::Poisoned { job, message })
    }

    fn poisoned(&self) -> Option<JobError> {
        lock(&self.poison)
            .as_ref()
            .map(|(job, message)| JobError::Poisoned {
                job: *job,
                message: message.clone(),
            })
    }
}

/// A fixed pool of worker threads pulling jobs from a shared run queue.
pub struct JobManager {
    workers: Vec<Worker>,
    run_queue: Arc<RunQueue>,
}

impl JobManager {
    /// Creates a manager with `num_threads` workers and default settings otherwise.
    ///
    /// # Example
    ///
    /// ```
    /// use jobgraph::{Job, JobManager};
    ///
    /// let manager = JobManager::new(2).expect("spawn workers");
    /// let job = Job::new("hello");
    /// job.initialize(&manager, |_| println!("Hello from a job!"), 1);
    /// job.remove_reference();
    /// job.wait();
    /// manager.shutdown().expect("Shutdown failed");
    /// ```
    pub fn new(num_threads: usize) -> Result<Self, JobError> {
        Self::new_with_config(JobManagerConfig::with_threads(num_threads))
    }

    /// Creates a manager from a full configuration.
    ///
    /// Fails if any worker thread cannot be spawned; workers created before the
    /// failure are shut down first.
    pub fn new_with_config(config: JobManagerConfig) -> Result<Self, JobError> {
        let run_queue = Arc::new(RunQueue::new(config.panic_policy));
        let count = config.worker_count();
        let mut manager = JobManager {
            workers: Vec::with_capacity(count),
            run_queue,
        };

        for id in 0..count {
            let worker = Worker::spawn(id, &config, Arc::clone(&manager.run_queue))
                .map_err(|source| JobError::Spawn { index: id, source })?;
            manager.workers.push(worker);
        }

        log::debug!(
            "job manager started with {} worker(s), pinning {:?}",
            count,
            config.pinning
        );
        Ok(manager)
    }

    /// Creates a manager with one worker per logical CPU.
    pub fn with_default_threads() -> Result<Self, JobError> {
        Self::new_with_config(JobManagerConfig::default())
    }

    /// Queues a job for execution and wakes one worker.
    ///
    /// The job's dependency count is not consulted; use
    /// [`Job::remove_reference`] to release a job through its counter.
    pub fn submit(&self, job: Arc<Job>) {
        self.run_queue.push(job);
    }

    /// Returns the number of worker threads.
    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Returns the number of jobs waiting in the run queue.
    pub fn pending_jobs(&self) -> usize {
        self.run_queue.len()
    }

    /// Returns whether shutdown has been requested.
    pub fn is_shut_down(&self) -> bool {
        self.run_queue.is_shutting_down()
    }

    /// Returns the first payload failure recorded under `PanicPolicy::Poison`.
    ///
    /// The record is sticky: every later call, and every later
    /// `GraphOrchestrator::wait_for_simulation`, reports it until
    /// [`JobManager::take_poison`] clears it.
    pub fn poisoned(&self) -> Option<JobError> {
        self.run_queue.poisoned()
    }

    /// Removes and returns the recorded payload failure, un-poisoning the manager.
    pub fn take_poison(&self) -> Option<JobError> {
        self.run_queue.take_poison()
    }

    /// Returns the manager's counters.
    #[cfg(feature = "metrics")]
    pub fn metrics(&self) -> &Metrics {
        &self.run_queue.metrics
    }

    pub(crate) fn run_queue(&self) -> &Arc<RunQueue> {
        &self.run_queue
    }

    /// Stops the workers. Jobs still queued are dropped without running, so
    /// anyone waiting on them blocks forever.
    ///
    /// Returns `Err` with the number of workers that died abnormally.
    pub fn shutdown(mut self) -> Result<(), JobError> {
        self.stop_workers()
    }

    fn stop_workers(&mut self) -> Result<(), JobError> {
        if self.workers.is_empty() {
            return Ok(());
        }

        let abandoned = self.run_queue.begin_shutdown();
        if abandoned > 0 {
            log::warn!("job manager shut down with {} queued job(s) abandoned", abandoned);
        }

        let mut failed_count = 0;
        for worker in self.workers.drain(..) {
            let worker_id = worker.id();
            if worker.join().is_err() {
                failed_count += 1;
                log::error!("worker {} panicked during execution", worker_id);
            }
        }
        log::debug!("job manager stopped");

        if failed_count > 0 {
            Err(JobError::WorkerPanicked(failed_count))
        } else {
            Ok(())
        }
    }
}

impl Drop for JobManager {
    fn drop(&mut self) {
        if let Err(err) = self.stop_workers() {
            log::error!("job manager shutdown failed: {}", err);
        }
    }
}

impl std::fmt::Debug for JobManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobManager")
            .field("workers", &self.workers.len())
            .field("pending_jobs", &self.pending_jobs())
            .finish()
    }
}
