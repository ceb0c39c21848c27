//! Worker thread implementation.
//!
//! Each worker blocks on the run queue's condvar, pops the oldest runnable job,
//! and executes it outside the queue lock. A worker exits once shutdown has
//! been requested and the queue is empty.

use crate::config::JobManagerConfig;
use crate::job_manager::RunQueue;
use crate::tracing::{CollectorGuard, TraceGuard};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A worker thread that executes jobs from the run queue.
pub(crate) struct Worker {
    id: usize,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawns a worker thread. Fails if the OS refuses to create the thread.
    pub(crate) fn spawn(
        id: usize,
        config: &JobManagerConfig,
        run_queue: Arc<RunQueue>,
    ) -> io::Result<Self> {
        let core = config.pinning.core_for_worker(id);
        let record_trace = config.record_trace;

        let handle = thread::Builder::new()
            .name(format!("{}-{}", config.thread_name, id))
            .spawn(move || {
                // Pin worker to its core for better cache locality
                if let Some(core) = core {
                    pin_current_thread(id, core);
                }

                let _collector = record_trace.then_some(CollectorGuard);
                Worker::run_loop(id, &run_queue, record_trace);
            })?;

        Ok(Worker {
            id,
            handle: Some(handle),
        })
    }

    /// Main execution loop for the worker thread.
    fn run_loop(id: usize, run_queue: &RunQueue, record_trace: bool) {
        log::trace!("worker {} started", id);

        while let Some(job) = run_queue.pop() {
            log::trace!("worker {} executing job '{}'", id, job.name());
            #[cfg(feature = "metrics")]
            let started = std::time::Instant::now();

            let outcome = {
                let _span = record_trace.then(|| TraceGuard::new(job.name(), id));
                panic::catch_unwind(AssertUnwindSafe(|| job.run(Some(run_queue))))
            };

            #[cfg(feature = "metrics")]
            run_queue.metrics.record_executed(started.elapsed());

            // The job already applied the panic policy before releasing its successor.
            if outcome.is_err() {
                log::trace!("worker {} recovered from panic in job '{}'", id, job.name());
            }
        }

        log::trace!("worker {} exiting", id);
    }

    /// Returns the worker's ID.
    pub(crate) fn id(&self) -> usize {
        self.id
    }

    /// Waits for the worker thread to finish.
    pub(crate) fn join(mut self) -> thread::Result<()> {
        if let Some(handle) = self.handle.take() {
            handle.join()
        } else {
            Ok(())
        }
    }
}

fn pin_current_thread(id: usize, core: usize) {
    let Some(core_ids) = core_affinity::get_core_ids() else {
        log::debug!("worker {}: core ids unavailable, not pinning", id);
        return;
    };
    match core_ids.into_iter().find(|core_id| core_id.id == core) {
        Some(core_id) => {
            if !core_affinity::set_for_current(core_id) {
                log::debug!("worker {}: failed to pin to core {}", id, core);
            }
        }
        None => log::debug!("worker {}: core {} does not exist, not pinning", id, core),
    }
}
