//! Job definitions and execution logic.
//!
//! A job is a reusable unit of work guarded by an atomic dependency count.
//! When the count drops to zero the job submits itself to the run queue of the
//! [`JobManager`] it was initialized with. Other threads can block on a job's
//! completion signal, which lives behind its own mutex/condvar pair so waiters
//! stay off the decrement path.

use crate::error::panic_message;
use crate::job_manager::{JobManager, RunQueue};
use crate::lock;
use crossbeam::utils::CachePadded;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError, Weak};

/// Work executed by a job. Receives the job itself so it can release dependents.
pub type Payload = Box<dyn FnMut(&Arc<Job>) + Send + 'static>;

/// Completion flag plus the condition waiters block on.
struct Completion {
    finished: Mutex<bool>,
    signal: Condvar,
}

/// A unit of deferred work with a dependency counter and a completion signal.
///
/// Jobs are shared as `Arc<Job>`: the owner keeps one handle, and the run queue
/// holds another while the job is pending. A job is reusable across frames via
/// [`Job::reset`].
pub struct Job {
    name: &'static str,
    payload: Mutex<Option<Payload>>,
    dependency_count: CachePadded<AtomicI32>,
    owner: Mutex<Weak<RunQueue>>,
    /// Downstream job released after this one completes. Set through `JobDependency`.
    successor: Mutex<Option<Arc<Job>>>,
    in_flight: AtomicBool,
    completion: Completion,
}

impl Job {
    /// Creates an uninitialized job. Call [`Job::initialize`] before releasing it.
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Job {
            name,
            payload: Mutex::new(None),
            dependency_count: CachePadded::new(AtomicI32::new(0)),
            owner: Mutex::new(Weak::new()),
            successor: Mutex::new(None),
            in_flight: AtomicBool::new(false),
            completion: Completion {
                finished: Mutex::new(false),
                signal: Condvar::new(),
            },
        })
    }

    /// Binds the payload and owning manager and sets the initial dependency count.
    pub fn initialize<F>(&self, owner: &JobManager, payload: F, initial_count: i32)
    where
        F: FnMut(&Arc<Job>) + Send + 'static,
    {
        *lock(&self.payload) = Some(Box::new(payload));
        self.bind(owner, initial_count);
    }

    /// Like [`Job::initialize`] but without a payload; executing the job only
    /// signals completion and releases its successor.
    pub fn initialize_empty(&self, owner: &JobManager, initial_count: i32) {
        *lock(&self.payload) = None;
        self.bind(owner, initial_count);
    }

    fn bind(&self, owner: &JobManager, initial_count: i32) {
        assert!(
            !self.in_flight.load(Ordering::Acquire),
            "job '{}' initialized while in flight",
            self.name
        );
        *lock(&self.owner) = Arc::downgrade(owner.run_queue());
        self.dependency_count.store(initial_count, Ordering::Release);
        *lock(&self.completion.finished) = false;
    }

    /// Restores the dependency count and clears the completion flag for the next cycle.
    ///
    /// # Panics
    ///
    /// Panics if the job has been submitted and has not completed yet.
    pub fn reset(&self, count: i32) {
        assert!(
            !self.in_flight.load(Ordering::Acquire),
            "job '{}' reset while in flight",
            self.name
        );
        self.dependency_count.store(count, Ordering::Release);
        *lock(&self.completion.finished) = false;
    }

    /// Adds one dependency.
    pub fn add_reference(&self) {
        self.dependency_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Removes one dependency; the caller that takes the count to zero submits the job.
    ///
    /// # Panics
    ///
    /// Panics if the count was already zero, which means the graph released
    /// this job more times than it has dependencies.
    pub fn remove_reference(self: &Arc<Self>) {
        // AcqRel: the thread that observes zero sees every predecessor's writes.
        let previous = self.dependency_count.fetch_sub(1, Ordering::AcqRel);
        assert!(
            previous > 0,
            "job '{}' dependency count went negative",
            self.name
        );
        if previous == 1 {
            self.submit_to_owner();
        }
    }

    fn submit_to_owner(self: &Arc<Self>) {
        let owner = lock(&self.owner).upgrade();
        match owner {
            Some(queue) => queue.push(Arc::clone(self)),
            None => log::error!(
                "job '{}' became runnable but its job manager is gone",
                self.name
            ),
        }
    }

    /// Runs the payload, signals completion, then releases the successor.
    ///
    /// A panicking payload is reported to the owning manager's panic policy,
    /// still completes the job and releases the successor, and is then resumed,
    /// so graphs downstream never wait forever.
    pub fn execute(self: &Arc<Self>) {
        let owner = lock(&self.owner).upgrade();
        self.run(owner.as_deref());
    }

    pub(crate) fn run(self: &Arc<Self>, queue: Option<&RunQueue>) {
        let outcome = {
            let mut payload = lock(&self.payload);
            match payload.as_mut() {
                Some(work) => panic::catch_unwind(AssertUnwindSafe(|| work(self))),
                None => Ok(()),
            }
        };

        // Report before releasing the successor so the failure is visible to
        // whoever waits on the end of the graph.
        let failure = outcome.err().inspect(|panic| {
            if let Some(queue) = queue {
                queue.handle_panic(self.name, panic_message(&**panic));
            }
        });

        self.complete();

        let successor = lock(&self.successor).clone();
        if let Some(successor) = successor {
            successor.remove_reference();
        }

        if let Some(panic) = failure {
            panic::resume_unwind(panic);
        }
    }

    fn complete(&self) {
        self.in_flight.store(false, Ordering::Release);
        let mut finished = lock(&self.completion.finished);
        *finished = true;
        self.completion.signal.notify_all();
    }

    /// Blocks until the job has finished executing. There is no timeout.
    pub fn wait(&self) {
        let mut finished = lock(&self.completion.finished);
        while !*finished {
            finished = self
                .completion
                .signal
                .wait(finished)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Returns whether the job has finished its current cycle.
    pub fn is_finished(&self) -> bool {
        *lock(&self.completion.finished)
    }

    /// Current dependency count.
    pub fn dependency_count(&self) -> i32 {
        self.dependency_count.load(Ordering::Acquire)
    }

    /// Name used in logs and traces.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn mark_in_flight(&self) {
        self.in_flight.store(true, Ordering::Release);
    }

    /// Clears the in-flight flag of a job dropped from the queue without running.
    pub(crate) fn mark_abandoned(&self) {
        self.in_flight.store(false, Ordering::Release);
    }

    pub(crate) fn set_successor(&self, successor: Option<Arc<Job>>) {
        *lock(&self.successor) = successor;
    }

    pub(crate) fn successor(&self) -> Option<Arc<Job>> {
        lock(&self.successor).clone()
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("dependency_count", &self.dependency_count())
            .field("in_flight", &self.in_flight.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_job_execution() {
        let manager = JobManager::new(1).expect("manager");
        let executed = Arc::new(AtomicBool::new(false));
        let executed_clone = executed.clone();

        let job = Job::new("test");
        job.initialize(
            &manager,
            move |_| executed_clone.store(true, Ordering::SeqCst),
            1,
        );

        job.execute();
        assert!(executed.load(Ordering::SeqCst));
        assert!(job.is_finished());
        manager.shutdown().expect("Shutdown failed");
    }

    #[test]
    fn test_reference_counting() {
        let manager = JobManager::new(1).expect("manager");
        let job = Job::new("test");
        job.initialize_empty(&manager, 2);

        job.add_reference();
        assert_eq!(job.dependency_count(), 3);
        job.remove_reference();
        job.remove_reference();
        assert_eq!(job.dependency_count(), 1);
        assert!(!job.is_finished());

        job.remove_reference();
        job.wait();
        assert_eq!(job.dependency_count(), 0);
        manager.shutdown().expect("Shutdown failed");
    }

    #[test]
    fn test_reset_clears_finished() {
        let manager = JobManager::new(1).expect("manager");
        let runs = Arc::new(AtomicUsize::new(0));
        let runs_clone = runs.clone();

        let job = Job::new("test");
        job.initialize(
            &manager,
            move |_| {
                runs_clone.fetch_add(1, Ordering::SeqCst);
            },
            1,
        );

        job.remove_reference();
        job.wait();

        job.reset(1);
        assert!(!job.is_finished());
        assert_eq!(job.dependency_count(), 1);

        job.remove_reference();
        job.wait();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        manager.shutdown().expect("Shutdown failed");
    }

    #[test]
    #[should_panic(expected = "dependency count went negative")]
    fn test_negative_count_is_fatal() {
        let job = Job::new("underflow");
        job.remove_reference();
    }

    #[test]
    #[should_panic(expected = "reset while in flight")]
    fn test_reset_of_queued_job_is_fatal() {
        let manager = JobManager::new(1).expect("manager");
        let gate = Arc::new(Mutex::new(()));

        let blocker = Job::new("blocker");
        let gate_clone = gate.clone();
        blocker.initialize(
            &manager,
            move |_| {
                let _held = lock(&gate_clone);
            },
            1,
        );
        let queued = Job::new("queued");
        queued.initialize_empty(&manager, 1);

        // Declared after the manager so unwinding unblocks the worker before shutdown.
        let _closed = lock(&gate);
        blocker.remove_reference();
        queued.remove_reference();
        queued.reset(1);
    }

    fn boxed<F: FnMut(&Arc<Job>) + Send + 'static>(work: F) -> Payload {
        Box::new(work)
    }

    #[test]
    fn test_payload_panic_still_completes() {
        let job = Job::new("panics");
        *lock(&job.payload) = Some(boxed(|_| panic!("payload failure")));

        let result = panic::catch_unwind(AssertUnwindSafe(|| job.execute()));
        assert!(result.is_err());
        assert!(job.is_finished());
    }

    #[test]
    fn test_wait_after_finish_returns() {
        let job = Job::new("done");
        job.execute();

        let job_clone = job.clone();
        let waiter = thread::spawn(move || job_clone.wait());
        thread::sleep(Duration::from_millis(10));
        waiter.join().expect("waiter panicked");
    }
}
