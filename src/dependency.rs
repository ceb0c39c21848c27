//! Jobs that release a downstream job when they finish.
//!
//! A graph is expressed entirely as "when I finish, decrement you": a join is
//! a job whose initial count equals the number of `JobDependency` nodes that
//! point at it.

use crate::job::Job;
use std::ops::Deref;
use std::sync::Arc;

/// A [`Job`] wired to a single successor.
///
/// After the payload runs, the successor's dependency count is decremented
/// unconditionally, including when the payload panicked.
#[derive(Clone, Debug)]
pub struct JobDependency {
    job: Arc<Job>,
}

impl JobDependency {
    /// Creates an uninitialized dependency node with no successor.
    pub fn new(name: &'static str) -> Self {
        JobDependency { job: Job::new(name) }
    }

    /// Sets the job released when this one completes.
    pub fn set_dependent_job(&self, successor: &Arc<Job>) {
        self.job.set_successor(Some(Arc::clone(successor)));
    }

    /// Detaches the successor.
    pub fn clear_dependent_job(&self) {
        self.job.set_successor(None);
    }

    /// Returns the current successor, if any.
    pub fn dependent_job(&self) -> Option<Arc<Job>> {
        self.job.successor()
    }

    /// Returns the underlying job handle.
    pub fn job(&self) -> &Arc<Job> {
        &self.job
    }
}

impl Deref for JobDependency {
    type Target = Arc<Job>;

    fn deref(&self) -> &Self::Target {
        &self.job
    }
}
