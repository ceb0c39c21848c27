//! # jobgraph - Dependency-Counted Job Scheduler
//!
//! A small thread pool that executes a per-frame graph of jobs whose edges are
//! expressed as reference counts. A job runs when its dependency count drops
//! to zero; the thread that performs that final decrement submits it.
//!
//! ## Architecture
//!
//! - **Job**: a reusable unit of work with an atomic dependency counter and a
//!   completion signal other threads can block on.
//! - **JobDependency**: a job that releases one count on a successor when it
//!   finishes; fan-in joins fall out of several dependencies sharing a successor.
//! - **JobManager**: worker threads pulling runnable jobs from a FIFO run queue.
//! - **GraphOrchestrator**: rebuilds and re-triggers a start/chunks/join graph
//!   against a [`Solver`] every simulation frame.
//!
//! ## Example
//!
//! ```no_run
//! use jobgraph::{GraphOrchestrator, JobManager, Solver};
//! use std::sync::Arc;
//!
//! struct Noop;
//!
//! impl Solver for Noop {
//!     fn chunk_count(&self) -> usize { 4 }
//!     fn begin_step(&self, _dt: f32) {}
//!     fn run_chunk(&self, _index: usize) {}
//!     fn end_step(&self) {}
//! }
//!
//! let manager = JobManager::new(4).expect("spawn workers");
//! let mut orchestrator = GraphOrchestrator::new(Arc::new(Noop), &manager);
//!
//! orchestrator.start_simulation(1.0 / 60.0);
//! orchestrator.wait_for_simulation().expect("frame failed");
//! ```

pub mod config;
pub mod dependency;
pub mod error;
pub mod job;
pub mod job_manager;
pub mod metrics;
pub mod orchestrator;
pub mod solver;
pub mod tracing;
mod worker;

pub use config::{JobManagerConfig, PanicPolicy, PinningStrategy};
pub use dependency::JobDependency;
pub use error::JobError;
pub use job::{Job, Payload};
pub use job_manager::JobManager;
pub use orchestrator::{FrameState, GraphOrchestrator};
pub use solver::Solver;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks a mutex, ignoring poisoning. Payload panics are handled by the
/// worker's panic policy, so a poisoned lock carries no extra information.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
