//! Per-frame solver graph: one start node, one node per chunk, one join node.
//!
//! ```text
//!            +--> chunk 0 --+
//!  start ----+--> chunk 1 --+--> join
//!            +--> chunk K --+
//! ```
//!
//! The start node calls [`Solver::begin_step`] and releases every chunk node.
//! Each chunk node runs [`Solver::run_chunk`] and releases one count on the
//! join node, whose count is reset to the chunk count every frame. The join
//! node calls [`Solver::end_step`] once the last chunk finished.
//!
//! Only one frame may be outstanding: every `start_simulation` must be paired
//! with a `wait_for_simulation` before the next one.

use crate::dependency::JobDependency;
use crate::error::JobError;
use crate::job::Job;
use crate::job_manager::JobManager;
use crate::solver::Solver;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Where the orchestrator is in its frame cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// No frame outstanding.
    Idle,
    /// A frame with `chunks` chunk nodes was started and not yet waited for.
    Running { chunks: usize },
}

/// Builds and re-triggers the solver graph once per frame.
///
/// The chunk nodes live in a vector indexed by chunk index. When the solver's
/// chunk count changes the vector is rebuilt with fresh nodes; nodes from the
/// previous size are dropped and never released again.
pub struct GraphOrchestrator<'m> {
    manager: &'m JobManager,
    solver: Arc<dyn Solver>,
    start_node: Arc<Job>,
    chunk_nodes: Arc<RwLock<Vec<JobDependency>>>,
    join_node: Arc<Job>,
    time_step: Arc<AtomicU32>,
    state: FrameState,
    frames_started: u64,
}

impl<'m> GraphOrchestrator<'m> {
    /// Wires the start and join nodes against `solver`, executing on `manager`.
    pub fn new(solver: Arc<dyn Solver>, manager: &'m JobManager) -> Self {
        let chunk_nodes: Arc<RwLock<Vec<JobDependency>>> = Arc::new(RwLock::new(Vec::new()));
        let time_step = Arc::new(AtomicU32::new(0f32.to_bits()));

        let start_node = Job::new("solver_begin_step");
        {
            let solver = Arc::clone(&solver);
            let chunk_nodes = Arc::clone(&chunk_nodes);
            let time_step = Arc::clone(&time_step);
            start_node.initialize(
                manager,
                move |_| {
                    let dt = f32::from_bits(time_step.load(Ordering::Acquire));
                    let outcome =
                        panic::catch_unwind(AssertUnwindSafe(|| solver.begin_step(dt)));
                    // Chunks are released even if begin_step unwound, otherwise
                    // the join would never reach zero.
                    let chunks = chunk_nodes.read().unwrap_or_else(PoisonError::into_inner);
                    for chunk in chunks.iter() {
                        chunk.remove_reference();
                    }
                    drop(chunks);
                    if let Err(panic) = outcome {
                        panic::resume_unwind(panic);
                    }
                },
                1,
            );
        }

        let join_node = Job::new("solver_end_step");
        {
            let solver = Arc::clone(&solver);
            join_node.initialize(manager, move |_| solver.end_step(), 0);
        }

        GraphOrchestrator {
            manager,
            solver,
            start_node,
            chunk_nodes,
            join_node,
            time_step,
            state: FrameState::Idle,
            frames_started: 0,
        }
    }

    /// Queues the graph for one step of `dt` seconds and returns without waiting.
    ///
    /// A solver reporting zero chunks dispatches nothing: neither
    /// [`Solver::begin_step`] nor [`Solver::end_step`] is called for that
    /// frame, and it is trivially complete.
    ///
    /// # Panics
    ///
    /// Panics if the previous frame has not been waited for.
    pub fn start_simulation(&mut self, dt: f32) {
        assert_eq!(
            self.state,
            FrameState::Idle,
            "start_simulation called while the previous frame is still outstanding"
        );

        let count = self.solver.chunk_count();
        self.prepare_chunks(count);
        if count == 0 {
            log::trace!("solver reported no chunks, skipping frame");
            return;
        }

        assert!(
            count <= i32::MAX as usize,
            "chunk count {} exceeds the dependency counter range",
            count
        );
        self.join_node.reset(count as i32);
        self.start_node.reset(1);
        self.time_step.store(dt.to_bits(), Ordering::Release);
        self.state = FrameState::Running { chunks: count };
        self.frames_started += 1;

        log::trace!(
            "frame {} started: dt {} with {} chunk(s)",
            self.frames_started,
            dt,
            count
        );
        self.start_node.remove_reference();
    }

    /// Rebuilds the chunk nodes when the count changed, otherwise resets them.
    fn prepare_chunks(&mut self, count: usize) {
        let mut chunks = self
            .chunk_nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if chunks.len() == count {
            for chunk in chunks.iter() {
                chunk.reset(1);
            }
            return;
        }

        log::debug!("rebuilding solver graph: {} -> {} chunk(s)", chunks.len(), count);
        chunks.clear();
        chunks.extend((0..count).map(|index| {
            let node = JobDependency::new("solver_chunk");
            let solver = Arc::clone(&self.solver);
            node.initialize(self.manager, move |_| solver.run_chunk(index), 1);
            node.set_dependent_job(&self.join_node);
            node
        }));
    }

    /// Blocks until the outstanding frame has fully completed.
    ///
    /// Returns immediately when no frame is outstanding. Reports a payload
    /// failure recorded by the manager under `PanicPolicy::Poison`; the record
    /// stays until [`JobManager::take_poison`] clears it.
    pub fn wait_for_simulation(&mut self) -> Result<(), JobError> {
        if let FrameState::Running { chunks } = self.state {
            self.join_node.wait();
            // The start node's completion signal can trail its released chunks.
            self.start_node.wait();
            self.state = FrameState::Idle;
            log::trace!("frame {} finished ({} chunk(s))", self.frames_started, chunks);
        }

        match self.manager.poisoned() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Current frame state.
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Number of chunk nodes currently wired to the join node.
    pub fn chunk_count(&self) -> usize {
        self.chunk_nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of frames dispatched so far. Frames with no chunks are not counted.
    pub fn frames_started(&self) -> u64 {
        self.frames_started
    }
}

impl Drop for GraphOrchestrator<'_> {
    fn drop(&mut self) {
        if let FrameState::Running { .. } = self.state {
            if let Err(err) = self.wait_for_simulation() {
                log::error!("solver frame failed while dropping orchestrator: {}", err);
            }
        }
    }
}
