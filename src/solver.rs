//! The interface the orchestrator drives each frame.

/// A simulation step split into independently runnable chunks.
///
/// Calls arrive from worker threads. `run_chunk` may be called for different
/// indices concurrently, so implementations must keep chunk data disjoint or
/// synchronize internally. Within one frame the calls are causally ordered:
/// `begin_step` happens before every `run_chunk`, and every `run_chunk`
/// happens before `end_step`.
pub trait Solver: Send + Sync {
    /// Number of parallel chunks for the next step. Queried once per frame.
    fn chunk_count(&self) -> usize;

    /// Prepares a step of `dt` seconds.
    fn begin_step(&self, dt: f32);

    /// Runs the work of chunk `index`, `0 <= index < chunk_count()`.
    fn run_chunk(&self, index: usize);

    /// Finishes the step after every chunk completed.
    fn end_step(&self);
}
