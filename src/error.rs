//! Error types for the job system.

use thiserror::Error;

/// Errors surfaced by the job manager and the graph orchestrator.
#[derive(Debug, Error)]
pub enum JobError {
    /// A worker thread could not be created while constructing the manager.
    #[error("failed to spawn worker thread {index}: {source}")]
    Spawn {
        index: usize,
        #[source]
        source: std::io::Error,
    },

    /// A job payload panicked while the manager was running with `PanicPolicy::Poison`.
    #[error("job '{job}' panicked: {message}")]
    Poisoned { job: &'static str, message: String },

    /// Worker threads terminated abnormally during shutdown.
    #[error("{0} worker thread(s) panicked")]
    WorkerPanicked(usize),
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
