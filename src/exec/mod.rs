use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Schedules node chunks and collects their results
mod scheduler;
pub use scheduler::{RunSummary, Scheduler};

/// Fixed pool of worker threads executing chunk jobs
mod pool;
pub use pool::{ChunkJob, ChunkResult, ResolvedRuntime, WorkerPool};

/// Run a subprocess
mod run_cmd;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Execution failed; {0} node(s) did not complete")]
    PipelineFailed(usize),
}

/// Cooperative cancellation flag, shared between the scheduler, the
/// worker threads and any running subprocesses.
#[derive(Debug, Default, Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Request that execution stop. Running chunks are killed and
    /// marked Stopped; chunks not yet started revert to None.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
