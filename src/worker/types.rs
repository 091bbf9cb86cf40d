/*!
 * Worker Types
 * Worker abstractions and the environment they report through
 */

use crate::core::types::{ResultMap, WorkerId};
use crate::memory::MemoryGate;
use crate::pool::{Strategy, TaskPool};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Worker operation result
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Worker lifecycle errors
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Worker backend unavailable: {0}")]
    Unavailable(String),
}

/// Shared surfaces a worker feeds during its lifetime. Everything here is
/// thread-safe; workers on any transport go through these and nothing else.
#[derive(Clone)]
pub struct WorkerEnv {
    pub pool: Arc<TaskPool>,
    pub gate: Arc<MemoryGate>,
    pub results: Arc<ResultMap>,
    pub cache_dir: PathBuf,
    /// Strategy for tasks the worker discovers and enqueues itself
    pub default_strategy: Strategy,
}

impl std::fmt::Debug for WorkerEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerEnv")
            .field("cache_dir", &self.cache_dir)
            .field("default_strategy", &self.default_strategy)
            .finish_non_exhaustive()
    }
}

/// Everything a factory needs to bring up one worker
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub id: WorkerId,
    /// Stable slot number; survives restarts while `id` does not
    pub slot: usize,
    pub env: WorkerEnv,
}

/// A running worker as the pool manager sees it.
///
/// Transport contract: workers report discovered dependents (`add_task`)
/// *before* the final `set_task_state` of the task that found them, so the
/// pool never reads as drained while work is still implied.
pub trait Worker: Send {
    /// Health probe. Once this returns `false` it stays `false`.
    fn is_alive(&mut self) -> bool;

    /// Whether a respawn could help. Meaningful only after `is_alive`
    /// returned `false`; a clean exit is final, an abnormal one is not.
    fn is_restartable(&self) -> bool;

    /// Terminate and reap. Idempotent.
    fn stop(&mut self);
}

/// Brings up workers for the pool manager
pub trait WorkerFactory: Send + Sync {
    /// Whether this factory can spawn at all right now (binary present,
    /// backend reachable). Checked once before the multiprocess phase.
    fn available(&self) -> bool;

    /// Spawn one worker. A failure here skips the slot; the manager never
    /// retries a failed initial spawn.
    fn spawn(&self, ctx: WorkerContext) -> WorkerResult<Box<dyn Worker>>;
}
