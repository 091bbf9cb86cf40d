/*!
 * Worker Module
 * Out-of-process conversion workers and the pool that manages them
 */

mod manager;
mod process;
mod types;

pub use manager::{compute_worker_count, WorkerPool};
pub use process::{ProcessWorker, ProcessWorkerConfig, ProcessWorkerFactory};
pub use types::{Worker, WorkerContext, WorkerEnv, WorkerError, WorkerFactory, WorkerResult};
