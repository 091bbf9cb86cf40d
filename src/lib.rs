/*!
 * Mesh Dispatch Library
 * Task dispatching for batch mesh-cache conversion
 */

pub mod convert;
pub mod core;
pub mod dispatch;
pub mod local;
pub mod memory;
pub mod pool;
pub mod worker;

// Re-exports
pub use self::core::types::{ResultMap, SourceFile, SourceKind, TaskIndex, WorkerId};
pub use convert::{Conversion, ConversionState, Converter};
pub use dispatch::{DispatchError, DispatchResult, Dispatcher, DispatcherBuilder, Phase, RunReport};
pub use local::LocalExecutor;
pub use memory::{MemoryGate, MemoryProbe, PressureCallback, PressureDecision, PressureEvent};
pub use pool::{StateCounts, Strategy, Task, TaskPool, TaskState};
pub use worker::{
    compute_worker_count, ProcessWorkerConfig, ProcessWorkerFactory, Worker, WorkerContext,
    WorkerEnv, WorkerError, WorkerFactory, WorkerPool, WorkerResult,
};
