/*!
 * Local Executor
 * Single-threaded in-process drain of whatever the worker phase left behind
 */

use crate::convert::{ConversionState, Converter};
use crate::core::types::ResultMap;
use crate::memory::{MemoryGate, PressureDecision};
use crate::pool::{Strategy, TaskPool, TaskState};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;

/// Converts tasks one at a time on the calling thread.
///
/// Each conversion blocks until the engine returns; there is no timeout, so
/// a hung engine hangs the drain. Only run after the worker pool stopped.
pub struct LocalExecutor {
    converter: Arc<dyn Converter>,
    cache_dir: PathBuf,
    /// Strategy for dependents discovered during the drain
    default_strategy: Strategy,
}

impl LocalExecutor {
    pub fn new(
        converter: Arc<dyn Converter>,
        cache_dir: PathBuf,
        default_strategy: Strategy,
    ) -> Self {
        Self {
            converter,
            cache_dir,
            default_strategy,
        }
    }

    /// Claim and convert until nothing is pending or the memory gate
    /// cancels. Returns the number of attempts made.
    ///
    /// Discovered dependents are enqueued before the task that found them
    /// is reported done, so the pool never reads as drained with work still
    /// implied. Failed exact-strategy attempts come back around as robust
    /// retries through the pool's own resubmission; there is no retry logic
    /// here. On cancel the remaining pending tasks stay untouched.
    pub fn drain(&self, pool: &TaskPool, gate: &MemoryGate, results: &ResultMap) -> usize {
        let mut attempts = 0;

        while let Some(task) = pool.get_next_task() {
            let outcome = self
                .converter
                .convert(&task.source, task.strategy, &self.cache_dir);
            attempts += 1;

            match outcome.state {
                ConversionState::Converted => {
                    for dependent in outcome.dependents {
                        pool.add_task(dependent, self.default_strategy);
                    }
                    results.insert(task.source.path.clone(), outcome.artifacts);
                    pool.set_task_state(task.index, TaskState::Converted);

                    gate.record_output(task.index, outcome.output_bytes);
                    if gate.can_continue() == PressureDecision::Cancel {
                        warn!("local drain cancelled under memory pressure");
                        break;
                    }
                }
                state => {
                    pool.set_task_state(task.index, state.to_task_state());
                }
            }
        }

        info!("local drain made {} attempt(s)", attempts);
        attempts
    }
}
