/*!
 * Task Types
 * Task records, lifecycle states, and tessellation strategies
 */

use crate::core::types::{SourceFile, TaskIndex};
use serde::{Deserialize, Serialize};

/// Tessellation engine choice for a conversion attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Native B-rep tessellation; fast and faithful, but intolerant of
    /// malformed geometry
    Exact,
    /// Tolerant re-meshing engine used when exact tessellation fails
    Robust,
}

impl Strategy {
    /// The engine a failed attempt is retried with, if any.
    /// `Robust` has no further fallback - its failures are terminal.
    pub fn fallback(self) -> Option<Strategy> {
        match self {
            Strategy::Exact => Some(Strategy::Robust),
            Strategy::Robust => None,
        }
    }
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::Exact
    }
}

/// Task lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting to be claimed
    Pending,
    /// Claimed by a worker or the local executor
    Running,
    /// Conversion produced its artifacts
    Converted,
    /// Conversion failed; terminal unless the pool requeues a fallback
    Failed,
    /// Source file missing on disk; terminal, never retried
    Missing,
    /// Reported by transports that lost the precise outcome; the pool
    /// normalizes this to `Converted` on store
    Unknown,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Converted | TaskState::Failed | TaskState::Missing
        )
    }
}

/// One unit of work: a source file plus the strategy to convert it with.
///
/// Tasks are mutated only by the pool's locked operations; everything handed
/// out by `claim_next_task`/`get_next_task` is a copy whose `index` stays
/// valid while the pool grows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Task {
    pub index: TaskIndex,
    pub source: SourceFile,
    pub strategy: Strategy,
    pub state: TaskState,
}
