/*!
 * Dispatch Types
 * Facade-level outcomes and run reporting
 */

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Dispatch operation result
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Facade-level failures. Per-task failures are task states, not errors.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Dispatcher already ran; it is single-use")]
    AlreadyDispatched,

    #[error("Cache directory {}: {source}", path.display())]
    CacheDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Manifest write failed: {0}")]
    Manifest(String),
}

/// Where the dispatcher is in its single run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Accepting tasks; `run` not called yet
    Idle,
    /// Workers are converting
    Multiprocess,
    /// In-process drain of whatever is left
    Local,
    /// Terminal; results are stable
    Done,
}

/// Summary of a finished run. `total` always equals the sum of the five
/// outcome counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunReport {
    /// Tasks ever queued, including fallback retries
    pub total: usize,
    pub converted: usize,
    pub failed: usize,
    pub missing: usize,
    /// Attempts superseded by an engine-fallback retry
    pub retried: usize,
    /// Tasks never attempted (memory cancel during the local drain)
    pub unprocessed: usize,
    pub used_multiprocessing: bool,
    pub cancelled_by_memory_guard: bool,
}

impl RunReport {
    /// Every queued task either converted or was retried into one that did
    pub fn is_complete_success(&self) -> bool {
        self.failed == 0 && self.missing == 0 && self.unprocessed == 0
    }
}
