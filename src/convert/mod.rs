/*!
 * Conversion Seam
 * Engine abstraction the dispatcher drives tasks through
 */

use crate::core::types::SourceFile;
use crate::pool::{Strategy, TaskState};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Outcome class of a single conversion attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionState {
    /// Output artifacts were produced
    Converted,
    /// The engine ran and gave up on this source
    Failed,
    /// The source file does not exist on disk
    SourceMissing,
}

impl ConversionState {
    /// Task-state equivalent for pool reporting
    pub fn to_task_state(self) -> TaskState {
        match self {
            ConversionState::Converted => TaskState::Converted,
            ConversionState::Failed => TaskState::Failed,
            ConversionState::SourceMissing => TaskState::Missing,
        }
    }
}

/// Everything a conversion attempt reports back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversion {
    pub state: ConversionState,
    /// Files written under the cache directory
    pub artifacts: Vec<PathBuf>,
    /// Referenced sources discovered while converting (assemblies only).
    /// Meaningful only when `state` is `Converted`.
    pub dependents: Vec<SourceFile>,
    /// On-disk size of the artifacts, for memory admission
    pub output_bytes: u64,
}

impl Conversion {
    /// A failed attempt with nothing produced
    pub fn failed() -> Self {
        Self {
            state: ConversionState::Failed,
            artifacts: Vec::new(),
            dependents: Vec::new(),
            output_bytes: 0,
        }
    }

    /// The source was not found on disk
    pub fn missing() -> Self {
        Self {
            state: ConversionState::SourceMissing,
            artifacts: Vec::new(),
            dependents: Vec::new(),
            output_bytes: 0,
        }
    }
}

/// Conversion engine interface.
///
/// `convert` blocks until the attempt resolves. Implementations decide what
/// each strategy means for their format; the dispatcher only relies on the
/// exact strategy being the fast path and the robust one the salvage path.
pub trait Converter: Send + Sync {
    fn convert(&self, source: &SourceFile, strategy: Strategy, cache_dir: &Path) -> Conversion;
}
