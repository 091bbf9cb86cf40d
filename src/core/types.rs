/*!
 * Core Types
 * Common types shared across the dispatcher
 */

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Position of a task in the pool's insertion order
pub type TaskIndex = usize;

/// Unique identity of a spawned worker; restarts mint a fresh one
pub type WorkerId = Uuid;

/// Source path to the artifact paths its conversion produced. Written by
/// whichever executor converts the task, read after the run.
pub type ResultMap = DashMap<PathBuf, Vec<PathBuf>>;

/// Whether a source file can pull further files into the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Self-contained geometry; conversion never discovers new inputs
    Part,
    /// Container format whose conversion may reference other source files
    Assembly,
}

/// A source file to be converted, plus enough metadata to know whether it
/// can transitively reference other files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SourceFile {
    pub path: PathBuf,
    pub kind: SourceKind,
}

impl SourceFile {
    pub fn part(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: SourceKind::Part,
        }
    }

    pub fn assembly(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: SourceKind::Assembly,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when converting this file may discover dependent files
    pub fn can_reference_other_files(&self) -> bool {
        self.kind == SourceKind::Assembly
    }
}
