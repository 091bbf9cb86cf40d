/*!
 * Core Module
 * Fundamental dispatcher types and limits
 */

pub mod limits;
pub mod types;

// Re-export for convenience
pub use types::{ResultMap, SourceFile, SourceKind, TaskIndex, WorkerId};
