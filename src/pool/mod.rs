/*!
 * Task Pool Module
 * Ordered, deduplicated conversion queue shared across workers
 */

mod queue;
mod types;

pub use queue::{StateCounts, TaskPool};
pub use types::{Strategy, Task, TaskState};
