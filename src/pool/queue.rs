/*!
 * Task Pool
 * Shared, growable task queue with a forward-scanning claim cursor
 *
 * The pool is the single source of truth for task state. Workers and the
 * local executor never hold task state themselves - they claim copies and
 * report outcomes back through `set_task_state`, always under the pool lock.
 */

use super::types::{Strategy, Task, TaskState};
use crate::core::types::{SourceFile, TaskIndex, WorkerId};
use ahash::RandomState;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Per-slot record. `retired` marks a slot recycled by the strategy
/// fallback: its state reads `Pending` but it is already counted complete
/// and must never be offered again, even after a cursor rewind.
#[derive(Debug, Clone)]
struct Entry {
    task: Task,
    claimant: Option<WorkerId>,
    retired: bool,
}

/// Snapshot of per-state slot counts, for reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StateCounts {
    pub pending: usize,
    pub running: usize,
    pub converted: usize,
    pub failed: usize,
    pub missing: usize,
    /// Slots recycled by the exact-to-robust fallback; counted complete,
    /// never offered again
    pub retired: usize,
}

#[derive(Debug, Default)]
struct PoolInner {
    entries: Vec<Entry>,
    seen: HashSet<(SourceFile, Strategy), RandomState>,
    next_scan: usize,
    completed: usize,
}

impl PoolInner {
    /// Append a task unless the `(source, strategy)` pair already exists.
    fn add(&mut self, source: SourceFile, strategy: Strategy) -> bool {
        if !self.seen.insert((source.clone(), strategy)) {
            debug!(
                "task for {:?} with {:?} already queued; ignoring",
                source.path, strategy
            );
            return false;
        }

        let index = self.entries.len();
        self.entries.push(Entry {
            task: Task {
                index,
                source,
                strategy,
                state: TaskState::Pending,
            },
            claimant: None,
            retired: false,
        });
        true
    }

    /// Accounting invariant: every terminal or retired slot has been counted
    /// exactly once.
    fn check_accounting(&self) {
        debug_assert_eq!(
            self.completed,
            self.entries
                .iter()
                .filter(|e| e.retired || e.task.state.is_terminal())
                .count(),
            "completed counter diverged from slot states"
        );
    }
}

/// Thread-safe task queue shared between the dispatcher, its workers, and
/// the local executor.
///
/// Tasks are offered in insertion order through a cursor that only moves
/// forward, except when a task is explicitly reset to `Pending` - then the
/// cursor rewinds so the resubmitted task is revisited. Appends during a
/// scan are well-defined: the queue is a single growable sequence, never an
/// iterator.
pub struct TaskPool {
    inner: Mutex<PoolInner>,
}

impl TaskPool {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(PoolInner::default()),
        }
    }

    /// Queue a conversion task. No-op if an identical `(source, strategy)`
    /// pair was ever queued, including pairs queued internally by the
    /// strategy fallback. Safe to call concurrently with all other
    /// operations, including from inside a drain.
    pub fn add_task(&self, source: SourceFile, strategy: Strategy) {
        let mut inner = self.inner.lock();
        if inner.add(source, strategy) {
            debug!("queued task {}", inner.entries.len() - 1);
        }
    }

    /// Claim the next `Pending` task for `claimant`, marking it `Running`.
    ///
    /// Returns a copy so the caller keeps a stable index and source even
    /// while the pool mutates concurrently. `None` means nothing is pending
    /// ahead of the scan cursor - other tasks may still be `Running`, so
    /// this does not imply the pool is drained.
    pub fn claim_next_task(&self, claimant: WorkerId) -> Option<Task> {
        self.next_task(Some(claimant))
    }

    /// Unclaimed variant of `claim_next_task`, used by the single-threaded
    /// local executor.
    pub fn get_next_task(&self) -> Option<Task> {
        self.next_task(None)
    }

    fn next_task(&self, claimant: Option<WorkerId>) -> Option<Task> {
        let mut inner = self.inner.lock();
        let start = inner.next_scan;

        for i in start..inner.entries.len() {
            let entry = &inner.entries[i];
            if entry.task.state == TaskState::Pending && !entry.retired {
                let entry = &mut inner.entries[i];
                entry.task.state = TaskState::Running;
                entry.claimant = claimant;
                let task = entry.task.clone();
                inner.next_scan = i + 1;
                return Some(task);
            }
        }

        None
    }

    /// Record the outcome of a task attempt.
    ///
    /// State handling, all under the pool lock:
    /// - `Unknown` is normalized to `Converted` and counted complete.
    /// - `Failed` on a strategy that still has a fallback requeues the same
    ///   source with the fallback engine and recycles the failed slot: the
    ///   slot reads `Pending` again but is retired behind the cursor, and
    ///   the failed attempt is counted complete without ever surfacing as a
    ///   failure.
    /// - `Failed` without a fallback, `Converted`, and `Missing` store
    ///   as-is and count complete.
    /// - `Pending` resubmits the task and rewinds the cursor to it; resetting
    ///   an already-completed slot also rolls the completion count back so
    ///   accounting stays exact.
    ///
    /// Index validity is a caller contract: an out-of-range index is a
    /// diagnostic no-op, not a recoverable error. Reports against a slot
    /// that already reached a terminal state are stale (the task was
    /// requeued from under a dead worker) and are dropped with a warning.
    pub fn set_task_state(&self, index: TaskIndex, state: TaskState) {
        let mut inner = self.inner.lock();

        if index >= inner.entries.len() {
            error!(
                "set_task_state: index {} out of range (pool has {} tasks)",
                index,
                inner.entries.len()
            );
            debug_assert!(false, "task index {} out of range", index);
            return;
        }

        let current = inner.entries[index].task.state;
        let retired = inner.entries[index].retired;

        match state {
            TaskState::Unknown => {
                if current.is_terminal() || retired {
                    warn!("stale report for task {}; ignoring", index);
                    return;
                }
                inner.entries[index].task.state = TaskState::Converted;
                inner.entries[index].claimant = None;
                inner.completed += 1;
            }
            TaskState::Failed => {
                if current.is_terminal() || retired {
                    warn!("stale report for task {}; ignoring", index);
                    return;
                }
                if let Some(fallback) = inner.entries[index].task.strategy.fallback() {
                    let source = inner.entries[index].task.source.clone();
                    let requeued = inner.add(source.clone(), fallback);
                    info!(
                        "task {} failed under {:?}; {} {:?} with {:?}",
                        index,
                        inner.entries[index].task.strategy,
                        if requeued { "requeued" } else { "fallback already queued for" },
                        source.path,
                        fallback
                    );
                    let entry = &mut inner.entries[index];
                    entry.task.state = TaskState::Pending;
                    entry.retired = true;
                    entry.claimant = None;
                    inner.completed += 1;
                } else {
                    let entry = &mut inner.entries[index];
                    entry.task.state = TaskState::Failed;
                    entry.claimant = None;
                    inner.completed += 1;
                    warn!("task {} failed with no fallback left", index);
                }
            }
            TaskState::Converted | TaskState::Missing => {
                if current.is_terminal() || retired {
                    warn!("stale report for task {}; ignoring", index);
                    return;
                }
                let entry = &mut inner.entries[index];
                entry.task.state = state;
                entry.claimant = None;
                inner.completed += 1;
            }
            TaskState::Pending => {
                if current.is_terminal() || retired {
                    // Resubmission of a finished slot: roll the count back
                    // so completion accounting stays exact.
                    inner.completed -= 1;
                }
                let entry = &mut inner.entries[index];
                entry.task.state = TaskState::Pending;
                entry.retired = false;
                entry.claimant = None;
                inner.next_scan = inner.next_scan.min(index);
                debug!("task {} resubmitted; cursor rewound to {}", index, inner.next_scan);
            }
            TaskState::Running => {
                error!(
                    "set_task_state: {:?} is assigned by claiming, not reported",
                    state
                );
                debug_assert!(false, "Running reported through set_task_state");
                return;
            }
        }

        inner.check_accounting();
    }

    /// Reset every `Running` task held by `claimant` back to `Pending`,
    /// rewinding the cursor so they are offered again. Called when a worker
    /// dies so its in-flight tasks are not stranded.
    pub fn release_claims(&self, claimant: WorkerId) -> usize {
        let mut inner = self.inner.lock();
        let mut released = 0;
        let mut rewind_to = inner.next_scan;

        for entry in inner.entries.iter_mut() {
            if entry.claimant == Some(claimant) && entry.task.state == TaskState::Running {
                entry.task.state = TaskState::Pending;
                entry.claimant = None;
                rewind_to = rewind_to.min(entry.task.index);
                released += 1;
            }
        }

        if released > 0 {
            inner.next_scan = rewind_to;
            info!(
                "released {} in-flight task(s) from dead worker {}",
                released, claimant
            );
        }
        released
    }

    /// Mark every task that has not finished as `Failed`, without strategy
    /// fallback. Used to drain the queue when the run is cancelled; the
    /// tasks were not attempted, so there is nothing to retry.
    pub fn fail_remaining(&self) -> usize {
        let mut inner = self.inner.lock();
        let mut failed = 0;

        for entry in inner.entries.iter_mut() {
            if entry.retired || entry.task.state.is_terminal() {
                continue;
            }
            entry.task.state = TaskState::Failed;
            entry.claimant = None;
            failed += 1;
        }

        inner.completed += failed;
        inner.next_scan = inner.entries.len();
        if failed > 0 {
            warn!("cancelled run: {} unfinished task(s) marked failed", failed);
        }
        inner.check_accounting();
        failed
    }

    /// True once every queued task has been accounted for. The length can
    /// grow between calls - fallback requeues and dependency discovery both
    /// append - so `true` is only stable once no worker can enqueue more.
    pub fn is_over(&self) -> bool {
        let inner = self.inner.lock();
        inner.completed == inner.entries.len()
    }

    /// Number of tasks ever queued, including retired fallback slots
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Number of attempts counted complete (terminal states plus retired
    /// fallback slots)
    pub fn completed(&self) -> usize {
        self.inner.lock().completed
    }

    /// Copy of every task, in insertion order
    pub fn snapshot(&self) -> Vec<Task> {
        self.inner
            .lock()
            .entries
            .iter()
            .map(|e| e.task.clone())
            .collect()
    }

    /// Per-state slot counts. Retired slots are reported separately from
    /// `pending` even though their stored state reads `Pending`.
    pub fn state_counts(&self) -> StateCounts {
        let inner = self.inner.lock();
        let mut counts = StateCounts::default();
        for entry in &inner.entries {
            if entry.retired {
                counts.retired += 1;
                continue;
            }
            match entry.task.state {
                TaskState::Pending => counts.pending += 1,
                TaskState::Running => counts.running += 1,
                TaskState::Converted => counts.converted += 1,
                TaskState::Failed => counts.failed += 1,
                TaskState::Missing => counts.missing += 1,
                TaskState::Unknown => counts.converted += 1,
            }
        }
        counts
    }
}

impl Default for TaskPool {
    fn default() -> Self {
        Self::new()
    }
}
