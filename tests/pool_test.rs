/*!
 * Task Pool Tests
 * Concurrent claiming, reporting, and accounting under contention
 */

use mesh_dispatch::{SourceFile, Strategy, TaskPool, TaskState};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use uuid::Uuid;

const CLAIMER_THREADS: usize = 8;
const TASKS_PER_THREAD: usize = 50;

#[test]
fn test_concurrent_claims_never_overlap() {
    let total = CLAIMER_THREADS * TASKS_PER_THREAD;
    let pool = Arc::new(TaskPool::new());
    for i in 0..total {
        pool.add_task(SourceFile::part(format!("part-{}.step", i)), Strategy::Exact);
    }

    let mut handles = vec![];
    for _ in 0..CLAIMER_THREADS {
        let pool = Arc::clone(&pool);
        handles.push(thread::spawn(move || {
            let id = Uuid::new_v4();
            let mut mine = vec![];
            while let Some(task) = pool.claim_next_task(id) {
                mine.push(task.index);
            }
            mine
        }));
    }

    let mut seen = HashSet::new();
    let mut claimed = 0;
    for handle in handles {
        for index in handle.join().unwrap() {
            claimed += 1;
            assert!(seen.insert(index), "task {} claimed twice", index);
        }
    }

    assert_eq!(claimed, total);
    assert!(!pool.is_over(), "claimed tasks are running, not done");
}

#[test]
fn test_concurrent_adds_deduplicate() {
    let pool = Arc::new(TaskPool::new());
    let mut handles = vec![];

    // Every thread races to add the same 30 tasks
    for _ in 0..CLAIMER_THREADS {
        let pool = Arc::clone(&pool);
        handles.push(thread::spawn(move || {
            for i in 0..30 {
                pool.add_task(SourceFile::part(format!("shared-{}.step", i)), Strategy::Exact);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(pool.len(), 30);
}

#[test]
fn test_concurrent_claim_and_report_accounting() {
    let total = CLAIMER_THREADS * TASKS_PER_THREAD;
    let pool = Arc::new(TaskPool::new());
    for i in 0..total {
        pool.add_task(SourceFile::part(format!("part-{}.step", i)), Strategy::Exact);
    }

    let converted = Arc::new(AtomicUsize::new(0));
    let mut handles = vec![];
    for _ in 0..CLAIMER_THREADS {
        let pool = Arc::clone(&pool);
        let converted = Arc::clone(&converted);
        handles.push(thread::spawn(move || {
            let id = Uuid::new_v4();
            while let Some(task) = pool.claim_next_task(id) {
                pool.set_task_state(task.index, TaskState::Converted);
                converted.fetch_add(1, Ordering::Relaxed);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(converted.load(Ordering::Relaxed), total);
    assert!(pool.is_over());
    assert_eq!(pool.completed(), total);
    assert_eq!(pool.state_counts().converted, total);
}

#[test]
fn test_concurrent_growth_while_claiming() {
    let pool = Arc::new(TaskPool::new());
    pool.add_task(SourceFile::assembly("root-0.asm"), Strategy::Exact);

    // Claimers convert; each assembly enqueues one child, 64 levels deep
    let mut handles = vec![];
    for _ in 0..4 {
        let pool = Arc::clone(&pool);
        handles.push(thread::spawn(move || {
            let id = Uuid::new_v4();
            loop {
                match pool.claim_next_task(id) {
                    Some(task) => {
                        let depth: usize = task
                            .source
                            .path()
                            .to_string_lossy()
                            .trim_start_matches("root-")
                            .trim_end_matches(".asm")
                            .parse()
                            .unwrap();
                        if depth < 64 {
                            pool.add_task(
                                SourceFile::assembly(format!("root-{}.asm", depth + 1)),
                                Strategy::Exact,
                            );
                        }
                        pool.set_task_state(task.index, TaskState::Converted);
                    }
                    None => {
                        if pool.is_over() {
                            break;
                        }
                        thread::yield_now();
                    }
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(pool.len(), 65);
    assert!(pool.is_over());
    assert_eq!(pool.state_counts().converted, 65);
}

proptest! {
    /// Adding any sequence of (file, strategy) pairs queues exactly the
    /// distinct ones, in first-seen order
    #[test]
    fn prop_add_deduplicates(ids in proptest::collection::vec((0u8..12, any::<bool>()), 1..64)) {
        let pool = TaskPool::new();
        let mut model: Vec<(u8, bool)> = Vec::new();

        for (file, robust) in ids {
            let strategy = if robust { Strategy::Robust } else { Strategy::Exact };
            pool.add_task(SourceFile::part(format!("f-{}.step", file)), strategy);
            if !model.contains(&(file, robust)) {
                model.push((file, robust));
            }
        }

        prop_assert_eq!(pool.len(), model.len());
        let snapshot = pool.snapshot();
        for (task, (file, robust)) in snapshot.iter().zip(&model) {
            let expected = format!("f-{}.step", file);
            prop_assert_eq!(task.source.path(), std::path::Path::new(&expected));
            prop_assert_eq!(task.strategy == Strategy::Robust, *robust);
        }
    }

    /// However exact attempts fail, the run converges: every source ends
    /// converted or failed-under-robust, and the books balance
    #[test]
    fn prop_fallback_always_converges(flaky in proptest::collection::vec(0u8..3, 1..32)) {
        let pool = TaskPool::new();
        for (i, _) in flaky.iter().enumerate() {
            pool.add_task(SourceFile::part(format!("f-{}.step", i)), Strategy::Exact);
        }
        let worker = Uuid::new_v4();

        // 0 = converts first try, 1 = fails exact only, 2 = fails both
        while let Some(task) = pool.claim_next_task(worker) {
            let index: usize = task
                .source
                .path()
                .to_string_lossy()
                .trim_start_matches("f-")
                .trim_end_matches(".step")
                .parse()
                .unwrap();
            let fails = match flaky[index] {
                0 => false,
                1 => task.strategy == Strategy::Exact,
                _ => true,
            };
            let outcome = if fails { TaskState::Failed } else { TaskState::Converted };
            pool.set_task_state(task.index, outcome);
        }

        prop_assert!(pool.is_over());
        let retries = flaky.iter().filter(|&&f| f > 0).count();
        let hard_failures = flaky.iter().filter(|&&f| f == 2).count();
        let counts = pool.state_counts();
        prop_assert_eq!(pool.len(), flaky.len() + retries);
        prop_assert_eq!(counts.retired, retries);
        prop_assert_eq!(counts.failed, hard_failures);
        prop_assert_eq!(counts.converted, flaky.len() - hard_failures);
    }

    /// Claims come back in insertion order regardless of interleaved
    /// completions
    #[test]
    fn prop_claims_follow_insertion_order(count in 1usize..40) {
        let pool = TaskPool::new();
        for i in 0..count {
            pool.add_task(SourceFile::part(format!("f-{}.step", i)), Strategy::Exact);
        }

        let mut order = vec![];
        while let Some(task) = pool.get_next_task() {
            order.push(task.index);
            pool.set_task_state(task.index, TaskState::Converted);
        }

        prop_assert_eq!(order, (0..count).collect::<Vec<_>>());
    }
}
