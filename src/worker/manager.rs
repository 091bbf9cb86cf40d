/*!
 * Worker Pool Manager
 * Spawns workers, polls their health, restarts crashes within a budget
 *
 * The manager never converts anything itself. It keeps the right number of
 * workers alive until the pool drains, the memory gate cancels the run, or
 * every worker is gone.
 */

use super::types::{Worker, WorkerContext, WorkerEnv, WorkerFactory};
use crate::core::limits::{MAX_WORKER_RESTARTS, RECOMMENDED_RAM_PER_WORKER, WORKER_POLL_INTERVAL};
use crate::core::types::WorkerId;
use crate::memory::PressureDecision;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::sync::Once;
use std::thread;

static RESTART_BUDGET_NOTICE: Once = Once::new();

/// Pick how many workers to run.
///
/// A single task that cannot reference other files gets exactly one worker:
/// nothing can ever be discovered to parallelize over. Otherwise the count
/// is bounded by cores and by how many workers fit in physical RAM at
/// `RECOMMENDED_RAM_PER_WORKER` each. An operator override replaces the
/// heuristic but is still capped at the core count.
pub fn compute_worker_count(
    total_tasks: usize,
    any_can_reference: bool,
    override_count: Option<usize>,
    total_ram: Option<u64>,
) -> usize {
    let cores = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    worker_count_for(total_tasks, any_can_reference, override_count, total_ram, cores)
}

fn worker_count_for(
    total_tasks: usize,
    any_can_reference: bool,
    override_count: Option<usize>,
    total_ram: Option<u64>,
    cores: usize,
) -> usize {
    if total_tasks == 1 && !any_can_reference {
        return 1;
    }

    let count = match override_count {
        Some(n) => n.min(cores),
        None => match total_ram {
            Some(bytes) => {
                let by_ram =
                    (bytes as f64 / RECOMMENDED_RAM_PER_WORKER as f64).round() as usize;
                cores.min(by_ram)
            }
            None => cores,
        },
    };

    count.max(1)
}

struct WorkerSlot {
    slot: usize,
    id: WorkerId,
    worker: Box<dyn Worker>,
}

/// Runs the multiprocess phase: a fixed set of worker slots polled on a
/// fixed interval.
pub struct WorkerPool {
    factory: Arc<dyn WorkerFactory>,
    env: WorkerEnv,
    count: usize,
    slots: Vec<WorkerSlot>,
    /// Cumulative over the pool's lifetime, not per slot
    restarts: u32,
}

impl WorkerPool {
    pub fn new(factory: Arc<dyn WorkerFactory>, env: WorkerEnv, count: usize) -> Self {
        Self {
            factory,
            env,
            count,
            slots: Vec::with_capacity(count),
            restarts: 0,
        }
    }

    /// Drive the worker phase to its end.
    ///
    /// Returns `true` when every queued task was consumed, `false` when the
    /// phase ended early: memory cancel, all workers gone with tasks left,
    /// or nothing could be spawned. A `false` with tasks remaining is the
    /// local executor's cue, not an error.
    pub fn run(&mut self) -> bool {
        self.spawn_all();

        loop {
            if self.env.gate.can_continue() == PressureDecision::Cancel {
                let failed = self.env.pool.fail_remaining();
                warn!(
                    "memory gate cancelled the run; {} task(s) marked failed",
                    failed
                );
                self.stop();
                return false;
            }

            self.restart_pass();

            if self.slots.is_empty() {
                let over = self.env.pool.is_over();
                info!(
                    "no live workers left; multiprocessing exhausted ({} task(s) of {} done)",
                    self.env.pool.completed(),
                    self.env.pool.len()
                );
                return over;
            }

            if self.env.pool.is_over() {
                info!("all {} task(s) consumed; stopping workers", self.env.pool.len());
                self.stop();
                return true;
            }

            thread::sleep(WORKER_POLL_INTERVAL);
        }
    }

    /// Terminate every live worker and release its slot. Idempotent.
    pub fn stop(&mut self) {
        if self.slots.is_empty() {
            return;
        }
        for slot in self.slots.iter_mut() {
            slot.worker.stop();
        }
        info!("stopped {} worker(s)", self.slots.len());
        self.slots.clear();
    }

    /// Live worker count, for reporting
    pub fn live_workers(&self) -> usize {
        self.slots.len()
    }

    fn spawn_all(&mut self) {
        for slot in 0..self.count {
            let id = WorkerId::new_v4();
            match self.factory.spawn(WorkerContext {
                id,
                slot,
                env: self.env.clone(),
            }) {
                Ok(worker) => self.slots.push(WorkerSlot { slot, id, worker }),
                Err(e) => error!("failed to spawn worker for slot {}: {}", slot, e),
            }
        }
        info!(
            "worker pool started with {} of {} worker(s)",
            self.slots.len(),
            self.count
        );
    }

    /// Sweep dead workers: requeue their in-flight tasks, then respawn
    /// while the cumulative restart budget lasts.
    fn restart_pass(&mut self) {
        let slots = std::mem::take(&mut self.slots);
        let mut retained = Vec::with_capacity(slots.len());

        for mut slot in slots {
            if slot.worker.is_alive() {
                retained.push(slot);
                continue;
            }

            // Dead claims go back to Pending so another worker picks them up
            self.env.pool.release_claims(slot.id);

            let restartable = slot.worker.is_restartable();
            slot.worker.stop();

            if !restartable {
                debug!("worker {} on slot {} finished; slot released", slot.id, slot.slot);
                continue;
            }

            if self.restarts >= MAX_WORKER_RESTARTS {
                RESTART_BUDGET_NOTICE.call_once(|| {
                    warn!(
                        "worker restart budget of {} exhausted; crashed slots stay down",
                        MAX_WORKER_RESTARTS
                    );
                });
                continue;
            }

            self.restarts += 1;
            let id = WorkerId::new_v4();
            info!(
                "restarting worker slot {} as {} ({} of {} restarts used)",
                slot.slot, id, self.restarts, MAX_WORKER_RESTARTS
            );
            match self.factory.spawn(WorkerContext {
                id,
                slot: slot.slot,
                env: self.env.clone(),
            }) {
                Ok(worker) => retained.push(WorkerSlot {
                    slot: slot.slot,
                    id,
                    worker,
                }),
                Err(e) => error!("respawn of worker slot {} failed: {}", slot.slot, e),
            }
        }

        self.slots = retained;
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}
