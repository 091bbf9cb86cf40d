/*!
 * Dispatcher
 * Single-use facade tying the pool, gate, workers, and local drain together
 *
 * One dispatcher runs one batch: queue tasks, call `run`, read the report
 * and artifacts. The worker phase is best-effort; whatever it leaves behind
 * the local drain finishes on the calling thread.
 */

use super::types::{DispatchError, DispatchResult, Phase, RunReport};
use crate::convert::Converter;
use crate::core::limits::MANIFEST_FILE_NAME;
use crate::core::types::{ResultMap, SourceFile};
use crate::local::LocalExecutor;
use crate::memory::{MemoryGate, MemoryProbe, PressureCallback, SystemMemoryProbe};
use crate::pool::{StateCounts, Strategy, Task, TaskPool};
use crate::worker::{compute_worker_count, WorkerEnv, WorkerFactory, WorkerPool};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Builder for Dispatcher
pub struct DispatcherBuilder {
    cache_dir: PathBuf,
    converter: Arc<dyn Converter>,
    factory: Option<Arc<dyn WorkerFactory>>,
    probe: Option<Box<dyn MemoryProbe>>,
    pressure_callback: Option<PressureCallback>,
    default_strategy: Strategy,
    worker_count_override: Option<usize>,
    memory_guard: bool,
}

impl DispatcherBuilder {
    fn new(cache_dir: PathBuf, converter: Arc<dyn Converter>) -> Self {
        Self {
            cache_dir,
            converter,
            factory: None,
            probe: None,
            pressure_callback: None,
            default_strategy: Strategy::default(),
            worker_count_override: None,
            memory_guard: true,
        }
    }

    /// Enable the multiprocess phase with this worker backend
    pub fn with_worker_factory(mut self, factory: Arc<dyn WorkerFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Replace the system memory probe (tests, embedded hosts)
    pub fn with_memory_probe(mut self, probe: Box<dyn MemoryProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Hook invoked under memory pressure instead of warn-and-continue
    pub fn with_pressure_callback(mut self, callback: PressureCallback) -> Self {
        self.pressure_callback = Some(callback);
        self
    }

    /// Strategy for tasks queued without an explicit one
    pub fn with_default_strategy(mut self, strategy: Strategy) -> Self {
        self.default_strategy = strategy;
        self
    }

    /// Replace the worker-count heuristic (still capped at core count)
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count_override = Some(count);
        self
    }

    /// Disable memory admission entirely
    pub fn without_memory_guard(mut self) -> Self {
        self.memory_guard = false;
        self
    }

    /// Create the cache directory and assemble the dispatcher
    pub fn build(self) -> DispatchResult<Dispatcher> {
        std::fs::create_dir_all(&self.cache_dir).map_err(|source| DispatchError::CacheDir {
            path: self.cache_dir.clone(),
            source,
        })?;

        let probe = self
            .probe
            .unwrap_or_else(|| Box::new(SystemMemoryProbe::new()));
        // Physical RAM is stable for the run; sample it once for the
        // worker-count heuristic before the probe moves into the gate.
        let total_ram = probe.total_bytes();

        let mut gate = MemoryGate::new(probe);
        if let Some(callback) = self.pressure_callback {
            gate = gate.with_callback(callback);
        }
        if !self.memory_guard {
            gate = gate.disabled();
        }

        info!(
            "dispatcher ready (cache at {})",
            self.cache_dir.display()
        );

        Ok(Dispatcher {
            pool: Arc::new(TaskPool::new()),
            gate: Arc::new(gate),
            results: Arc::new(ResultMap::default()),
            converter: self.converter,
            factory: self.factory,
            cache_dir: self.cache_dir,
            default_strategy: self.default_strategy,
            worker_count_override: self.worker_count_override,
            total_ram,
            phase: Mutex::new(Phase::Idle),
        })
    }
}

/// What `write_manifest` serializes
#[derive(Serialize)]
struct Manifest {
    counts: StateCounts,
    tasks: Vec<Task>,
    artifacts: BTreeMap<PathBuf, Vec<PathBuf>>,
}

/// Batch conversion dispatcher. Single-use: `run` consumes the one batch
/// this dispatcher was loaded with.
pub struct Dispatcher {
    pool: Arc<TaskPool>,
    gate: Arc<MemoryGate>,
    results: Arc<ResultMap>,
    converter: Arc<dyn Converter>,
    factory: Option<Arc<dyn WorkerFactory>>,
    cache_dir: PathBuf,
    default_strategy: Strategy,
    worker_count_override: Option<usize>,
    /// Sampled once at build time
    total_ram: Option<u64>,
    phase: Mutex<Phase>,
}

impl Dispatcher {
    /// Create a builder for constructing a Dispatcher
    pub fn builder(cache_dir: impl Into<PathBuf>, converter: Arc<dyn Converter>) -> DispatcherBuilder {
        DispatcherBuilder::new(cache_dir.into(), converter)
    }

    /// Queue a source with the default strategy
    pub fn add_task(&self, source: SourceFile) {
        self.pool.add_task(source, self.default_strategy);
    }

    /// Queue a source with an explicit strategy
    pub fn add_task_with_strategy(&self, source: SourceFile, strategy: Strategy) {
        self.pool.add_task(source, strategy);
    }

    /// Convert the batch.
    ///
    /// The multiprocess phase runs iff `use_multiprocessing` is set, a
    /// worker factory is configured, and it reports itself available;
    /// otherwise the run goes straight to the local drain. Whatever the
    /// worker phase does not consume, the local drain picks up.
    pub fn run(&self, use_multiprocessing: bool) -> DispatchResult<RunReport> {
        let factory = if use_multiprocessing {
            self.factory.as_ref().filter(|f| f.available()).cloned()
        } else {
            None
        };
        if use_multiprocessing && factory.is_none() {
            warn!("multiprocessing requested but no worker backend is available");
        }

        {
            let mut phase = self.phase.lock();
            if *phase != Phase::Idle {
                return Err(DispatchError::AlreadyDispatched);
            }
            *phase = if factory.is_some() {
                Phase::Multiprocess
            } else {
                Phase::Local
            };
        }

        let mut used_multiprocessing = false;
        let mut consumed = false;

        if let Some(factory) = factory {
            let any_can_reference = self
                .pool
                .snapshot()
                .iter()
                .any(|t| t.source.can_reference_other_files());
            let count = compute_worker_count(
                self.pool.len(),
                any_can_reference,
                self.worker_count_override,
                self.total_ram,
            );
            info!(
                "dispatching {} task(s) across {} worker(s)",
                self.pool.len(),
                count
            );

            let mut workers = WorkerPool::new(factory, self.worker_env(), count);
            used_multiprocessing = true;
            consumed = workers.run();
        }

        if !consumed {
            *self.phase.lock() = Phase::Local;
            let executor = LocalExecutor::new(
                Arc::clone(&self.converter),
                self.cache_dir.clone(),
                self.default_strategy,
            );
            executor.drain(&self.pool, &self.gate, &self.results);
        }

        *self.phase.lock() = Phase::Done;
        let report = self.build_report(used_multiprocessing);
        info!(
            "run finished: {} of {} converted ({} failed, {} missing, {} retried, {} unprocessed)",
            report.converted,
            report.total,
            report.failed,
            report.missing,
            report.retried,
            report.unprocessed
        );
        Ok(report)
    }

    /// True once every queued task is accounted for
    pub fn is_over(&self) -> bool {
        self.pool.is_over()
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    /// Artifacts produced for one source, if it converted
    pub fn artifacts_for(&self, source: &SourceFile) -> Option<Vec<PathBuf>> {
        self.note_early_query("artifacts_for");
        self.results
            .get(source.path())
            .map(|entry| entry.value().clone())
    }

    /// The full source-to-artifacts map
    pub fn results(&self) -> Arc<ResultMap> {
        self.note_early_query("results");
        Arc::clone(&self.results)
    }

    /// Write the conversion manifest into the cache directory and return
    /// its path
    pub fn write_manifest(&self) -> DispatchResult<PathBuf> {
        self.note_early_query("write_manifest");

        let manifest = Manifest {
            counts: self.pool.state_counts(),
            tasks: self.pool.snapshot(),
            artifacts: self
                .results
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
        };

        let path = self.cache_dir.join(MANIFEST_FILE_NAME);
        let json = serde_json::to_string_pretty(&manifest)
            .map_err(|e| DispatchError::Manifest(e.to_string()))?;
        std::fs::write(&path, json).map_err(|e| DispatchError::Manifest(e.to_string()))?;

        info!("manifest written to {}", path.display());
        Ok(path)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn worker_env(&self) -> WorkerEnv {
        WorkerEnv {
            pool: Arc::clone(&self.pool),
            gate: Arc::clone(&self.gate),
            results: Arc::clone(&self.results),
            cache_dir: self.cache_dir.clone(),
            default_strategy: self.default_strategy,
        }
    }

    fn build_report(&self, used_multiprocessing: bool) -> RunReport {
        let counts = self.pool.state_counts();
        RunReport {
            total: self.pool.len(),
            converted: counts.converted,
            failed: counts.failed,
            missing: counts.missing,
            retried: counts.retired,
            unprocessed: counts.pending + counts.running,
            used_multiprocessing,
            cancelled_by_memory_guard: self.gate.was_cancelled(),
        }
    }

    /// Reading results mid-run is a caller bug, not an error
    fn note_early_query(&self, what: &str) {
        let phase = *self.phase.lock();
        if phase != Phase::Done {
            debug!("{} queried in phase {:?}; results may be partial", what, phase);
        }
    }
}
