/*!
 * Shared test fixtures
 * Thread-backed workers standing in for the out-of-process executable
 */

// Not every test binary uses every fixture
#![allow(dead_code)]

use mesh_dispatch::{
    Conversion, ConversionState, Converter, MemoryGate, MemoryProbe, SourceFile, Strategy, Task,
    TaskState, Worker, WorkerContext, WorkerEnv, WorkerError, WorkerFactory, WorkerResult,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::thread::{self, JoinHandle};
use std::time::Duration;

static LOG_INIT: Once = Once::new();

/// Route crate logs through the test harness; honors RUST_LOG
pub fn init_logging() {
    LOG_INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Probe with a fixed reading
pub struct StaticProbe(pub Option<u64>);

impl MemoryProbe for StaticProbe {
    fn available_bytes(&self) -> Option<u64> {
        self.0
    }
    fn total_bytes(&self) -> Option<u64> {
        self.0
    }
}

/// Gate that never raises pressure
pub fn unbounded_gate() -> MemoryGate {
    MemoryGate::new(Box::new(StaticProbe(Some(u64::MAX))))
}

/// Converter with per-(path, strategy) scripted outcomes; everything
/// unscripted fails
#[derive(Default)]
pub struct ScriptConverter {
    outcomes: HashMap<(PathBuf, Strategy), Conversion>,
}

impl ScriptConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn converts(self, path: &str, strategy: Strategy, bytes: u64) -> Self {
        self.converts_discovering(path, strategy, bytes, &[])
    }

    pub fn converts_discovering(
        mut self,
        path: &str,
        strategy: Strategy,
        bytes: u64,
        dependents: &[SourceFile],
    ) -> Self {
        let artifact = PathBuf::from(format!("{}.mesh", path));
        self.outcomes.insert(
            (PathBuf::from(path), strategy),
            Conversion {
                state: ConversionState::Converted,
                artifacts: vec![artifact],
                dependents: dependents.to_vec(),
                output_bytes: bytes,
            },
        );
        self
    }

    pub fn missing(mut self, path: &str) -> Self {
        for strategy in [Strategy::Exact, Strategy::Robust] {
            self.outcomes
                .insert((PathBuf::from(path), strategy), Conversion::missing());
        }
        self
    }
}

impl Converter for ScriptConverter {
    fn convert(&self, source: &SourceFile, strategy: Strategy, _cache_dir: &Path) -> Conversion {
        self.outcomes
            .get(&(source.path.clone(), strategy))
            .cloned()
            .unwrap_or_else(Conversion::failed)
    }
}

/// What a scripted worker does with a claimed task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
    /// The task was reported back to the pool
    Reported,
    /// Die right now, leaving the claim dangling
    Crash,
}

pub type TaskBehavior = dyn Fn(&Task, &WorkerEnv) -> TaskAction + Send + Sync;

/// Report a task converted with a small fixed artifact
pub fn convert_behavior() -> Arc<TaskBehavior> {
    Arc::new(|task, env| {
        let artifact = env.cache_dir.join(format!("{}.mesh", task.index));
        env.results.insert(task.source.path.clone(), vec![artifact]);
        env.pool.set_task_state(task.index, TaskState::Converted);
        env.gate.record_output(task.index, 64);
        TaskAction::Reported
    })
}

/// Crash on the first claim of `path`; convert everything else and later
/// claims of the same path
pub fn crash_once_on(path: &str) -> Arc<TaskBehavior> {
    let trap = PathBuf::from(path);
    let sprung = AtomicBool::new(false);
    let convert = convert_behavior();
    Arc::new(move |task, env| {
        if task.source.path == trap && !sprung.swap(true, Ordering::SeqCst) {
            return TaskAction::Crash;
        }
        convert(task, env)
    })
}

/// Crash on every claim
pub fn crash_always() -> Arc<TaskBehavior> {
    Arc::new(|_, _| TaskAction::Crash)
}

/// Convert with a fixed per-task delay, for tests that need work still in
/// flight when the control loop ticks
pub fn slow_convert_behavior(delay: Duration) -> Arc<TaskBehavior> {
    let convert = convert_behavior();
    Arc::new(move |task, env| {
        thread::sleep(delay);
        convert(task, env)
    })
}

/// In-process worker: a thread claiming from the shared pool exactly the
/// way the real executable would over its transport
pub struct ThreadWorker {
    alive: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    /// Set by the thread when it dies via `Crash`, the analogue of an
    /// abnormal exit status
    crashed: Arc<AtomicBool>,
    crash_is_restartable: bool,
    handle: Option<JoinHandle<()>>,
}

impl Worker for ThreadWorker {
    fn is_alive(&mut self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn is_restartable(&self) -> bool {
        self.crash_is_restartable && self.crashed.load(Ordering::Acquire)
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ThreadWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawns `ThreadWorker`s running a scripted behavior
pub struct ThreadWorkerFactory {
    behavior: Arc<TaskBehavior>,
    restartable: bool,
    spawned: AtomicUsize,
    spawn_limit: Option<usize>,
}

impl ThreadWorkerFactory {
    pub fn new(behavior: Arc<TaskBehavior>) -> Self {
        Self {
            behavior,
            restartable: true,
            spawned: AtomicUsize::new(0),
            spawn_limit: None,
        }
    }

    /// Workers report crashes as non-restartable (clean exits)
    pub fn not_restartable(mut self) -> Self {
        self.restartable = false;
        self
    }

    /// Fail every spawn after the first `limit`
    pub fn with_spawn_limit(mut self, limit: usize) -> Self {
        self.spawn_limit = Some(limit);
        self
    }

    /// Total spawn attempts so far, including failed ones
    pub fn spawn_count(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }
}

impl WorkerFactory for ThreadWorkerFactory {
    fn available(&self) -> bool {
        true
    }

    fn spawn(&self, ctx: WorkerContext) -> WorkerResult<Box<dyn Worker>> {
        let n = self.spawned.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.spawn_limit {
            if n >= limit {
                return Err(WorkerError::SpawnFailed("spawn limit reached".to_string()));
            }
        }

        let alive = Arc::new(AtomicBool::new(true));
        let stop = Arc::new(AtomicBool::new(false));
        let crashed = Arc::new(AtomicBool::new(false));
        let behavior = Arc::clone(&self.behavior);
        let thread_alive = Arc::clone(&alive);
        let thread_stop = Arc::clone(&stop);
        let thread_crashed = Arc::clone(&crashed);
        let env = ctx.env.clone();
        let id = ctx.id;

        let handle = thread::spawn(move || {
            loop {
                if thread_stop.load(Ordering::Acquire) {
                    break;
                }
                match env.pool.claim_next_task(id) {
                    Some(task) => {
                        if behavior(&task, &env) == TaskAction::Crash {
                            // No report, no cleanup: the claim dangles the
                            // way a killed process would leave it
                            thread_crashed.store(true, Ordering::Release);
                            thread_alive.store(false, Ordering::Release);
                            return;
                        }
                    }
                    None => {
                        if env.pool.is_over() {
                            break;
                        }
                        thread::sleep(Duration::from_millis(5));
                    }
                }
            }
            thread_alive.store(false, Ordering::Release);
        });

        Ok(Box::new(ThreadWorker {
            alive,
            stop,
            crashed,
            crash_is_restartable: self.restartable,
            handle: Some(handle),
        }))
    }
}
