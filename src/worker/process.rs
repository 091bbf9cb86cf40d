/*!
 * Process Workers
 * Out-of-process conversion workers spawned from a configured executable
 *
 * The executable claims tasks and reports results over whatever channel the
 * host wires up; this module only owns the OS-process lifecycle.
 */

use super::types::{Worker, WorkerContext, WorkerError, WorkerFactory, WorkerResult};
use crate::core::types::WorkerId;
use log::{error, info, warn};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};

/// How a worker executable is launched
#[derive(Debug, Clone)]
pub struct ProcessWorkerConfig {
    /// Path to the worker executable
    pub command: PathBuf,
    /// Extra arguments appended after the standard ones
    pub args: Vec<String>,
    /// Environment handed to the worker (the inherited one is cleared)
    pub env_vars: Vec<(String, String)>,
}

impl ProcessWorkerConfig {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args: vec![],
            env_vars: vec![],
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_env(mut self, env_vars: Vec<(String, String)>) -> Self {
        self.env_vars = env_vars;
        self
    }
}

/// Spawns one OS process per worker slot
pub struct ProcessWorkerFactory {
    config: ProcessWorkerConfig,
}

impl ProcessWorkerFactory {
    pub fn new(config: ProcessWorkerConfig) -> Self {
        Self { config }
    }

    /// Validate the command for security
    fn validate_command(&self) -> WorkerResult<()> {
        let command = self.config.command.to_string_lossy();

        if command.trim().is_empty() {
            return Err(WorkerError::InvalidCommand("Empty command".to_string()));
        }

        // Shell injection prevention
        let dangerous_chars = [';', '|', '&', '\n', '\r', '\0', '`', '$', '(', ')'];
        if dangerous_chars.iter().any(|&c| command.contains(c)) {
            return Err(WorkerError::PermissionDenied(
                "Command contains dangerous characters".to_string(),
            ));
        }

        // Command traversal prevention
        if command.contains("..") {
            return Err(WorkerError::PermissionDenied(
                "Command contains path traversal".to_string(),
            ));
        }

        Ok(())
    }
}

impl WorkerFactory for ProcessWorkerFactory {
    fn available(&self) -> bool {
        self.config.command.is_file()
    }

    fn spawn(&self, ctx: WorkerContext) -> WorkerResult<Box<dyn Worker>> {
        self.validate_command()?;

        let mut cmd = Command::new(&self.config.command);
        cmd.arg("--cache-dir")
            .arg(&ctx.env.cache_dir)
            .arg("--worker-id")
            .arg(ctx.id.to_string());

        if !self.config.args.is_empty() {
            cmd.args(&self.config.args);
        }

        // Start from a clean environment for security
        cmd.env_clear();
        for (key, value) in &self.config.env_vars {
            cmd.env(key, value);
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let child = cmd.spawn().map_err(|e| {
            WorkerError::SpawnFailed(format!("{}: {}", self.config.command.display(), e))
        })?;

        info!(
            "Spawned worker process {} for slot {} (OS PID: {})",
            ctx.id,
            ctx.slot,
            child.id()
        );

        Ok(Box::new(ProcessWorker {
            id: ctx.id,
            child,
            liveness: Liveness::Running,
        }))
    }
}

/// Last observed state of the child process
#[derive(Debug, Clone, Copy)]
enum Liveness {
    Running,
    Exited(ExitStatus),
    /// Probe or kill failed; the handle can no longer be trusted
    Lost,
}

/// One spawned worker process
pub struct ProcessWorker {
    id: WorkerId,
    child: Child,
    liveness: Liveness,
}

impl Worker for ProcessWorker {
    fn is_alive(&mut self) -> bool {
        if !matches!(self.liveness, Liveness::Running) {
            return false;
        }

        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                if status.success() {
                    info!("Worker process {} exited cleanly", self.id);
                } else {
                    warn!("Worker process {} exited with {}", self.id, status);
                }
                self.liveness = Liveness::Exited(status);
                false
            }
            Err(e) => {
                warn!("Error checking worker process {}: {}", self.id, e);
                self.liveness = Liveness::Lost;
                false
            }
        }
    }

    fn is_restartable(&self) -> bool {
        match self.liveness {
            Liveness::Running => false,
            Liveness::Exited(status) => !status.success(),
            Liveness::Lost => true,
        }
    }

    fn stop(&mut self) {
        if !matches!(self.liveness, Liveness::Running) {
            return;
        }

        match self.child.kill() {
            Ok(()) => {
                info!(
                    "Killed worker process {} (OS PID: {})",
                    self.id,
                    self.child.id()
                );
                // Reap so the process does not linger as a zombie
                self.liveness = match self.child.wait() {
                    Ok(status) => Liveness::Exited(status),
                    Err(_) => Liveness::Lost,
                };
            }
            Err(e) => {
                error!("Failed to kill worker process {}: {}", self.id, e);
                self.liveness = Liveness::Lost;
            }
        }
    }
}

impl Drop for ProcessWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
