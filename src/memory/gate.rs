/*!
 * Memory Admission Gate
 * Soft gate that projects downstream memory use from converted output size
 *
 * The gate never kills anything mid-task. It is consulted between tasks;
 * a `Cancel` tells the caller to stop claiming new work and drain out.
 */

use super::probe::MemoryProbe;
use crate::core::limits::MEMORY_INFLATION_RATIO;
use crate::core::types::TaskIndex;
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Outcome of an admission check or pressure callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressureDecision {
    Continue,
    Cancel,
}

/// What the pressure callback sees when projected use exceeds what the
/// system has left
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PressureEvent {
    /// Bytes the system reports as available right now
    pub available: u64,
    /// Bytes the run is projected to need when the outputs are consumed
    pub estimated: u64,
    /// A previous check already raised pressure this run
    pub already_warned: bool,
}

/// Host hook invoked under memory pressure. Returning `Continue` keeps the
/// run going and keeps future checks enabled; a host that wants
/// warn-once-then-silence returns `Continue` whenever `already_warned` is
/// set. Returning `Cancel` latches the gate shut for the rest of the run.
pub type PressureCallback = Box<dyn Fn(PressureEvent) -> PressureDecision + Send + Sync>;

fn warn_and_continue(event: PressureEvent) -> PressureDecision {
    if !event.already_warned {
        warn!(
            "projected memory use {} bytes exceeds {} bytes available; continuing",
            event.estimated, event.available
        );
    }
    PressureDecision::Continue
}

/// Tracks cumulative converted-output size and gates new work on the
/// projection `output_bytes * MEMORY_INFLATION_RATIO` staying within the
/// memory the system has left.
pub struct MemoryGate {
    probe: Box<dyn MemoryProbe>,
    /// Projected downstream bytes, already inflated. Monotonic.
    estimated: AtomicU64,
    warned: AtomicBool,
    cancelled: AtomicBool,
    enabled: bool,
    callback: PressureCallback,
}

impl MemoryGate {
    /// Gate with admission checks enabled and the headless
    /// warn-and-continue callback
    pub fn new(probe: Box<dyn MemoryProbe>) -> Self {
        Self {
            probe,
            estimated: AtomicU64::new(0),
            warned: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            enabled: true,
            callback: Box::new(warn_and_continue),
        }
    }

    /// Replace the pressure callback (interactive hosts prompt the user)
    pub fn with_callback(mut self, callback: PressureCallback) -> Self {
        self.callback = callback;
        self
    }

    /// Disable admission checks; `can_continue` always passes
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Record the on-disk size of a finished conversion. Called once per
    /// converted task.
    pub fn record_output(&self, task: TaskIndex, bytes: u64) {
        let inflated = bytes.saturating_mul(MEMORY_INFLATION_RATIO);
        let total = self.estimated.fetch_add(inflated, Ordering::AcqRel) + inflated;
        debug!(
            "task {} produced {} bytes; projected use now {} bytes",
            task, bytes, total
        );
    }

    /// Admission check, consulted between tasks.
    ///
    /// `Cancel` is sticky: once the gate latches shut, every later check
    /// reports `Cancel` without consulting the probe or callback again.
    pub fn can_continue(&self) -> PressureDecision {
        if self.cancelled.load(Ordering::Acquire) {
            return PressureDecision::Cancel;
        }
        if !self.enabled {
            return PressureDecision::Continue;
        }

        let estimated = self.estimated.load(Ordering::Acquire);
        let Some(available) = self.probe.available_bytes() else {
            debug!("memory probe gave no reading; admission check skipped");
            return PressureDecision::Continue;
        };

        if available >= estimated {
            return PressureDecision::Continue;
        }

        let already_warned = self.warned.swap(true, Ordering::AcqRel);
        let decision = (self.callback)(PressureEvent {
            available,
            estimated,
            already_warned,
        });

        if decision == PressureDecision::Cancel {
            self.cancelled.store(true, Ordering::Release);
            warn!(
                "run cancelled under memory pressure ({} bytes projected, {} available)",
                estimated, available
            );
        }
        decision
    }

    /// Projected downstream memory use in bytes (inflated)
    pub fn estimated_bytes(&self) -> u64 {
        self.estimated.load(Ordering::Acquire)
    }

    /// True once a pressure callback returned `Cancel`
    pub fn was_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for MemoryGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryGate")
            .field("estimated", &self.estimated.load(Ordering::Relaxed))
            .field("warned", &self.warned.load(Ordering::Relaxed))
            .field("cancelled", &self.cancelled.load(Ordering::Relaxed))
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}
