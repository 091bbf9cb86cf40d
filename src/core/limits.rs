/*!
 * Dispatcher Limits and Constants
 *
 * Centralized location for run-wide limits, thresholds, and magic numbers.
 * All values include rationale comments explaining why they exist.
 */

use std::time::Duration;

// =============================================================================
// MEMORY ADMISSION
// =============================================================================

/// Ratio between a task's on-disk output size and the peak in-memory
/// footprint the downstream consumer needs to load it.
/// Empirical: tessellated caches inflate roughly 11x once instanced,
/// de-indexed, and uploaded by the viewer.
pub const MEMORY_INFLATION_RATIO: u64 = 11;

// =============================================================================
// WORKER POOL
// =============================================================================

/// Physical RAM budgeted per worker process (4GB)
/// Tessellating a large model holds the full B-rep plus the growing mesh;
/// packing more workers than RAM allows trades throughput for swapping.
pub const RECOMMENDED_RAM_PER_WORKER: u64 = 4 * 1024 * 1024 * 1024;

/// Control-loop sleep between health/admission polls (100ms)
/// Short enough to notice crashes promptly, long enough to stay invisible
/// next to per-file conversion times measured in seconds.
pub const WORKER_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Cumulative worker restart ceiling per run
/// A worker crashing repeatedly is almost always choking on the same file;
/// respawning past this point only burns process-spawn latency.
pub const MAX_WORKER_RESTARTS: u32 = 3;

// =============================================================================
// CACHE LAYOUT
// =============================================================================

/// File name of the conversion manifest written into the cache directory
pub const MANIFEST_FILE_NAME: &str = "manifest.json";
