/*!
 * Memory Probes
 * System memory sampling behind a trait so hosts and tests can substitute
 * their own source
 */

use log::debug;

/// Source of system memory readings.
///
/// `None` means the reading is not available on this platform or failed;
/// callers must degrade gracefully rather than treat it as zero.
pub trait MemoryProbe: Send + Sync {
    /// Bytes of memory the system could hand out without swapping
    fn available_bytes(&self) -> Option<u64>;

    /// Total physical memory in bytes
    fn total_bytes(&self) -> Option<u64>;
}

/// Probe backed by `/proc/meminfo`. Returns `None` on non-Linux platforms.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemMemoryProbe;

impl SystemMemoryProbe {
    pub fn new() -> Self {
        Self
    }

    #[cfg(target_os = "linux")]
    fn read_meminfo(key: &str) -> Option<u64> {
        let content = match std::fs::read_to_string("/proc/meminfo") {
            Ok(content) => content,
            Err(e) => {
                debug!("failed to read /proc/meminfo: {}", e);
                return None;
            }
        };
        parse_meminfo(&content, key)
    }
}

impl MemoryProbe for SystemMemoryProbe {
    fn available_bytes(&self) -> Option<u64> {
        #[cfg(target_os = "linux")]
        {
            // MemAvailable accounts for reclaimable caches; older kernels
            // only expose MemFree.
            Self::read_meminfo("MemAvailable").or_else(|| Self::read_meminfo("MemFree"))
        }
        #[cfg(not(target_os = "linux"))]
        {
            debug!("no system memory probe on this platform");
            None
        }
    }

    fn total_bytes(&self) -> Option<u64> {
        #[cfg(target_os = "linux")]
        {
            Self::read_meminfo("MemTotal")
        }
        #[cfg(not(target_os = "linux"))]
        {
            None
        }
    }
}

/// Parse one `key:   <value> kB` line out of meminfo-formatted text
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_meminfo(content: &str, key: &str) -> Option<u64> {
    for line in content.lines() {
        let Some(rest) = line.strip_prefix(key) else {
            continue;
        };
        let Some(rest) = rest.strip_prefix(':') else {
            continue;
        };
        let kib: u64 = rest.trim().trim_end_matches("kB").trim().parse().ok()?;
        return Some(kib * 1024);
    }
    None
}
