//! Live process memory measurement
//!
//! The batch queue admits lines based on the resident footprint of the whole
//! process, not on its own byte count. [`MemoryProbe`] is the seam; the
//! process implementation reads Linux procfs and falls back to `sysinfo` on
//! other platforms.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use sysinfo::{Pid, System};

/// Source of the current resident memory footprint
pub trait MemoryProbe: Send + Sync {
    /// Resident bytes, or `None` when the measurement is unavailable
    fn resident_bytes(&self) -> Option<u64>;
}

/// Resident set size of the running process.
pub struct ProcessMemory {
    pid: Option<Pid>,
    system: Mutex<System>,
}

impl fmt::Debug for ProcessMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessMemory").field("pid", &self.pid).finish()
    }
}

impl Default for ProcessMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessMemory {
    /// Create a probe for the current process
    pub fn new() -> Self {
        Self {
            pid: sysinfo::get_current_pid().ok(),
            system: Mutex::new(System::new()),
        }
    }

    /// Resident bytes as reported by `sysinfo`
    pub fn sampled_bytes(&self) -> Option<u64> {
        let pid = self.pid?;
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        if !system.refresh_process(pid) {
            return None;
        }
        system.process(pid).map(|process| process.memory())
    }

    #[cfg(target_os = "linux")]
    fn procfs_bytes() -> Option<u64> {
        std::fs::read_to_string("/proc/self/status")
            .ok()
            .and_then(|content| parse_vm_rss(&content))
    }

    #[cfg(not(target_os = "linux"))]
    fn procfs_bytes() -> Option<u64> {
        None
    }
}

impl MemoryProbe for ProcessMemory {
    fn resident_bytes(&self) -> Option<u64> {
        Self::procfs_bytes().or_else(|| self.sampled_bytes())
    }
}

/// Extract `VmRSS` (reported in kB) from a `/proc/<pid>/status` dump
pub fn parse_vm_rss(status: &str) -> Option<u64> {
    status
        .lines()
        .find(|line| line.starts_with("VmRSS:"))
        .and_then(|line| {
            line.split_whitespace()
                .nth(1)
                .and_then(|kb| kb.parse::<u64>().ok())
                .map(|kb| kb * 1024)
        })
}

/// Settable footprint, for simulating memory pressure.
#[derive(Debug, Default)]
pub struct SimulatedMemory {
    bytes: AtomicU64,
}

impl SimulatedMemory {
    /// Start at `bytes`
    pub fn new(bytes: u64) -> Self {
        Self {
            bytes: AtomicU64::new(bytes),
        }
    }

    /// Change the reported footprint
    pub fn set(&self, bytes: u64) {
        self.bytes.store(bytes, Ordering::SeqCst);
    }
}

impl MemoryProbe for SimulatedMemory {
    fn resident_bytes(&self) -> Option<u64> {
        Some(self.bytes.load(Ordering::SeqCst))
    }
}
