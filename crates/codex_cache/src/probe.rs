//! Memory usage probes consulted by eviction.

use std::sync::{Mutex, PoisonError};

use sysinfo::{Pid, ProcessesToUpdate, System};

/// Reports resident memory so eviction can decide whether to run.
///
/// `session_bytes` is the data footprint of the store doing the asking.
/// Probes that measure the whole process ignore it.
pub trait MemoryProbe: Send + Sync {
    /// Current resident usage in bytes.
    fn resident_bytes(&self, session_bytes: u64) -> u64;
}

/// Resident set size of the current process, read through `sysinfo`.
pub struct ProcessMemoryProbe {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl ProcessMemoryProbe {
    /// Creates a probe for the current process.
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid().ok();
        if pid.is_none() {
            tracing::warn!("current process id unavailable; memory probe will report zero");
        }
        Self {
            system: Mutex::new(System::new()),
            pid,
        }
    }
}

impl Default for ProcessMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for ProcessMemoryProbe {
    fn resident_bytes(&self, _session_bytes: u64) -> u64 {
        let Some(pid) = self.pid else {
            return 0;
        };
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        system.process(pid).map_or(0, |p| p.memory())
    }
}

/// Reports the store's own data footprint as its usage.
///
/// Deterministic, and independent of allocator behaviour: every eviction
/// shrinks the reading by exactly the evicted entry's size.
#[derive(Debug, Default, Clone, Copy)]
pub struct FootprintProbe;

impl MemoryProbe for FootprintProbe {
    fn resident_bytes(&self, session_bytes: u64) -> u64 {
        session_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn footprint_reports_session_bytes() {
        assert_eq!(FootprintProbe.resident_bytes(4096), 4096);
    }

    #[test]
    fn process_probe_sees_this_process() {
        let probe = ProcessMemoryProbe::new();
        assert!(probe.resident_bytes(0) > 0);
    }
}
