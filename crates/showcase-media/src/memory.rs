//! Process memory sampling for the renderer's soft ceiling.

use std::sync::Mutex;
use sysinfo::{Pid, System};

const MB: u64 = 1024 * 1024;

/// Reads this process's resident memory.
pub trait MemoryProbe: Send + Sync {
    /// Resident set size in bytes, `None` if it cannot be read.
    fn resident_bytes(&self) -> Option<u64>;
}

/// [`MemoryProbe`] backed by `sysinfo`.
pub struct SystemMemoryProbe {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl SystemMemoryProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            pid: sysinfo::get_current_pid().ok(),
        }
    }
}

impl Default for SystemMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SystemMemoryProbe {
    fn resident_bytes(&self) -> Option<u64> {
        let pid = self.pid?;
        let mut system = self.system.lock().ok()?;
        if !system.refresh_process(pid) {
            return None;
        }
        system.process(pid).map(|p| p.memory())
    }
}

/// Soft memory ceiling checked before each image is processed.
pub struct MemoryGuard<'a> {
    probe: &'a dyn MemoryProbe,
    limit_bytes: u64,
}

impl<'a> MemoryGuard<'a> {
    pub fn new(probe: &'a dyn MemoryProbe, limit_mb: u64) -> Self {
        Self {
            probe,
            limit_bytes: limit_mb.saturating_mul(MB),
        }
    }

    /// `Err((used_mb, limit_mb))` when resident memory exceeds the ceiling.
    ///
    /// An unreadable sample passes.
    pub fn check(&self) -> Result<(), (u64, u64)> {
        match self.probe.resident_bytes() {
            Some(used) if used > self.limit_bytes => Err((used / MB, self.limit_bytes / MB)),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Fixed-value probe for tests.
    pub(crate) struct FixedProbe(pub Option<u64>);

    impl MemoryProbe for FixedProbe {
        fn resident_bytes(&self) -> Option<u64> {
            self.0
        }
    }

    #[test]
    fn test_guard_thresholds() {
        let under = FixedProbe(Some(100 * MB));
        assert!(MemoryGuard::new(&under, 200).check().is_ok());

        let over = FixedProbe(Some(300 * MB));
        assert_eq!(MemoryGuard::new(&over, 200).check(), Err((300, 200)));

        let unknown = FixedProbe(None);
        assert!(MemoryGuard::new(&unknown, 1).check().is_ok());
    }

    #[test]
    fn test_system_probe_reads_self() {
        let probe = SystemMemoryProbe::new();
        let bytes = probe.resident_bytes();
        assert!(bytes.map(|b| b > 0).unwrap_or(true));
    }
}
