//! Process and system memory sampling
//!
//! The batch sizer never reads global state itself. It receives a
//! [`MemorySnapshot`] from a [`MemoryProbe`], so tests can drive it with
//! synthetic pressure while the binary samples the live system via sysinfo.

use sysinfo::{Pid, System};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Memory readings taken at one instant, in megabytes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemorySnapshot {
    /// Resident set size of this process
    pub process_mb: f64,

    /// Memory the OS reports as available for new allocations
    pub available_mb: f64,
}

impl MemorySnapshot {
    /// Build a snapshot, clamping negative or NaN readings to zero
    pub fn new(process_mb: f64, available_mb: f64) -> Self {
        Self {
            process_mb: non_negative(process_mb),
            available_mb: non_negative(available_mb),
        }
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Source of memory readings
///
/// Implementations must sample at call time; nothing may be cached between
/// calls. One call per sizing decision is the expected rate.
pub trait MemoryProbe {
    fn sample(&mut self) -> MemorySnapshot;
}

/// Live probe backed by sysinfo
pub struct SystemMemory {
    system: System,
    pid: Pid,
}

impl SystemMemory {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            pid: Pid::from_u32(std::process::id()),
        }
    }

    /// Current resident memory of this process in MB
    pub fn current_process_memory_mb(&mut self) -> f64 {
        self.system.refresh_process(self.pid);
        self.system
            .process(self.pid)
            .map(|p| p.memory() as f64 / BYTES_PER_MB)
            .unwrap_or(0.0)
    }

    /// Memory available to new allocations system-wide, in MB
    pub fn available_system_memory_mb(&mut self) -> f64 {
        self.system.refresh_memory();
        self.system.available_memory() as f64 / BYTES_PER_MB
    }
}

impl Default for SystemMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SystemMemory {
    fn sample(&mut self) -> MemorySnapshot {
        let process_mb = self.current_process_memory_mb();
        let available_mb = self.available_system_memory_mb();
        MemorySnapshot::new(process_mb, available_mb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_clamps_invalid_readings() {
        let snap = MemorySnapshot::new(-5.0, f64::NAN);
        assert_eq!(snap.process_mb, 0.0);
        assert_eq!(snap.available_mb, 0.0);
    }

    #[test]
    fn test_system_probe_reports_live_values() {
        let mut probe = SystemMemory::new();
        let snap = probe.sample();
        assert!(snap.process_mb.is_finite() && snap.process_mb >= 0.0);
        assert!(snap.available_mb.is_finite() && snap.available_mb >= 0.0);
    }
}
