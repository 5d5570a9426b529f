//! Host facts

use serde::{Deserialize, Serialize};
use sysinfo::{Disks, System};

/// Snapshot of the machine, reported by diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostFacts {
    /// Hostname
    pub hostname: String,

    /// Number of CPU cores
    pub cpu_count: usize,

    /// Total memory in bytes
    pub memory_total: u64,

    /// Free disk space in bytes, summed over all disks
    pub disk_available: u64,

    /// Total disk space in bytes
    pub disk_total: u64,

    /// System uptime in seconds
    pub uptime_secs: u64,
}

/// Collect host facts
pub fn collect_host_facts() -> HostFacts {
    let mut sys = System::new();
    sys.refresh_cpu_all();
    sys.refresh_memory();

    let disks = Disks::new_with_refreshed_list();
    let (disk_available, disk_total) = disks.iter().fold((0u64, 0u64), |(available, total), disk| {
        (available + disk.available_space(), total + disk.total_space())
    });

    HostFacts {
        hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
        cpu_count: sys.cpus().len(),
        memory_total: sys.total_memory(),
        disk_available,
        disk_total,
        uptime_secs: System::uptime(),
    }
}

/// Bytes as GiB with one decimal
pub fn format_gib(bytes: u64) -> String {
    format!("{:.1} GiB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
}
