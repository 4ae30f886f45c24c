//! Host resource metrics used by preflight checks and restore points.

pub mod watcher;

pub use watcher::{ResourceAlert, ResourceWatcher};

use crate::core::ResourceSample;
use chrono::Utc;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use sysinfo::{Disks, System};

pub trait MetricsProvider: Send + Sync {
    fn sample(&self) -> ResourceSample;
}

/// Live metrics from the host, with disk usage taken from the mount
/// holding the engine's working root.
pub struct SystemMetricsProvider {
    root: PathBuf,
    system: Mutex<System>,
}

impl SystemMetricsProvider {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            system: Mutex::new(System::new()),
        }
    }

    fn disk_pct(&self) -> f32 {
        let disks = Disks::new_with_refreshed_list();
        // Longest mount-point prefix wins, so /var beats / for /var/data.
        let best = disks
            .iter()
            .filter(|disk| self.root.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len());
        match best {
            Some(disk) if disk.total_space() > 0 => {
                let used = disk.total_space() - disk.available_space();
                (used as f64 / disk.total_space() as f64 * 100.0) as f32
            }
            _ => 0.0,
        }
    }
}

impl MetricsProvider for SystemMetricsProvider {
    fn sample(&self) -> ResourceSample {
        let (cpu_pct, memory_pct) = {
            let mut system = self.system.lock();
            system.refresh_cpu_usage();
            system.refresh_memory();
            let memory = if system.total_memory() > 0 {
                (system.used_memory() as f64 / system.total_memory() as f64 * 100.0) as f32
            } else {
                0.0
            };
            (system.global_cpu_usage(), memory)
        };

        ResourceSample {
            cpu_pct,
            memory_pct,
            disk_pct: self.disk_pct(),
            sampled_at: Utc::now(),
        }
    }
}

/// Fixed readings, for tests and dry runs.
pub struct StaticMetricsProvider {
    pub cpu_pct: f32,
    pub memory_pct: f32,
    pub disk_pct: f32,
}

impl StaticMetricsProvider {
    pub fn healthy() -> Self {
        Self {
            cpu_pct: 10.0,
            memory_pct: 30.0,
            disk_pct: 40.0,
        }
    }
}

impl MetricsProvider for StaticMetricsProvider {
    fn sample(&self) -> ResourceSample {
        ResourceSample {
            cpu_pct: self.cpu_pct,
            memory_pct: self.memory_pct,
            disk_pct: self.disk_pct,
            sampled_at: Utc::now(),
        }
    }
}
