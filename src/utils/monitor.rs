#[cfg(feature = "cli")]
use std::sync::Mutex;
#[cfg(feature = "cli")]
use std::time::Instant;
#[cfg(feature = "cli")]
use sysinfo::{Pid, RefreshKind, System};

/// Per-run resource stats, logged between pipeline phases when `--monitor` is on.
#[cfg(feature = "cli")]
pub struct SystemMonitor {
    system: Mutex<System>,
    pid: Pid,
    started: Instant,
    peak_memory_mb: Mutex<u64>,
    enabled: bool,
}

#[cfg(feature = "cli")]
impl SystemMonitor {
    pub fn new(enabled: bool) -> Self {
        let mut system = System::new_with_specifics(RefreshKind::everything());
        system.refresh_all();

        let pid = sysinfo::get_current_pid().expect("Failed to get current PID");

        Self {
            system: Mutex::new(system),
            pid,
            started: Instant::now(),
            peak_memory_mb: Mutex::new(0),
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn log_stats(&self, phase: &str) {
        if !self.enabled {
            return;
        }

        let Ok(mut system) = self.system.lock() else {
            return;
        };
        system.refresh_all();

        let Some(process) = system.process(self.pid) else {
            return;
        };
        let memory_mb = process.memory() / 1024 / 1024;
        let cpu = process.cpu_usage();
        drop(system);

        let peak = {
            let mut peak = match self.peak_memory_mb.lock() {
                Ok(p) => p,
                Err(_) => return,
            };
            if memory_mb > *peak {
                *peak = memory_mb;
            }
            *peak
        };

        tracing::info!(
            "📊 {} - CPU: {:.1}%, Memory: {}MB, Peak: {}MB, Elapsed: {:?}",
            phase,
            cpu,
            memory_mb,
            peak,
            self.started.elapsed()
        );
    }

    pub fn log_final_stats(&self) {
        if !self.enabled {
            return;
        }
        let peak = self.peak_memory_mb.lock().map(|p| *p).unwrap_or(0);
        tracing::info!(
            "📊 Final Stats - Total Time: {:?}, Peak Memory: {}MB",
            self.started.elapsed(),
            peak
        );
    }
}

#[cfg(feature = "cli")]
impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}

// 為非CLI環境提供空實現
#[cfg(not(feature = "cli"))]
pub struct SystemMonitor;

#[cfg(not(feature = "cli"))]
impl SystemMonitor {
    pub fn new(_enabled: bool) -> Self {
        Self
    }

    pub fn is_enabled(&self) -> bool {
        false
    }

    pub fn log_stats(&self, _phase: &str) {}

    pub fn log_final_stats(&self) {}
}
