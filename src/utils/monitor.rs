use crate::core::hooks::EventObserver;
use crate::domain::model::Event;
use crate::utils::error::ObserverError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[cfg(feature = "cli")]
use std::sync::Mutex;
#[cfg(feature = "cli")]
use sysinfo::{Pid, RefreshKind, System};

#[derive(Debug, Clone)]
pub struct ResourceStats {
    pub cpu_usage: f32,
    pub memory_usage_mb: u64,
    pub peak_memory_mb: u64,
    pub elapsed_time: Duration,
}

/// 執行期間的資源監控，同時作為事件觀察者每 N 個事件輸出一次統計
pub struct RunMonitor {
    #[cfg(feature = "cli")]
    system: Mutex<System>,
    #[cfg(feature = "cli")]
    pid: Option<Pid>,
    start_time: Instant,
    peak_memory_mb: AtomicU64,
    events_seen: AtomicU64,
    report_every: u64,
}

impl RunMonitor {
    pub fn new(report_every: u64) -> Self {
        Self {
            #[cfg(feature = "cli")]
            system: Mutex::new(System::new_with_specifics(RefreshKind::everything())),
            #[cfg(feature = "cli")]
            pid: sysinfo::get_current_pid().ok(),
            start_time: Instant::now(),
            peak_memory_mb: AtomicU64::new(0),
            events_seen: AtomicU64::new(0),
            report_every: report_every.max(1),
        }
    }

    #[cfg(feature = "cli")]
    pub fn stats(&self) -> Option<ResourceStats> {
        let pid = self.pid?;
        let mut system = self.system.lock().ok()?;
        system.refresh_all();
        let process = system.process(pid)?;
        let memory_mb = process.memory() / 1024 / 1024;
        let peak = self.peak_memory_mb.fetch_max(memory_mb, Ordering::Relaxed).max(memory_mb);

        Some(ResourceStats {
            cpu_usage: process.cpu_usage(),
            memory_usage_mb: memory_mb,
            peak_memory_mb: peak,
            elapsed_time: self.start_time.elapsed(),
        })
    }

    // 沒有 sysinfo 時只回報經過時間
    #[cfg(not(feature = "cli"))]
    pub fn stats(&self) -> Option<ResourceStats> {
        Some(ResourceStats {
            cpu_usage: 0.0,
            memory_usage_mb: 0,
            peak_memory_mb: self.peak_memory_mb.load(Ordering::Relaxed),
            elapsed_time: self.start_time.elapsed(),
        })
    }

    pub fn log_stats(&self, phase: &str) {
        if let Some(stats) = self.stats() {
            tracing::info!(
                "📊 {} - CPU: {:.1}%, Memory: {}MB, Peak: {}MB, Time: {:?}",
                phase,
                stats.cpu_usage,
                stats.memory_usage_mb,
                stats.peak_memory_mb,
                stats.elapsed_time
            );
        }
    }

    pub fn events_seen(&self) -> u64 {
        self.events_seen.load(Ordering::Relaxed)
    }
}

impl Default for RunMonitor {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl EventObserver for RunMonitor {
    fn on_event(&self, _event: &Event<'_>) -> Result<(), ObserverError> {
        let seen = self.events_seen.fetch_add(1, Ordering::Relaxed) + 1;
        if seen % self.report_every == 0 {
            self.log_stats(&format!("{} events processed", seen));
        }
        Ok(())
    }
}
