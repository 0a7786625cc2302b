use std::time::Duration;

use sysinfo::{Pid, System};
use tokio::sync::watch;
use tracing::{info, warn};

const SAMPLE_INTERVAL: Duration = Duration::from_secs(5);
const WARNING_RATIO: f64 = 0.75;
const CRITICAL_RATIO: f64 = 0.90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryPressure {
    Normal,
    Warning,
    Critical,
}

/// Samples this process's RSS against total system memory every ~5s (§4.10)
/// and reports pressure level changes over a watch channel so the
/// Coordinator can slow down or cancel the crawl under critical pressure.
pub struct MemoryWatcher {
    pressure_rx: watch::Receiver<MemoryPressure>,
}

impl MemoryWatcher {
    pub fn spawn(mut shutdown: watch::Receiver<bool>) -> Self {
        let (pressure_tx, pressure_rx) = watch::channel(MemoryPressure::Normal);

        tokio::spawn(async move {
            let mut system = System::new();
            let pid = match sysinfo::get_current_pid() {
                Ok(pid) => pid,
                Err(e) => {
                    warn!(error = %e, "cannot determine current pid, memory watcher disabled");
                    return;
                }
            };

            loop {
                tokio::select! {
                    _ = tokio::time::sleep(SAMPLE_INTERVAL) => {}
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            return;
                        }
                    }
                }

                system.refresh_memory();
                system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]), true);

                let Some(process) = system.process(pid) else {
                    continue;
                };
                let total = system.total_memory();
                if total == 0 {
                    continue;
                }

                let rss = process.memory();
                let ratio = rss as f64 / total as f64;
                let pressure = if ratio >= CRITICAL_RATIO {
                    MemoryPressure::Critical
                } else if ratio >= WARNING_RATIO {
                    MemoryPressure::Warning
                } else {
                    MemoryPressure::Normal
                };

                if pressure != *pressure_tx.borrow() {
                    match pressure {
                        MemoryPressure::Critical => warn!(rss, total, ratio, "memory pressure critical"),
                        MemoryPressure::Warning => warn!(rss, total, ratio, "memory pressure elevated"),
                        MemoryPressure::Normal => info!(rss, total, ratio, "memory pressure normal"),
                    }
                    let _ = pressure_tx.send(pressure);
                }
            }
        });

        Self { pressure_rx }
    }

    pub fn current(&self) -> MemoryPressure {
        *self.pressure_rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<MemoryPressure> {
        self.pressure_rx.clone()
    }
}
