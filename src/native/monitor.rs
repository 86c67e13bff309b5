use std::time::Duration;

use sysinfo::{Pid, System};
use tokio::sync::Mutex;

use crate::{
    constants::CPU_SAMPLE_WINDOW,
    core::{
        errors::MonitorError,
        traits::monitor::{ProcessStats, SystemMonitor},
    },
};

/// `sysinfo`-backed statistics for the current process.
#[derive(Debug)]
pub struct SysinfoMonitor {
    system: Mutex<System>,
    pid: Option<Pid>,
    cpu_window: Duration,
}

impl SysinfoMonitor {
    pub fn new() -> Self {
        Self::with_cpu_window(CPU_SAMPLE_WINDOW)
    }

    pub fn with_cpu_window(cpu_window: Duration) -> Self {
        Self {
            system: Mutex::new(System::new()),
            pid: sysinfo::get_current_pid().ok(),
            cpu_window,
        }
    }
}

#[async_trait::async_trait]
impl SystemMonitor for SysinfoMonitor {
    fn total_memory_bytes(&self) -> Result<u64, MonitorError> {
        let mut system = System::new();
        system.refresh_memory();
        match system.total_memory() {
            0 => Err(MonitorError::Unavailable {
                msg: "total memory reported as zero".to_string(),
            }),
            total => Ok(total),
        }
    }

    async fn sample_process(&self) -> Result<ProcessStats, MonitorError> {
        let pid = self.pid.ok_or(MonitorError::ProcessNotFound)?;
        let mut system = self.system.lock().await;

        // CPU usage is the delta between two refreshes.
        system.refresh_process(pid);
        tokio::time::sleep(self.cpu_window).await;
        if !system.refresh_process(pid) {
            return Err(MonitorError::ProcessNotFound);
        }

        let process = system.process(pid).ok_or(MonitorError::ProcessNotFound)?;
        Ok(ProcessStats {
            rss_bytes: process.memory(),
            cpu_percent: process.cpu_usage(),
        })
    }
}
