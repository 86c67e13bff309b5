use crate::core::errors::MonitorError;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ProcessStats {
    pub rss_bytes: u64,
    pub cpu_percent: f32,
}

impl ProcessStats {
    pub fn rss_mb(&self) -> f64 {
        self.rss_bytes as f64 / (1024.0 * 1024.0)
    }
}

#[mockall::automock]
#[async_trait::async_trait]
pub trait SystemMonitor: std::fmt::Debug + Send + Sync {
    fn total_memory_bytes(&self) -> Result<u64, MonitorError>;

    /// Resident size and CPU usage of the current process. May take a
    /// sampling window to measure CPU.
    async fn sample_process(&self) -> Result<ProcessStats, MonitorError>;
}
