use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    config::RunConfig,
    core::{
        access::{AccessScheduler, ShutdownReport, StopFlag},
        domain::{RunState, TargetSize},
        errors::{PlatformError, RunError},
        pool::{BufferPool, ChunkAllocator, MemoryChunk},
        sizing::SizingPolicy,
        traits::{monitor::SystemMonitor, platform::Platform},
    },
};

const MB: f64 = 1024.0 * 1024.0;

#[derive(Clone, Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub target: TargetSize,
    pub chunks_allocated: usize,
    pub bytes_allocated: u64,
    pub pages_touched: usize,
    pub workers_started: usize,
    pub shutdown: ShutdownReport,
    pub final_state: RunState,
}

/// Drives one run through Allocating, Touching, Active, Cleanup and
/// Terminated.
#[derive(Debug)]
pub struct LifecycleController {
    run_id: Uuid,
    config: RunConfig,
    platform: Arc<dyn Platform>,
    monitor: Arc<dyn SystemMonitor>,
    stop: StopFlag,
    state: RunState,
    alloc_chunk: ChunkAllocator,
}

impl LifecycleController {
    pub fn new(
        config: RunConfig,
        platform: Arc<dyn Platform>,
        monitor: Arc<dyn SystemMonitor>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            config,
            platform,
            monitor,
            stop: StopFlag::new(),
            state: RunState::default(),
            alloc_chunk: MemoryChunk::allocate,
        }
    }

    #[cfg(test)]
    pub fn with_chunk_allocator(mut self, alloc_chunk: ChunkAllocator) -> Self {
        self.alloc_chunk = alloc_chunk;
        self
    }

    /// Handle for whoever delivers cancellation (signal listener, tests).
    pub fn stop_handle(&self) -> StopFlag {
        self.stop.clone()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub async fn run(mut self) -> Result<RunReport, RunError> {
        let span = tracing::info_span!("run", id = %self.run_id);
        self.run_phases().instrument(span).await
    }

    async fn run_phases(&mut self) -> Result<RunReport, RunError> {
        let started_at = Utc::now();
        self.tune_process();

        let target = match self.size_target() {
            Ok(target) => target,
            Err(e) => {
                self.terminate_early();
                return Err(e);
            }
        };
        let pool = match self.allocate(target).await {
            Ok(pool) => pool,
            Err(e) => {
                self.terminate_early();
                return Err(e);
            }
        };

        let mut report = RunReport {
            run_id: self.run_id,
            started_at,
            finished_at: started_at,
            target,
            chunks_allocated: pool.len(),
            bytes_allocated: pool.total_bytes(),
            pages_touched: 0,
            workers_started: 0,
            shutdown: ShutdownReport::default(),
            final_state: self.state,
        };

        let pool = if self.stop.is_stopped() {
            tracing::info!("stop requested during allocation");
            Arc::new(pool)
        } else {
            let (pool, pages) = match self.touch(pool).await {
                Ok(touched) => touched,
                Err(e) => return Err(self.abort_touching(e)),
            };
            report.pages_touched = pages;
            let pool = Arc::new(pool);

            if self.stop.is_stopped() {
                tracing::info!("stop requested while touching pages");
            } else {
                let (workers, shutdown) = self.keep_active(pool.clone()).await;
                report.workers_started = workers;
                report.shutdown = shutdown;
            }
            pool
        };

        self.cleanup(pool);
        self.advance(RunState::Terminated);

        report.finished_at = Utc::now();
        report.final_state = self.state();
        Ok(report)
    }

    fn advance(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::debug!(from = ?self.state, to = ?next, "run state changed");
        self.state = next;
    }

    fn terminate_early(&mut self) {
        self.advance(RunState::Cleanup);
        self.advance(RunState::Terminated);
    }

    fn tune_process(&self) {
        if let Err(e) = self.platform.raise_priority() {
            log_platform_warning("could not raise process priority", &e);
        }
        if let Err(e) = self.platform.shield_from_oom_killer() {
            log_platform_warning("could not adjust OOM score", &e);
        }
    }

    fn size_target(&self) -> Result<TargetSize, RunError> {
        let total_memory = self
            .monitor
            .total_memory_bytes()
            .map_err(|e| RunError::Internal { msg: e.to_string() })?;

        SizingPolicy::new(self.platform.page_size()).compute(
            total_memory,
            self.config.percentage,
            self.config.chunk_bytes,
        )
    }

    async fn allocate(&mut self, target: TargetSize) -> Result<BufferPool, RunError> {
        tracing::info!(
            total_mb = %format!("{:.2}", target.total_bytes as f64 / MB),
            chunks = target.chunk_count,
            chunk_mb = %format!("{:.2}", target.chunk_bytes as f64 / MB),
            "allocating memory"
        );

        let page_size = target.page_size as usize;
        let alloc_chunk = self.alloc_chunk;
        let (pool, allocation) = tokio::task::spawn_blocking(move || {
            let mut pool = BufferPool::new(page_size).with_chunk_allocator(alloc_chunk);
            let allocation = pool.allocate(&target);
            (pool, allocation)
        })
        .await
        .map_err(|e| RunError::Internal { msg: e.to_string() })?;

        if let Err(source) = allocation {
            if pool.is_empty() {
                return Err(RunError::EmptyPool { source });
            }
            tracing::warn!(
                allocated = pool.len(),
                requested = target.chunk_count,
                "{}, continuing with the chunks already allocated",
                source
            );
        }

        tracing::info!(
            chunks = pool.len(),
            allocated_mb = %format!("{:.2}", pool.total_bytes() as f64 / MB),
            "allocation finished"
        );
        Ok(pool)
    }

    async fn touch(&mut self, pool: BufferPool) -> Result<(BufferPool, usize), RunError> {
        self.advance(RunState::Touching);

        if let Err(e) = self.platform.lock_memory() {
            log_platform_warning("could not lock memory, pages may be swapped out", &e);
        }

        tracing::info!("touching memory pages");
        let (pool, pages) = tokio::task::spawn_blocking(move || {
            let pages = pool.touch_all();
            (pool, pages)
        })
        .await
        .map_err(|e| RunError::Internal { msg: e.to_string() })?;
        tracing::info!(pages, "finished touching pages");

        self.report_utilization(&pool).await;
        Ok((pool, pages))
    }

    async fn report_utilization(&self, pool: &BufferPool) {
        match self.monitor.sample_process().await {
            Ok(stats) => tracing::info!(
                rss_mb = %format!("{:.2}", stats.rss_mb()),
                requested_mb = %format!("{:.2}", pool.total_bytes() as f64 / MB),
                "memory utilization"
            ),
            Err(e) => tracing::warn!("could not sample memory utilization: {}", e),
        }
    }

    /// Runs the workers and the reporting loop until the stop flag is set.
    async fn keep_active(&mut self, pool: Arc<BufferPool>) -> (usize, ShutdownReport) {
        self.advance(RunState::Active);
        let intensity = self.config.intensity;

        let scheduler = AccessScheduler::start(pool, intensity, self.stop.clone());
        let workers = scheduler.len();
        if scheduler.is_empty() {
            tracing::warn!("no memory access worker could be started, pages may be swapped out");
        }

        if self.config.static_mode {
            tracing::info!(
                %intensity,
                "static buffer created, touching it aggressively to prevent swapping"
            );
        } else {
            tracing::info!(%intensity, "starting aggressive memory access, press Ctrl+C to exit");
        }

        self.report_until_stopped().await;

        tracing::info!("stopping memory access workers");
        let shutdown = scheduler.shutdown(self.config.join_timeout).await;
        (workers, shutdown)
    }

    async fn report_until_stopped(&self) {
        let intensity = self.config.intensity;
        loop {
            tokio::select! {
                _ = self.stop.stopped() => break,
                sample = self.monitor.sample_process() => match sample {
                    Ok(stats) => tracing::info!(
                        rss_mb = %format!("{:.2}", stats.rss_mb()),
                        cpu_percent = %format!("{:.1}", stats.cpu_percent),
                        %intensity,
                        "memory stats"
                    ),
                    Err(e) => tracing::warn!("could not sample process statistics: {}", e),
                },
            }

            tokio::select! {
                _ = self.stop.stopped() => break,
                _ = tokio::time::sleep(self.config.report_interval) => {}
            }
        }
    }

    /// The pool is gone with the failed touch task; only the lock is undone.
    fn abort_touching(&mut self, error: RunError) -> RunError {
        self.advance(RunState::Cleanup);
        self.unlock();
        self.advance(RunState::Terminated);
        error
    }

    fn unlock(&self) {
        if let Err(e) = self.platform.unlock_memory() {
            log_platform_warning("could not unlock memory", &e);
        }
    }

    fn cleanup(&mut self, pool: Arc<BufferPool>) {
        self.advance(RunState::Cleanup);
        self.unlock();

        match Arc::try_unwrap(pool) {
            Ok(mut pool) => pool.release(),
            Err(shared) => tracing::warn!(
                references = Arc::strong_count(&shared),
                "abandoned workers still hold the pool, memory is returned at exit"
            ),
        }
    }
}

fn log_platform_warning(context: &str, error: &PlatformError) {
    match error {
        PlatformError::Unsupported { .. } => tracing::debug!("{}: {}", context, error),
        _ => tracing::warn!("{}: {}", context, error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        domain::Intensity,
        errors::{AllocationError, MonitorError},
        traits::{
            monitor::{MockSystemMonitor, ProcessStats},
            platform::MockPlatform,
        },
    };
    use std::time::Duration;

    const MIB: u64 = 1024 * 1024;

    fn config(intensity: u8) -> RunConfig {
        RunConfig {
            percentage: 50,
            chunk_bytes: MIB,
            intensity: Intensity::new(intensity).unwrap(),
            static_mode: false,
            report_interval: Duration::from_millis(20),
            join_timeout: Duration::from_secs(2),
        }
    }

    fn platform() -> MockPlatform {
        let mut platform = MockPlatform::new();
        platform.expect_page_size().return_const(4096usize);
        platform.expect_raise_priority().returning(|| Ok(()));
        platform.expect_shield_from_oom_killer().returning(|| Ok(()));
        platform
    }

    fn monitor(total: u64) -> MockSystemMonitor {
        let mut monitor = MockSystemMonitor::new();
        monitor.expect_total_memory_bytes().returning(move || Ok(total));
        monitor.expect_sample_process().returning(|| {
            Ok(ProcessStats {
                rss_bytes: 4 * MIB,
                cpu_percent: 12.5,
            })
        });
        monitor
    }

    fn stop_after(controller: &LifecycleController, delay: Duration) {
        let stop = controller.stop_handle();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            stop.stop();
        });
    }

    #[tokio::test]
    async fn test_run_until_stopped() {
        let mut platform = platform();
        platform.expect_lock_memory().times(1).returning(|| Ok(()));
        platform.expect_unlock_memory().times(1).returning(|| Ok(()));

        let controller = LifecycleController::new(
            config(10),
            Arc::new(platform),
            Arc::new(monitor(8 * MIB)),
        );
        assert_eq!(controller.state(), RunState::Allocating);
        stop_after(&controller, Duration::from_millis(300));

        let report = controller.run().await.unwrap();

        assert_eq!(report.target.total_bytes, 4 * MIB);
        assert_eq!(report.chunks_allocated, 4);
        assert_eq!(report.bytes_allocated, 4 * MIB);
        assert_eq!(report.pages_touched, 1024);
        assert_eq!(report.workers_started, 10);
        assert_eq!(report.shutdown.stopped, 10);
        assert_eq!(report.shutdown.abandoned, 0);
        assert_eq!(report.final_state, RunState::Terminated);
        assert!(report.finished_at >= report.started_at);
    }

    #[tokio::test]
    async fn test_lock_failure_is_not_fatal() {
        let mut platform = platform();
        platform.expect_lock_memory().returning(|| {
            Err(PlatformError::Syscall {
                op: "mlockall",
                msg: "Cannot allocate memory".to_string(),
            })
        });
        platform.expect_unlock_memory().returning(|| Ok(()));

        let controller = LifecycleController::new(
            config(3),
            Arc::new(platform),
            Arc::new(monitor(8 * MIB)),
        );
        stop_after(&controller, Duration::from_millis(100));

        let report = controller.run().await.unwrap();

        assert_eq!(report.workers_started, 3);
        assert_eq!(report.final_state, RunState::Terminated);
    }

    #[tokio::test]
    async fn test_static_mode_runs_the_same_workers() {
        let mut platform = platform();
        platform.expect_lock_memory().returning(|| Ok(()));
        platform.expect_unlock_memory().returning(|| Ok(()));

        let mut config = config(8);
        config.static_mode = true;
        let controller =
            LifecycleController::new(config, Arc::new(platform), Arc::new(monitor(8 * MIB)));
        stop_after(&controller, Duration::from_millis(100));

        let report = controller.run().await.unwrap();

        assert_eq!(report.workers_started, 10);
    }

    #[tokio::test]
    async fn test_zero_sized_target_is_fatal() {
        let mut platform = platform();
        platform.expect_lock_memory().never();
        platform.expect_unlock_memory().never();

        let controller =
            LifecycleController::new(config(5), Arc::new(platform), Arc::new(monitor(4096)));

        let result = controller.run().await;

        assert!(matches!(result, Err(RunError::InvalidConfiguration { .. })));
    }

    #[tokio::test]
    async fn test_unavailable_total_memory_is_fatal() {
        let mut monitor = MockSystemMonitor::new();
        monitor.expect_total_memory_bytes().returning(|| {
            Err(MonitorError::Unavailable {
                msg: "no meminfo".to_string(),
            })
        });

        let controller =
            LifecycleController::new(config(5), Arc::new(platform()), Arc::new(monitor));

        assert!(matches!(
            controller.run().await,
            Err(RunError::Internal { .. })
        ));
    }

    #[tokio::test]
    async fn test_unallocatable_pool_is_fatal() {
        let mut platform = platform();
        platform.expect_lock_memory().never();

        // Half of 2^62 bytes in a single chunk is far beyond any address space.
        let mut config = config(5);
        config.chunk_bytes = 1 << 61;
        let controller =
            LifecycleController::new(config, Arc::new(platform), Arc::new(monitor(1 << 62)));

        let result = controller.run().await;

        assert!(matches!(result, Err(RunError::EmptyPool { .. })));
    }

    #[tokio::test]
    async fn test_stop_before_start_skips_active_phase() {
        let mut platform = platform();
        platform.expect_lock_memory().never();
        platform.expect_unlock_memory().times(1).returning(|| Ok(()));

        let controller = LifecycleController::new(
            config(10),
            Arc::new(platform),
            Arc::new(monitor(8 * MIB)),
        );
        controller.stop_handle().stop();

        let report = controller.run().await.unwrap();

        assert_eq!(report.chunks_allocated, 4);
        assert_eq!(report.pages_touched, 0);
        assert_eq!(report.workers_started, 0);
        assert_eq!(report.final_state, RunState::Terminated);
    }

    #[tokio::test]
    async fn test_monitor_failures_are_tolerated() {
        let mut platform = platform();
        platform.expect_lock_memory().returning(|| Ok(()));
        platform.expect_unlock_memory().returning(|| Ok(()));

        let mut monitor = MockSystemMonitor::new();
        monitor.expect_total_memory_bytes().returning(|| Ok(8 * MIB));
        monitor
            .expect_sample_process()
            .returning(|| Err(MonitorError::ProcessNotFound));

        let controller =
            LifecycleController::new(config(2), Arc::new(platform), Arc::new(monitor));
        stop_after(&controller, Duration::from_millis(100));

        let report = controller.run().await.unwrap();

        assert_eq!(report.workers_started, 2);
        assert_eq!(report.shutdown.stopped, 2);
    }

    #[tokio::test]
    async fn test_partial_allocation_keeps_running() {
        let mut platform = platform();
        platform.expect_lock_memory().times(1).returning(|| Ok(()));
        platform.expect_unlock_memory().times(1).returning(|| Ok(()));

        let controller = LifecycleController::new(
            config(3),
            Arc::new(platform),
            Arc::new(monitor(8 * MIB)),
        )
        .with_chunk_allocator(|index, bytes, page_size| {
            if index == 2 {
                Err(AllocationError::OutOfMemory { index, bytes })
            } else {
                MemoryChunk::allocate(index, bytes, page_size)
            }
        });
        stop_after(&controller, Duration::from_millis(150));

        let report = controller.run().await.unwrap();

        assert_eq!(report.target.chunk_count, 4);
        assert_eq!(report.chunks_allocated, 2);
        assert_eq!(report.bytes_allocated, 2 * MIB);
        assert_eq!(report.pages_touched, 512);
        assert_eq!(report.workers_started, 3);
        assert_eq!(report.shutdown.stopped, 3);
        assert_eq!(report.final_state, RunState::Terminated);
    }

    #[test]
    fn test_failed_touch_still_unlocks() {
        let mut platform = platform();
        platform.expect_unlock_memory().times(1).returning(|| Ok(()));
        let mut controller = LifecycleController::new(
            config(5),
            Arc::new(platform),
            Arc::new(monitor(8 * MIB)),
        );
        controller.advance(RunState::Touching);

        let error = controller.abort_touching(RunError::Internal {
            msg: "touch task panicked".to_string(),
        });

        assert!(matches!(error, RunError::Internal { .. }));
        assert_eq!(controller.state(), RunState::Terminated);
    }
}
