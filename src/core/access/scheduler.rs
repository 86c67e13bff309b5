use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use itertools::Itertools;
use tokio::sync::oneshot;

use crate::core::{
    access::{StopFlag, WorkerContext, bulk_scan, steady, walker},
    domain::Intensity,
    pool::BufferPool,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WorkerKind {
    SteadyTouch,
    BulkScan,
    Walker,
}

impl WorkerKind {
    fn label(&self) -> &'static str {
        match self {
            WorkerKind::SteadyTouch => "steady",
            WorkerKind::BulkScan => "bulk",
            WorkerKind::Walker => "walker",
        }
    }

    fn run(&self, ctx: WorkerContext, id: usize) {
        match self {
            WorkerKind::SteadyTouch => steady::run(ctx, id),
            WorkerKind::BulkScan => bulk_scan::run(ctx, id),
            WorkerKind::Walker => walker::run(ctx, id),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerOutcome {
    Stopped,
    Faulted { msg: String },
    Abandoned,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub stopped: usize,
    pub faulted: usize,
    pub abandoned: usize,
}

impl ShutdownReport {
    fn record(&mut self, outcome: &WorkerOutcome) {
        match outcome {
            WorkerOutcome::Stopped => self.stopped += 1,
            WorkerOutcome::Faulted { .. } => self.faulted += 1,
            WorkerOutcome::Abandoned => self.abandoned += 1,
        }
    }
}

#[derive(Debug)]
struct WorkerHandle {
    id: usize,
    kind: WorkerKind,
    done: oneshot::Receiver<WorkerOutcome>,
}

impl WorkerHandle {
    async fn join(self, join_timeout: Duration) -> WorkerOutcome {
        match tokio::time::timeout(join_timeout, self.done).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => WorkerOutcome::Faulted {
                msg: "worker exited without reporting".to_string(),
            },
            Err(_) => {
                tracing::warn!(
                    worker = self.id,
                    kind = ?self.kind,
                    timeout_ms = join_timeout.as_millis() as u64,
                    "worker did not stop in time, abandoning it"
                );
                WorkerOutcome::Abandoned
            }
        }
    }
}

/// Owns the worker threads of the Active phase.
#[derive(Debug)]
pub struct AccessScheduler {
    workers: Vec<WorkerHandle>,
    stop: StopFlag,
}

impl AccessScheduler {
    /// Spawns the worker set for `intensity`. A worker that cannot be spawned
    /// is logged and skipped.
    #[tracing::instrument(skip(pool, stop))]
    pub fn start(pool: Arc<BufferPool>, intensity: Intensity, stop: StopFlag) -> Self {
        let mut kinds = vec![WorkerKind::SteadyTouch; intensity.steady_workers()];
        if intensity.bulk_scan_enabled() {
            kinds.push(WorkerKind::BulkScan);
        }
        if intensity.walker_enabled() {
            kinds.push(WorkerKind::Walker);
        }

        tracing::info!(
            steady_workers = intensity.steady_workers(),
            total_workers = intensity.total_workers(),
            %intensity,
            "starting memory activity workers"
        );

        let workers = kinds
            .into_iter()
            .enumerate()
            .filter_map(|(id, kind)| {
                let ctx = WorkerContext {
                    pool: pool.clone(),
                    intensity,
                    stop: stop.clone(),
                };
                spawn_worker(id, kind, move || kind.run(ctx, id))
            })
            .collect();

        Self { workers, stop }
    }

    #[cfg(test)]
    pub fn worker_kinds(&self) -> Vec<WorkerKind> {
        self.workers.iter().map(|w| w.kind).collect()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Sets the stop flag and waits for every worker, each for at most
    /// `join_timeout`. Workers that overrun are left to die with the process.
    pub async fn shutdown(mut self, join_timeout: Duration) -> ShutdownReport {
        self.stop.stop();
        let workers = std::mem::take(&mut self.workers);

        let outcomes =
            futures::future::join_all(workers.into_iter().map(|w| w.join(join_timeout))).await;

        let mut report = ShutdownReport::default();
        for outcome in &outcomes {
            report.record(outcome);
        }
        let faults = outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                WorkerOutcome::Faulted { msg } => Some(msg.as_str()),
                _ => None,
            })
            .collect_vec();
        if !faults.is_empty() {
            tracing::warn!(?faults, "some workers faulted during the run");
        }
        tracing::info!(
            stopped = report.stopped,
            faulted = report.faulted,
            abandoned = report.abandoned,
            "memory activity workers stopped"
        );
        report
    }
}

impl Drop for AccessScheduler {
    fn drop(&mut self) {
        self.stop.stop();
    }
}

fn spawn_worker<F>(id: usize, kind: WorkerKind, work: F) -> Option<WorkerHandle>
where
    F: FnOnce() + Send + 'static,
{
    let (done_tx, done) = oneshot::channel();

    let body = move || {
        // `work` owns the worker context, so the pool reference is dropped
        // before the outcome is reported.
        let outcome = match panic::catch_unwind(AssertUnwindSafe(work)) {
            Ok(()) => WorkerOutcome::Stopped,
            Err(payload) => {
                let msg = panic_message(payload.as_ref());
                tracing::error!(worker = id, kind = ?kind, "worker fault: {}", msg);
                WorkerOutcome::Faulted { msg }
            }
        };
        let _ = done_tx.send(outcome);
    };

    match std::thread::Builder::new()
        .name(format!("jaws-{}-{}", kind.label(), id))
        .spawn(body)
    {
        Ok(_) => Some(WorkerHandle { id, kind, done }),
        Err(e) => {
            tracing::warn!(worker = id, kind = ?kind, "failed to spawn worker: {}", e);
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
