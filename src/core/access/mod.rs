//! Worker threads that keep the buffer pool resident.

use std::sync::Arc;

use crate::core::{domain::Intensity, pool::BufferPool};

pub mod bulk_scan;
pub mod scheduler;
pub mod steady;
pub mod stop;
pub mod walker;

pub use scheduler::{AccessScheduler, ShutdownReport};
pub use stop::StopFlag;

/// Everything a worker needs. Cloned once per worker.
#[derive(Clone, Debug)]
pub struct WorkerContext {
    pub pool: Arc<BufferPool>,
    pub intensity: Intensity,
    pub stop: StopFlag,
}

#[cfg(test)]
pub(crate) fn test_pool(chunks: usize, pages_per_chunk: usize) -> BufferPool {
    use crate::core::domain::TargetSize;

    let page_size = 4096u64;
    let chunk_bytes = pages_per_chunk as u64 * page_size;
    let target = TargetSize {
        total_bytes: chunk_bytes * chunks as u64,
        page_size,
        chunk_bytes,
        chunk_count: chunks,
    };
    let mut pool = BufferPool::new(page_size as usize);
    pool.allocate(&target).unwrap();
    pool
}
