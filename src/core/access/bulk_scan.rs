use std::ops::Range;

use rand::Rng;

use crate::{
    constants::SAMPLE_STRIDE,
    core::{access::WorkerContext, pool::MemoryChunk},
};

/// Reads a large window of one chunk, then writes the checksum back to
/// every page of that window.
pub fn run(ctx: WorkerContext, id: usize) {
    let window = ctx.intensity.bulk_window_bytes();
    let interval = ctx.intensity.bulk_interval();
    tracing::info!(
        worker = id,
        window_mb = window / (1024 * 1024),
        interval_secs = interval.as_secs_f64(),
        "bulk-scan worker started"
    );

    let mut rng = rand::thread_rng();
    while !ctx.stop.is_stopped() {
        scan_cycle(&ctx, &mut rng);
        if ctx.stop.sleep(interval) {
            break;
        }
    }
}

/// Returns the scanned range, or `None` when the pool is empty.
pub(crate) fn scan_cycle<R: Rng>(ctx: &WorkerContext, rng: &mut R) -> Option<(usize, Range<usize>)> {
    let chunks = ctx.pool.chunks();
    if chunks.is_empty() {
        return None;
    }
    let chunk_idx = rng.gen_range(0..chunks.len());
    let chunk = &chunks[chunk_idx];
    let window = ctx.intensity.bulk_window_bytes();

    let range = if chunk.len() >= window {
        let start = rng.gen_range(0..=chunk.len() - window);
        start..start + window
    } else {
        0..chunk.len()
    };

    let checksum = checksum(chunk, range.clone());
    let value = (checksum % 256) as u8;
    for offset in range.clone().step_by(ctx.pool.page_size()) {
        chunk.write(offset, value);
    }

    Some((chunk_idx, range))
}

fn checksum(chunk: &MemoryChunk, range: Range<usize>) -> u64 {
    range
        .step_by(SAMPLE_STRIDE)
        .map(|offset| u64::from(chunk.read(offset)))
        .fold(0u64, u64::wrapping_add)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::access::{StopFlag, test_pool};
    use crate::core::domain::Intensity;
    use std::sync::Arc;

    #[test]
    fn test_small_chunk_is_scanned_whole() {
        let ctx = WorkerContext {
            pool: Arc::new(test_pool(1, 8)),
            intensity: Intensity::new(5).unwrap(),
            stop: StopFlag::new(),
        };
        let chunk = &ctx.pool.chunks()[0];
        for (page, value) in [(0, 100u8), (1, 200), (2, 10)] {
            chunk.write(page * 4096, value);
        }

        let (idx, range) = scan_cycle(&ctx, &mut rand::thread_rng()).unwrap();

        assert_eq!(idx, 0);
        assert_eq!(range, 0..8 * 4096);
        // (100 + 200 + 10) mod 256
        for offset in (0..chunk.len()).step_by(4096) {
            assert_eq!(chunk.read(offset), 54);
        }
    }

    #[test]
    fn test_large_chunk_scans_one_window() {
        // 60 MiB chunk, 50 MiB window at intensity 5.
        let ctx = WorkerContext {
            pool: Arc::new(test_pool(1, 60 * 256)),
            intensity: Intensity::new(5).unwrap(),
            stop: StopFlag::new(),
        };

        let (_, range) = scan_cycle(&ctx, &mut rand::thread_rng()).unwrap();

        assert_eq!(range.len(), 50 * 1024 * 1024);
        assert!(range.end <= ctx.pool.chunks()[0].len());
    }

    #[test]
    fn test_empty_pool_is_skipped() {
        let ctx = WorkerContext {
            pool: Arc::new(crate::core::pool::BufferPool::new(4096)),
            intensity: Intensity::new(5).unwrap(),
            stop: StopFlag::new(),
        };
        assert!(scan_cycle(&ctx, &mut rand::thread_rng()).is_none());
    }
}
