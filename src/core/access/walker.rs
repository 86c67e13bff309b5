use itertools::Itertools;
use rand::Rng;
use rand::seq::SliceRandom;

use crate::{
    constants::{
        SAMPLE_STRIDE, WALKER_PASS_PAUSE, WALKER_PREFERRED_CHUNK_BYTES, WALKER_WINDOW_BYTES,
        WALKER_WINDOW_PAUSE,
    },
    core::{access::WorkerContext, pool::BufferPool},
};

/// Streams through whole chunks in 1 MiB windows.
pub fn run(ctx: WorkerContext, id: usize) {
    tracing::info!(
        worker = id,
        window_kb = WALKER_WINDOW_BYTES / 1024,
        "memory walker started"
    );

    let mut rng = rand::thread_rng();
    while !ctx.stop.is_stopped() {
        let Some(chunk_idx) = pick_chunk(&ctx.pool, &mut rng) else {
            tracing::warn!(worker = id, "memory walker has no chunks to walk");
            return;
        };
        if walk_chunk(&ctx, chunk_idx).is_none() {
            break;
        }
        if ctx.stop.sleep(WALKER_PASS_PAUSE) {
            break;
        }
    }
}

/// Prefers chunks larger than 50 MiB and falls back to any chunk.
pub(crate) fn pick_chunk<R: Rng>(pool: &BufferPool, rng: &mut R) -> Option<usize> {
    let large = pool
        .chunks()
        .iter()
        .positions(|chunk| chunk.len() > WALKER_PREFERRED_CHUNK_BYTES)
        .collect_vec();

    if large.is_empty() {
        (!pool.is_empty()).then(|| rng.gen_range(0..pool.len()))
    } else {
        large.choose(rng).copied()
    }
}

/// One full pass. Returns the number of windows walked, or `None` if the
/// stop flag interrupted the pass.
pub(crate) fn walk_chunk(ctx: &WorkerContext, chunk_idx: usize) -> Option<usize> {
    let chunk = &ctx.pool.chunks()[chunk_idx];
    let mut windows = 0;

    for start in (0..chunk.len()).step_by(WALKER_WINDOW_BYTES) {
        if ctx.stop.is_stopped() {
            return None;
        }
        let end = (start + WALKER_WINDOW_BYTES).min(chunk.len());
        for offset in (start..end).step_by(SAMPLE_STRIDE) {
            chunk.bump(offset);
        }
        windows += 1;

        if ctx.stop.sleep(WALKER_WINDOW_PAUSE) {
            return None;
        }
    }

    Some(windows)
}
