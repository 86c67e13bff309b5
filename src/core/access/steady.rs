use rand::Rng;
use rand::seq::index;

use crate::core::{access::WorkerContext, domain::Intensity, pool::MemoryChunk};

/// Touches a random subset of chunks every cycle.
pub fn run(ctx: WorkerContext, id: usize) {
    let accesses = ctx.intensity.accesses_per_cycle();
    let interval = ctx.intensity.steady_interval();
    tracing::info!(
        worker = id,
        accesses,
        interval_secs = interval.as_secs_f64(),
        "steady-touch worker started"
    );

    let mut rng = rand::thread_rng();
    while !ctx.stop.is_stopped() {
        touch_cycle(&ctx, &mut rng);
        if ctx.stop.sleep(interval) {
            break;
        }
    }
}

/// One cycle: distinct chunks chosen without replacement, the access budget
/// split evenly between them.
pub(crate) fn touch_cycle<R: Rng>(ctx: &WorkerContext, rng: &mut R) -> usize {
    let chunks = ctx.pool.chunks();
    let chosen = ctx.intensity.chunks_per_cycle(chunks.len());
    if chosen == 0 {
        return 0;
    }
    let per_chunk = ctx.intensity.accesses_per_cycle() / chosen;

    let mut touched = 0;
    for chunk_idx in index::sample(rng, chunks.len(), chosen) {
        touched += touch_chunk(
            &chunks[chunk_idx],
            per_chunk,
            ctx.intensity,
            ctx.pool.page_size(),
            rng,
        );
    }
    touched
}

fn touch_chunk<R: Rng>(
    chunk: &MemoryChunk,
    accesses: usize,
    intensity: Intensity,
    page_size: usize,
    rng: &mut R,
) -> usize {
    if chunk.is_empty() || accesses == 0 {
        return 0;
    }
    let len = chunk.len();

    if intensity.sequential_touch() {
        let last_start = len.saturating_sub(accesses + 1);
        let start = rng.gen_range(0..=last_start) / page_size * page_size;
        for i in 0..accesses {
            chunk.bump((start + i) % len);
        }
    } else {
        for _ in 0..accesses {
            chunk.bump(rng.gen_range(0..len));
        }
    }
    accesses
}
