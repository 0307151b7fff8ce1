//! Fan-out helpers over the context's worker pool.
//!
//! The parallelization opportunities are:
//! - **WOTS+**: the `len` chains of a one-time key are independent
//! - **Tree hashing**: left and right subtrees are independent
//!
//! Without a worker pool (thread mode `Single` or the `parallel` feature
//! disabled) both helpers run on the calling thread in order, so results
//! never depend on the thread mode.

use crate::context::Context;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Apply `op` to every `chunk`-sized piece of `out` along with its index.
pub(crate) fn for_each_chunk<F>(ctx: &Context, out: &mut [u8], chunk: usize, op: F)
where
    F: Fn(usize, &mut [u8]) + Send + Sync,
{
    #[cfg(feature = "parallel")]
    if ctx.is_parallel() {
        ctx.install(|| {
            out.par_chunks_mut(chunk)
                .enumerate()
                .for_each(|(i, piece)| op(i, piece));
        });
        return;
    }

    #[cfg(not(feature = "parallel"))]
    let _ = ctx;

    out.chunks_mut(chunk)
        .enumerate()
        .for_each(|(i, piece)| op(i, piece));
}

/// Evaluate two independent closures, concurrently when a pool exists.
pub(crate) fn join<A, B, RA, RB>(ctx: &Context, a: A, b: B) -> (RA, RB)
where
    A: FnOnce() -> RA + Send,
    B: FnOnce() -> RB + Send,
    RA: Send,
    RB: Send,
{
    #[cfg(feature = "parallel")]
    if ctx.is_parallel() {
        return ctx.install(|| rayon::join(a, b));
    }

    #[cfg(not(feature = "parallel"))]
    let _ = ctx;

    (a(), b())
}
