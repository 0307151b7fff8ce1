//! Execution context: pooled digests, scratch buffers and the worker pool.
//!
//! One context backs one digest of one engine. Every primitive borrows a
//! digest from the context through a [`Pooled`] guard, which resets the
//! object and returns it to the free list when dropped, so early returns and
//! unwinding panics cannot leak pool entries.

use crate::hash::{HashType, Hasher};
use crate::params::{Params, WotsParams};
use core::ops::{Deref, DerefMut};
use parking_lot::Mutex;
use quill_core::{Result, Zeroize};
use std::sync::atomic::{AtomicUsize, Ordering};
#[cfg(feature = "parallel")]
use std::sync::Arc;

/// Objects that can be returned to a [`Pool`].
pub trait Recycle {
    /// Clear any state left by the previous user.
    fn recycle(&mut self);
}

impl Recycle for Hasher {
    fn recycle(&mut self) {
        self.reset();
    }
}

impl Recycle for Vec<u8> {
    fn recycle(&mut self) {
        // Scratch buffers may have held secret chain values.
        self.zeroize();
    }
}

/// Mutex-guarded free list of reusable objects.
pub struct Pool<T> {
    free: Mutex<Vec<T>>,
    create: Box<dyn Fn() -> T + Send + Sync>,
    created: AtomicUsize,
}

impl<T: Recycle> Pool<T> {
    /// Empty pool creating new objects with `create`.
    pub fn new(create: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            create: Box::new(create),
            created: AtomicUsize::new(0),
        }
    }

    /// Take an object from the free list, creating one if it is empty.
    pub fn acquire(&self) -> Pooled<'_, T> {
        let item = self.free.lock().pop().unwrap_or_else(|| {
            self.created.fetch_add(1, Ordering::Relaxed);
            (self.create)()
        });
        Pooled {
            pool: self,
            item: Some(item),
        }
    }

    /// Objects currently on the free list.
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }

    /// Objects created over the pool's lifetime.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    fn release(&self, mut item: T) {
        item.recycle();
        self.free.lock().push(item);
    }
}

impl<T> core::fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Pool")
            .field("idle", &self.free.lock().len())
            .field("created", &self.created.load(Ordering::Relaxed))
            .finish()
    }
}

/// Borrowed pool object, returned on drop.
pub struct Pooled<'a, T: Recycle> {
    pool: &'a Pool<T>,
    item: Option<T>,
}

impl<T: Recycle> Deref for Pooled<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.item {
            Some(item) => item,
            None => unreachable!("pooled object used after release"),
        }
    }
}

impl<T: Recycle> DerefMut for Pooled<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.item {
            Some(item) => item,
            None => unreachable!("pooled object used after release"),
        }
    }
}

impl<T: Recycle> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool.release(item);
        }
    }
}

#[cfg(feature = "parallel")]
type Workers = Option<Arc<rayon::ThreadPool>>;
#[cfg(not(feature = "parallel"))]
type Workers = ();

/// Shared state of one engine under one digest.
pub struct Context {
    params: Params,
    hash: HashType,
    wots: WotsParams,
    hashers: Pool<Hasher>,
    buffers: Pool<Vec<u8>>,
    workers: Workers,
}

impl Context {
    /// Context for the primary digest of `params`.
    pub fn new(params: Params) -> Result<Self> {
        params.validate()?;
        let workers = build_workers(&params)?;
        Ok(Self::assemble(params, params.hash, workers))
    }

    /// Context for another digest sharing this context's worker pool.
    #[must_use]
    pub fn with_digest(&self, hash: HashType) -> Self {
        Self::assemble(self.params, hash, self.workers.clone())
    }

    fn assemble(params: Params, hash: HashType, workers: Workers) -> Self {
        let n = hash.output_size();
        Self {
            params,
            hash,
            wots: WotsParams::new(n, params.winternitz),
            hashers: Pool::new(move || hash.hasher()),
            buffers: Pool::new(move || Vec::with_capacity(2 * n)),
            workers,
        }
    }

    /// Engine parameters.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Digest of this context.
    pub fn hash(&self) -> HashType {
        self.hash
    }

    /// Digest size `n`.
    pub fn n(&self) -> usize {
        self.wots.n
    }

    /// WOTS+ lengths for this digest.
    pub fn wots(&self) -> &WotsParams {
        &self.wots
    }

    /// Borrow a digest instance.
    pub fn hasher(&self) -> Pooled<'_, Hasher> {
        self.hashers.acquire()
    }

    /// Borrow an empty scratch buffer.
    pub fn scratch(&self) -> Pooled<'_, Vec<u8>> {
        self.buffers.acquire()
    }

    /// Digest pool, for diagnostics.
    pub fn hasher_pool(&self) -> &Pool<Hasher> {
        &self.hashers
    }

    /// Whether work is fanned out across a worker pool.
    pub fn is_parallel(&self) -> bool {
        #[cfg(feature = "parallel")]
        {
            self.workers.is_some()
        }
        #[cfg(not(feature = "parallel"))]
        {
            false
        }
    }

    /// Run `op` inside the worker pool, or inline without one.
    pub fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        #[cfg(feature = "parallel")]
        if let Some(workers) = &self.workers {
            return workers.install(op);
        }
        op()
    }
}

impl core::fmt::Debug for Context {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Context")
            .field("hash", &self.hash)
            .field("n", &self.wots.n)
            .field("parallel", &self.is_parallel())
            .finish_non_exhaustive()
    }
}

#[cfg(not(feature = "parallel"))]
#[allow(clippy::unnecessary_wraps)]
fn build_workers(_params: &Params) -> Result<Workers> {
    Ok(())
}

#[cfg(feature = "parallel")]
fn build_workers(params: &Params) -> Result<Workers> {
    use crate::params::ThreadMode;
    use quill_core::Error;

    if params.threads == ThreadMode::Single {
        return Ok(None);
    }
    let threads = params.threads.worker_count(num_cpus::get());
    tracing::debug!(threads, mode = ?params.threads, "building worker pool");
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("quill-worker-{i}"))
        .build()
        .map(|pool| Some(Arc::new(pool)))
        .map_err(|_| Error::ThreadPool)
}
