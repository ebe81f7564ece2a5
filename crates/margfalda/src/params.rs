//! Thread identity and the coordination primitives borrowed from the host.
//!
//! The crate owns no threads. A fixed pool of `nth` workers, each knowing
//! its index `ith`, enters [`crate::matmul`] concurrently; the pool hands
//! the kernels a barrier and one shared atomic job counter and nothing
//! else.

/// Coordination surface the host's thread pool must provide.
///
/// The counter is the authoritative next-job token for the floating-point
/// scheduler. `chunk_set` must be visible to every worker that later exits
/// the same [`barrier`](Threadpool::barrier) call, and `chunk_add` must be
/// a sequentially-consistent fetch-add: relaxed ordering is not enough,
/// because each worker's first tile depends on observing the reset.
pub trait Threadpool: Sync {
    /// Blocks until all `nth` workers of the current invocation arrive.
    fn barrier(&self);

    /// Stores `value` to the shared job counter.
    fn chunk_set(&self, value: usize);

    /// Atomically adds `delta` to the shared job counter and returns the
    /// previous value.
    fn chunk_add(&self, delta: usize) -> usize;
}

/// Per-worker call parameters: thread identity plus the borrowed pool.
pub struct MatmulParams<'a, P: Threadpool> {
    /// This worker's index, in `[0, nth)`.
    pub ith: usize,
    /// Number of workers entering the call.
    pub nth: usize,
    /// The host's pool, shared by all `nth` workers.
    pub pool: &'a P,
}
