use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use kelpie_common::{Error, Result};

/// Opaque handle produced by pinning a region for RDMA. The real transport
/// would hand back a registered-memory descriptor here; in this core it's a
/// synthetic counter, enough for the loopback transport to address memory by
/// identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinHandle(pub u64);

pub type PinFn = Arc<dyn Fn(&[u8]) -> PinHandle + Send + Sync>;
pub type UnpinFn = Arc<dyn Fn(PinHandle) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocatorType {
    Eager,
    Lazy,
}

impl fmt::Display for AllocatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocatorType::Eager => write!(f, "eager"),
            AllocatorType::Lazy => write!(f, "lazy"),
        }
    }
}

/// Shared bookkeeping every allocator implementation can embed: live byte
/// counters and the shutdown latch described in §4.1 ("after decrefing the
/// allocator itself to zero while allocations are live, mark shutdown").
#[derive(Debug, Default)]
pub struct AllocatorCounters {
    total_allocated: AtomicUsize,
    total_used: AtomicUsize,
    live_allocations: AtomicUsize,
    shut_down: AtomicBool,
}

impl AllocatorCounters {
    pub fn record_alloc(&self, bytes: usize) {
        self.total_allocated.fetch_add(bytes, Ordering::SeqCst);
        self.total_used.fetch_add(bytes, Ordering::SeqCst);
        self.live_allocations.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_free(&self, bytes: usize) {
        self.total_used.fetch_sub(bytes, Ordering::SeqCst);
        self.live_allocations.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn total_allocated(&self) -> usize {
        self.total_allocated.load(Ordering::SeqCst)
    }

    pub fn total_used(&self) -> usize {
        self.total_used.load(Ordering::SeqCst)
    }

    pub fn has_active_allocations(&self) -> bool {
        self.live_allocations.load(Ordering::SeqCst) > 0
    }

    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

/// A memory pool that hands out [`crate::Allocation`]s. Two implementations
/// are required: a plain pass-through allocator (`MallocAllocator`, eager
/// pinning) and a page-pooled allocator (`PooledAllocator`, lazy pinning) for
/// high-frequency fixed-size traffic.
pub trait Allocator: Send + Sync + fmt::Debug {
    fn allocator_type(&self) -> AllocatorType;

    /// Reserve `user_capacity` bytes. Fails with `Error::Unavailable` once
    /// the allocator has been shut down.
    fn raw_allocate(&self, user_capacity: usize) -> Result<Vec<u8>>;

    fn counters(&self) -> &AllocatorCounters;

    fn register_pin_unpin(&self, pin: PinFn, unpin: UnpinFn);

    fn pin(&self, bytes: &[u8]) -> Option<PinHandle>;
    fn unpin(&self, handle: PinHandle);

    fn total_allocated(&self) -> usize {
        self.counters().total_allocated()
    }

    fn total_used(&self) -> usize {
        self.counters().total_used()
    }

    /// Release `user_capacity` bytes back to the allocator's bookkeeping and
    /// hand the backing buffer back, so a pooling allocator can recycle it
    /// instead of letting it drop. Called once, from `Allocation`'s `Drop`.
    /// The default just updates the counters and drops `buf`, which is the
    /// right behavior for a plain pass-through allocator.
    fn free(&self, user_capacity: usize, buf: Vec<u8>) {
        let _ = buf;
        self.counters().record_free(user_capacity);
    }

    fn has_active_allocations(&self) -> bool {
        self.counters().has_active_allocations()
    }

    /// Stop accepting new allocations. Existing `Allocation`s keep the
    /// allocator alive (each holds an `Arc<dyn Allocator>`) until the last
    /// one drops.
    fn shutdown(&self) {
        self.counters().shutdown();
    }

    fn is_shutdown(&self) -> bool {
        self.counters().is_shutdown()
    }

    fn sanity_check(&self) -> Result<()> {
        if self.counters().total_used() > self.counters().total_allocated() {
            return Err(Error::fatal("allocator used-bytes exceeds allocated-bytes"));
        }
        Ok(())
    }
}

pub(crate) fn check_not_shutdown(counters: &AllocatorCounters) -> Result<()> {
    if counters.is_shutdown() {
        return Err(Error::unavailable("allocator has been shut down"));
    }
    Ok(())
}
