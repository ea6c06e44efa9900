use std::collections::HashMap;
use std::sync::Mutex;

use kelpie_common::Result;

use crate::allocator::{
    check_not_shutdown, Allocator, AllocatorCounters, AllocatorType, PinFn, PinHandle, UnpinFn,
};

/// Rounds a requested size up to the nearest size class so buffers of
/// similar size can be recycled instead of reallocated.
fn size_class(capacity: usize) -> usize {
    const MIN_CLASS: usize = 256;
    if capacity <= MIN_CLASS {
        return MIN_CLASS;
    }
    capacity.next_power_of_two()
}

/// The page-pooled allocator: buffers are recycled per size class and
/// pinning is deferred until the transport actually asks for an RDMA
/// descriptor (lazy registration).
#[derive(Debug, Default)]
pub struct PooledAllocator {
    counters: AllocatorCounters,
    free_lists: Mutex<HashMap<usize, Vec<Vec<u8>>>>,
    pin_fn: Mutex<Option<PinFn>>,
    unpin_fn: Mutex<Option<UnpinFn>>,
}

impl PooledAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a previously freed buffer to its size class's free list
    /// instead of dropping it, so the next same-class allocation can reuse
    /// the backing memory.
    fn recycle(&self, mut buf: Vec<u8>) {
        let class = size_class(buf.capacity());
        buf.clear();
        self.free_lists
            .lock()
            .unwrap()
            .entry(class)
            .or_default()
            .push(buf);
    }
}

impl Allocator for PooledAllocator {
    fn allocator_type(&self) -> AllocatorType {
        AllocatorType::Lazy
    }

    fn raw_allocate(&self, user_capacity: usize) -> Result<Vec<u8>> {
        check_not_shutdown(&self.counters)?;
        let class = size_class(user_capacity);
        let mut buf = self
            .free_lists
            .lock()
            .unwrap()
            .get_mut(&class)
            .and_then(Vec::pop)
            .unwrap_or_else(|| Vec::with_capacity(class));
        buf.resize(user_capacity, 0);
        self.counters.record_alloc(user_capacity);
        Ok(buf)
    }

    fn counters(&self) -> &AllocatorCounters {
        &self.counters
    }

    fn register_pin_unpin(&self, pin: PinFn, unpin: UnpinFn) {
        *self.pin_fn.lock().unwrap() = Some(pin);
        *self.unpin_fn.lock().unwrap() = Some(unpin);
    }

    fn pin(&self, bytes: &[u8]) -> Option<PinHandle> {
        self.pin_fn.lock().unwrap().as_ref().map(|f| f(bytes))
    }

    fn unpin(&self, handle: PinHandle) {
        if let Some(f) = self.unpin_fn.lock().unwrap().as_ref() {
            f(handle)
        }
    }

    fn free(&self, user_capacity: usize, buf: Vec<u8>) {
        self.counters.record_free(user_capacity);
        self.recycle(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recycled_buffer_is_reused() {
        let alloc = PooledAllocator::new();
        let buf = alloc.raw_allocate(300).unwrap();
        let cap = buf.capacity();
        Allocator::free(&alloc, 300, buf);
        let buf2 = alloc.raw_allocate(300).unwrap();
        assert_eq!(buf2.capacity(), cap);
    }

    #[test]
    fn size_classes_bucket_similar_requests() {
        assert_eq!(size_class(10), 256);
        assert_eq!(size_class(300), 512);
        assert_eq!(size_class(1024), 1024);
    }
}
