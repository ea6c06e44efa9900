use std::sync::Mutex;

use kelpie_common::Result;

use crate::allocator::{
    check_not_shutdown, Allocator, AllocatorCounters, AllocatorType, PinFn, PinHandle, UnpinFn,
};

/// The plain allocator: every request goes straight to the platform
/// allocator and, since it's eager, is pinned immediately.
#[derive(Debug, Default)]
pub struct MallocAllocator {
    counters: AllocatorCounters,
    pin_fn: Mutex<Option<PinFn>>,
    unpin_fn: Mutex<Option<UnpinFn>>,
}

impl MallocAllocator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Allocator for MallocAllocator {
    fn allocator_type(&self) -> AllocatorType {
        AllocatorType::Eager
    }

    fn raw_allocate(&self, user_capacity: usize) -> Result<Vec<u8>> {
        check_not_shutdown(&self.counters)?;
        let buf = vec![0u8; user_capacity];
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_rejects_new_allocations() {
        let alloc = MallocAllocator::new();
        alloc.raw_allocate(16).unwrap();
        alloc.shutdown();
        assert!(alloc.raw_allocate(16).is_err());
        assert!(alloc.has_active_allocations());
    }

    #[test]
    fn counters_track_allocated_bytes() {
        let alloc = MallocAllocator::new();
        alloc.raw_allocate(100).unwrap();
        alloc.raw_allocate(50).unwrap();
        assert_eq!(alloc.total_allocated(), 150);
        assert_eq!(alloc.total_used(), 150);
    }
}
