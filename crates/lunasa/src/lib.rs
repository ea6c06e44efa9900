//! Reference-counted, optionally RDMA-pinned buffers (`faodel-lunasa`).
//!
//! [`DataObject`] is the handle applications hold; [`Allocation`] is the
//! backing store it shares by `Arc`. Two [`Allocator`] implementations are
//! provided: [`MallocAllocator`] (eager pinning) and [`PooledAllocator`]
//! (lazy pinning, size-classed recycling).

pub mod allocation;
pub mod allocator;
pub mod data_object;
pub mod malloc;
pub mod pooled;

pub use allocation::{Allocation, RdmaSegment, SegmentKind, UserSegment, WireHeader, LDO_ALIGNMENT};
pub use allocator::{Allocator, AllocatorType, PinFn, PinHandle, UnpinFn};
pub use data_object::DataObject;
pub use malloc::MallocAllocator;
pub use pooled::PooledAllocator;
