use std::sync::{Arc, Mutex, RwLock};

use kelpie_common::{Error, Result};

use crate::allocator::{Allocator, PinHandle};

/// 4-byte tail alignment for the meta+data payload (`LDO_ALIGNMENT`).
pub const LDO_ALIGNMENT: usize = 4;

/// The wire header that precedes meta+data on the network and on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct WireHeader {
    pub type_id: u16,
    pub meta_bytes: u32,
    pub data_bytes: u32,
    pub padding: u16,
}

impl WireHeader {
    pub const WIRE_SIZE: usize = 2 + 4 + 4 + 2;

    pub fn to_bytes(&self) -> [u8; Self::WIRE_SIZE] {
        let mut out = [0u8; Self::WIRE_SIZE];
        out[0..2].copy_from_slice(&self.type_id.to_le_bytes());
        out[2..6].copy_from_slice(&self.meta_bytes.to_le_bytes());
        out[6..10].copy_from_slice(&self.data_bytes.to_le_bytes());
        out[10..12].copy_from_slice(&self.padding.to_le_bytes());
        out
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::WIRE_SIZE {
            return Err(Error::invalid_input("wire header truncated"));
        }
        Ok(WireHeader {
            type_id: u16::from_le_bytes(buf[0..2].try_into().unwrap()),
            meta_bytes: u32::from_le_bytes(buf[2..6].try_into().unwrap()),
            data_bytes: u32::from_le_bytes(buf[6..10].try_into().unwrap()),
            padding: u16::from_le_bytes(buf[10..12].try_into().unwrap()),
        })
    }
}

/// Externally owned memory attached to an `Allocation`, with its own pin
/// handle and a cleanup closure run when the allocation's refcount drops to
/// zero.
pub struct UserSegment {
    pub bytes: Vec<u8>,
    pub pin: Option<PinHandle>,
    cleanup: Option<Box<dyn FnOnce() + Send>>,
}

impl UserSegment {
    pub fn new(bytes: Vec<u8>, cleanup: impl FnOnce() + Send + 'static) -> Self {
        UserSegment {
            bytes,
            pin: None,
            cleanup: Some(Box::new(cleanup)),
        }
    }
}

impl Drop for UserSegment {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

impl std::fmt::Debug for UserSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserSegment")
            .field("len", &self.bytes.len())
            .field("pin", &self.pin)
            .finish()
    }
}

/// Which semantic region of an `Allocation` an RDMA descriptor should cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Whole,
    Header,
    Meta,
    Data,
}

/// One RDMA-addressable range the transport can Put/Get against.
#[derive(Debug, Clone, Copy)]
pub struct RdmaSegment {
    pub handle: PinHandle,
    pub offset: usize,
    pub length: usize,
}

/// The backing store for a `DataObject`: a contiguous `[meta][data]` user
/// buffer plus its wire header, guarded by a refcount that is literally the
/// strong count of the `Arc` the `DataObject` wraps.
#[derive(Debug)]
pub struct Allocation {
    allocator: Arc<dyn Allocator>,
    capacity: usize,
    header: Mutex<WireHeader>,
    bytes: RwLock<Vec<u8>>,
    pin: Mutex<Option<PinHandle>>,
    segments: Mutex<Vec<UserSegment>>,
}

impl Allocation {
    pub fn allocate(
        allocator: Arc<dyn Allocator>,
        meta_bytes: u32,
        data_bytes: u32,
        type_id: u16,
    ) -> Result<Self> {
        let requested = meta_bytes as usize + data_bytes as usize;
        let padding = (LDO_ALIGNMENT - (requested % LDO_ALIGNMENT)) % LDO_ALIGNMENT;
        let capacity = requested + padding;
        let bytes = allocator.raw_allocate(capacity)?;
        let pin = if allocator.allocator_type() == crate::allocator::AllocatorType::Eager {
            allocator.pin(&bytes)
        } else {
            None
        };
        Ok(Allocation {
            allocator,
            capacity,
            header: Mutex::new(WireHeader {
                type_id,
                meta_bytes,
                data_bytes,
                padding: padding as u16,
            }),
            bytes: RwLock::new(bytes),
            pin: Mutex::new(pin),
            segments: Mutex::new(Vec::new()),
        })
    }

    pub fn user_capacity(&self) -> usize {
        self.capacity
    }

    pub fn header(&self) -> WireHeader {
        *self.header.lock().unwrap()
    }

    pub fn meta(&self) -> Vec<u8> {
        let header = self.header();
        self.bytes.read().unwrap()[0..header.meta_bytes as usize].to_vec()
    }

    pub fn data(&self) -> Vec<u8> {
        let header = self.header();
        let start = header.meta_bytes as usize;
        let end = start + header.data_bytes as usize;
        self.bytes.read().unwrap()[start..end].to_vec()
    }

    pub fn write_meta(&self, bytes: &[u8]) -> Result<()> {
        let header = self.header();
        if bytes.len() != header.meta_bytes as usize {
            return Err(Error::invalid_input("meta write size mismatch"));
        }
        self.bytes.write().unwrap()[0..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    pub fn write_data(&self, bytes: &[u8]) -> Result<()> {
        let header = self.header();
        if bytes.len() != header.data_bytes as usize {
            return Err(Error::invalid_input("data write size mismatch"));
        }
        let start = header.meta_bytes as usize;
        self.bytes.write().unwrap()[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Resize the meta/data split without reallocating, as long as the new
    /// split still fits the original capacity.
    pub fn modify_user_sizes(&self, meta_bytes: u32, data_bytes: u32) -> Result<()> {
        let requested = meta_bytes as usize + data_bytes as usize;
        if requested > self.capacity {
            return Err(Error::invalid_input(
                "meta+data exceeds allocation capacity",
            ));
        }
        let mut header = self.header.lock().unwrap();
        header.meta_bytes = meta_bytes;
        header.data_bytes = data_bytes;
        header.padding = (self.capacity - requested) as u16;
        Ok(())
    }

    pub fn register_user_segment(&self, segment: UserSegment) {
        self.segments.lock().unwrap().push(segment);
    }

    pub fn get_or_pin(&self) -> PinHandle {
        let mut pin = self.pin.lock().unwrap();
        if let Some(handle) = *pin {
            return handle;
        }
        let handle = self
            .allocator
            .pin(&self.bytes.read().unwrap())
            .unwrap_or(PinHandle(0));
        *pin = Some(handle);
        handle
    }

    pub fn rdma_segments(&self, kind: SegmentKind) -> Vec<RdmaSegment> {
        let handle = self.get_or_pin();
        let header = self.header();
        let range = match kind {
            SegmentKind::Whole => 0..self.capacity,
            SegmentKind::Header => 0..0,
            SegmentKind::Meta => 0..header.meta_bytes as usize,
            SegmentKind::Data => {
                header.meta_bytes as usize
                    ..header.meta_bytes as usize + header.data_bytes as usize
            }
        };
        let mut segments = vec![RdmaSegment {
            handle,
            offset: range.start,
            length: range.end - range.start,
        }];
        for seg in self.segments.lock().unwrap().iter() {
            if let Some(pin) = seg.pin {
                segments.push(RdmaSegment {
                    handle: pin,
                    offset: 0,
                    length: seg.bytes.len(),
                });
            }
        }
        segments
    }

    pub fn to_wire_bytes(&self) -> Vec<u8> {
        let header = self.header();
        let mut out = Vec::with_capacity(WireHeader::WIRE_SIZE + self.capacity);
        out.extend_from_slice(&header.to_bytes());
        out.extend_from_slice(&self.bytes.read().unwrap());
        out.truncate(WireHeader::WIRE_SIZE + header.meta_bytes as usize + header.data_bytes as usize);
        out
    }

    pub fn from_wire_bytes(allocator: Arc<dyn Allocator>, buf: &[u8]) -> Result<Self> {
        let header = WireHeader::from_bytes(buf)?;
        let payload = &buf[WireHeader::WIRE_SIZE..];
        let allocation = Allocation::allocate(allocator, header.meta_bytes, header.data_bytes, header.type_id)?;
        allocation.write_meta(&payload[0..header.meta_bytes as usize])?;
        allocation.write_data(&payload[header.meta_bytes as usize..])?;
        Ok(allocation)
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        if let Some(pin) = self.pin.lock().unwrap().take() {
            self.allocator.unpin(pin);
        }
        self.segments.lock().unwrap().clear();
        let buf = std::mem::take(&mut *self.bytes.write().unwrap());
        self.allocator.free(self.capacity, buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::malloc::MallocAllocator;

    #[test]
    fn alignment_pads_to_four_bytes() {
        let alloc: Arc<dyn Allocator> = Arc::new(MallocAllocator::new());
        let allocation = Allocation::allocate(alloc, 3, 5, 1).unwrap();
        assert_eq!(allocation.user_capacity() % LDO_ALIGNMENT, 0);
        assert_eq!(allocation.user_capacity(), 8);
    }

    #[test]
    fn modify_user_sizes_respects_capacity() {
        let alloc: Arc<dyn Allocator> = Arc::new(MallocAllocator::new());
        let allocation = Allocation::allocate(alloc, 4, 4, 1).unwrap();
        allocation.modify_user_sizes(2, 6).unwrap();
        assert!(allocation.modify_user_sizes(5, 5).is_err());
    }

    #[test]
    fn free_updates_allocator_counters() {
        let alloc: Arc<dyn Allocator> = Arc::new(MallocAllocator::new());
        {
            let _allocation = Allocation::allocate(alloc.clone(), 4, 4, 1).unwrap();
            assert!(alloc.has_active_allocations());
        }
        assert!(!alloc.has_active_allocations());
    }
}
