use std::fs;
use std::path::Path;
use std::sync::Arc;

use kelpie_common::{Error, Result};

use crate::allocation::{Allocation, UserSegment};
use crate::allocator::Allocator;

/// Lunasa DataObject: a refcounted handle over an [`Allocation`]. Cloning is
/// the shallow copy the spec describes — it's exactly `Arc::clone`, so
/// `refcount()` (the strong count) behaves precisely per the invariants in
/// §8: after `k = o.clone()`, `refcount() == 2`.
#[derive(Debug, Clone)]
pub struct DataObject(Arc<Allocation>);

impl DataObject {
    pub fn allocate(
        allocator: Arc<dyn Allocator>,
        meta_bytes: u32,
        data_bytes: u32,
        type_id: u16,
    ) -> Result<Self> {
        if meta_bytes == 0 && data_bytes == 0 {
            tracing::trace!("allocating zero-sized DataObject");
        }
        let allocation = Allocation::allocate(allocator, meta_bytes, data_bytes, type_id)?;
        Ok(DataObject(Arc::new(allocation)))
    }

    pub fn refcount(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub fn user_capacity(&self) -> usize {
        self.0.user_capacity()
    }

    pub fn meta_bytes(&self) -> u32 {
        self.0.header().meta_bytes
    }

    pub fn data_bytes(&self) -> u32 {
        self.0.header().data_bytes
    }

    pub fn type_id(&self) -> u16 {
        self.0.header().type_id
    }

    pub fn meta(&self) -> Vec<u8> {
        self.0.meta()
    }

    pub fn data(&self) -> Vec<u8> {
        self.0.data()
    }

    pub fn write_meta(&self, bytes: &[u8]) -> Result<()> {
        self.0.write_meta(bytes)
    }

    pub fn write_data(&self, bytes: &[u8]) -> Result<()> {
        self.0.write_data(bytes)
    }

    pub fn modify_user_sizes(&self, meta_bytes: u32, data_bytes: u32) -> Result<()> {
        self.0.modify_user_sizes(meta_bytes, data_bytes)
    }

    pub fn register_user_segment(&self, segment: UserSegment) {
        self.0.register_user_segment(segment)
    }

    pub fn rdma_segments(&self, kind: crate::allocation::SegmentKind) -> Vec<crate::allocation::RdmaSegment> {
        self.0.rdma_segments(kind)
    }

    /// Byte-for-byte comparison of meta+data, ignoring type tag and padding.
    /// The idiomatic stand-in for the source's `DeepCompare`.
    pub fn deep_compare(&self, other: &DataObject) -> bool {
        self.meta() == other.meta() && self.data() == other.data()
    }

    /// A true copy: duplicates meta+data into a freshly allocated object on
    /// the same allocator. Unlike `clone`, user segments are not carried
    /// over.
    pub fn deep_copy(&self, allocator: Arc<dyn Allocator>) -> Result<DataObject> {
        let copy = DataObject::allocate(allocator, self.meta_bytes(), self.data_bytes(), self.type_id())?;
        copy.write_meta(&self.meta())?;
        copy.write_data(&self.data())?;
        Ok(copy)
    }

    pub fn to_wire_bytes(&self) -> Vec<u8> {
        self.0.to_wire_bytes()
    }

    pub fn from_wire_bytes(allocator: Arc<dyn Allocator>, buf: &[u8]) -> Result<Self> {
        Ok(DataObject(Arc::new(Allocation::from_wire_bytes(
            allocator, buf,
        )?)))
    }

    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_wire_bytes()).map_err(|e| Error::internal(WrapIo(e)))
    }

    pub fn load_from_file(allocator: Arc<dyn Allocator>, path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| Error::internal(WrapIo(e)))?;
        DataObject::from_wire_bytes(allocator, &bytes)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("io error: {0}")]
struct WrapIo(std::io::Error);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::malloc::MallocAllocator;

    fn allocator() -> Arc<dyn Allocator> {
        Arc::new(MallocAllocator::new())
    }

    #[test]
    fn shallow_copy_bumps_refcount() {
        let o = DataObject::allocate(allocator(), 0, 4, 1).unwrap();
        assert_eq!(o.refcount(), 1);
        let k = o.clone();
        assert_eq!(o.refcount(), 2);
        drop(k);
        assert_eq!(o.refcount(), 1);
    }

    #[test]
    fn deep_compare_matches_identical_payloads() {
        let o = DataObject::allocate(allocator(), 0, 8, 1).unwrap();
        o.write_data(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        let copy = o.deep_copy(allocator()).unwrap();
        assert!(o.deep_compare(&copy));
    }

    #[test]
    fn snapshot_round_trip_preserves_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.ldo");
        let o = DataObject::allocate(allocator(), 8, 1024, 42).unwrap();
        let meta: Vec<u8> = (0..8).collect();
        let data: Vec<u8> = (0..1024).map(|i| (i % 251) as u8).collect();
        o.write_meta(&meta).unwrap();
        o.write_data(&data).unwrap();
        o.write_to_file(&path).unwrap();

        let loaded = DataObject::load_from_file(allocator(), &path).unwrap();
        assert_eq!(loaded.type_id(), 42);
        assert_eq!(loaded.meta(), meta);
        assert_eq!(loaded.data(), data);
    }

    #[test]
    fn single_node_payload_round_trips() {
        let payload: Vec<u8> = (0..4096u32).map(|i| 0x30 + (i % 26) as u8).collect();
        let o = DataObject::allocate(allocator(), 0, 4096, 0).unwrap();
        o.write_data(&payload).unwrap();
        assert_eq!(o.data_bytes(), 4096);
        assert_eq!(o.data(), payload);
    }
}
