use std::sync::Arc;

use kelpie_lunasa::{Allocator, DataObject};

/// A byte buffer filled by `fill(i)`, the shape every deterministic-payload
/// scenario in §8 wants (e.g. `0x30 + i mod 26`) without committing to one
/// fixed pattern.
pub fn filled_payload(len: usize, fill: impl Fn(usize) -> u8) -> Vec<u8> {
    (0..len).map(fill).collect()
}

/// `0x30 + i mod 26`, the pattern the single-node publish/need scenario asks
/// for.
pub fn ascii_cycle_payload(len: usize) -> Vec<u8> {
    filled_payload(len, |i| 0x30 + (i % 26) as u8)
}

/// Allocate an LDO with no meta and `data` as its payload.
pub fn make_ldo(allocator: &Arc<dyn Allocator>, data: &[u8]) -> DataObject {
    make_ldo_with_meta(allocator, &[], data)
}

/// Allocate an LDO with both regions populated, for the meta/data layout
/// invariants in §8.
pub fn make_ldo_with_meta(allocator: &Arc<dyn Allocator>, meta: &[u8], data: &[u8]) -> DataObject {
    let ldo = DataObject::allocate(allocator.clone(), meta.len() as u32, data.len() as u32, 0)
        .expect("test fixture allocation should not fail");
    if !meta.is_empty() {
        ldo.write_meta(meta).expect("test fixture meta write should not fail");
    }
    ldo.write_data(data).expect("test fixture data write should not fail");
    ldo
}

#[cfg(test)]
mod tests {
    use super::*;
    use kelpie_lunasa::MallocAllocator;

    #[test]
    fn ascii_cycle_wraps_at_26() {
        let payload = ascii_cycle_payload(30);
        assert_eq!(payload[0], b'0');
        assert_eq!(payload[26], b'0');
    }

    #[test]
    fn make_ldo_round_trips_bytes() {
        let allocator: Arc<dyn Allocator> = Arc::new(MallocAllocator::new());
        let ldo = make_ldo(&allocator, b"hello");
        assert_eq!(ldo.data(), b"hello");
    }
}
