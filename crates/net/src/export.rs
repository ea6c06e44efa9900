use std::collections::HashMap;
use std::sync::Mutex;

use kelpie_common::NodeId;
use kelpie_lunasa::DataObject;

/// Per-node table of objects a target has exposed for a pull (RDMA Get) by
/// the origin, or a staging slot for a push (RDMA Put) from the origin. The
/// real transport would hand out a registered-memory descriptor instead;
/// since the loopback transport runs in a single process it can just share
/// the `DataObject` by `Arc` and call it a day.
#[derive(Debug, Default)]
pub struct ExportTable {
    inner: Mutex<HashMap<(NodeId, u64), DataObject>>,
}

impl ExportTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expose(&self, owner: NodeId, export_id: u64, object: DataObject) {
        self.inner.lock().unwrap().insert((owner, export_id), object);
    }

    pub fn take(&self, owner: NodeId, export_id: u64) -> Option<DataObject> {
        self.inner.lock().unwrap().remove(&(owner, export_id))
    }

    pub fn peek(&self, owner: NodeId, export_id: u64) -> Option<DataObject> {
        self.inner.lock().unwrap().get(&(owner, export_id)).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kelpie_lunasa::{Allocator, MallocAllocator};
    use std::sync::Arc;

    #[test]
    fn expose_then_take_round_trips() {
        let table = ExportTable::new();
        let allocator: Arc<dyn Allocator> = Arc::new(MallocAllocator::new());
        let obj = DataObject::allocate(allocator, 0, 4, 1).unwrap();
        table.expose(NodeId::from_raw(1), 42, obj.clone());
        let taken = table.take(NodeId::from_raw(1), 42).unwrap();
        assert!(taken.deep_compare(&obj));
        assert!(table.take(NodeId::from_raw(1), 42).is_none());
    }
}
