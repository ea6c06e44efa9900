use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use kelpie_common::{NodeId, Result};
use kelpie_lunasa::DataObject;
use kelpie_net::{Message, Transport};

/// Everything an [`crate::Op`] needs to perform IO while it's being driven:
/// the transport, this process's own node id, and a shared mailbox counter
/// for ops that need to mint a nested mailbox of their own.
pub struct OpContext<T: Transport> {
    transport: Arc<T>,
    mailbox_counter: Arc<AtomicU64>,
}

impl<T: Transport> OpContext<T> {
    pub(crate) fn new(transport: Arc<T>, mailbox_counter: Arc<AtomicU64>) -> Self {
        OpContext {
            transport,
            mailbox_counter,
        }
    }

    pub fn my_node(&self) -> NodeId {
        self.transport.my_node()
    }

    pub fn new_mailbox(&self) -> u64 {
        self.mailbox_counter.fetch_add(1, Ordering::SeqCst)
    }

    pub async fn send_msg(&self, dst: NodeId, message: Message) -> Result<()> {
        self.transport.send_msg(dst, message).await
    }

    pub fn expose(&self, export_id: u64, object: DataObject) {
        self.transport.expose(export_id, object)
    }

    pub async fn rdma_get(&self, owner: NodeId, export_id: u64) -> Result<DataObject> {
        self.transport.rdma_get(owner, export_id).await
    }

    pub async fn rdma_put(&self, dst: NodeId, export_id: u64, object: DataObject) -> Result<()> {
        self.transport.rdma_put(dst, export_id, object).await
    }

    pub fn take_pushed(&self, export_id: u64) -> Option<DataObject> {
        self.transport.take_pushed(export_id)
    }
}

impl<T: Transport> Clone for OpContext<T> {
    fn clone(&self) -> Self {
        OpContext {
            transport: self.transport.clone(),
            mailbox_counter: self.mailbox_counter.clone(),
        }
    }
}
