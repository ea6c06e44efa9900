use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use kelpie_common::{Error, NodeId, Result};
use kelpie_lunasa::DataObject;

use crate::export::ExportTable;
use crate::message::Message;
use crate::transport::Transport;

/// Shared switchboard for every [`LoopbackTransport`] in a process: a
/// registry of per-node inboxes plus the export tables `rdma_get`/`rdma_put`
/// use to simulate RDMA without real hardware. This is what `kelpie.type =
/// nonet` wires up.
#[derive(Debug, Default)]
pub struct LoopbackNetwork {
    senders: Mutex<HashMap<NodeId, mpsc::UnboundedSender<Message>>>,
    exports: ExportTable,
    pushes: Mutex<HashMap<(NodeId, u64), DataObject>>,
}

impl LoopbackNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `node` on the network, returning its transport handle and
    /// the receiver its Op runtime should drain in a `recv_loop`.
    pub fn join(self: &Arc<Self>, node: NodeId) -> (LoopbackTransport, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().unwrap().insert(node, tx);
        (
            LoopbackTransport {
                network: self.clone(),
                my_node: node,
            },
            rx,
        )
    }
}

#[derive(Debug, Clone)]
pub struct LoopbackTransport {
    network: Arc<LoopbackNetwork>,
    my_node: NodeId,
}

impl Transport for LoopbackTransport {
    async fn send_msg(&self, dst: NodeId, message: Message) -> Result<()> {
        let sender = self
            .network
            .senders
            .lock()
            .unwrap()
            .get(&dst)
            .cloned()
            .ok_or_else(|| Error::communication(format!("no such node on loopback network: {dst}")))?;
        sender
            .send(message)
            .map_err(|_| Error::communication(format!("peer {dst} has disconnected")))
    }

    fn expose(&self, export_id: u64, object: DataObject) {
        self.network.exports.expose(self.my_node, export_id, object);
    }

    async fn rdma_get(&self, owner: NodeId, export_id: u64) -> Result<DataObject> {
        let object = self.network.exports.take(owner, export_id).ok_or_else(|| {
            Error::communication(format!("no object exposed at {owner}:{export_id}"))
        })?;
        tracing::debug!(%owner, export_id, bytes = object.data_bytes(), "rdma_get");
        Ok(object)
    }

    async fn rdma_put(&self, dst: NodeId, export_id: u64, object: DataObject) -> Result<()> {
        self.network
            .pushes
            .lock()
            .unwrap()
            .insert((dst, export_id), object);
        Ok(())
    }

    fn take_pushed(&self, export_id: u64) -> Option<DataObject> {
        self.network
            .pushes
            .lock()
            .unwrap()
            .remove(&(self.my_node, export_id))
    }

    fn my_node(&self) -> NodeId {
        self.my_node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Message, MessageHeader};
    use kelpie_lunasa::{Allocator, MallocAllocator};
    use std::sync::Arc as StdArc;

    #[tokio::test]
    async fn send_msg_delivers_to_registered_node() {
        let network = LoopbackNetwork::new();
        let a = NodeId::from_raw(1);
        let b = NodeId::from_raw(2);
        let (transport_a, _rx_a) = network.join(a);
        let (_transport_b, mut rx_b) = network.join(b);

        let msg = Message::new(
            MessageHeader {
                src: a,
                dst: b,
                src_mailbox: 1,
                dst_mailbox: 0,
                op_id: 1,
                body_len: 0,
                user_flags: 0,
                hdr_flags: 0,
            },
            b"hi".to_vec(),
        );
        transport_a.send_msg(b, msg).await.unwrap();
        let received = rx_b.recv().await.unwrap();
        assert_eq!(received.body_str(), Some("hi"));
    }

    #[tokio::test]
    async fn send_msg_to_unknown_node_fails() {
        let network = LoopbackNetwork::new();
        let (transport, _rx) = network.join(NodeId::from_raw(1));
        let msg = Message::allocate_string_request(NodeId::from_raw(1), NodeId::from_raw(9), 1, 1, 0, "x");
        assert!(transport.send_msg(NodeId::from_raw(9), msg).await.is_err());
    }

    #[tokio::test]
    async fn rdma_get_pulls_exposed_object() {
        let network = LoopbackNetwork::new();
        let (transport, _rx) = network.join(NodeId::from_raw(1));
        let allocator: StdArc<dyn Allocator> = StdArc::new(MallocAllocator::new());
        let obj = DataObject::allocate(allocator, 0, 4, 1).unwrap();
        obj.write_data(&[9, 9, 9, 9]).unwrap();
        transport.expose(7, obj.clone());

        let pulled = transport.rdma_get(NodeId::from_raw(1), 7).await.unwrap();
        assert!(pulled.deep_compare(&obj));
    }
}
