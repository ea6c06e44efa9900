use kelpie_common::{NodeId, Result};
use kelpie_lunasa::DataObject;

use crate::message::Message;

/// What a send/receive callback is told, tagged the way the spec's
/// `OpArgs` is: an incoming message, or the outcome of an earlier send.
#[derive(Debug, Clone)]
pub enum OpArgs {
    /// Fed to a freshly launched origin op to kick off its state machine.
    Start,
    IncomingMessage(Message),
    SendSuccess { mailbox: u64 },
    SendFailure { mailbox: u64, reason: String },
    RdmaComplete { mailbox: u64 },
}

/// The message/RDMA surface the Op runtime consumes. `Connect`/`GetRdmaPtr`
/// from the distilled spec are folded into `rdma_get`/`rdma_put`, which take
/// an export id instead of a raw descriptor — see [`crate::export::ExportTable`]
/// for why that's the right shape for an in-process reference transport.
#[trait_variant::make(Send)]
pub trait Transport: Send + Sync {
    /// Deliver `message` to `dst`. Resolves once the transport has handed
    /// the message off; delivery itself happens on the receiver's
    /// `recv_loop`.
    async fn send_msg(&self, dst: NodeId, message: Message) -> Result<()>;

    /// Make `object` available for the peer identified by `(self.my_node(),
    /// export_id)` to pull with `rdma_get`.
    fn expose(&self, export_id: u64, object: DataObject);

    /// Pull a previously exposed object from `owner`.
    async fn rdma_get(&self, owner: NodeId, export_id: u64) -> Result<DataObject>;

    /// Push `object` into `dst`'s bounce slot at `export_id`, for the target
    /// to pick up with `take_pushed`.
    async fn rdma_put(&self, dst: NodeId, export_id: u64, object: DataObject) -> Result<()>;

    fn take_pushed(&self, export_id: u64) -> Option<DataObject>;

    fn my_node(&self) -> NodeId;
}
