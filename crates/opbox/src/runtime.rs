use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::RwLock;

use kelpie_common::{Error, NodeId, Result};
use kelpie_lunasa::DataObject;
use kelpie_net::{Message, OpArgs, Transport};

use crate::context::OpContext;
use crate::op::{Op, OpFactory};
use crate::waiting::WaitingType;

type TargetKey = (NodeId, u64);

/// The Op runtime: a registry of op factories keyed by opcode, plus two
/// mailbox tables (one for ops this process launched, one for ops this
/// process is the target of). Each mailbox is driven single-threaded — the
/// `AsyncMutex` wrapping each op entry is held for the duration of one
/// `update_*` call, so a second message for the same mailbox queues behind
/// it rather than racing it.
pub struct OpRuntime<T: Transport> {
    transport: Arc<T>,
    mailbox_counter: Arc<AtomicU64>,
    started: AtomicBool,
    factories: RwLock<HashMap<u32, (String, OpFactory<T>)>>,
    origin_mailboxes: RwLock<HashMap<u64, Arc<AsyncMutex<Box<dyn Op<T>>>>>>,
    target_mailboxes: RwLock<HashMap<TargetKey, Arc<AsyncMutex<Box<dyn Op<T>>>>>>,
}

impl<T: Transport + 'static> OpRuntime<T> {
    pub fn new(transport: Arc<T>) -> Arc<Self> {
        Arc::new(OpRuntime {
            transport,
            mailbox_counter: Arc::new(AtomicU64::new(1)),
            started: AtomicBool::new(false),
            factories: RwLock::new(HashMap::new()),
            origin_mailboxes: RwLock::new(HashMap::new()),
            target_mailboxes: RwLock::new(HashMap::new()),
        })
    }

    fn ctx(&self) -> OpContext<T> {
        OpContext::new(self.transport.clone(), self.mailbox_counter.clone())
    }

    pub fn my_node(&self) -> NodeId {
        self.transport.my_node()
    }

    pub async fn register_op(&self, opcode: u32, name: &str, factory: OpFactory<T>) -> Result<()> {
        if self.started.load(Ordering::SeqCst) {
            return Err(Error::unavailable("cannot register an op after Start"));
        }
        let mut factories = self.factories.write().await;
        if factories.contains_key(&opcode) {
            return Err(Error::already_exists(format!(
                "op opcode {opcode} ({name}) already registered"
            )));
        }
        factories.insert(opcode, (name.to_string(), factory));
        Ok(())
    }

    pub async fn deregister_op(&self, opcode: u32, ignore_lock_warning: bool) {
        let mut factories = self.factories.write().await;
        if factories.remove(&opcode).is_none() && !ignore_lock_warning {
            tracing::warn!(opcode, "deregister_op: opcode was not registered");
        }
    }

    pub fn start(&self) {
        self.started.store(true, Ordering::SeqCst);
    }

    pub fn new_mailbox(&self) -> u64 {
        self.mailbox_counter.fetch_add(1, Ordering::SeqCst)
    }

    /// Expose an object for a peer to pull via `rdma_get`, ahead of
    /// launching an op that tells that peer the export id to ask for. Used
    /// by callers that need to set up the export before an op exists to hand
    /// them an [`crate::context::OpContext`].
    pub fn expose(&self, export_id: u64, object: DataObject) {
        self.transport.expose(export_id, object)
    }

    /// Transfer ownership of `op` to the runtime and drive its first
    /// `update_origin(Start)`. Returns the mailbox the caller should use
    /// with [`Self::trigger_origin`] for any further external completions.
    pub async fn launch_op(self: &Arc<Self>, mut op: Box<dyn Op<T>>) -> Result<u64> {
        let mailbox = self.new_mailbox();
        op.assign_mailbox(mailbox);
        let ctx = self.ctx();
        match op.update_origin(&ctx, OpArgs::Start).await? {
            WaitingType::WaitingOnCq => {
                self.origin_mailboxes
                    .write()
                    .await
                    .insert(mailbox, Arc::new(AsyncMutex::new(op)));
            }
            WaitingType::DoneAndDestroy => {}
            WaitingType::Error => {
                tracing::debug!(mailbox, "launch_op: op errored on Start");
            }
        }
        Ok(mailbox)
    }

    /// Re-enqueue an already-launched origin op, e.g. to deliver an
    /// out-of-band completion such as an LKV waiter firing.
    pub async fn trigger_origin(&self, mailbox: u64, args: OpArgs) -> Result<()> {
        let entry = self.origin_mailboxes.read().await.get(&mailbox).cloned();
        let Some(entry) = entry else {
            return Err(Error::invalid_input(format!("no origin op at mailbox {mailbox}")));
        };
        let mut op = entry.lock().await;
        let ctx = self.ctx();
        let outcome = op.update_origin(&ctx, args).await?;
        drop(op);
        if !matches!(outcome, WaitingType::WaitingOnCq) {
            self.origin_mailboxes.write().await.remove(&mailbox);
        }
        Ok(())
    }

    pub async fn trigger_target(&self, key: (NodeId, u64), args: OpArgs) -> Result<()> {
        let entry = self.target_mailboxes.read().await.get(&key).cloned();
        let Some(entry) = entry else {
            return Err(Error::invalid_input("no target op at that key"));
        };
        let mut op = entry.lock().await;
        let ctx = self.ctx();
        let outcome = op.update_target(&ctx, args).await?;
        drop(op);
        if !matches!(outcome, WaitingType::WaitingOnCq) {
            self.target_mailboxes.write().await.remove(&key);
        }
        Ok(())
    }

    /// Route one inbound message: to an existing origin op if the message
    /// targets a mailbox we launched, to an existing target op if we've
    /// already created one for this (src node, src mailbox) conversation,
    /// or to a freshly created target op via the opcode's factory. Unknown
    /// opcodes are logged and dropped, per §4.3.
    pub async fn handle_incoming_message(self: &Arc<Self>, msg: Message) -> Result<()> {
        if msg.header.dst_mailbox != 0 {
            if let Some(entry) = self.origin_mailboxes.read().await.get(&msg.header.dst_mailbox).cloned() {
                let mailbox = msg.header.dst_mailbox;
                let mut op = entry.lock().await;
                let ctx = self.ctx();
                let outcome = op.update_origin(&ctx, OpArgs::IncomingMessage(msg)).await?;
                drop(op);
                if !matches!(outcome, WaitingType::WaitingOnCq) {
                    self.origin_mailboxes.write().await.remove(&mailbox);
                }
                return Ok(());
            }
        }

        let key = (msg.header.src, msg.header.src_mailbox);
        if let Some(entry) = self.target_mailboxes.read().await.get(&key).cloned() {
            let mut op = entry.lock().await;
            let ctx = self.ctx();
            let outcome = op.update_target(&ctx, OpArgs::IncomingMessage(msg)).await?;
            drop(op);
            if !matches!(outcome, WaitingType::WaitingOnCq) {
                self.target_mailboxes.write().await.remove(&key);
            }
            return Ok(());
        }

        let factory = self
            .factories
            .read()
            .await
            .get(&msg.header.op_id)
            .map(|(_, f)| f.clone());
        let Some(factory) = factory else {
            tracing::warn!(op_id = msg.header.op_id, "dropping message for unknown opcode");
            return Ok(());
        };

        let mut op = factory();
        let ctx = self.ctx();
        let outcome = op.update_target(&ctx, OpArgs::IncomingMessage(msg)).await?;
        if matches!(outcome, WaitingType::WaitingOnCq) {
            self.target_mailboxes
                .write()
                .await
                .insert(key, Arc::new(AsyncMutex::new(op)));
        }
        Ok(())
    }

    /// Drain `rx` forever, dispatching each message through
    /// `handle_incoming_message`. Spawn this once per node at startup.
    pub async fn recv_loop(self: Arc<Self>, mut rx: tokio::sync::mpsc::UnboundedReceiver<Message>) {
        while let Some(msg) = rx.recv().await {
            if let Err(err) = self.handle_incoming_message(msg).await {
                tracing::error!(?err, "error handling incoming message");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kelpie_net::LoopbackNetwork;

    struct EchoOp {
        done_tx: Option<tokio::sync::oneshot::Sender<()>>,
    }

    #[async_trait::async_trait]
    impl<T: Transport> Op<T> for EchoOp {
        async fn update_origin(&mut self, _ctx: &OpContext<T>, args: OpArgs) -> Result<WaitingType> {
            match args {
                OpArgs::Start => Ok(WaitingType::WaitingOnCq),
                OpArgs::IncomingMessage(_) => {
                    if let Some(tx) = self.done_tx.take() {
                        let _ = tx.send(());
                    }
                    Ok(WaitingType::DoneAndDestroy)
                }
                _ => Ok(WaitingType::WaitingOnCq),
            }
        }

        async fn update_target(&mut self, _ctx: &OpContext<T>, _args: OpArgs) -> Result<WaitingType> {
            Ok(WaitingType::DoneAndDestroy)
        }
    }

    #[tokio::test]
    async fn deregister_unregistered_opcode_does_not_panic() {
        let network = LoopbackNetwork::new();
        let (transport, _rx) = network.join(NodeId::from_raw(1));
        let runtime = OpRuntime::new(Arc::new(transport));
        runtime.deregister_op(999, true).await;
    }

    #[tokio::test]
    async fn launch_op_assigns_increasing_mailboxes() {
        let network = LoopbackNetwork::new();
        let (transport, _rx) = network.join(NodeId::from_raw(1));
        let runtime = OpRuntime::new(Arc::new(transport));
        let (tx1, _rx1) = tokio::sync::oneshot::channel();
        let (tx2, _rx2) = tokio::sync::oneshot::channel();
        let m1 = runtime
            .launch_op(Box::new(EchoOp { done_tx: Some(tx1) }))
            .await
            .unwrap();
        let m2 = runtime
            .launch_op(Box::new(EchoOp { done_tx: Some(tx2) }))
            .await
            .unwrap();
        assert!(m2 > m1);
    }
}
