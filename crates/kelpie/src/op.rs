use std::sync::Arc;

use tokio::sync::oneshot;

use kelpie_common::{Bucket, Error, Key, NodeId, Result};
use kelpie_lunasa::{Allocator, DataObject};
use kelpie_net::{Message, MessageHeader, OpArgs, Transport, HDR_FLAG_STRUCTURED_BODY};
use kelpie_opbox::{stable_opcode, Op, OpContext, WaitingType};

use crate::lkv::{EntryInfo, Lkv};
use crate::wire::{Payload, PoolReply, PoolRequest, WireEntryInfo, WireErrorKind, INLINE_THRESHOLD};

pub const POOL_OPCODE_NAME: &str = "PoolOp";

pub fn pool_opcode() -> u32 {
    stable_opcode(POOL_OPCODE_NAME)
}

/// What an origin `PoolOp` resolves to, once a reply (and, for `Value`, the
/// RDMA pull it names) has been fully processed.
#[derive(Debug)]
pub enum PoolOutcome {
    Ack,
    Value(DataObject),
    Info(EntryInfo),
    Listed(Vec<(Key, usize)>),
}

/// Resolves `path` to the local row store a target-side request should act
/// against, creating one on first use — the wire equivalent of `Connect`
/// auto-vivifying a Local pool.
#[async_trait::async_trait]
pub trait PoolRouter: Send + Sync {
    async fn lkv_for(&self, path: &str, bucket: Bucket) -> Arc<Lkv>;
}

enum Role {
    Origin {
        dst: NodeId,
        request: Option<PoolRequest>,
        reply_tx: Option<oneshot::Sender<Result<PoolOutcome>>>,
        mailbox: u64,
        allocator: Arc<dyn Allocator>,
    },
    Target { router: Arc<dyn PoolRouter> },
}

pub struct PoolOp {
    role: Role,
}

impl PoolOp {
    pub fn origin(
        dst: NodeId,
        request: PoolRequest,
        allocator: Arc<dyn Allocator>,
    ) -> (Self, oneshot::Receiver<Result<PoolOutcome>>) {
        let (tx, rx) = oneshot::channel();
        (
            PoolOp {
                role: Role::Origin { dst, request: Some(request), reply_tx: Some(tx), mailbox: 0, allocator },
            },
            rx,
        )
    }

    pub fn target(router: Arc<dyn PoolRouter>) -> Self {
        PoolOp { role: Role::Target { router } }
    }
}

#[async_trait::async_trait]
impl<T: Transport + 'static> Op<T> for PoolOp {
    fn assign_mailbox(&mut self, mailbox: u64) {
        if let Role::Origin { mailbox: slot, .. } = &mut self.role {
            *slot = mailbox;
        }
    }

    async fn update_origin(&mut self, ctx: &OpContext<T>, args: OpArgs) -> Result<WaitingType> {
        let Role::Origin { dst, request, reply_tx, mailbox, allocator } = &mut self.role else {
            return Err(Error::fatal("PoolOp: update_origin called on a target op"));
        };

        match args {
            OpArgs::Start => {
                let request = request.take().ok_or_else(|| Error::fatal("PoolOp: Start fired twice"))?;
                let body = serde_json::to_vec(&request)
                    .map_err(|e| Error::fatal(format!("pool request encode failed: {e}")))?;
                let msg = Message::new(
                    MessageHeader {
                        src: ctx.my_node(),
                        dst: *dst,
                        src_mailbox: *mailbox,
                        dst_mailbox: 0,
                        op_id: pool_opcode(),
                        body_len: 0,
                        user_flags: 0,
                        hdr_flags: HDR_FLAG_STRUCTURED_BODY,
                    },
                    body,
                );
                ctx.send_msg(*dst, msg).await?;
                Ok(WaitingType::WaitingOnCq)
            }
            OpArgs::IncomingMessage(msg) => {
                let reply = serde_json::from_slice::<PoolReply>(&msg.body)
                    .map_err(|e| Error::fatal(format!("pool reply decode failed: {e}")));
                // A `Want` gets two messages: an immediate `WantRegistered`
                // ack, then later the real outcome pushed to this same
                // mailbox. Only the second one resolves the op.
                if matches!(reply, Ok(PoolReply::WantRegistered)) {
                    return Ok(WaitingType::WaitingOnCq);
                }
                let resolved = match reply {
                    Ok(reply) => resolve_reply(ctx, *dst, reply, allocator).await,
                    Err(err) => Err(err),
                };
                if let Some(tx) = reply_tx.take() {
                    let _ = tx.send(resolved);
                }
                Ok(WaitingType::DoneAndDestroy)
            }
            OpArgs::SendFailure { reason, .. } => {
                if let Some(tx) = reply_tx.take() {
                    let _ = tx.send(Err(Error::communication(reason)));
                }
                Ok(WaitingType::DoneAndDestroy)
            }
            _ => Ok(WaitingType::WaitingOnCq),
        }
    }

    async fn update_target(&mut self, ctx: &OpContext<T>, args: OpArgs) -> Result<WaitingType> {
        let Role::Target { router } = &self.role else {
            return Err(Error::fatal("PoolOp: update_target called on an origin op"));
        };

        match args {
            OpArgs::IncomingMessage(msg) => {
                let request = serde_json::from_slice::<PoolRequest>(&msg.body)
                    .map_err(|e| Error::fatal(format!("pool request decode failed: {e}")))?;
                let reply = handle_target(ctx, router, msg.header.src, msg.header.src_mailbox, request).await;
                let body = serde_json::to_vec(&reply)
                    .map_err(|e| Error::fatal(format!("pool reply encode failed: {e}")))?;
                let reply_msg = Message::new(
                    MessageHeader {
                        src: msg.header.dst,
                        dst: msg.header.src,
                        src_mailbox: 0,
                        dst_mailbox: msg.header.src_mailbox,
                        op_id: msg.header.op_id,
                        body_len: 0,
                        user_flags: 0,
                        hdr_flags: HDR_FLAG_STRUCTURED_BODY,
                    },
                    body,
                );
                ctx.send_msg(msg.header.src, reply_msg).await?;
                Ok(WaitingType::DoneAndDestroy)
            }
            _ => Ok(WaitingType::DoneAndDestroy),
        }
    }
}

async fn resolve_reply<T: Transport>(
    ctx: &OpContext<T>,
    dst: NodeId,
    reply: PoolReply,
    allocator: &Arc<dyn Allocator>,
) -> Result<PoolOutcome> {
    match reply {
        PoolReply::Published | PoolReply::Dropped => Ok(PoolOutcome::Ack),
        PoolReply::Info(info) => Ok(PoolOutcome::Info(info.into())),
        PoolReply::Listed(entries) => Ok(PoolOutcome::Listed(entries)),
        PoolReply::Value { payload } | PoolReply::Computed { payload } => {
            Ok(PoolOutcome::Value(resolve_payload(ctx, dst, payload, allocator).await?))
        }
        PoolReply::WantRegistered => Err(Error::fatal("WantRegistered must be handled before resolve_reply")),
        PoolReply::Error { kind, message } => Err(kind.into_error(message)),
    }
}

/// Decode a `Payload` into a real `DataObject`: an inline one is already in
/// hand, a remote one is pulled from `owner` with `rdma_get`.
async fn resolve_payload<T: Transport>(
    ctx: &OpContext<T>,
    owner: NodeId,
    payload: Payload,
    allocator: &Arc<dyn Allocator>,
) -> Result<DataObject> {
    match payload {
        Payload::Inline(bytes) => DataObject::from_wire_bytes(allocator.clone(), &bytes),
        Payload::Remote { export_id } => ctx.rdma_get(owner, export_id).await,
    }
}

/// Encode a `DataObject` as a `Payload`: small ones are inlined directly,
/// large ones stay exposed for the receiver to pull with `rdma_get`.
fn make_payload<T: Transport>(ctx: &OpContext<T>, ldo: DataObject) -> Payload {
    if ldo.user_capacity() <= INLINE_THRESHOLD {
        Payload::Inline(ldo.to_wire_bytes())
    } else {
        let export_id = ctx.new_mailbox();
        ctx.expose(export_id, ldo);
        Payload::Remote { export_id }
    }
}

async fn handle_target<T: Transport + 'static>(
    ctx: &OpContext<T>,
    router: &Arc<dyn PoolRouter>,
    origin: NodeId,
    origin_mailbox: u64,
    request: PoolRequest,
) -> PoolReply {
    match request {
        PoolRequest::Publish { path, bucket, key, payload } => {
            let lkv = router.lkv_for(&path, bucket).await;
            let ldo = match resolve_payload(ctx, origin, payload, lkv.allocator()).await {
                Ok(ldo) => ldo,
                Err(err) => return err_reply(err),
            };
            match lkv.put(bucket, &key, ldo).await {
                Ok(_) => PoolReply::Published,
                Err(err) => err_reply(err),
            }
        }
        PoolRequest::Get { path, bucket, key } => {
            let lkv = router.lkv_for(&path, bucket).await;
            match lkv.get(bucket, &key).await {
                Ok((ldo, _)) => PoolReply::Value { payload: make_payload(ctx, ldo) },
                Err(err) => err_reply(err),
            }
        }
        PoolRequest::Info { path, bucket, key } => {
            let lkv = router.lkv_for(&path, bucket).await;
            match lkv.get(bucket, &key).await {
                Ok((_, info)) => PoolReply::Info(WireEntryInfo::from(info)),
                Err(Error::Waiting) => PoolReply::Info(WireEntryInfo::from(EntryInfo {
                    user_bytes: 0,
                    availability: crate::lkv::Availability::Waiting,
                })),
                Err(err) => err_reply(err),
            }
        }
        PoolRequest::Drop { path, bucket, pattern } => {
            let lkv = router.lkv_for(&path, bucket).await;
            match lkv.drop_matching(bucket, &pattern).await {
                Ok(()) => PoolReply::Dropped,
                Err(err) => err_reply(err),
            }
        }
        PoolRequest::List { path, bucket, pattern } => {
            let lkv = router.lkv_for(&path, bucket).await;
            PoolReply::Listed(lkv.list_matching(bucket, &pattern).await)
        }
        PoolRequest::Compute { path, bucket, pattern, fname, arg } => {
            let lkv = router.lkv_for(&path, bucket).await;
            match lkv.do_compute(bucket, &pattern, &fname, &arg).await {
                Ok(ldo) => PoolReply::Computed { payload: make_payload(ctx, ldo) },
                Err(err) => err_reply(err),
            }
        }
        PoolRequest::Want { path, bucket, key } => {
            let lkv = router.lkv_for(&path, bucket).await;
            let push_ctx = ctx.clone();
            let registered = lkv
                .want_local(
                    bucket,
                    &key,
                    Box::new(move |result| push_want_result(push_ctx, origin, origin_mailbox, result)),
                )
                .await;
            match registered {
                Ok(()) => PoolReply::WantRegistered,
                Err(err) => err_reply(err),
            }
        }
    }
}

/// Deliver a fired `want_local` callback to the node that registered it, as
/// a standalone message addressed to its still-open origin mailbox. Runs
/// detached from the `update_target` call that registered the waiter, since
/// the callback may fire arbitrarily later (on a different `put`/`drop`).
fn push_want_result<T: Transport + 'static>(
    ctx: OpContext<T>,
    origin: NodeId,
    origin_mailbox: u64,
    result: Result<DataObject>,
) {
    tokio::spawn(async move {
        let reply = match result {
            Ok(ldo) => PoolReply::Value { payload: make_payload(&ctx, ldo) },
            Err(err) => err_reply(err),
        };
        let body = match serde_json::to_vec(&reply) {
            Ok(body) => body,
            Err(err) => {
                tracing::error!(?err, "push_want_result: encode failed");
                return;
            }
        };
        let msg = Message::new(
            MessageHeader {
                src: ctx.my_node(),
                dst: origin,
                src_mailbox: 0,
                dst_mailbox: origin_mailbox,
                op_id: pool_opcode(),
                body_len: 0,
                user_flags: 0,
                hdr_flags: HDR_FLAG_STRUCTURED_BODY,
            },
            body,
        );
        if let Err(err) = ctx.send_msg(origin, msg).await {
            tracing::warn!(?err, "push_want_result: send failed");
        }
    });
}

fn err_reply(err: Error) -> PoolReply {
    PoolReply::Error { kind: WireErrorKind::of(&err), message: err.to_string() }
}
