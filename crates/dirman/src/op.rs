use std::sync::Arc;

use tokio::sync::oneshot;

use kelpie_common::{Error, NodeId, Result};
use kelpie_net::{Message, MessageHeader, OpArgs, Transport, HDR_FLAG_STRUCTURED_BODY};
use kelpie_opbox::{stable_opcode, Op, OpContext, WaitingType};

use crate::wire::{DirManReply, DirManRequest};

pub const DIRMAN_OPCODE_NAME: &str = "DirManCentralized";

pub fn dirman_opcode() -> u32 {
    stable_opcode(DIRMAN_OPCODE_NAME)
}

pub type TargetHandler = Arc<dyn Fn(DirManRequest) -> DirManReply + Send + Sync>;

enum Role {
    /// Runs on the node that called into `DirManCore`: sends the request on
    /// `Start`, parses the reply on the next `IncomingMessage`, and fulfills
    /// `reply_tx` exactly once either way.
    Origin {
        authority: NodeId,
        request: DirManRequest,
        reply_tx: Option<oneshot::Sender<Result<DirManReply>>>,
        mailbox: u64,
    },
    /// Runs on the authority: decodes the request, invokes `handle`
    /// synchronously against the authority's `DirectoryCache`, and replies.
    Target { handle: TargetHandler },
}

pub struct DirManOp {
    role: Role,
}

impl DirManOp {
    pub fn origin(
        authority: NodeId,
        request: DirManRequest,
    ) -> (Self, oneshot::Receiver<Result<DirManReply>>) {
        let (tx, rx) = oneshot::channel();
        (
            DirManOp {
                role: Role::Origin {
                    authority,
                    request,
                    reply_tx: Some(tx),
                    mailbox: 0,
                },
            },
            rx,
        )
    }

    pub fn target(handle: TargetHandler) -> Self {
        DirManOp {
            role: Role::Target { handle },
        }
    }
}

#[async_trait::async_trait]
impl<T: Transport> Op<T> for DirManOp {
    fn assign_mailbox(&mut self, mailbox: u64) {
        if let Role::Origin { mailbox: slot, .. } = &mut self.role {
            *slot = mailbox;
        }
    }

    async fn update_origin(&mut self, ctx: &OpContext<T>, args: OpArgs) -> Result<WaitingType> {
        let Role::Origin {
            authority,
            request,
            reply_tx,
            mailbox,
        } = &mut self.role
        else {
            return Err(Error::fatal("DirManOp: update_origin called on a target op"));
        };

        match args {
            OpArgs::Start => {
                let body = serde_json::to_vec(request)
                    .map_err(|e| Error::fatal(format!("DirMan request encode failed: {e}")))?;
                let msg = Message::new(
                    MessageHeader {
                        src: ctx.my_node(),
                        dst: *authority,
                        src_mailbox: *mailbox,
                        dst_mailbox: 0,
                        op_id: dirman_opcode(),
                        body_len: 0,
                        user_flags: 0,
                        hdr_flags: HDR_FLAG_STRUCTURED_BODY,
                    },
                    body,
                );
                ctx.send_msg(*authority, msg).await?;
                Ok(WaitingType::WaitingOnCq)
            }
            OpArgs::IncomingMessage(msg) => {
                let decoded = serde_json::from_slice::<DirManReply>(&msg.body)
                    .map_err(|e| Error::fatal(format!("DirMan reply decode failed: {e}")));
                if let Some(tx) = reply_tx.take() {
                    let _ = tx.send(decoded);
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
        let Role::Target { handle } = &self.role else {
            return Err(Error::fatal("DirManOp: update_target called on an origin op"));
        };

        match args {
            OpArgs::IncomingMessage(msg) => {
                let request = serde_json::from_slice::<DirManRequest>(&msg.body)
                    .map_err(|e| Error::fatal(format!("DirMan request decode failed: {e}")))?;
                let reply = handle(request);
                let body = serde_json::to_vec(&reply)
                    .map_err(|e| Error::fatal(format!("DirMan reply encode failed: {e}")))?;
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
