use kelpie_common::Result;
use kelpie_net::{OpArgs, Transport};

use crate::context::OpContext;
use crate::waiting::WaitingType;

/// A state machine driving one RPC. `update_origin` runs on the node that
/// launched the op; `update_target` runs on the node that received it.
/// Boxed as a trait object (`async_trait`, rather than `trait_variant`,
/// because the runtime's mailbox tables need dynamic dispatch across
/// heterogeneous op types registered by opcode).
#[async_trait::async_trait]
pub trait Op<T: Transport>: Send {
    /// Called once, right after the runtime mints a mailbox for a launched
    /// origin op, so the op can stamp its own `src_mailbox` on the request
    /// it's about to send. Most ops ignore this.
    fn assign_mailbox(&mut self, _mailbox: u64) {}

    async fn update_origin(&mut self, ctx: &OpContext<T>, args: OpArgs) -> Result<WaitingType>;

    async fn update_target(&mut self, ctx: &OpContext<T>, args: OpArgs) -> Result<WaitingType>;
}

pub type OpFactory<T> = std::sync::Arc<dyn Fn() -> Box<dyn Op<T>> + Send + Sync>;

/// Stable 32-bit opcode for an op type: djb2 over its name, matching the
/// source's `HashStringToUint32`-derived opcodes so two independently built
/// binaries agree on the numeric id for "DirManCentralized" or "Publish".
pub fn stable_opcode(name: &str) -> u32 {
    let mut hash: u32 = 5381;
    for b in name.as_bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(*b as u32);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_opcode_is_deterministic() {
        assert_eq!(stable_opcode("Publish"), stable_opcode("Publish"));
        assert_ne!(stable_opcode("Publish"), stable_opcode("Drop"));
    }
}
