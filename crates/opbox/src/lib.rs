//! Async RPC op-runtime (`faodel-opbox`): a registry of op factories keyed
//! by a stable opcode, and a pair of mailbox tables that serialize updates
//! per conversation while letting unrelated ops run concurrently.

pub mod context;
pub mod op;
pub mod runtime;
pub mod waiting;

pub use context::OpContext;
pub use op::{stable_opcode, Op, OpFactory};
pub use runtime::OpRuntime;
pub use waiting::WaitingType;
