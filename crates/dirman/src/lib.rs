//! Centralized directory/naming service (`faodel-dirman`): a single
//! authority node tracks which resources exist and who's joined each one;
//! every other node asks it over an [`kelpie_opbox::Op`] RPC.

pub mod cache;
pub mod core;
pub mod op;
pub mod wire;

pub use cache::DirectoryCache;
pub use core::DirManCore;
pub use op::{dirman_opcode, DirManOp, DIRMAN_OPCODE_NAME};
pub use wire::{DirManReply, DirManRequest};
