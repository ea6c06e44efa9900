//! The Kelpie pool core: a process-local row store (`Lkv`), the `Pool`
//! trait and its Local/Null/Trace/DHT/RFT/TFT/Unconfigured implementations,
//! and the registry that resolves a `ResourceUrl` into one of them.

pub mod behavior;
pub mod compute;
pub mod iom;
pub mod lkv;
pub mod op;
pub mod pool;
pub mod pools;
pub mod registry;
pub mod wire;

pub use behavior::PoolBehavior;
pub use iom::Iom;
pub use lkv::{Availability, ComputeFn, EntryInfo, Lkv, Waiter};
pub use pool::{Pool, PoolBase};
pub use pools::{DhtPool, LocalPool, NullPool, Placement, TracePool, UnconfiguredPool};
pub use registry::PoolRegistry;
