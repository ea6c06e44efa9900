pub mod dht;
pub mod local;
pub mod null;
pub mod trace;
pub mod unconfigured;

pub use dht::{DhtPool, Placement};
pub use local::LocalPool;
pub use null::NullPool;
pub use trace::TracePool;
pub use unconfigured::UnconfiguredPool;
