//! Message header, RDMA segment surface, and a loopback reference transport
//! (`faodel-common`'s wire format + a stand-in for the real RDMA transport).

pub mod export;
pub mod loopback;
pub mod message;
pub mod transport;

pub use export::ExportTable;
pub use loopback::{LoopbackNetwork, LoopbackTransport};
pub use message::{Message, MessageHeader, HDR_FLAG_STRUCTURED_BODY};
pub use transport::{OpArgs, Transport};
