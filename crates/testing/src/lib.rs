//! Fixtures shared by every Kelpie crate's tests: a multi-rank loopback
//! cluster (`LoopbackCluster`), deterministic payload generators, and a
//! tracing capture for asserting on a logged event instead of re-deriving
//! the same fact some other way.

pub mod capture;
pub mod cluster;
pub mod payload;

pub use capture::LogCapture;
pub use cluster::{ClusterNode, LoopbackCluster};
pub use payload::{ascii_cycle_payload, filled_payload, make_ldo, make_ldo_with_meta};
