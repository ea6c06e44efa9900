//! Shared identifiers, URL grammar, configuration and error types used by
//! every Kelpie crate (common ≈ `faodel-common`).

pub mod config;
pub mod directory;
pub mod error;
pub mod key;
pub mod logging;
pub mod node;
pub mod url;

pub use config::Configuration;
pub use directory::DirectoryInfo;
pub use error::{Error, Result};
pub use key::Key;
pub use logging::init_tracing;
pub use node::{Bucket, NodeId};
pub use url::ResourceUrl;
