use kelpie_common::{Bucket, Key};

use crate::lkv::{Availability, EntryInfo};

/// How a Publish/Get/Compute payload crosses the wire: a small value travels
/// inline in the request/reply body; a large one stays exposed on the
/// sender's transport for the receiver to pull with `ctx.rdma_get`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Payload {
    Inline(Vec<u8>),
    Remote { export_id: u64 },
}

/// Payloads at or under this size travel inline after the header instead of
/// bouncing through an RDMA Get.
pub const INLINE_THRESHOLD: usize = 4096;

/// One sum type over every pool verb, the way [`kelpie_dirman::DirManRequest`]
/// covers every DirMan verb, rather than one wire op per verb.
///
/// `path` names the resource this request targets (e.g. `/data/myplace`) so
/// the receiving node's [`crate::registry::PoolRegistry`] can route it to the
/// right local row store without a DirMan round trip of its own.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum PoolRequest {
    Publish { path: String, bucket: Bucket, key: Key, payload: Payload },
    Get { path: String, bucket: Bucket, key: Key },
    Info { path: String, bucket: Bucket, key: Key },
    Drop { path: String, bucket: Bucket, pattern: Key },
    List { path: String, bucket: Bucket, pattern: Key },
    Compute { path: String, bucket: Bucket, pattern: Key, fname: String, arg: String },
    /// Register a remote waiter for `key`. The target always acks with
    /// `WantRegistered` first; the eventual `Value`/`Error` arrives later as
    /// a second, separately pushed message to the same origin mailbox.
    Want { path: String, bucket: Bucket, key: Key },
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct WireEntryInfo {
    pub user_bytes: usize,
    pub availability: WireAvailability,
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub enum WireAvailability {
    Unavailable,
    Waiting,
    InLocalMemory,
    InRemoteMemory,
    InDisk,
}

impl From<EntryInfo> for WireEntryInfo {
    fn from(info: EntryInfo) -> Self {
        WireEntryInfo {
            user_bytes: info.user_bytes,
            availability: match info.availability {
                Availability::Unavailable => WireAvailability::Unavailable,
                Availability::Waiting => WireAvailability::Waiting,
                Availability::InLocalMemory => WireAvailability::InLocalMemory,
                Availability::InRemoteMemory => WireAvailability::InRemoteMemory,
                Availability::InDisk => WireAvailability::InDisk,
            },
        }
    }
}

impl From<WireEntryInfo> for EntryInfo {
    fn from(info: WireEntryInfo) -> Self {
        EntryInfo {
            user_bytes: info.user_bytes,
            availability: match info.availability {
                WireAvailability::Unavailable => Availability::Unavailable,
                WireAvailability::Waiting => Availability::Waiting,
                WireAvailability::InLocalMemory => Availability::InLocalMemory,
                WireAvailability::InRemoteMemory => Availability::InRemoteMemory,
                WireAvailability::InDisk => Availability::InDisk,
            },
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum PoolReply {
    Published,
    Value { payload: Payload },
    Info(WireEntryInfo),
    Dropped,
    Listed(Vec<(Key, usize)>),
    Computed { payload: Payload },
    /// Ack that a `Want` was registered at the target; the real outcome
    /// follows later as its own pushed `Value`/`Error` message.
    WantRegistered,
    Error { kind: WireErrorKind, message: String },
}

/// Mirrors the subset of [`kelpie_common::Error`] worth preserving across the
/// wire instead of flattening every failure into a string.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub enum WireErrorKind {
    Waiting,
    NotFound,
    InvalidInput,
    Unavailable,
    Fatal,
}

impl WireErrorKind {
    pub fn of(err: &kelpie_common::Error) -> Self {
        use kelpie_common::Error;
        match err {
            Error::Waiting => WireErrorKind::Waiting,
            Error::NotFound => WireErrorKind::NotFound,
            Error::InvalidInput(_) => WireErrorKind::InvalidInput,
            Error::Unavailable(_) => WireErrorKind::Unavailable,
            _ => WireErrorKind::Fatal,
        }
    }

    pub fn into_error(self, message: String) -> kelpie_common::Error {
        use kelpie_common::Error;
        match self {
            WireErrorKind::Waiting => Error::Waiting,
            WireErrorKind::NotFound => Error::NotFound,
            WireErrorKind::InvalidInput => Error::InvalidInput(message),
            WireErrorKind::Unavailable => Error::Unavailable(message),
            WireErrorKind::Fatal => Error::Fatal(message),
        }
    }
}
