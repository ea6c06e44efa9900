use std::sync::Arc;

use kelpie_common::{Bucket, DirectoryInfo, Key, Result};
use kelpie_common::ResourceUrl;
use kelpie_lunasa::DataObject;

use crate::behavior::PoolBehavior;
use crate::iom::Iom;
use crate::lkv::{EntryInfo, Lkv, Waiter};

/// The uniform surface every pool type exposes, wire ops and all: FAODEL's
/// Publish/Want/Need/Info/Drop/List/Compute verbs.
#[async_trait::async_trait]
pub trait Pool: Send + Sync {
    fn url(&self) -> &ResourceUrl;
    fn bucket(&self) -> Bucket;
    fn behavior(&self) -> PoolBehavior;

    async fn publish(&self, key: &Key, ldo: DataObject) -> Result<()>;
    /// Register `callback` to fire once, whenever `key` becomes available (or
    /// is dropped while waited on). Never blocks.
    async fn want(&self, key: &Key, callback: Waiter) -> Result<()>;
    /// Block until `key` is available, then return its value.
    async fn need(&self, key: &Key) -> Result<DataObject>;
    async fn info(&self, key: &Key) -> Result<EntryInfo>;
    async fn drop_key(&self, pattern: &Key) -> Result<()>;
    async fn list(&self, pattern: &Key) -> Result<Vec<(Key, usize)>>;
    async fn compute(&self, pattern: &Key, fname: &str, arg: &str) -> Result<DataObject>;
}

/// Fields every pool implementation shares: the resolved URL it was
/// constructed from, its directory membership, its write/read behavior, the
/// optional persistent back-end it writes through to, and the row store it
/// keeps locally (every pool type keeps one, even Null and RFT/TFT/DHT
/// members that forward most reads elsewhere, because every node still needs
/// somewhere to land the rows placement assigns to it).
pub struct PoolBase {
    pub url: ResourceUrl,
    pub bucket: Bucket,
    pub dir_info: DirectoryInfo,
    pub behavior: PoolBehavior,
    pub iom: Option<Arc<dyn Iom>>,
    pub lkv: Arc<Lkv>,
}

impl PoolBase {
    pub fn path(&self) -> String {
        self.url.directory_path()
    }
}
