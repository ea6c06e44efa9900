use kelpie_common::{Bucket, Key, Result};
use kelpie_lunasa::DataObject;

use crate::lkv::EntryInfo;

/// Persistent pool back-end interface. Concrete drivers are out of scope
/// here; [`kelpie_testing`] provides an in-memory double for exercising
/// pools that attach one.
#[async_trait::async_trait]
pub trait Iom: Send + Sync {
    async fn write(&self, bucket: Bucket, key: &Key, ldo: DataObject) -> Result<()>;
    async fn read(&self, bucket: Bucket, key: &Key) -> Result<DataObject>;
    async fn get_info(&self, bucket: Bucket, key: &Key) -> Result<EntryInfo>;
}
