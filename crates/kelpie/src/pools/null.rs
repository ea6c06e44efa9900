use std::sync::Arc;

use kelpie_common::{Bucket, Error, Key, Result};
use kelpie_common::ResourceUrl;
use kelpie_lunasa::{Allocator, DataObject};

use crate::behavior::PoolBehavior;
use crate::lkv::{Availability, EntryInfo, Waiter};
use crate::pool::Pool;

/// Discards every publish and reports nothing as ever available. Useful as a
/// `Connect` fallback target and for benchmarking the cost of the pool layer
/// itself with storage removed from the loop.
pub struct NullPool {
    url: ResourceUrl,
    bucket: Bucket,
    allocator: Arc<dyn Allocator>,
}

impl NullPool {
    pub fn new(url: ResourceUrl, bucket: Bucket, allocator: Arc<dyn Allocator>) -> Self {
        NullPool { url, bucket, allocator }
    }
}

#[async_trait::async_trait]
impl Pool for NullPool {
    fn url(&self) -> &ResourceUrl {
        &self.url
    }

    fn bucket(&self) -> Bucket {
        self.bucket
    }

    fn behavior(&self) -> PoolBehavior {
        PoolBehavior::default()
    }

    async fn publish(&self, _key: &Key, _ldo: DataObject) -> Result<()> {
        Ok(())
    }

    async fn want(&self, _key: &Key, callback: Waiter) -> Result<()> {
        callback(Err(Error::NotFound));
        Ok(())
    }

    async fn need(&self, _key: &Key) -> Result<DataObject> {
        Err(Error::NotFound)
    }

    async fn info(&self, _key: &Key) -> Result<EntryInfo> {
        Ok(EntryInfo { user_bytes: 0, availability: Availability::Unavailable })
    }

    async fn drop_key(&self, _pattern: &Key) -> Result<()> {
        Ok(())
    }

    async fn list(&self, _pattern: &Key) -> Result<Vec<(Key, usize)>> {
        Ok(Vec::new())
    }

    async fn compute(&self, _pattern: &Key, _fname: &str, _arg: &str) -> Result<DataObject> {
        DataObject::allocate(self.allocator.clone(), 0, 0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kelpie_lunasa::MallocAllocator;

    #[tokio::test]
    async fn publish_then_need_never_finds_anything() {
        let allocator: Arc<dyn Allocator> = Arc::new(MallocAllocator::new());
        let pool = NullPool::new(ResourceUrl::parse("null:/x").unwrap(), Bucket::UNSPECIFIED, allocator.clone());
        let ldo = DataObject::allocate(allocator, 0, 4, 0).unwrap();
        pool.publish(&Key::new("k", "c"), ldo).await.unwrap();
        let err = pool.need(&Key::new("k", "c")).await.unwrap_err();
        assert!(matches!(err, Error::NotFound));
    }
}
