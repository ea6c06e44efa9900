use std::sync::Arc;

use kelpie_common::{Bucket, Key, Result};
use kelpie_common::ResourceUrl;
use kelpie_lunasa::DataObject;

use crate::behavior::PoolBehavior;
use crate::lkv::{EntryInfo, Waiter};
use crate::pool::Pool;

/// Wraps a downstream pool and logs every call through `tracing`, tagged
/// with the rank-like name given at construction — the reference stand-in
/// for the source's per-rank trace file.
pub struct TracePool {
    url: ResourceUrl,
    rank_tag: String,
    inner: Arc<dyn Pool>,
}

impl TracePool {
    pub fn new(url: ResourceUrl, rank_tag: String, inner: Arc<dyn Pool>) -> Self {
        TracePool { url, rank_tag, inner }
    }
}

#[async_trait::async_trait]
impl Pool for TracePool {
    fn url(&self) -> &ResourceUrl {
        &self.url
    }

    fn bucket(&self) -> Bucket {
        self.inner.bucket()
    }

    fn behavior(&self) -> PoolBehavior {
        self.inner.behavior()
    }

    async fn publish(&self, key: &Key, ldo: DataObject) -> Result<()> {
        let bytes = ldo.data_bytes();
        let result = self.inner.publish(key, ldo).await;
        tracing::info!(rank = %self.rank_tag, %key, bytes, ok = result.is_ok(), "trace: publish");
        result
    }

    async fn want(&self, key: &Key, callback: Waiter) -> Result<()> {
        tracing::info!(rank = %self.rank_tag, %key, "trace: want");
        self.inner.want(key, callback).await
    }

    async fn need(&self, key: &Key) -> Result<DataObject> {
        let result = self.inner.need(key).await;
        tracing::info!(rank = %self.rank_tag, %key, ok = result.is_ok(), "trace: need");
        result
    }

    async fn info(&self, key: &Key) -> Result<EntryInfo> {
        tracing::info!(rank = %self.rank_tag, %key, "trace: info");
        self.inner.info(key).await
    }

    async fn drop_key(&self, pattern: &Key) -> Result<()> {
        tracing::info!(rank = %self.rank_tag, pattern = %pattern, "trace: drop");
        self.inner.drop_key(pattern).await
    }

    async fn list(&self, pattern: &Key) -> Result<Vec<(Key, usize)>> {
        tracing::info!(rank = %self.rank_tag, pattern = %pattern, "trace: list");
        self.inner.list(pattern).await
    }

    async fn compute(&self, pattern: &Key, fname: &str, arg: &str) -> Result<DataObject> {
        tracing::info!(rank = %self.rank_tag, pattern = %pattern, fname, arg, "trace: compute");
        self.inner.compute(pattern, fname, arg).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pools::null::NullPool;
    use kelpie_lunasa::{Allocator, MallocAllocator};

    #[tokio::test]
    async fn forwards_to_inner_pool() {
        let allocator: Arc<dyn Allocator> = Arc::new(MallocAllocator::new());
        let inner = Arc::new(NullPool::new(ResourceUrl::parse("null:/x").unwrap(), Bucket::UNSPECIFIED, allocator));
        let traced = TracePool::new(ResourceUrl::parse("trace:/x").unwrap(), "rank0".to_string(), inner);
        let err = traced.need(&Key::new("k", "c")).await.unwrap_err();
        assert!(matches!(err, kelpie_common::Error::NotFound));
    }
}
