use std::sync::Arc;

use kelpie_common::{Error, Key, Result};
use kelpie_common::ResourceUrl;
use kelpie_lunasa::{Allocator, DataObject};

use crate::behavior::PoolBehavior;
use crate::lkv::{EntryInfo, Waiter};
use crate::pool::{Pool, PoolBase};

/// Forwards straight to the process-local row store, writing through to an
/// IOM when one is attached and `behavior` asks for it. Every other pool
/// type is built out of one of these for whichever row lands on `my_node`.
pub struct LocalPool {
    base: PoolBase,
}

impl LocalPool {
    pub fn new(base: PoolBase) -> Self {
        LocalPool { base }
    }

    /// The allocator backing this row's store, so a remote pool wrapping a
    /// `LocalPool` can decode an inlined payload into a real `DataObject`.
    pub fn allocator(&self) -> &Arc<dyn Allocator> {
        self.base.lkv.allocator()
    }
}

#[async_trait::async_trait]
impl Pool for LocalPool {
    fn url(&self) -> &ResourceUrl {
        &self.base.url
    }

    fn bucket(&self) -> kelpie_common::Bucket {
        self.base.bucket
    }

    fn behavior(&self) -> PoolBehavior {
        self.base.behavior
    }

    async fn publish(&self, key: &Key, ldo: DataObject) -> Result<()> {
        if self.base.behavior.contains(PoolBehavior::WRITE_TO_LOCAL) {
            self.base.lkv.put(self.base.bucket, key, ldo.clone()).await?;
        }
        if self.base.behavior.contains(PoolBehavior::WRITE_TO_IOM) {
            if let Some(iom) = &self.base.iom {
                iom.write(self.base.bucket, key, ldo).await?;
            }
        }
        Ok(())
    }

    async fn want(&self, key: &Key, callback: Waiter) -> Result<()> {
        match self.base.lkv.want_local(self.base.bucket, key, callback).await {
            Ok(()) | Err(Error::Waiting) => Ok(()),
            Err(other) => Err(other),
        }
    }

    async fn need(&self, key: &Key) -> Result<DataObject> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        match self
            .base
            .lkv
            .want_local(
                self.base.bucket,
                key,
                Box::new(move |result| {
                    let _ = tx.send(result);
                }),
            )
            .await
        {
            Ok(()) | Err(Error::Waiting) => rx.await.map_err(|_| Error::communication("waiter dropped before firing"))?,
            Err(other) => Err(other),
        }
    }

    async fn info(&self, key: &Key) -> Result<EntryInfo> {
        match self.base.lkv.get(self.base.bucket, key).await {
            Ok((_, info)) => Ok(info),
            Err(Error::Waiting) => Ok(EntryInfo { user_bytes: 0, availability: crate::lkv::Availability::Waiting }),
            Err(Error::NotFound) => match &self.base.iom {
                Some(iom) if self.base.behavior.contains(PoolBehavior::READ_TO_LOCAL) => {
                    iom.get_info(self.base.bucket, key).await
                }
                _ => Err(Error::NotFound),
            },
            Err(other) => Err(other),
        }
    }

    async fn drop_key(&self, pattern: &Key) -> Result<()> {
        self.base.lkv.drop_matching(self.base.bucket, pattern).await
    }

    async fn list(&self, pattern: &Key) -> Result<Vec<(Key, usize)>> {
        Ok(self.base.lkv.list_matching(self.base.bucket, pattern).await)
    }

    async fn compute(&self, pattern: &Key, fname: &str, arg: &str) -> Result<DataObject> {
        self.base.lkv.do_compute(self.base.bucket, pattern, fname, arg).await
    }
}
