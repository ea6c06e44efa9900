use kelpie_common::{Bucket, Error, Key, Result};
use kelpie_common::ResourceUrl;
use kelpie_lunasa::DataObject;

use crate::behavior::PoolBehavior;
use crate::lkv::{EntryInfo, Waiter};
use crate::pool::Pool;

/// What `Connect` returns instead of failing outright: every op reports
/// `Unavailable` with the reason resolution fell through, so a caller sees a
/// live pool handle either way and the failure surfaces at first use.
pub struct UnconfiguredPool {
    url: ResourceUrl,
    reason: String,
}

impl UnconfiguredPool {
    pub fn new(url: ResourceUrl, reason: impl Into<String>) -> Self {
        UnconfiguredPool { url, reason: reason.into() }
    }

    fn err(&self) -> Error {
        Error::unavailable(format!("pool {} is unconfigured: {}", self.url, self.reason))
    }
}

#[async_trait::async_trait]
impl Pool for UnconfiguredPool {
    fn url(&self) -> &ResourceUrl {
        &self.url
    }

    fn bucket(&self) -> Bucket {
        self.url.bucket
    }

    fn behavior(&self) -> PoolBehavior {
        PoolBehavior::default()
    }

    async fn publish(&self, _key: &Key, _ldo: DataObject) -> Result<()> {
        Err(self.err())
    }

    async fn want(&self, _key: &Key, callback: Waiter) -> Result<()> {
        callback(Err(self.err()));
        Ok(())
    }

    async fn need(&self, _key: &Key) -> Result<DataObject> {
        Err(self.err())
    }

    async fn info(&self, _key: &Key) -> Result<EntryInfo> {
        Err(self.err())
    }

    async fn drop_key(&self, _pattern: &Key) -> Result<()> {
        Err(self.err())
    }

    async fn list(&self, _pattern: &Key) -> Result<Vec<(Key, usize)>> {
        Err(self.err())
    }

    async fn compute(&self, _pattern: &Key, _fname: &str, _arg: &str) -> Result<DataObject> {
        Err(self.err())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_op_reports_unavailable() {
        let pool = UnconfiguredPool::new(ResourceUrl::parse("dht:/x").unwrap(), "no directory service configured");
        let err = pool.need(&Key::new("k", "c")).await.unwrap_err();
        assert!(matches!(err, Error::Unavailable(_)));
    }
}
