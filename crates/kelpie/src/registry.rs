use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use kelpie_common::{Bucket, Configuration, DirectoryInfo, Error, NodeId, Result};
use kelpie_common::ResourceUrl;
use kelpie_dirman::DirManCore;
use kelpie_lunasa::Allocator;
use kelpie_net::Transport;
use kelpie_opbox::{Op, OpRuntime};

use crate::behavior::PoolBehavior;
use crate::iom::Iom;
use crate::lkv::Lkv;
use crate::op::{pool_opcode, PoolOp, PoolRouter, POOL_OPCODE_NAME};
use crate::pool::{Pool, PoolBase};
use crate::pools::{DhtPool, LocalPool, NullPool, Placement, TracePool, UnconfiguredPool};

struct Resolved {
    url: ResourceUrl,
    dir: DirectoryInfo,
}

/// Implements `Connect`: resolve a (possibly reference) URL through DirMan,
/// then reuse or build the pool it names. Construction never fails outward —
/// any resolution or configuration error downgrades to an [`UnconfiguredPool`]
/// carrying the reason, per §4.6's "Connect always returns a pool" rule.
pub struct PoolRegistry<T: Transport> {
    my_node: NodeId,
    default_bucket: Bucket,
    dirman: Arc<DirManCore<T>>,
    opbox: Arc<OpRuntime<T>>,
    allocator: Arc<dyn Allocator>,
    ioms: RwLock<HashMap<String, Arc<dyn Iom>>>,
    pools: RwLock<HashMap<String, Arc<dyn Pool>>>,
    local_lkvs: RwLock<HashMap<String, Arc<Lkv>>>,
}

impl<T: Transport + 'static> PoolRegistry<T> {
    pub fn new(
        config: &Configuration,
        my_node: NodeId,
        dirman: Arc<DirManCore<T>>,
        opbox: Arc<OpRuntime<T>>,
        allocator: Arc<dyn Allocator>,
    ) -> Arc<Self> {
        let default_bucket = config.get("dirman.bucket").map(Bucket::from).unwrap_or(Bucket::UNSPECIFIED);
        Arc::new(PoolRegistry {
            my_node,
            default_bucket,
            dirman,
            opbox,
            allocator,
            ioms: RwLock::new(HashMap::new()),
            pools: RwLock::new(HashMap::new()),
            local_lkvs: RwLock::new(HashMap::new()),
        })
    }

    pub async fn register_iom(&self, name: &str, iom: Arc<dyn Iom>) {
        self.ioms.write().await.insert(name.to_string(), iom);
    }

    /// Register the wire op that lets other nodes reach rows this process
    /// owns as a DHT/RFT/TFT member.
    pub async fn install(self: &Arc<Self>) -> Result<()> {
        let registry = self.clone();
        self.opbox
            .register_op(
                pool_opcode(),
                POOL_OPCODE_NAME,
                Arc::new(move || {
                    let registry = registry.clone() as Arc<dyn PoolRouter>;
                    Box::new(PoolOp::target(registry)) as Box<dyn Op<T>>
                }),
            )
            .await
    }

    async fn local_lkv_for(&self, path: &str, bucket: Bucket) -> Arc<Lkv> {
        let tag = format!("{bucket}:{path}");
        if let Some(lkv) = self.local_lkvs.read().await.get(&tag).cloned() {
            return lkv;
        }
        let mut lkvs = self.local_lkvs.write().await;
        if let Some(lkv) = lkvs.get(&tag).cloned() {
            return lkv;
        }
        let lkv = Lkv::new(self.allocator.clone());
        lkv.start();
        lkvs.insert(tag, lkv.clone());
        lkv
    }

    async fn resolve(&self, url: &ResourceUrl) -> Result<Resolved> {
        match url.resource_type.as_str() {
            "local" | "lkv" | "null" => Ok(Resolved { url: url.clone(), dir: DirectoryInfo::new(url.clone()) }),
            _ => {
                let dir = self
                    .dirman
                    .get_directory_info(url, true, true)
                    .await?
                    .ok_or(Error::NotFound)?;
                let mut resolved_url = dir.url.clone();
                resolved_url.merge_from(url);
                Ok(Resolved { url: resolved_url, dir })
            }
        }
    }

    pub async fn connect(self: &Arc<Self>, original: &ResourceUrl) -> Arc<dyn Pool> {
        let mut url = original.clone();
        url.bucket = url.bucket.or(self.default_bucket);

        let resolved = match self.resolve(&url).await {
            Ok(r) => r,
            Err(err) => return Arc::new(UnconfiguredPool::new(url, err.to_string())),
        };
        let tag = resolved.url.pool_tag();

        if let Some(pool) = self.pools.read().await.get(&tag).cloned() {
            return pool;
        }
        let mut pools = self.pools.write().await;
        if let Some(pool) = pools.get(&tag).cloned() {
            return pool;
        }
        let pool = match self.build(resolved).await {
            Ok(pool) => pool,
            Err(err) => Arc::new(UnconfiguredPool::new(url, err.to_string())),
        };
        pools.insert(tag, pool.clone());
        pool
    }

    async fn resolve_iom(&self, url: &ResourceUrl) -> Option<Arc<dyn Iom>> {
        let name = url.option("iom")?;
        self.ioms.read().await.get(name).cloned()
    }

    async fn build(&self, resolved: Resolved) -> Result<Arc<dyn Pool>> {
        let resource_type = resolved.url.resource_type.clone();
        let path = resolved.url.directory_path();
        let bucket = resolved.url.bucket;

        if resource_type == "null" {
            return Ok(Arc::new(NullPool::new(resolved.url, bucket, self.allocator.clone())));
        }

        let behavior = resolved
            .url
            .option("behavior")
            .and_then(PoolBehavior::parse)
            .unwrap_or(default_behavior(&resource_type));
        let iom = self.resolve_iom(&resolved.url).await;
        let lkv = self.local_lkv_for(&path, bucket).await;
        let base = PoolBase { url: resolved.url.clone(), bucket, dir_info: resolved.dir.clone(), behavior, iom, lkv };

        match resource_type.as_str() {
            "local" | "lkv" => Ok(Arc::new(LocalPool::new(base))),
            "trace" => {
                let rank_tag = resolved.url.option("rank").unwrap_or("0").to_string();
                Ok(Arc::new(TracePool::new(resolved.url, rank_tag, Arc::new(LocalPool::new(base)))))
            }
            "dht" | "rft" | "tft" => {
                let members: Vec<NodeId> = resolved.dir.members.iter().map(|(_, n)| *n).collect();
                let placement = match resource_type.as_str() {
                    "rft" => {
                        let rank = resolved
                            .url
                            .option("rank")
                            .and_then(|v| v.parse::<usize>().ok())
                            .ok_or_else(|| Error::invalid_input("rft pool requires a rank= option"))?;
                        Placement::Rank(rank)
                    }
                    "tft" => Placement::Tag,
                    _ => Placement::Hash,
                };
                let local = Arc::new(LocalPool::new(base));
                Ok(Arc::new(DhtPool::new(resolved.url, path, placement, members, self.my_node, local, self.opbox.clone())))
            }
            other => Err(Error::invalid_input(format!("unknown pool type: {other}"))),
        }
    }
}

#[async_trait::async_trait]
impl<T: Transport + 'static> PoolRouter for PoolRegistry<T> {
    async fn lkv_for(&self, path: &str, bucket: Bucket) -> Arc<Lkv> {
        self.local_lkv_for(path, bucket).await
    }
}

fn default_behavior(resource_type: &str) -> PoolBehavior {
    match resource_type {
        "local" | "lkv" => PoolBehavior::WRITE_TO_LOCAL.union(PoolBehavior::READ_TO_LOCAL),
        "dht" | "rft" | "tft" => PoolBehavior::WRITE_TO_LOCAL.union(PoolBehavior::READ_TO_LOCAL),
        _ => PoolBehavior::default(),
    }
}
