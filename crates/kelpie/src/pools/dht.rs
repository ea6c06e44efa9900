use std::sync::Arc;

use kelpie_common::{Bucket, Key, NodeId, Result};
use kelpie_common::ResourceUrl;
use kelpie_lunasa::DataObject;
use kelpie_net::Transport;
use kelpie_opbox::OpRuntime;

use crate::behavior::PoolBehavior;
use crate::lkv::{EntryInfo, Waiter};
use crate::op::{PoolOp, PoolOutcome};
use crate::pool::Pool;
use crate::pools::local::LocalPool;
use crate::wire::{Payload, PoolRequest, INLINE_THRESHOLD};

/// How a key maps to one of `members`. DHT hashes the row key; RFT and TFT
/// are the same placement machinery with a different index rule, so one
/// struct covers all three rather than three near-duplicate types.
#[derive(Debug, Clone, Copy)]
pub enum Placement {
    /// `hash(bucket, k1) mod members.len()` — plain DHT.
    Hash,
    /// A fixed member index from the URL's `rank=` option, ignoring the key
    /// entirely — RFT.
    Rank(usize),
    /// The key's K1 tag mod `members.len()`, falling back to `Hash` when the
    /// key carries no tag — TFT.
    Tag,
}

pub struct DhtPool<T: Transport> {
    url: ResourceUrl,
    bucket: Bucket,
    path: String,
    placement: Placement,
    members: Vec<NodeId>,
    my_node: NodeId,
    local: Arc<LocalPool>,
    opbox: Arc<OpRuntime<T>>,
}

impl<T: Transport + 'static> DhtPool<T> {
    pub fn new(
        url: ResourceUrl,
        path: String,
        placement: Placement,
        members: Vec<NodeId>,
        my_node: NodeId,
        local: Arc<LocalPool>,
        opbox: Arc<OpRuntime<T>>,
    ) -> Self {
        DhtPool { bucket: url.bucket, url, path, placement, members, my_node, local, opbox }
    }

    fn target_for(&self, key: &Key) -> NodeId {
        if self.members.is_empty() {
            return self.my_node;
        }
        let idx = match self.placement {
            Placement::Hash => hash_index(self.bucket, key.k1(), self.members.len()),
            Placement::Rank(rank) => rank % self.members.len(),
            Placement::Tag => key
                .k1_tag()
                .map(|tag| (tag as usize) % self.members.len())
                .unwrap_or_else(|| hash_index(self.bucket, key.k1(), self.members.len())),
        };
        self.members[idx]
    }

    async fn remote_call(&self, dst: NodeId, request: PoolRequest) -> Result<PoolOutcome> {
        let (op, rx) = PoolOp::origin(dst, request, self.local.allocator().clone());
        self.opbox.launch_op(Box::new(op)).await?;
        rx.await.map_err(|_| kelpie_common::Error::communication("pool op dropped before replying"))?
    }
}

/// Small payloads travel inline with the request; anything over
/// `INLINE_THRESHOLD` stays exposed for the target to pull with `rdma_get`.
fn publish_payload<T: Transport>(opbox: &OpRuntime<T>, ldo: DataObject) -> Payload {
    if ldo.user_capacity() <= INLINE_THRESHOLD {
        Payload::Inline(ldo.to_wire_bytes())
    } else {
        let export_id = opbox.new_mailbox();
        opbox.expose(export_id, ldo);
        Payload::Remote { export_id }
    }
}

fn hash_index(bucket: Bucket, k1: &str, len: usize) -> usize {
    let mut bytes = bucket.raw().to_le_bytes().to_vec();
    bytes.extend_from_slice(k1.as_bytes());
    (xxhash_rust::xxh3::xxh3_64(&bytes) as usize) % len
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use proptest::proptest;

    use super::*;

    proptest! {
        #[test]
        fn hash_index_always_lands_in_range(k1 in "[a-z]{1,16}", len in 1usize..64) {
            let idx = hash_index(Bucket::from_raw(0), &k1, len);
            prop_assert!(idx < len);
        }
    }

    /// On a DHT pool of N members, the empirical distribution of
    /// `placement(hash("row_i"))` over i in [0, 10000) should deviate from
    /// uniform by less than 5%.
    #[test]
    fn placement_of_ten_thousand_rows_is_within_five_percent_of_uniform() {
        const ROWS: usize = 10_000;
        const MEMBERS: usize = 8;
        let bucket = Bucket::from_raw(0);
        let mut counts = vec![0usize; MEMBERS];
        for i in 0..ROWS {
            let key = format!("row_{i}");
            counts[hash_index(bucket, &key, MEMBERS)] += 1;
        }
        let expected = ROWS as f64 / MEMBERS as f64;
        for (member, &count) in counts.iter().enumerate() {
            let deviation = (count as f64 - expected).abs() / expected;
            assert!(
                deviation < 0.05,
                "member {member} got {count} rows, expected ~{expected} (deviation {deviation:.3})"
            );
        }
    }
}

#[async_trait::async_trait]
impl<T: Transport + 'static> Pool for DhtPool<T> {
    fn url(&self) -> &ResourceUrl {
        &self.url
    }

    fn bucket(&self) -> Bucket {
        self.bucket
    }

    fn behavior(&self) -> PoolBehavior {
        self.local.behavior()
    }

    async fn publish(&self, key: &Key, ldo: DataObject) -> Result<()> {
        let dst = self.target_for(key);
        if dst == self.my_node {
            return self.local.publish(key, ldo).await;
        }
        let payload = publish_payload(&self.opbox, ldo);
        let request = PoolRequest::Publish { path: self.path.clone(), bucket: self.bucket, key: key.clone(), payload };
        match self.remote_call(dst, request).await? {
            PoolOutcome::Ack => Ok(()),
            _ => Err(kelpie_common::Error::fatal("publish: unexpected reply shape")),
        }
    }

    async fn want(&self, key: &Key, callback: Waiter) -> Result<()> {
        let dst = self.target_for(key);
        if dst == self.my_node {
            return self.local.want(key, callback).await;
        }
        // `remote_call` launches the origin op and awaits its eventual
        // reply; the op itself (see op.rs) stays registered across the
        // target's immediate `WantRegistered` ack and only resolves once the
        // target pushes the real outcome, whenever its local waiter fires.
        let request = PoolRequest::Want { path: self.path.clone(), bucket: self.bucket, key: key.clone() };
        match self.remote_call(dst, request).await {
            Ok(PoolOutcome::Value(ldo)) => {
                callback(Ok(ldo));
                Ok(())
            }
            Ok(_) => Err(kelpie_common::Error::fatal("want: unexpected reply shape")),
            Err(err) => {
                callback(Err(err));
                Ok(())
            }
        }
    }

    async fn need(&self, key: &Key) -> Result<DataObject> {
        let dst = self.target_for(key);
        if dst == self.my_node {
            return self.local.need(key).await;
        }
        let request = PoolRequest::Get { path: self.path.clone(), bucket: self.bucket, key: key.clone() };
        match self.remote_call(dst, request).await? {
            PoolOutcome::Value(ldo) => Ok(ldo),
            _ => Err(kelpie_common::Error::fatal("need: unexpected reply shape")),
        }
    }

    async fn info(&self, key: &Key) -> Result<EntryInfo> {
        let dst = self.target_for(key);
        if dst == self.my_node {
            return self.local.info(key).await;
        }
        let request = PoolRequest::Info { path: self.path.clone(), bucket: self.bucket, key: key.clone() };
        match self.remote_call(dst, request).await? {
            PoolOutcome::Info(info) => Ok(info),
            _ => Err(kelpie_common::Error::fatal("info: unexpected reply shape")),
        }
    }

    async fn drop_key(&self, pattern: &Key) -> Result<()> {
        // A wildcard pattern may span every member; a concrete key routes to
        // exactly one. Broadcast in the wildcard case, single-target
        // otherwise.
        if pattern.is_wildcard() || self.members.is_empty() {
            for &member in &self.members {
                if member == self.my_node {
                    self.local.drop_key(pattern).await?;
                } else {
                    let request = PoolRequest::Drop { path: self.path.clone(), bucket: self.bucket, pattern: pattern.clone() };
                    self.remote_call(member, request).await?;
                }
            }
            if self.members.is_empty() {
                self.local.drop_key(pattern).await?;
            }
            return Ok(());
        }
        let dst = self.target_for(pattern);
        if dst == self.my_node {
            return self.local.drop_key(pattern).await;
        }
        let request = PoolRequest::Drop { path: self.path.clone(), bucket: self.bucket, pattern: pattern.clone() };
        self.remote_call(dst, request).await?;
        Ok(())
    }

    async fn list(&self, pattern: &Key) -> Result<Vec<(Key, usize)>> {
        let mut out = Vec::new();
        if self.members.is_empty() {
            return self.local.list(pattern).await;
        }
        for &member in &self.members {
            if member == self.my_node {
                out.extend(self.local.list(pattern).await?);
                continue;
            }
            let request = PoolRequest::List { path: self.path.clone(), bucket: self.bucket, pattern: pattern.clone() };
            if let PoolOutcome::Listed(entries) = self.remote_call(member, request).await? {
                out.extend(entries);
            }
        }
        Ok(out)
    }

    async fn compute(&self, pattern: &Key, fname: &str, arg: &str) -> Result<DataObject> {
        // A k2-only wildcard ("myrow","*") still names a single owning
        // member, the same one a concrete key in that row would hash to, so
        // it routes like any other request. Only a wildcard *k1* spans rows
        // that could be scattered across members, and fanning that in isn't
        // part of this pool layer — it runs against whichever member we are.
        if pattern.is_k1_wildcard() {
            return self.local.compute(pattern, fname, arg).await;
        }
        let dst = self.target_for(pattern);
        if dst == self.my_node {
            return self.local.compute(pattern, fname, arg).await;
        }
        let request = PoolRequest::Compute {
            path: self.path.clone(),
            bucket: self.bucket,
            pattern: pattern.clone(),
            fname: fname.to_string(),
            arg: arg.to_string(),
        };
        match self.remote_call(dst, request).await? {
            PoolOutcome::Value(ldo) => Ok(ldo),
            _ => Err(kelpie_common::Error::fatal("compute: unexpected reply shape")),
        }
    }
}
