use std::net::Ipv4Addr;
use std::sync::Arc;

use kelpie::{Pool, PoolRegistry};
use kelpie_common::{Configuration, NodeId, ResourceUrl};
use kelpie_dirman::DirManCore;
use kelpie_lunasa::{Allocator, MallocAllocator};
use kelpie_net::{LoopbackNetwork, LoopbackTransport};
use kelpie_opbox::OpRuntime;

/// One rank in a [`LoopbackCluster`]: the pieces a real process would wire up
/// at bootstrap (transport, Op runtime, DirMan, pool registry), all sharing
/// one `LoopbackNetwork` so ranks exchange real wire messages without real
/// sockets.
pub struct ClusterNode {
    pub node: NodeId,
    pub allocator: Arc<dyn Allocator>,
    pub opbox: Arc<OpRuntime<LoopbackTransport>>,
    pub dirman: Arc<DirManCore<LoopbackTransport>>,
    pub pools: Arc<PoolRegistry<LoopbackTransport>>,
}

impl ClusterNode {
    /// `PoolRegistry::connect` a URL, parsing it first — a convenience for
    /// tests that only ever pass literal strings.
    pub async fn connect(&self, url: &str) -> Arc<dyn Pool> {
        let url = ResourceUrl::parse(url).expect("test fixture passed an unparseable URL");
        self.pools.connect(&url).await
    }
}

/// A set of ranks on one shared [`LoopbackNetwork`], each with its own
/// DirMan and pool registry but all forwarding to the same centralized
/// DirMan authority (rank 0) — the multi-process topology §8's scenarios
/// describe, minus the separate OS processes.
pub struct LoopbackCluster {
    nodes: Vec<ClusterNode>,
}

impl LoopbackCluster {
    pub async fn new(size: usize) -> Self {
        assert!(size > 0, "a cluster needs at least one rank");
        let network = LoopbackNetwork::new();
        let ids: Vec<NodeId> = (0..size)
            .map(|i| NodeId::new(Ipv4Addr::LOCALHOST, 9000, i as u16))
            .collect();
        let authority = ids[0];

        let mut nodes = Vec::with_capacity(size);
        for &node in &ids {
            let (transport, rx) = network.join(node);
            let opbox = OpRuntime::new(Arc::new(transport));
            let config = Configuration::from_pairs([("dirman.root.node", authority.to_hex())]);

            let dirman = DirManCore::new(&config, node, opbox.clone()).expect("dirman config");
            dirman.install().await.expect("install dirman op");

            let allocator: Arc<dyn Allocator> = Arc::new(MallocAllocator::new());
            let pools = PoolRegistry::new(&config, node, dirman.clone(), opbox.clone(), allocator.clone());
            pools.install().await.expect("install pool op");

            opbox.start();
            tokio::spawn(opbox.clone().recv_loop(rx));

            nodes.push(ClusterNode { node, allocator, opbox, dirman, pools });
        }
        LoopbackCluster { nodes }
    }

    pub fn node(&self, rank: usize) -> &ClusterNode {
        &self.nodes[rank]
    }

    pub fn node_id(&self, rank: usize) -> NodeId {
        self.nodes[rank].node
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kelpie_common::{Bucket, Key};

    #[tokio::test]
    async fn single_rank_connect_round_trips() {
        let cluster = LoopbackCluster::new(1).await;
        let pool = cluster.node(0).connect("lkv:/x").await;
        assert_eq!(pool.bucket(), Bucket::UNSPECIFIED);
        assert!(pool.need(&Key::new("a", "b")).await.is_err());
    }

    #[tokio::test]
    async fn every_rank_forwards_to_the_same_authority() {
        let cluster = LoopbackCluster::new(3).await;
        for rank in 0..3 {
            assert_eq!(cluster.node(rank).dirman.authority(), cluster.node_id(0));
        }
        assert!(cluster.node(0).dirman.am_root());
        assert!(!cluster.node(1).dirman.am_root());
    }
}
