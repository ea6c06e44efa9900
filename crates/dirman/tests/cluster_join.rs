//! Black-box scenario: three processes joining the same directory through a
//! centralized authority that isn't rank 0, covering join-order membership.

use std::sync::Arc;

use kelpie_common::{Configuration, NodeId, ResourceUrl};
use kelpie_dirman::DirManCore;
use kelpie_net::LoopbackNetwork;
use kelpie_opbox::OpRuntime;

async fn spin_up(network: &Arc<LoopbackNetwork>, node: NodeId, authority: NodeId) -> Arc<DirManCore<kelpie_net::LoopbackTransport>> {
    let (transport, rx) = network.join(node);
    let opbox = OpRuntime::new(Arc::new(transport));
    let config = Configuration::from_pairs([("dirman.root.node", authority.to_hex())]);
    let core = DirManCore::new(&config, node, opbox.clone()).unwrap();
    core.install().await.unwrap();
    opbox.start();
    tokio::spawn(opbox.recv_loop(rx));
    core
}

/// Scenario 2: start 3 processes with the authority on rank 2. Each joins
/// `dht:/myplace` without naming itself. After the third join, any rank's
/// view of the directory lists all 3 members, in join order.
#[tokio::test]
async fn three_rank_join_without_name_orders_members_by_arrival() {
    let network = LoopbackNetwork::new();
    let ranks: Vec<NodeId> = (0..3).map(NodeId::from_raw).collect();
    let authority = ranks[2];

    let mut cores = Vec::with_capacity(3);
    for &rank in &ranks {
        cores.push(spin_up(&network, rank, authority).await);
    }

    let url = ResourceUrl::parse("dht:/myplace").unwrap();
    for core in &cores {
        core.join_dir_with_name(&url, None).await.unwrap();
    }

    for core in &cores {
        let dir = core.get_directory_info(&url, true, true).await.unwrap().unwrap();
        assert_eq!(dir.members.len(), 3);
        assert_eq!(dir.members[0].1, ranks[0]);
        assert_eq!(dir.members[1].1, ranks[1]);
        assert_eq!(dir.members[2].1, ranks[2]);
    }
}
