//! Black-box scenarios run against a [`LoopbackCluster`] instead of a single
//! crate's internals, covering the literal end-to-end cases with expected
//! outputs.

use kelpie_common::{Key, ResourceUrl};
use kelpie_testing::{ascii_cycle_payload, filled_payload, make_ldo, LoopbackCluster, LogCapture};

/// Scenario 1: single-node local publish/need.
#[tokio::test]
async fn single_node_local_publish_need_round_trips() {
    let cluster = LoopbackCluster::new(1).await;
    let node = cluster.node(0);
    let pool = node.connect("lkv:/howdy").await;

    let payload = ascii_cycle_payload(4096);
    let ldo = make_ldo(&node.allocator, &payload);

    pool.publish(&Key::new("howdy", "bob"), ldo.clone()).await.unwrap();
    let got = pool.need(&Key::new("howdy", "bob")).await.unwrap();

    assert_eq!(got.data_bytes() as usize, 4096);
    assert!(got.deep_compare(&ldo));
}

/// Scenario 3: cross-node Want/Publish wakeup. Rank 1 is the DHT's only
/// member, so its own `Want` is local; rank 0's `Publish` reaches rank 1 over
/// the wire and fires the waiter rank 1 registered.
#[tokio::test]
async fn cross_node_want_then_publish_wakes_waiter_exactly_once() {
    let cluster = LoopbackCluster::new(2).await;
    let rank0 = cluster.node(0);
    let rank1 = cluster.node(1);

    rank1
        .dirman
        .join_dir_with_name(&ResourceUrl::parse("dht:/myplace").unwrap(), Some("rank1"))
        .await
        .unwrap();

    let pool1 = rank1.connect("dht:/myplace").await;
    let pool0 = rank0.connect("dht:/myplace").await;

    let (tx, rx) = tokio::sync::oneshot::channel();
    let mut tx = Some(tx);
    let fire_count = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let fire_count_in_cb = fire_count.clone();
    pool1
        .want(
            &Key::new("k", "c"),
            Box::new(move |result| {
                fire_count_in_cb.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                if let Some(tx) = tx.take() {
                    let _ = tx.send(result.is_ok());
                }
            }),
        )
        .await
        .unwrap();

    let payload = filled_payload(64, |i| i as u8);
    let ldo = make_ldo(&rank0.allocator, &payload);
    pool0.publish(&Key::new("k", "c"), ldo.clone()).await.unwrap();

    assert!(rx.await.unwrap());
    assert_eq!(fire_count.load(std::sync::atomic::Ordering::SeqCst), 1);

    let got = pool1.need(&Key::new("k", "c")).await.unwrap();
    assert!(got.deep_compare(&ldo));
}

/// A genuine remote want registration: rank 0's `Want` targets rank 1 (an
/// `rft` pool with a fixed `rank=1` routes every key there), so the waiter
/// lives on a node other than the caller. Rank 1's own `Publish` fires it
/// through the target-pushed `WantRegistered` → `Value` sequence, not a
/// same-node shortcut.
#[tokio::test]
async fn remote_want_registration_wakes_waiter_on_a_different_node() {
    let cluster = LoopbackCluster::new(2).await;
    for rank in 0..2 {
        cluster
            .node(rank)
            .dirman
            .join_dir_with_name(&ResourceUrl::parse("rft:/elsewhere").unwrap(), Some(&format!("rank{rank}")))
            .await
            .unwrap();
    }

    let pool0 = cluster.node(0).connect("rft:/elsewhere&rank=1").await;
    let pool1 = cluster.node(1).connect("rft:/elsewhere&rank=1").await;

    let (tx, rx) = tokio::sync::oneshot::channel();
    let mut tx = Some(tx);
    pool0
        .want(
            &Key::new("far", "away"),
            Box::new(move |result| {
                if let Some(tx) = tx.take() {
                    let _ = tx.send(result.is_ok());
                }
            }),
        )
        .await
        .unwrap();

    let payload = filled_payload(32, |i| i as u8);
    let ldo = make_ldo(&cluster.node(1).allocator, &payload);
    pool1.publish(&Key::new("far", "away"), ldo.clone()).await.unwrap();

    assert!(rx.await.unwrap());
    let got = pool0.need(&Key::new("far", "away")).await.unwrap();
    assert!(got.deep_compare(&ldo));
}

/// Scenario 4: pick over a DHT. Placement hashes on `k1` alone, so every
/// rank publishing to row "myrow" lands on the same member regardless of
/// which rank calls `Publish` — and a k2-only wildcard Compute still routes
/// to that one member instead of fanning out.
#[tokio::test]
async fn pick_last_over_a_four_rank_dht_returns_highest_ranked_publish() {
    let cluster = LoopbackCluster::new(4).await;
    for rank in 1..4 {
        cluster
            .node(rank)
            .dirman
            .join_dir_with_name(&ResourceUrl::parse("dht:/myplace").unwrap(), Some(&format!("rank{rank}")))
            .await
            .unwrap();
    }

    for rank in 0..4 {
        let pool = cluster.node(rank).connect("dht:/myplace").await;
        let content = format!("This is an object from rank {rank}{}", "!".repeat(3 - rank));
        let ldo = make_ldo(&cluster.node(rank).allocator, content.as_bytes());
        pool.publish(&Key::new("myrow", &rank.to_string()), ldo).await.unwrap();
    }

    let pool0 = cluster.node(0).connect("dht:/myplace").await;
    let result = pool0
        .compute(&Key::new("myrow", "*"), "pick", "last")
        .await
        .unwrap();
    assert_eq!(String::from_utf8(result.data()).unwrap(), "This is an object from rank 3");
}

/// Scenario 5: a large object crosses nodes via RDMA Get, not an inline
/// copy. An `rft` pool with a fixed `rank=1` guarantees every key routes to
/// rank 1 regardless of hash, so rank 0 never has a local copy to begin
/// with — the only way its `Need` can succeed is by pulling from rank 1,
/// which the loopback transport logs every time it happens.
#[tokio::test]
async fn large_object_need_crosses_nodes_via_rdma_get() {
    let cluster = LoopbackCluster::new(2).await;
    for rank in 0..2 {
        cluster
            .node(rank)
            .dirman
            .join_dir_with_name(&ResourceUrl::parse("rft:/bignum").unwrap(), Some(&format!("rank{rank}")))
            .await
            .unwrap();
    }
    let capture = LogCapture::new();
    let guard = capture.install();

    let client = cluster.node(0).connect("rft:/bignum&rank=1").await;
    let owner = cluster.node(1).connect("rft:/bignum&rank=1").await;

    let eight_mib = 8 * 1024 * 1024;
    let payload = filled_payload(eight_mib, |i| (i % 251) as u8);
    let ldo = make_ldo(&cluster.node(0).allocator, &payload);

    client.publish(&Key::new("big", "blob"), ldo.clone()).await.unwrap();
    let got = client.need(&Key::new("big", "blob")).await.unwrap();

    assert!(got.deep_compare(&ldo));
    assert_eq!(got.data_bytes() as usize, eight_mib);
    assert!(capture.contains("rdma_get"));
    drop(guard);
    assert_eq!(owner.behavior(), client.behavior());
}
