use itertools::Itertools;

use crate::consistency::QuorumConfig;
use crate::dht::NodeId;
use crate::dht::Routing;
use crate::error::Error;
use crate::error::Result;
use crate::storage::MemStorage;
use crate::tests::default::address;
use crate::tests::default::assert_ring;
use crate::tests::default::prepare_node;
use crate::tests::default::prepare_ring;
use crate::tests::default::tick;
use crate::transport::dummy::DummyNetwork;

#[tokio::test]
async fn test_singleton_ring() -> Result<()> {
    let net = DummyNetwork::new();
    let nodes = prepare_ring(&net, &[42], Routing::Full, QuorumConfig::default()).await?;
    tick(&nodes, 1).await;

    let snapshot = nodes[0].swarm.ring_snapshot()?;
    assert_eq!(snapshot.self_id, NodeId::new(42));
    assert_eq!(snapshot.successor.id, NodeId::new(42));
    assert_eq!(snapshot.predecessor.as_ref().map(|p| p.id), Some(NodeId::new(42)));
    assert!(snapshot.successors.is_empty());
    for id in [0, 41, 42, 43, 255] {
        let owner = nodes[0].swarm.find_successor(NodeId::new(id)).await?;
        assert_eq!(owner.id, NodeId::new(42), "singleton owns {}", id);
    }
    Ok(())
}

#[tokio::test]
async fn test_two_nodes_stabilize() -> Result<()> {
    let net = DummyNetwork::new();
    let nodes = prepare_ring(&net, &[100, 10], Routing::Full, QuorumConfig::default()).await?;
    println!("===== after join =====");
    tick(&nodes, 2).await;
    assert_ring(&nodes, &[10, 100]);
    Ok(())
}

async fn check_join_order_independence(routing: Routing) -> Result<()> {
    let ids = [30u64, 70, 100, 80];
    let sorted = [30u64, 70, 80, 100];
    for order in ids.iter().copied().permutations(ids.len()) {
        println!("===== {:?} join order {:?} =====", routing, order);
        let net = DummyNetwork::new();
        let nodes = prepare_ring(&net, &order, routing, QuorumConfig::default()).await?;
        tick(&nodes, 5).await;
        assert_ring(&nodes, &sorted);

        for node in nodes.iter() {
            for (id, owner) in [(75, 80), (80, 80), (81, 100), (101, 30), (5, 30), (30, 30)] {
                let found = node.swarm.find_successor(NodeId::new(id)).await?;
                assert_eq!(
                    found.id,
                    NodeId::new(owner),
                    "expect owner of {} to be {} on node {} with order {:?}",
                    id,
                    owner,
                    node.id(),
                    order
                );
            }
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_join_order_independence_full_ring() -> Result<()> {
    check_join_order_independence(Routing::Full).await
}

#[tokio::test]
async fn test_join_order_independence_finger() -> Result<()> {
    check_join_order_independence(Routing::Finger).await
}

#[tokio::test]
async fn test_dead_successor_is_bypassed() -> Result<()> {
    let net = DummyNetwork::new();
    let mut nodes =
        prepare_ring(&net, &[10, 50, 100], Routing::Full, QuorumConfig::default()).await?;
    tick(&nodes, 3).await;
    assert_ring(&nodes, &[10, 50, 100]);

    println!("===== kill 50 =====");
    net.kill(&address(50));
    nodes.remove(1);
    tick(&nodes, 3).await;
    assert_ring(&nodes, &[10, 100]);

    let snapshot = nodes[0].swarm.ring_snapshot()?;
    let dead = snapshot
        .all_known_nodes
        .iter()
        .find(|n| n.id == NodeId::new(50))
        .unwrap();
    assert!(!dead.alive, "50 should be suspected dead");
    let owner = nodes[0].swarm.find_successor(NodeId::new(30)).await?;
    assert_eq!(owner.id, NodeId::new(100));
    Ok(())
}

#[tokio::test]
async fn test_ring_snapshot() -> Result<()> {
    let net = DummyNetwork::new();
    let nodes =
        prepare_ring(&net, &[10, 50, 100], Routing::Full, QuorumConfig::default()).await?;
    tick(&nodes, 3).await;

    let snapshot = nodes[0].swarm.ring_snapshot()?;
    assert_eq!(snapshot.address, address(10));
    assert_eq!(snapshot.successor.id, NodeId::new(50));
    assert_eq!(snapshot.predecessor.as_ref().map(|p| p.id), Some(NodeId::new(100)));
    assert_eq!(
        snapshot.successors.iter().map(|n| n.id.as_u64()).collect::<Vec<_>>(),
        vec![50, 100]
    );
    assert_eq!(snapshot.all_known_nodes.len(), 3);
    assert_eq!(snapshot.finger_table.len(), 8);

    let json = serde_json::to_string(&snapshot)?;
    assert!(json.contains("\"self_id\""));
    Ok(())
}

#[tokio::test]
async fn test_unreachable_bootstrap() {
    let net = DummyNetwork::new();
    let node = prepare_node(
        &net,
        10,
        Routing::Full,
        QuorumConfig::default(),
        MemStorage::new(),
    );
    let ret = node.swarm.join(Some("node-404")).await;
    assert!(
        matches!(ret, Err(Error::UnreachableBootstrap(ref a)) if a == "node-404"),
        "expect UnreachableBootstrap got {:?}",
        ret
    );
}
