use crate::consistency::Causality;
use crate::consistency::QuorumConfig;
use crate::dht::NodeId;
use crate::dht::Routing;
use crate::error::Result;
use crate::storage::Role;
use crate::tests::default::address;
use crate::tests::default::key_in;
use crate::tests::default::prepare_node;
use crate::tests::default::prepare_ring;
use crate::tests::default::settle;
use crate::tests::default::tick;
use crate::transport::dummy::DummyNetwork;

#[tokio::test]
async fn test_restarted_node_catches_up_through_handoff() -> Result<()> {
    let net = DummyNetwork::new();
    let quorum = QuorumConfig::default();
    let mut nodes = prepare_ring(&net, &[10, 50, 100], Routing::Full, quorum).await?;
    tick(&nodes, 3).await;

    // Owned by 100, replicated on 10 and 50.
    let key = key_in(50, 100);
    let v1 = nodes[1].swarm.put(&key, "v1").await?;
    settle().await;
    assert_eq!(nodes[0].stored(&key).await.unwrap().value, "v1");

    println!("===== 10 goes down =====");
    net.kill(&address(10));
    let old = nodes.remove(0);
    let v2 = nodes[0].swarm.put(&key, "v2").await?;
    assert_eq!(v1.compare(&v2), Causality::Before);
    settle().await;
    // No spare node on a three node ring, so the coordinator keeps the hint.
    let hint = nodes[0]
        .swarm
        .storage()
        .load_hint(&key, NodeId::new(10))
        .await?
        .unwrap();
    assert_eq!(hint.version, v2);

    println!("===== 10 restarts =====");
    let storage = old.storage.clone();
    drop(old);
    assert_eq!(storage_value(&storage, &key).await, Some("v1".to_string()));
    let restarted = prepare_node(&net, 10, Routing::Full, quorum, storage);
    restarted.swarm.join(Some(&address(50))).await?;
    nodes.insert(0, restarted);

    let mut rounds = 0;
    while nodes[0].stored(&key).await.map(|r| r.value) != Some("v2".to_string()) {
        assert!(rounds < 3, "10 did not catch up within 3 ticks");
        tick(&nodes, 1).await;
        rounds += 1;
    }

    let record = nodes[0].stored(&key).await.unwrap();
    assert_eq!(record.version, v2);
    assert_eq!(record.role, Role::Backup);
    assert_eq!(nodes[0].swarm.get(&key).await?.value, "v2");
    assert!(
        nodes[1]
            .swarm
            .storage()
            .load_hint(&key, NodeId::new(10))
            .await?
            .is_none(),
        "hint dropped after handoff"
    );
    Ok(())
}

async fn storage_value(
    storage: &crate::storage::MemStorage<crate::storage::Record>,
    key: &str,
) -> Option<String> {
    use crate::storage::KvStorageInterface;
    storage
        .get(&crate::storage::record_key(key))
        .await
        .unwrap()
        .map(|r| r.value)
}

#[tokio::test]
async fn test_owner_reassigns_to_substitute() -> Result<()> {
    let net = DummyNetwork::new();
    let nodes = prepare_ring(
        &net,
        &[10, 50, 100, 200],
        Routing::Full,
        QuorumConfig::default(),
    )
    .await?;
    tick(&nodes, 3).await;

    // Owned by 50, natural replicas 50, 100 and 200; 10 is the spare.
    let key = key_in(10, 50);
    nodes[1].swarm.put(&key, "v1").await?;
    settle().await;
    assert!(nodes[0].stored(&key).await.is_none());

    println!("===== 100 goes down =====");
    net.kill(&address(100));
    let alive = [&nodes[0], &nodes[1], &nodes[3]];
    for node in alive {
        node.swarm.stabilizer().stabilize().await?;
    }
    // 50 noticed 100 through its successor list and pushed a hinted copy to 10.
    let hint = nodes[0]
        .swarm
        .storage()
        .load_hint(&key, NodeId::new(100))
        .await?
        .unwrap();
    assert_eq!(hint.value, "v1");
    assert_eq!(hint.owner, NodeId::new(50));
    Ok(())
}

#[tokio::test]
async fn test_finger_routing_revived_node_gets_missed_write() -> Result<()> {
    let net = DummyNetwork::new();
    let nodes = prepare_ring(
        &net,
        &[10, 50, 100, 200],
        Routing::Finger,
        QuorumConfig::default(),
    )
    .await?;
    tick(&nodes, 5).await;

    // Owned by 50, natural replicas 50, 100 and 200; 10 is the spare.
    let key = key_in(10, 50);
    nodes[1].swarm.put(&key, "v1").await?;
    settle().await;

    println!("===== 100 goes down =====");
    net.kill(&address(100));
    let alive = [&nodes[0], &nodes[1], &nodes[3]];
    for _ in 0..3 {
        for node in alive {
            node.swarm.stabilizer().stabilize().await?;
        }
    }
    let v2 = nodes[0].swarm.put(&key, "v2").await?;
    settle().await;
    let hint = nodes[0]
        .swarm
        .storage()
        .load_hint(&key, NodeId::new(100))
        .await?;
    assert!(
        matches!(hint, Some(ref h) if h.version == v2),
        "expect 10 to hold v2 for 100 got {:?}",
        hint
    );

    println!("===== 100 comes back =====");
    net.revive(&address(100));
    let mut rounds = 0;
    while nodes[2].stored(&key).await.map(|r| r.value) != Some("v2".to_string()) {
        assert!(rounds < 3, "100 did not catch up within 3 ticks");
        tick(&nodes, 1).await;
        rounds += 1;
    }
    assert_eq!(nodes[2].stored(&key).await.unwrap().version, v2);
    Ok(())
}
