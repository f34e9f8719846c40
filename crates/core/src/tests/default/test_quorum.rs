use std::time::Duration;

use crate::consistency::Causality;
use crate::consistency::QuorumConfig;
use crate::consistency::VersionVector;
use crate::dht::NodeId;
use crate::dht::Routing;
use crate::error::Error;
use crate::error::Result;
use crate::storage::Role;
use crate::tests::default::address;
use crate::tests::default::key_in;
use crate::tests::default::prepare_ring;
use crate::tests::default::settle;
use crate::tests::default::tick;
use crate::transport::dummy::DummyNetwork;

#[tokio::test]
async fn test_put_then_get_from_any_node() -> Result<()> {
    let net = DummyNetwork::new();
    let nodes =
        prepare_ring(&net, &[10, 50, 100], Routing::Full, QuorumConfig::default()).await?;
    tick(&nodes, 3).await;

    let key = key_in(50, 100);
    let v1 = nodes[0].swarm.put(&key, "v1").await?;
    assert_eq!(v1, VersionVector::from(vec![(10, 1)]));

    for node in nodes.iter() {
        let got = node.swarm.get(&key).await?;
        assert_eq!(got.value, "v1", "read from {}", node.id());
        assert_eq!(got.version, v1);
    }

    println!("===== overwrite from another coordinator =====");
    let v2 = nodes[1].swarm.put(&key, "v2").await?;
    assert_eq!(v1.compare(&v2), Causality::Before);
    assert_eq!(v2, VersionVector::from(vec![(10, 1), (50, 1)]));
    let got = nodes[2].swarm.get(&key).await?;
    assert_eq!(got.value, "v2");
    assert_eq!(got.version, v2);
    settle().await;

    // 100 owns the key, 10 and 50 are its successors.
    let owner = nodes[2].stored(&key).await.unwrap();
    assert_eq!(owner.role, Role::Primary);
    assert_eq!(owner.owner, NodeId::new(100));
    for node in &nodes[..2] {
        let backup = node.stored(&key).await.unwrap();
        assert_eq!(backup.role, Role::Backup);
        assert_eq!(backup.value, "v2");
    }

    let listing = nodes[2].swarm.list_keys().await?;
    assert_eq!(listing.primary_keys, vec![key.clone()]);
    let listing = nodes[0].swarm.list_keys().await?;
    assert!(listing.primary_keys.is_empty());
    assert_eq!(listing.backup_keys.get(&NodeId::new(100)), Some(&vec![key]));
    Ok(())
}

#[tokio::test]
async fn test_put_with_stale_version_stays_concurrent() -> Result<()> {
    let net = DummyNetwork::new();
    let nodes =
        prepare_ring(&net, &[10, 50, 100], Routing::Full, QuorumConfig::default()).await?;
    tick(&nodes, 3).await;

    let key = key_in(10, 50);
    let base = nodes[0].swarm.put(&key, "base").await?;
    let left = nodes[0].swarm.put_with_version(&key, "left", base.clone()).await?;
    let right = nodes[1].swarm.put_with_version(&key, "right", base.clone()).await?;
    assert_eq!(left.compare(&right), Causality::Concurrent);

    let got = nodes[2].swarm.get(&key).await?;
    assert_eq!(got.version, left.merge(&right));
    // Equal counter sums; the highest differing node id is 50, which wrote "right".
    assert_eq!(got.value, "right");
    Ok(())
}

#[tokio::test]
async fn test_get_missing_key() -> Result<()> {
    let net = DummyNetwork::new();
    let nodes =
        prepare_ring(&net, &[10, 50, 100], Routing::Full, QuorumConfig::default()).await?;
    tick(&nodes, 3).await;

    let ret = nodes[0].swarm.get("nobody-wrote-this").await;
    assert!(
        matches!(ret, Err(Error::NotFound(_))),
        "expect NotFound got {:?}",
        ret
    );
    Ok(())
}

#[tokio::test]
async fn test_insufficient_replicas_on_small_ring() -> Result<()> {
    let net = DummyNetwork::new();
    let nodes = prepare_ring(&net, &[10], Routing::Full, QuorumConfig::default()).await?;

    let ret = nodes[0].swarm.put("k", "v").await;
    assert!(
        matches!(ret, Err(Error::InsufficientReplicas { needed: 2, got: 1 })),
        "expect InsufficientReplicas got {:?}",
        ret
    );
    assert!(nodes[0].stored("k").await.is_none(), "nothing written");
    Ok(())
}

#[tokio::test]
async fn test_single_node_with_unit_quorum() -> Result<()> {
    let net = DummyNetwork::new();
    let quorum = QuorumConfig::new(1, 1, 1)?;
    let nodes = prepare_ring(&net, &[10], Routing::Full, quorum).await?;

    nodes[0].swarm.put("k", "v").await?;
    let got = nodes[0].swarm.get("k").await?;
    assert_eq!(got.value, "v");
    assert_eq!(nodes[0].stored("k").await.unwrap().role, Role::Primary);
    Ok(())
}

#[tokio::test]
async fn test_write_quorum_failure() -> Result<()> {
    let net = DummyNetwork::new();
    let quorum = QuorumConfig::new(3, 2, 3)?;
    let nodes = prepare_ring(&net, &[10, 50, 100], Routing::Full, quorum).await?;
    tick(&nodes, 3).await;

    net.kill(&address(100));
    let key = key_in(10, 50);
    let ret = nodes[0].swarm.put(&key, "v").await;
    assert!(
        matches!(
            ret,
            Err(Error::QuorumWriteFailed {
                needed: 3,
                got: 2
            })
        ),
        "expect QuorumWriteFailed got {:?}",
        ret
    );

    // 100 is now known dead and no node is left to stand in for it.
    let ret = nodes[0].swarm.put(&key, "v").await;
    assert!(
        matches!(ret, Err(Error::InsufficientReplicas { needed: 3, got: 2 })),
        "expect InsufficientReplicas got {:?}",
        ret
    );
    Ok(())
}

#[tokio::test]
async fn test_read_quorum_failure() -> Result<()> {
    let net = DummyNetwork::new();
    let quorum = QuorumConfig::new(3, 3, 2)?;
    let nodes = prepare_ring(&net, &[10, 50, 100], Routing::Full, quorum).await?;
    tick(&nodes, 3).await;

    let key = key_in(10, 50);
    nodes[0].swarm.put(&key, "v").await?;
    settle().await;

    net.kill(&address(100));
    let ret = nodes[1].swarm.get(&key).await;
    assert!(
        matches!(ret, Err(Error::QuorumReadFailed { needed: 3, got: 2 })),
        "expect QuorumReadFailed got {:?}",
        ret
    );
    Ok(())
}

#[tokio::test]
async fn test_read_repair() -> Result<()> {
    let net = DummyNetwork::new();
    let nodes =
        prepare_ring(&net, &[10, 50, 100], Routing::Full, QuorumConfig::default()).await?;
    tick(&nodes, 3).await;

    let key = key_in(50, 100);
    nodes[1].swarm.put(&key, "v1").await?;
    settle().await;

    println!("===== 100 misses v2 =====");
    net.kill(&address(100));
    let v2 = nodes[1].swarm.put(&key, "v2").await?;
    settle().await;
    net.revive(&address(100));
    assert_eq!(nodes[2].stored(&key).await.unwrap().value, "v1");

    // 10 never saw 100 fail, so it reads from it and repairs it.
    let got = nodes[0].swarm.get(&key).await?;
    assert_eq!(got.value, "v2");
    settle().await;
    let repaired = nodes[2].stored(&key).await.unwrap();
    assert_eq!(repaired.value, "v2");
    assert_eq!(repaired.version, v2);
    assert_eq!(repaired.role, Role::Primary);
    Ok(())
}

#[tokio::test]
async fn test_sloppy_quorum_substitute() -> Result<()> {
    let net = DummyNetwork::new();
    let nodes = prepare_ring(
        &net,
        &[10, 50, 100, 200],
        Routing::Full,
        QuorumConfig::default(),
    )
    .await?;
    tick(&nodes, 3).await;

    // Natural replicas are 50, 100 and 200; 10 is the spare.
    let key = key_in(10, 50);
    println!("===== kill 100 =====");
    net.kill(&address(100));
    nodes[0].swarm.put(&key, "v1").await?;
    settle().await;
    assert!(!nodes[0].swarm.dht().is_alive(NodeId::new(100))?);

    let v2 = nodes[0].swarm.put(&key, "v2").await?;
    settle().await;
    let hint = nodes[0]
        .swarm
        .storage()
        .load_hint(&key, NodeId::new(100))
        .await?
        .unwrap();
    assert_eq!(hint.value, "v2");
    assert_eq!(hint.hint_for, Some(NodeId::new(100)));
    let listing = nodes[0].swarm.list_keys().await?;
    assert_eq!(listing.backup_keys.get(&NodeId::new(100)), Some(&vec![key.clone()]));

    println!("===== revive 100 =====");
    net.revive(&address(100));
    tick(&nodes[..1], 1).await;
    let handed = nodes[2].stored(&key).await.unwrap();
    assert_eq!(handed.value, "v2");
    assert_eq!(handed.version, v2);
    assert_eq!(handed.role, Role::Backup);
    assert!(
        nodes[0]
            .swarm
            .storage()
            .load_hint(&key, NodeId::new(100))
            .await?
            .is_none(),
        "hint dropped after handoff"
    );
    Ok(())
}

#[tokio::test]
async fn test_finger_routing_put_get() -> Result<()> {
    let net = DummyNetwork::new();
    let nodes = prepare_ring(
        &net,
        &[30, 70, 100, 80],
        Routing::Finger,
        QuorumConfig::default(),
    )
    .await?;
    tick(&nodes, 5).await;

    let key = key_in(70, 80);
    nodes[0].swarm.put(&key, "finger").await?;
    settle().await;
    for node in nodes.iter() {
        assert_eq!(node.swarm.get(&key).await?.value, "finger");
    }
    // 80 owns the key, 100 and 30 follow it.
    assert_eq!(nodes[3].stored(&key).await.unwrap().role, Role::Primary);
    assert!(nodes[2].stored(&key).await.is_some());
    assert!(nodes[1].stored(&key).await.is_none());
    Ok(())
}

#[tokio::test]
async fn test_put_acked_despite_hung_replica() -> Result<()> {
    let net = DummyNetwork::new();
    let quorum = QuorumConfig::new(3, 3, 2)?;
    let nodes = prepare_ring(&net, &[10, 50, 100], Routing::Full, quorum).await?;
    tick(&nodes, 3).await;

    println!("===== 100 hangs =====");
    net.delay(&address(100), Duration::from_secs(60));
    let key = key_in(50, 100);
    let ret = nodes[0].swarm.put(&key, "v").await;
    assert!(ret.is_ok(), "expect put acked by 10 and 50 got {:?}", ret);
    assert_eq!(nodes[1].stored(&key).await.unwrap().value, "v");

    // The write to 100 times out after the put returned and turns into a hint.
    tokio::time::sleep(Duration::from_millis(900)).await;
    let hint = nodes[0]
        .swarm
        .storage()
        .load_hint(&key, NodeId::new(100))
        .await?;
    assert!(
        matches!(hint, Some(ref h) if h.value == "v"),
        "expect late hint for 100 got {:?}",
        hint
    );
    Ok(())
}

#[tokio::test]
async fn test_slow_replica_repaired_after_quorum_read() -> Result<()> {
    let net = DummyNetwork::new();
    let nodes =
        prepare_ring(&net, &[10, 50, 100], Routing::Full, QuorumConfig::default()).await?;
    tick(&nodes, 3).await;

    let key = key_in(50, 100);
    nodes[0].swarm.put(&key, "v1").await?;
    settle().await;

    net.kill(&address(100));
    let v2 = nodes[0].swarm.put(&key, "v2").await?;
    settle().await;

    println!("===== 100 back but slow =====");
    net.revive(&address(100));
    net.delay(&address(100), Duration::from_millis(200));
    let got = nodes[1].swarm.get(&key).await?;
    assert_eq!(got.value, "v2");
    assert_eq!(
        nodes[2].stored(&key).await.unwrap().value,
        "v1",
        "quorum was met before 100 answered"
    );

    // 100 answers after the quorum and is repaired in the background.
    tokio::time::sleep(Duration::from_millis(700)).await;
    net.undelay(&address(100));
    let repaired = nodes[2].stored(&key).await.unwrap();
    assert_eq!(repaired.value, "v2");
    assert_eq!(repaired.version, v2);
    Ok(())
}
