use super::*;
use objectstore::memory_store;
use std::time::Duration;

fn lease(store: objectstore::StoreHandle, node: &str) -> LeaderLease<objectstore::StoreHandle> {
    LeaderLease::new(store, node.to_string(), Duration::from_secs(30), Duration::from_secs(10))
}

#[tokio::test]
async fn first_candidate_acquires_an_absent_lease() {
    let store = memory_store();
    let l = lease(store, "node-a");
    assert!(l.try_acquire().await.unwrap());
    assert_eq!(l.state(), LeaseState::Leader);
}

#[tokio::test]
async fn second_candidate_loses_to_an_unexpired_lease() {
    let store = memory_store();
    let a = lease(store.clone(), "node-a");
    assert!(a.try_acquire().await.unwrap());

    let b = lease(store, "node-b");
    assert!(!b.try_acquire().await.unwrap());
    assert_eq!(b.state(), LeaseState::Candidate);
}

#[tokio::test]
async fn candidate_can_take_over_an_expired_lease() {
    let store = memory_store();
    let expired = LeaderRecord {
        node_id: "stale".to_string(),
        lease_start: 0,
        lease_expiry: 1, // long past
    };
    store
        .put(LEADER_KEY, serde_json::to_vec(&expired).unwrap())
        .await
        .unwrap();

    let b = lease(store.clone(), "node-b");
    assert!(b.try_acquire().await.unwrap());

    let record: LeaderRecord =
        serde_json::from_slice(&store.get(LEADER_KEY).await.unwrap().unwrap()).unwrap();
    assert_eq!(record.node_id, "node-b");
}

#[tokio::test]
async fn acquiring_publishes_the_per_node_presence_record() {
    let store = memory_store();
    let a = lease(store.clone(), "node-a");
    assert!(a.try_acquire().await.unwrap());

    let record: LeaderRecord = serde_json::from_slice(
        &store.get("cluster/leaders/node-a").await.unwrap().unwrap(),
    )
    .unwrap();
    assert_eq!(record.node_id, "node-a");
}

#[tokio::test]
async fn heartbeat_keeps_a_leader_refreshed() {
    let store = memory_store();
    let l = lease(store.clone(), "node-a");
    assert!(l.try_acquire().await.unwrap());

    l.heartbeat_tick().await.unwrap();
    assert_eq!(l.state(), LeaseState::Leader);

    let record: LeaderRecord =
        serde_json::from_slice(&store.get(LEADER_KEY).await.unwrap().unwrap()).unwrap();
    assert_eq!(record.node_id, "node-a");
}

#[tokio::test]
async fn heartbeat_steps_back_when_another_node_took_over() {
    let store = memory_store();
    let a = lease(store.clone(), "node-a");
    assert!(a.try_acquire().await.unwrap());

    // Simulate node-b forcibly overwriting the record (e.g. after a, say,
    // clock-skew-driven double acquisition).
    let hijack = LeaderRecord {
        node_id: "node-b".to_string(),
        lease_start: 0,
        lease_expiry: u64::MAX,
    };
    store.put(LEADER_KEY, serde_json::to_vec(&hijack).unwrap()).await.unwrap();

    a.heartbeat_tick().await.unwrap();
    assert_eq!(a.state(), LeaseState::Candidate);
}

#[tokio::test]
async fn designated_leader_mode_skips_contention() {
    let store = memory_store();
    let l = lease(store, "solo");
    l.become_designated_leader().await.unwrap();
    assert!(l.is_leader());
}

#[tokio::test]
async fn release_deletes_the_record_when_still_leader() {
    let store = memory_store();
    let a = lease(store.clone(), "node-a");
    assert!(a.try_acquire().await.unwrap());

    a.release().await.unwrap();
    assert_eq!(a.state(), LeaseState::Candidate);
    assert!(store.get(LEADER_KEY).await.unwrap().is_none());
    assert!(store.get("cluster/leaders/node-a").await.unwrap().is_none());
}

#[tokio::test]
async fn release_is_a_no_op_for_a_non_leader() {
    let store = memory_store();
    let a = lease(store.clone(), "node-a");
    a.release().await.unwrap();
    assert_eq!(a.state(), LeaseState::Candidate);
}

#[tokio::test]
async fn follower_observes_without_acquiring() {
    let store = memory_store();
    let a = lease(store.clone(), "node-a");
    a.try_acquire().await.unwrap();

    let f = lease(store, "node-f");
    let seen = f.observe().await.unwrap().unwrap();
    assert_eq!(seen.node_id, "node-a");
    assert_eq!(f.state(), LeaseState::Candidate);
}
