use std::time::Duration;

use objectstore::memory_store;

use super::*;

fn test_config() -> EchoConfig {
    let mut cfg = EchoConfig::default();
    cfg.node_id = "node-a".to_string();
    cfg.designated_leader = true;
    // Small thresholds so the tests can drive rotation/flush/compaction
    // deterministically without writing megabytes of data.
    cfg.memtable.bytes = 64;
    cfg.memtable.max_immutable = 2;
    cfg.compaction.l0_trigger = 1;
    cfg
}

#[tokio::test]
async fn put_then_get_round_trips() {
    let engine = Engine::open(memory_store(), test_config()).await.unwrap();
    engine.put(b"k1".to_vec(), b"v1".to_vec()).await.unwrap();
    assert_eq!(engine.get(b"k1").await.unwrap(), Some(b"v1".to_vec()));
}

#[tokio::test]
async fn get_on_missing_key_is_none() {
    let engine = Engine::open(memory_store(), test_config()).await.unwrap();
    assert_eq!(engine.get(b"ghost").await.unwrap(), None);
}

#[tokio::test]
async fn delete_shadows_an_older_value() {
    let engine = Engine::open(memory_store(), test_config()).await.unwrap();
    engine.put(b"k1".to_vec(), b"v1".to_vec()).await.unwrap();
    engine.delete(b"k1".to_vec()).await.unwrap();
    assert_eq!(engine.get(b"k1").await.unwrap(), None);
}

#[tokio::test]
async fn delete_shadows_a_value_flushed_to_an_sst() {
    let engine = Engine::open(memory_store(), test_config()).await.unwrap();
    engine.put(b"k1".to_vec(), b"v1".to_vec()).await.unwrap();
    engine.flush().await.unwrap();
    engine.delete(b"k1".to_vec()).await.unwrap();
    assert_eq!(engine.get(b"k1").await.unwrap(), None);
}

#[tokio::test]
async fn flush_moves_memtable_contents_into_l0_and_empties_it() {
    let engine = Engine::open(memory_store(), test_config()).await.unwrap();
    engine.put(b"k1".to_vec(), b"v1".to_vec()).await.unwrap();
    engine.flush().await.unwrap();
    assert_eq!(engine.get(b"k1").await.unwrap(), Some(b"v1".to_vec()));
}

#[tokio::test]
async fn flush_with_nothing_pending_is_a_no_op() {
    let engine = Engine::open(memory_store(), test_config()).await.unwrap();
    engine.flush().await.unwrap();
    assert_eq!(engine.l0_count(), 0);
}

#[tokio::test]
async fn compaction_merges_l0_into_a_single_l1_table() {
    let engine = Engine::open(memory_store(), test_config()).await.unwrap();
    engine.put(b"a".to_vec(), b"1".to_vec()).await.unwrap();
    engine.flush().await.unwrap();
    engine.put(b"b".to_vec(), b"2".to_vec()).await.unwrap();
    engine.flush().await.unwrap();

    engine.compact().await.unwrap();

    assert_eq!(engine.l0_count(), 0);
    assert_eq!(engine.level_count(1), 1);
    assert_eq!(engine.get(b"a").await.unwrap(), Some(b"1".to_vec()));
    assert_eq!(engine.get(b"b").await.unwrap(), Some(b"2".to_vec()));
}

#[tokio::test]
async fn put_auto_triggers_flush_and_compaction_past_thresholds() {
    let engine = Engine::open(memory_store(), test_config()).await.unwrap();
    // memtable.bytes is tiny (64) and l0_trigger is 1, so a handful of puts
    // should drive both an automatic flush and an automatic compaction.
    for i in 0..8u8 {
        engine
            .put(vec![b'k', i], vec![b'v'; 32])
            .await
            .unwrap();
    }
    assert!(engine.l0_count() <= 1);
    for i in 0..8u8 {
        assert_eq!(
            engine.get(&[b'k', i]).await.unwrap(),
            Some(vec![b'v'; 32])
        );
    }
}

#[tokio::test]
async fn recovery_replays_wal_rows_not_covered_by_the_checkpoint() {
    let store = memory_store();
    {
        let engine = Engine::open(store.clone(), test_config()).await.unwrap();
        engine.put(b"k1".to_vec(), b"v1".to_vec()).await.unwrap();
        engine.wal.flush().await.unwrap();
        // Simulate a crash: the process exits here without ever calling
        // flush()/close(), so the write only exists in the WAL.
    }

    let engine = Engine::open(store, test_config()).await.unwrap();
    assert_eq!(engine.get(b"k1").await.unwrap(), Some(b"v1".to_vec()));
}

#[tokio::test]
async fn recovery_skips_rows_already_covered_by_the_checkpoint() {
    let store = memory_store();
    {
        let engine = Engine::open(store.clone(), test_config()).await.unwrap();
        engine.put(b"k1".to_vec(), b"v1".to_vec()).await.unwrap();
        engine.flush().await.unwrap();
        engine.put(b"k2".to_vec(), b"v2".to_vec()).await.unwrap();
        engine.wal.flush().await.unwrap();
    }

    let engine = Engine::open(store, test_config()).await.unwrap();
    assert_eq!(engine.get(b"k1").await.unwrap(), Some(b"v1".to_vec()));
    assert_eq!(engine.get(b"k2").await.unwrap(), Some(b"v2".to_vec()));
}

#[tokio::test]
async fn discovery_orders_l0_newest_first_regardless_of_sweep_order() {
    let store = memory_store();
    sstable::write_sstable(&store, 0, &[(b"k".to_vec(), Some(b"old".to_vec()))])
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(2)).await;
    sstable::write_sstable(&store, 0, &[(b"k".to_vec(), Some(b"new".to_vec()))])
        .await
        .unwrap();

    // A follower that never wrote either table discovers both in a single
    // sweep; the newer write must win the key collision regardless of the
    // order `list()` happens to return them in.
    let mut cfg = test_config();
    cfg.designated_leader = false;
    let engine = Engine::open(store, cfg).await.unwrap();
    assert_eq!(engine.get(b"k").await.unwrap(), Some(b"new".to_vec()));
}

#[tokio::test]
async fn non_leader_writes_are_rejected() {
    let mut cfg = test_config();
    cfg.designated_leader = false;
    let engine = Engine::open(memory_store(), cfg).await.unwrap();
    assert!(!engine.is_leader());
    let err = engine.put(b"k".to_vec(), b"v".to_vec()).await.unwrap_err();
    assert!(matches!(err, EngineError::NotLeader));
}

#[tokio::test]
async fn operations_after_close_return_closed() {
    let engine = Engine::open(memory_store(), test_config()).await.unwrap();
    let workers = engine.spawn_background_workers();
    engine.close(workers, Duration::from_millis(50)).await.unwrap();

    let err = engine.get(b"k").await.unwrap_err();
    assert!(matches!(err, EngineError::Closed));
    let err = engine.put(b"k".to_vec(), b"v".to_vec()).await.unwrap_err();
    assert!(matches!(err, EngineError::Closed));
}

#[tokio::test]
async fn close_releases_the_leader_lease() {
    let engine = Engine::open(memory_store(), test_config()).await.unwrap();
    assert!(engine.is_leader());
    let workers = engine.spawn_background_workers();
    engine.close(workers, Duration::from_millis(50)).await.unwrap();
    assert!(!engine.is_leader());
}

#[tokio::test]
async fn close_is_idempotent() {
    let engine = Engine::open(memory_store(), test_config()).await.unwrap();
    let workers = engine.spawn_background_workers();
    engine.close(workers, Duration::from_millis(50)).await.unwrap();

    let workers2 = engine.spawn_background_workers();
    engine.close(workers2, Duration::from_millis(50)).await.unwrap();
}
