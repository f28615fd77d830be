use super::*;
use objectstore::memory_store;
use proptest::prelude::*;
use std::time::Duration;

#[tokio::test]
async fn first_allocation_after_empty_store_starts_past_one_batch() {
    let store = memory_store();
    let alloc = SequenceAllocator::new(store).await.unwrap();
    assert_eq!(alloc.next().unwrap(), 1);
    assert_eq!(alloc.next().unwrap(), 2);
}

#[tokio::test]
async fn sequences_are_strictly_increasing() {
    let store = memory_store();
    let alloc = SequenceAllocator::new(store).await.unwrap();
    let mut prev = 0;
    for _ in 0..50 {
        let v = alloc.next().unwrap();
        assert!(v > prev);
        prev = v;
    }
}

#[tokio::test]
async fn restart_after_crash_skips_past_the_reserved_batch() {
    // Scenario 3 from the testable-properties list: allocate 1..5, simulate
    // a crash (drop without persisting further), restart with the
    // persisted ceiling still at `BATCH`; the next allocation must be
    // strictly beyond every value handed out before the crash.
    let store = memory_store();
    {
        let alloc = SequenceAllocator::new(store.clone()).await.unwrap();
        for _ in 0..5 {
            alloc.next().unwrap();
        }
        // no close() — simulates a crash with no further persistence
    }

    let persisted = store.get(SEQUENCE_KEY).await.unwrap().unwrap();
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&persisted);
    assert_eq!(u64::from_be_bytes(buf), BATCH);

    let restarted = SequenceAllocator::new(store).await.unwrap();
    let next = restarted.next().unwrap();
    assert!(next >= BATCH + BATCH, "next={next} must skip past the prior reservation");
}

#[tokio::test]
async fn close_persists_final_value_synchronously() {
    let store = memory_store();
    let mut alloc = SequenceAllocator::new(store.clone()).await.unwrap();
    let last = (0..10).map(|_| alloc.next().unwrap()).last().unwrap();
    alloc.close(Duration::from_secs(1)).await.unwrap();

    let persisted = store.get(SEQUENCE_KEY).await.unwrap().unwrap();
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&persisted);
    assert!(u64::from_be_bytes(buf) >= last);
}

#[tokio::test]
async fn next_after_close_errors() {
    let store = memory_store();
    let mut alloc = SequenceAllocator::new(store).await.unwrap();
    alloc.close(Duration::from_secs(1)).await.unwrap();
    assert!(matches!(alloc.next(), Err(SequenceError::Closed)));
}

#[tokio::test]
async fn eager_reservation_extends_ceiling_before_exhaustion() {
    let store = memory_store();
    let alloc = SequenceAllocator::new(store.clone()).await.unwrap();
    // Drive the counter to within the eager margin of the initial ceiling.
    for _ in 0..(BATCH - EAGER_MARGIN) {
        alloc.next().unwrap();
    }
    // Give the spawned reservation task a chance to run.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let persisted = store.get(SEQUENCE_KEY).await.unwrap().unwrap();
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&persisted);
    assert!(
        u64::from_be_bytes(buf) > BATCH,
        "ceiling should have been extended before running out"
    );
}

proptest::proptest! {
    #[test]
    fn prop_sequences_never_repeat_across_restart_with_arbitrary_allocation_counts(
        first_round in 1u64..50,
        second_round in 1u64..50,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async move {
            let store = memory_store();
            let mut seen = std::collections::HashSet::new();
            {
                let alloc = SequenceAllocator::new(store.clone()).await.unwrap();
                for _ in 0..first_round {
                    seen.insert(alloc.next().unwrap());
                }
            }
            let alloc = SequenceAllocator::new(store).await.unwrap();
            for _ in 0..second_round {
                let v = alloc.next().unwrap();
                prop_assert!(!seen.contains(&v));
                seen.insert(v);
            }
            Ok(())
        })?;
    }
}
