use super::*;
use parking_lot::Mutex;
use std::sync::Arc;
use wal::WalWriter;

#[derive(Default)]
struct FakeSink {
    applied: Mutex<Vec<(Vec<u8>, Option<Vec<u8>>, u64)>>,
}

impl WriteSink for FakeSink {
    fn put_with_seq(&self, key: Vec<u8>, value: Vec<u8>, seq: u64, _ts: u64) {
        self.applied.lock().push((key, Some(value), seq));
    }
    fn delete_with_seq(&self, key: Vec<u8>, seq: u64, _ts: u64) {
        self.applied.lock().push((key, None, seq));
    }
}

#[tokio::test]
async fn replays_rows_above_checkpoint_only() {
    let store = objectstore::memory_store();
    let writer = WalWriter::new(store.clone());
    writer.append(Row::put(50, b"a".to_vec(), b"old".to_vec(), 0));
    writer.append(Row::put(150, b"b".to_vec(), b"new".to_vec(), 0));
    writer.flush().await.unwrap();

    let checkpoint = Checkpoint {
        last_flushed_seq: 100,
        last_flushed_wal_offset: 0,
        ts: 0,
    };
    let sink = FakeSink::default();
    let applied = recover(&store, &checkpoint, &sink).await.unwrap();

    assert_eq!(applied, 1);
    let rows = sink.applied.lock();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].0, b"b".to_vec());
}

#[tokio::test]
async fn segments_older_than_last_flushed_wal_offset_are_skipped_entirely() {
    let store = objectstore::memory_store();
    store.put("wal/wal-5", b"garbage-but-never-read".to_vec()).await.unwrap();

    let checkpoint = Checkpoint {
        last_flushed_seq: 0,
        last_flushed_wal_offset: 100,
        ts: 0,
    };
    let sink = FakeSink::default();
    // If the old segment were read, decode_segment would choke on garbage
    // and we'd see a warning log but no panic either way; assert it's
    // filtered out before a GET even happens by checking no rows applied.
    let applied = recover(&store, &checkpoint, &sink).await.unwrap();
    assert_eq!(applied, 0);
}

#[tokio::test]
async fn replay_is_idempotent() {
    let store = objectstore::memory_store();
    let writer = WalWriter::new(store.clone());
    writer.append(Row::put(1, b"x".to_vec(), b"1".to_vec(), 0));
    writer.flush().await.unwrap();

    let checkpoint = Checkpoint { last_flushed_seq: 0, last_flushed_wal_offset: 0, ts: 0 };
    let sink = Arc::new(FakeSink::default());

    recover(&store, &checkpoint, sink.as_ref()).await.unwrap();
    recover(&store, &checkpoint, sink.as_ref()).await.unwrap();

    // The sink saw the row twice (recovery itself is just replay-and-apply);
    // idempotence of the *resulting state* is the memtable's job, exercised
    // in the engine-level integration tests.
    assert_eq!(sink.applied.lock().len(), 2);
}

#[tokio::test]
async fn unparsable_segment_timestamp_is_included_conservatively() {
    let store = objectstore::memory_store();
    let mut row_bytes = Vec::new();
    wal::encode_row(&Row::put(1, b"k".to_vec(), b"v".to_vec(), 0), &mut row_bytes);
    store.put("wal/wal-not-a-number", row_bytes).await.unwrap();

    let checkpoint = Checkpoint { last_flushed_seq: 0, last_flushed_wal_offset: 1000, ts: 0 };
    let sink = FakeSink::default();
    let applied = recover(&store, &checkpoint, &sink).await.unwrap();
    assert_eq!(applied, 1);
}
