use super::*;
use crate::merge::merge_tables;
use objectstore::{memory_store, ObjectStore};
use proptest::prelude::*;

fn entries(pairs: &[(&str, Option<&str>)]) -> Vec<(Vec<u8>, Option<Vec<u8>>)> {
    pairs
        .iter()
        .map(|(k, v)| (k.as_bytes().to_vec(), v.map(|v| v.as_bytes().to_vec())))
        .collect()
}

#[tokio::test]
async fn round_trip_every_key_returns_its_value() {
    let store = memory_store();
    let data = entries(&[("a", Some("1")), ("b", Some("2")), ("c", Some("3"))]);
    let meta = write_sstable(&store, 0, &data).await.unwrap();

    let reader = SstReader::new(store, meta.table_id, meta.level);
    for (k, v) in &data {
        assert_eq!(reader.get(k).await.unwrap(), Some(v.clone()));
    }
    assert_eq!(reader.get(b"missing").await.unwrap(), None);
}

#[tokio::test]
async fn iterate_yields_pairs_in_sorted_order() {
    let store = memory_store();
    let data = entries(&[("a", Some("1")), ("b", Some("2")), ("c", Some("3"))]);
    let meta = write_sstable(&store, 0, &data).await.unwrap();
    let reader = SstReader::new(store, meta.table_id, meta.level);
    assert_eq!(reader.iterate().await.unwrap(), data);
}

#[tokio::test]
async fn tombstone_is_distinguished_from_absence() {
    let store = memory_store();
    let data = entries(&[("a", Some("1")), ("b", None)]);
    let meta = write_sstable(&store, 0, &data).await.unwrap();
    let reader = SstReader::new(store, meta.table_id, meta.level);

    assert_eq!(reader.get(b"b").await.unwrap(), Some(None));
    assert_eq!(reader.get(b"zzz").await.unwrap(), None);
}

#[tokio::test]
async fn sparse_index_floor_lookup_finds_keys_between_samples() {
    let store = memory_store();
    // 50 keys at level 0 => sample_interval = 10, so most keys are not
    // directly indexed and must be found via floor + scan.
    let data: Vec<(Vec<u8>, Option<Vec<u8>>)> = (0..50)
        .map(|i| (format!("k{i:03}").into_bytes(), Some(format!("v{i}").into_bytes())))
        .collect();
    let meta = write_sstable(&store, 0, &data).await.unwrap();
    let reader = SstReader::new(store, meta.table_id, meta.level);

    for (k, v) in &data {
        assert_eq!(reader.get(k).await.unwrap(), Some(v.clone()));
    }
}

#[tokio::test]
async fn sample_interval_matches_level_rule() {
    assert_eq!(format::sample_interval(0), 10);
    assert_eq!(format::sample_interval(1), 10);
    assert_eq!(format::sample_interval(2), 20);
    assert_eq!(format::sample_interval(10), 50);
    assert_eq!(format::sample_interval(100), 50);
}

#[tokio::test]
async fn empty_entries_is_rejected() {
    let store = memory_store();
    let err = write_sstable(&store, 0, &[]).await.unwrap_err();
    assert!(matches!(err, SstError::EmptyTable));
}

#[tokio::test]
async fn merge_prefers_higher_priority_source_on_key_collision() {
    let store = memory_store();
    let newer = write_sstable(&store, 0, &entries(&[("a", Some("new"))]))
        .await
        .unwrap();
    let older = write_sstable(&store, 0, &entries(&[("a", Some("old")), ("b", Some("2"))]))
        .await
        .unwrap();

    let newer_reader = SstReader::new(store.clone(), newer.table_id, newer.level);
    let older_reader = SstReader::new(store.clone(), older.table_id, older.level);
    let merged = merge_tables(&[&newer_reader, &older_reader]).await.unwrap();
    assert_eq!(
        merged,
        entries(&[("a", Some("new")), ("b", Some("2"))])
    );
}

#[tokio::test]
async fn merge_retains_tombstones() {
    let store = memory_store();
    let newer = write_sstable(&store, 0, &entries(&[("a", None)])).await.unwrap();
    let older = write_sstable(&store, 1, &entries(&[("a", Some("old"))]))
        .await
        .unwrap();

    let newer_reader = SstReader::new(store.clone(), newer.table_id, newer.level);
    let older_reader = SstReader::new(store.clone(), older.table_id, older.level);
    let merged = merge_tables(&[&newer_reader, &older_reader]).await.unwrap();
    assert_eq!(merged, entries(&[("a", None)]));
}

#[tokio::test]
async fn bloom_filter_gives_fast_negative_for_absent_key() {
    let store = memory_store();
    let data = entries(&[("a", Some("1"))]);
    let meta = write_sstable(&store, 0, &data).await.unwrap();
    assert!(store
        .get(&bloom_key(meta.level, &meta.table_id))
        .await
        .unwrap()
        .is_some());

    let reader = SstReader::new(store, meta.table_id, meta.level);
    assert_eq!(reader.get(b"definitely-not-present").await.unwrap(), None);
}

#[tokio::test]
async fn reader_tolerates_missing_data_blob() {
    let store = memory_store();
    let reader = SstReader::new(store, "nonexistent".to_string(), 0);
    assert_eq!(reader.get(b"k").await.unwrap(), None);
    assert_eq!(reader.iterate().await.unwrap(), Vec::new());
}

#[test]
fn parses_data_key_into_level_and_table_id() {
    assert_eq!(
        parse_data_key("data/l0/sstable-123-abc.data"),
        Some((0, "sstable-123-abc".to_string()))
    );
    assert_eq!(parse_data_key("wal/wal-123"), None);
}

proptest::proptest! {
    #[test]
    fn prop_sstable_round_trip_preserves_every_key(
        raw in proptest::collection::vec(
            (any::<u8>(), proptest::option::of(proptest::collection::vec(any::<u8>(), 0..16))),
            1..80,
        )
    ) {
        use std::collections::BTreeMap;
        let mut sorted: BTreeMap<Vec<u8>, Option<Vec<u8>>> = BTreeMap::new();
        for (k, v) in raw {
            sorted.insert(vec![k], v);
        }
        let data: Vec<(Vec<u8>, Option<Vec<u8>>)> = sorted.into_iter().collect();

        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let store = memory_store();
            let meta = write_sstable(&store, 0, &data).await.unwrap();
            let reader = SstReader::new(store, meta.table_id, meta.level);
            for (k, v) in &data {
                prop_assert_eq!(reader.get(k).await.unwrap(), Some(v.clone()));
            }
            prop_assert_eq!(reader.iterate().await.unwrap(), data);
            Ok(())
        })?;
    }
}
