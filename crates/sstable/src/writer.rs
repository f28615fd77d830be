use objectstore::ObjectStore;
use uuid::Uuid;

use crate::format::{encode_data_entry, encode_index_entry, sample_interval};
use crate::{data_key, index_key, SstError, SstMeta};
use bloom::BloomFilter;

/// Generates a monotonically-sortable, collision-resistant table id:
/// `sstable-<ms-timestamp>-<uuid>`.
pub fn new_table_id() -> String {
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before the epoch")
        .as_millis();
    format!("sstable-{ts}-{}", Uuid::new_v4())
}

/// Builds and uploads a new SST at `level` from `entries`, which must already
/// be sorted by key with no duplicates. `None` values are tombstones.
///
/// Writes three blobs: `.data`, `.index`, and an auxiliary `.bloom` (not part
/// of the bit-exact layout — an additive accelerator for negative lookups).
pub async fn write_sstable<S: ObjectStore>(
    store: &S,
    level: usize,
    entries: &[(Vec<u8>, Option<Vec<u8>>)],
) -> Result<SstMeta, SstError> {
    if entries.is_empty() {
        return Err(SstError::EmptyTable);
    }

    let interval = sample_interval(level);
    let mut data = Vec::new();
    let mut index = Vec::new();
    let mut bloom = BloomFilter::for_keys(entries.len());

    for (i, (key, value)) in entries.iter().enumerate() {
        let offset = data.len() as u64;
        if i % interval == 0 {
            encode_index_entry(key, offset, &mut index);
        }
        encode_data_entry(key, value.as_deref(), &mut data);
        bloom.insert(key);
    }

    let table_id = new_table_id();
    let mut bloom_bytes = Vec::new();
    bloom
        .write_to(&mut bloom_bytes)
        .expect("writing to a Vec<u8> is infallible");

    store.put(&data_key(level, &table_id), data).await?;
    store.put(&index_key(level, &table_id), index).await?;
    store
        .put(&crate::bloom_key(level, &table_id), bloom_bytes)
        .await?;

    Ok(SstMeta {
        table_id,
        level,
        min_key: entries.first().unwrap().0.clone(),
        max_key: entries.last().unwrap().0.clone(),
        count: entries.len(),
    })
}
