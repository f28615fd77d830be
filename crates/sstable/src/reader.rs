use objectstore::ObjectStore;
use tokio::sync::OnceCell;

use crate::format::{decode_data, decode_index, floor_offset, scan_data_from};
use crate::{bloom_key, data_key, index_key, SstError};
use bloom::BloomFilter;

/// A handle onto one already-published SST. Index, bloom filter, and the
/// full data blob are loaded lazily on first access and cached for the
/// lifetime of the reader.
pub struct SstReader<S: ObjectStore> {
    store: S,
    table_id: String,
    level: usize,
    index: OnceCell<Vec<(Vec<u8>, u64)>>,
    bloom: OnceCell<Option<BloomFilter>>,
    data: OnceCell<Vec<u8>>,
}

impl<S: ObjectStore> SstReader<S> {
    pub fn new(store: S, table_id: String, level: usize) -> Self {
        Self {
            store,
            table_id,
            level,
            index: OnceCell::new(),
            bloom: OnceCell::new(),
            data: OnceCell::new(),
        }
    }

    pub fn table_id(&self) -> &str {
        &self.table_id
    }

    pub fn level(&self) -> usize {
        self.level
    }

    async fn index(&self) -> Result<&Vec<(Vec<u8>, u64)>, SstError> {
        self.index
            .get_or_try_init(|| async {
                match self.store.get(&index_key(self.level, &self.table_id)).await? {
                    Some(bytes) => decode_index(&bytes),
                    None => Ok(Vec::new()),
                }
            })
            .await
    }

    async fn bloom(&self) -> &Option<BloomFilter> {
        self.bloom
            .get_or_init(|| async {
                match self.store.get(&bloom_key(self.level, &self.table_id)).await {
                    Ok(Some(bytes)) => {
                        let mut slice = bytes.as_slice();
                        BloomFilter::read_from(&mut slice).ok()
                    }
                    _ => None,
                }
            })
            .await
    }

    async fn data(&self) -> Result<&Vec<u8>, SstError> {
        self.data
            .get_or_try_init(|| async {
                match self.store.get(&data_key(self.level, &self.table_id)).await? {
                    Some(bytes) => Ok(bytes),
                    None => {
                        tracing::warn!(table_id = %self.table_id, "data blob missing for registered SST");
                        Ok(Vec::new())
                    }
                }
            })
            .await
    }

    /// Looks up `key`.
    ///
    /// - `Ok(None)` — the key is not in this table.
    /// - `Ok(Some(None))` — the key is a tombstone in this table.
    /// - `Ok(Some(Some(v)))` — the key's live value in this table.
    pub async fn get(&self, key: &[u8]) -> Result<Option<Option<Vec<u8>>>, SstError> {
        if let Some(bloom) = self.bloom().await {
            if !bloom.may_contain(key) {
                return Ok(None);
            }
        }

        let index = self.index().await?;
        let start = floor_offset(index, key);
        let data = self.data().await?;
        if data.is_empty() {
            return Ok(None);
        }
        let hits = scan_data_from(data, start, Some(key))?;
        Ok(hits
            .into_iter()
            .find(|e| e.key == key)
            .map(|e| e.value))
    }

    /// Yields every `(key, value)` entry front to back, tombstones included.
    pub async fn iterate(&self) -> Result<Vec<(Vec<u8>, Option<Vec<u8>>)>, SstError> {
        let data = self.data().await?;
        if data.is_empty() {
            return Ok(Vec::new());
        }
        Ok(decode_data(data)?
            .into_iter()
            .map(|e| (e.key, e.value))
            .collect())
    }

    pub async fn min_max_key(&self) -> Result<Option<(Vec<u8>, Vec<u8>)>, SstError> {
        let entries = self.iterate().await?;
        Ok(match (entries.first(), entries.last()) {
            (Some(first), Some(last)) => Some((first.0.clone(), last.0.clone())),
            _ => None,
        })
    }
}
