//! Read path: active memtable → immutable memtables (newest first) → L0
//! (newest first) → L1..Ln, first hit wins. A tombstone encountered at any
//! level shadows everything below it and is reported as "not found".
use objectstore::ObjectStore;

use crate::{Engine, EngineError};

impl<S: ObjectStore + Clone + Send + Sync + 'static> Engine<S> {
    /// Looks up `key`, returning `Ok(None)` both when the key was never
    /// written and when the newest write found is a tombstone.
    pub async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError> {
        self.ensure_open()?;
        let _db = self.db_lock.read().await;

        // Memtables are fully in memory; resolve them without leaving the
        // lock, then drop it before touching any SST (which may do I/O).
        let memtable_hit = {
            let state = self.tree.read();
            if let Some(entry) = state.active.get_entry(key) {
                Some(entry.value.clone())
            } else {
                state
                    .immutable
                    .iter()
                    .find_map(|mt| mt.get_entry(key).map(|e| e.value.clone()))
            }
        };
        if let Some(value) = memtable_hit {
            return Ok(value);
        }

        let (l0, levels) = {
            let state = self.tree.read();
            let l0 = state.l0.clone();
            let levels: Vec<_> = state.levels.values().cloned().collect();
            (l0, levels)
        };

        for reader in &l0 {
            if let Some(value) = self.lookup_reader(reader, key).await? {
                return Ok(value);
            }
        }
        for level in &levels {
            for reader in level {
                if let Some(value) = self.lookup_reader(reader, key).await? {
                    return Ok(value);
                }
            }
        }
        Ok(None)
    }

    async fn lookup_reader(
        &self,
        reader: &sstable::SstReader<S>,
        key: &[u8],
    ) -> Result<Option<Option<Vec<u8>>>, EngineError> {
        if let Some(cached) = self.cache.write().get(reader.table_id(), key) {
            return Ok(Some(cached));
        }
        let found = reader.get(key).await?;
        if let Some(value) = &found {
            self.cache.write().insert(reader.table_id(), key, value.clone());
        }
        Ok(found)
    }
}
