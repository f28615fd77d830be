//! Compaction: merges every L0 and L1 SST into a single new L1 table.
//!
//! This core's compaction is intentionally the "simplified form" the spec
//! calls for: always a full merge of L0+L1 into one L1 table, never a
//! multi-level cascade. Tombstones are retained rather than dropped (§9
//! Open Question (a) — see `DESIGN.md`), since a lower level could in
//! principle still exist below L1 in a future extension and a dropped
//! tombstone here would silently resurrect a deleted key. Old SST blobs are
//! left on the object store; there is no sweeper (§9 Open Question (c)).
use std::sync::Arc;

use objectstore::ObjectStore;
use sstable::SstReader;

use crate::{Engine, EngineError};

impl<S: ObjectStore + Clone + Send + Sync + 'static> Engine<S> {
    /// Merges all currently-registered L0 and L1 tables into one new L1
    /// table. A no-op if there is nothing, or only one table, to merge.
    pub async fn compact(&self) -> Result<(), EngineError> {
        self.ensure_open()?;
        let _db = self.db_lock.write().await;

        let mut readers: Vec<Arc<SstReader<S>>> = {
            let mut state = self.tree.write();
            let mut l0 = std::mem::take(&mut state.l0);
            let mut l1 = state.levels.remove(&1).unwrap_or_default();
            let mut combined = Vec::with_capacity(l0.len() + l1.len());
            combined.append(&mut l0);
            combined.append(&mut l1);
            combined
        };

        if readers.len() <= 1 {
            // Nothing to merge; put whatever single table existed back into
            // L0 so it is not lost (it may have come from either level, but
            // L0 is always probed first on read so correctness is
            // unaffected by the level it temporarily sits in).
            let mut state = self.tree.write();
            state.l0.append(&mut readers);
            return Ok(());
        }

        let refs: Vec<&SstReader<S>> = readers.iter().map(AsRef::as_ref).collect();
        let merged = sstable::merge::merge_tables(&refs).await?;

        if merged.is_empty() {
            // Every source table was empty (shouldn't normally happen, since
            // an empty memtable is never flushed) or fully tombstoned with
            // nothing left to retain.
            return Ok(());
        }

        let meta = sstable::write_sstable(&self.store, 1, &merged).await?;
        let new_reader = Arc::new(SstReader::new(self.store.clone(), meta.table_id.clone(), 1));

        let mut state = self.tree.write();
        state.levels.insert(1, vec![new_reader]);
        state.known.insert((1, meta.table_id));
        Ok(())
    }

    /// Runs [`Engine::compact`] on a timer until `stop` fires.
    pub(crate) async fn run_compaction(
        self: Arc<Self>,
        interval: std::time::Duration,
        mut stop: tokio::sync::watch::Receiver<bool>,
    ) {
        let mut tick = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if self.l0_count() > self.config.compaction.l0_trigger {
                        if let Err(e) = self.compact().await {
                            tracing::error!(error = %e, "compaction failed; continuing");
                        }
                    }
                }
                _ = stop.changed() => {
                    if *stop.borrow() {
                        return;
                    }
                }
            }
        }
    }
}
