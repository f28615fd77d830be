//! Write path: `put`, `delete`, memtable rotation, and `flush`.
//!
//! Every mutation is assigned a sequence before anything else happens,
//! appended to the WAL queue (no I/O — see [`wal::WalWriter::append`]), then
//! applied to the active memtable. Rotation and flush follow the thresholds
//! in [`config::MemtableConfig`].
use std::sync::Arc;

use objectstore::ObjectStore;
use sstable::SstReader;

use crate::{now_ms, Engine, EngineError, LsmState};

impl<S: ObjectStore + Clone + Send + Sync + 'static> Engine<S> {
    /// Inserts `value` at `key`. Fails with [`EngineError::NotLeader`] if
    /// this node does not currently hold the leader lease.
    pub async fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), EngineError> {
        self.ensure_open()?;
        self.ensure_leader()?;
        let _db = self.db_lock.read().await;

        let seq = self.next_seq().await?;
        let ts = now_ms();
        self.wal.append(memtable::Row::put(seq, key.clone(), value.clone(), ts));

        let should_flush = {
            let mut state = self.tree.write();
            state.active.put(key, value, seq, ts);
            rotate_if_full(&mut state, &self.config.memtable)
        };
        if should_flush {
            drop(_db);
            self.flush().await?;
        }
        Ok(())
    }

    /// Writes a tombstone for `key`.
    pub async fn delete(&self, key: Vec<u8>) -> Result<(), EngineError> {
        self.ensure_open()?;
        self.ensure_leader()?;
        let _db = self.db_lock.read().await;

        let seq = self.next_seq().await?;
        let ts = now_ms();
        self.wal.append(memtable::Row::delete(seq, key.clone(), ts));

        let should_flush = {
            let mut state = self.tree.write();
            state.active.delete(key, seq, ts);
            rotate_if_full(&mut state, &self.config.memtable)
        };
        if should_flush {
            drop(_db);
            self.flush().await?;
        }
        Ok(())
    }

    async fn next_seq(&self) -> Result<u64, EngineError> {
        let seq = self.sequence.lock().await;
        Ok(seq.next()?)
    }

    /// Forces a flush of the active and any pending immutable memtables to
    /// new L0 SSTs, regardless of whether the rotation thresholds have been
    /// reached. A no-op if there is nothing to flush.
    pub async fn flush(&self) -> Result<(), EngineError> {
        self.ensure_open()?;
        let _db = self.db_lock.write().await;

        let to_flush = {
            let mut state = self.tree.write();
            if !state.active.is_empty() {
                let mut frozen = std::mem::replace(&mut state.active, memtable::Memtable::new());
                frozen.freeze();
                state.immutable.insert(0, frozen);
            }
            std::mem::take(&mut state.immutable)
        };
        if to_flush.is_empty() {
            return Ok(());
        }

        let mut max_seq = 0u64;
        // Oldest immutable table first, so the newest ends up at the front
        // of L0 once every `insert(0, ...)` below has run.
        for table in to_flush.into_iter().rev() {
            if table.is_empty() {
                continue;
            }
            max_seq = max_seq.max(table.max_seq());
            let entries: Vec<(Vec<u8>, Option<Vec<u8>>)> = table
                .iter()
                .map(|(k, entry)| (k.to_vec(), entry.value.clone()))
                .collect();
            let meta = sstable::write_sstable(&self.store, 0, &entries).await?;
            let reader = Arc::new(SstReader::new(self.store.clone(), meta.table_id.clone(), 0));
            let mut state = self.tree.write();
            state.l0.insert(0, reader);
            state.known.insert((0, meta.table_id));
        }

        let wal_offset = self.latest_wal_ts().await?;
        self.checkpointer.update(max_seq, wal_offset).await?;

        let l0_len = self.tree.read().l0.len();
        let should_compact = l0_len > self.config.compaction.l0_trigger;
        drop(_db);
        if should_compact {
            self.compact().await?;
        }
        Ok(())
    }

    /// The timestamp suffix of the newest WAL segment known to exist,
    /// flushing any still-buffered rows first so the value reflects
    /// everything durable up to this point (§9 Open Question (b): there is
    /// no byte-offset concept over a sequence of timestamped blobs, so the
    /// checkpoint's `last_flushed_wal_offset` field carries this instead).
    async fn latest_wal_ts(&self) -> Result<u64, EngineError> {
        if let Some(key) = self.wal.flush().await? {
            return Ok(wal::parse_segment_ts(&key).unwrap_or(0));
        }
        let segments = wal::list_segments(&self.store).await?;
        Ok(segments
            .last()
            .and_then(|k| wal::parse_segment_ts(k))
            .unwrap_or_else(|| self.checkpointer.current().last_flushed_wal_offset))
    }
}

/// Freezes the active memtable into the immutable list if its byte
/// footprint has crossed the rotation threshold. Returns whether the
/// immutable list has now reached the flush trigger.
fn rotate_if_full<S: ObjectStore>(state: &mut LsmState<S>, cfg: &config::MemtableConfig) -> bool {
    if state.active.approx_bytes() >= cfg.bytes {
        let mut frozen = std::mem::replace(&mut state.active, memtable::Memtable::new());
        frozen.freeze();
        state.immutable.insert(0, frozen);
    }
    state.immutable.len() >= cfg.max_immutable
}
