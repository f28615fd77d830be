//! Table discovery: lists `data/l0/`..`data/l7/` for `.data` blobs not yet
//! registered and adds them as SST readers. Used both for cold-start
//! recovery (register everything already published, read nothing eagerly)
//! and as a periodic follower-convergence mechanism — a node that never
//! writes a byte itself still sees the leader's published state this way.
use std::sync::Arc;

use objectstore::ObjectStore;
use sstable::SstReader;

use crate::{Engine, EngineError};

/// Levels 0 through 7 are swept; the spec bounds discovery to this range
/// (compaction in this design only ever produces L1, but a future deeper
/// compaction strategy would still be found by a follower running this
/// unchanged).
const MAX_LEVEL: usize = 7;

/// Extracts the millisecond timestamp embedded in a `sstable-<ts>-<uuid>`
/// table id. Unparsable ids (there shouldn't be any) sort as oldest.
fn table_id_timestamp(table_id: &str) -> u64 {
    table_id
        .split('-')
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

impl<S: ObjectStore + Clone + Send + Sync + 'static> Engine<S> {
    /// One discovery pass across every level. Registers any `.data` blob
    /// not already known; never reads `.data`/`.index` contents (those load
    /// lazily on first `get`/`iterate` through [`SstReader`]'s caches).
    pub(crate) async fn discover_once(&self) -> Result<(), EngineError> {
        let _db = self.db_lock.read().await;
        for level in 0..=MAX_LEVEL {
            let prefix = format!("data/l{level}/");
            let keys = self.store.list(&prefix).await?;

            let mut fresh = Vec::new();
            {
                let state = self.tree.read();
                for key in &keys {
                    if let Some((lvl, table_id)) = sstable::parse_data_key(key) {
                        if lvl == level && !state.known.contains(&(lvl, table_id.clone())) {
                            fresh.push((lvl, table_id));
                        }
                    }
                }
            }
            if fresh.is_empty() {
                continue;
            }

            let mut state = self.tree.write();
            let mut l0_touched = false;
            for (lvl, table_id) in fresh {
                if !state.known.insert((lvl, table_id.clone())) {
                    continue;
                }
                let reader = Arc::new(SstReader::new(self.store.clone(), table_id, lvl));
                if lvl == 0 {
                    state.l0.push(reader);
                    l0_touched = true;
                } else {
                    state.levels.entry(lvl).or_default().push(reader);
                }
            }
            // Table ids, not list position, are the source of truth for
            // priority: re-sort newest-first by the timestamp embedded in
            // each id so a discovered table lands exactly where `flush()`
            // would have inserted it, regardless of discovery order.
            if l0_touched {
                state
                    .l0
                    .sort_by_key(|r| std::cmp::Reverse(table_id_timestamp(r.table_id())));
            }
        }
        Ok(())
    }

    /// Runs [`Engine::discover_once`] on a timer until `stop` fires.
    pub(crate) async fn run_discovery(
        self: Arc<Self>,
        interval: std::time::Duration,
        mut stop: tokio::sync::watch::Receiver<bool>,
    ) {
        let mut tick = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.discover_once().await {
                        tracing::error!(error = %e, "table discovery failed; continuing");
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
