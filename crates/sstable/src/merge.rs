//! K-way merge over several [`SstReader`]s, used by compaction.
//!
//! Readers are given in priority order — index 0 is the newest source.
//! When the same key appears in more than one reader, the entry from the
//! highest-priority (lowest-index) reader wins; the SST wire format carries
//! no sequence number, so table priority (the LSM's L0 newest-first order,
//! followed by L1) is the only signal available for tie-breaking.
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use objectstore::ObjectStore;

use crate::{SstError, SstReader};

struct HeapEntry {
    key: Vec<u8>,
    source: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.source == other.source
    }
}
impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on key; ties favor the lower source index (higher priority).
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.source.cmp(&self.source))
    }
}

/// Merges `readers` (highest priority first) into one sorted,
/// duplicate-free stream of `(key, value)` pairs, tombstones included.
pub async fn merge_tables<S: ObjectStore>(
    readers: &[&SstReader<S>],
) -> Result<Vec<(Vec<u8>, Option<Vec<u8>>)>, SstError> {
    let mut entries: Vec<Vec<(Vec<u8>, Option<Vec<u8>>)>> = Vec::with_capacity(readers.len());
    for reader in readers {
        entries.push(reader.iterate().await?);
    }

    let mut iters: Vec<std::vec::IntoIter<(Vec<u8>, Option<Vec<u8>>)>> =
        entries.into_iter().map(|v| v.into_iter()).collect();
    let mut heads: Vec<Option<(Vec<u8>, Option<Vec<u8>>)>> =
        iters.iter_mut().map(|it| it.next()).collect();

    let mut heap = BinaryHeap::new();
    for (source, head) in heads.iter().enumerate() {
        if let Some((key, _)) = head {
            heap.push(HeapEntry {
                key: key.clone(),
                source,
            });
        }
    }

    let mut out = Vec::new();
    while let Some(top) = heap.pop() {
        let best_key = top.key;
        let mut winner: Option<(usize, Option<Vec<u8>>)> = None;

        // Collect every source currently positioned at `best_key`.
        let mut sources_at_key = vec![top.source];
        while let Some(peek) = heap.peek() {
            if peek.key != best_key {
                break;
            }
            sources_at_key.push(heap.pop().unwrap().source);
        }

        for source in sources_at_key {
            let (key, value) = heads[source].take().expect("source was at the head");
            debug_assert_eq!(key, best_key);
            if winner.is_none() {
                winner = Some((source, value));
            }
            let next = iters[source].next();
            if let Some((next_key, _)) = &next {
                heap.push(HeapEntry {
                    key: next_key.clone(),
                    source,
                });
            }
            heads[source] = next;
        }

        out.push((best_key, winner.unwrap().1));
    }

    Ok(out)
}
