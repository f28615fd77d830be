//! # Memtable
//!
//! The in-memory, sorted, mutable write buffer at the bottom of EchoDB's read
//! path. Every `put`/`delete` lands here first; the [`crate::Row`] type
//! defined in this crate is also the wire unit shared by the `wal` and
//! `sstable` crates, so a mutation has exactly one shape from the moment it
//! is accepted until it is durably sorted into an SST.
//!
//! ## Key properties
//! - **Sorted order**: entries are always in ascending key order (`BTreeMap`),
//!   which is what lets a flush walk the table and emit a sorted SST directly.
//! - **Sequence-number gated**: a write with a sequence number <= the
//!   existing entry's sequence is silently dropped. This is what makes WAL
//!   recovery idempotent (replaying the same rows twice never regresses a
//!   key to an older value).
//! - **Tombstone support**: deletes are recorded as `Row { kind: Delete, .. }`
//!   and shadow older values both here and once flushed into an SST.
//! - **Approximate size tracking**: `approx_bytes` sums key+value bytes so the
//!   engine can decide when to rotate.
//!
//! ## Lifecycle
//!
//! A table starts *active* (writable). [`Memtable::freeze`] transitions it to
//! *immutable*: every subsequent `put`/`delete` is a programmer error (the
//! engine must install a fresh active table before routing more writes) and
//! is rejected — panicking in debug builds, silently ignored in release,
//! matching the `Internal` error policy.
use std::collections::BTreeMap;

/// A mutation kind: a live value, or a tombstone recording a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Put,
    Delete,
}

/// A single mutation with its assigned sequence number.
///
/// `value` is `Some` iff `kind == Put`; a `Delete` row always carries
/// `value: None`. `ts` is the wall-clock milliseconds at which the row was
/// produced, carried through to the WAL and the SST for diagnostics — it
/// plays no role in ordering (sequence numbers do that).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub seq: u64,
    pub kind: RowKind,
    pub key: Vec<u8>,
    pub value: Option<Vec<u8>>,
    pub ts: u64,
}

impl Row {
    pub fn put(seq: u64, key: Vec<u8>, value: Vec<u8>, ts: u64) -> Self {
        Self {
            seq,
            kind: RowKind::Put,
            key,
            value: Some(value),
            ts,
        }
    }

    pub fn delete(seq: u64, key: Vec<u8>, ts: u64) -> Self {
        Self {
            seq,
            kind: RowKind::Delete,
            key,
            value: None,
            ts,
        }
    }

    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        matches!(self.kind, RowKind::Delete)
    }
}

/// A value-bearing entry as stored in a [`Memtable`] or an SST index: the
/// parts of a [`Row`] that matter once the key itself is the map key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueEntry {
    pub seq: u64,
    pub value: Option<Vec<u8>>,
    pub ts: u64,
}

impl From<Row> for (Vec<u8>, ValueEntry) {
    fn from(row: Row) -> Self {
        (
            row.key,
            ValueEntry {
                seq: row.seq,
                value: row.value,
                ts: row.ts,
            },
        )
    }
}

/// An ordered, in-memory write buffer backed by a `BTreeMap`.
#[derive(Debug)]
pub struct Memtable {
    map: BTreeMap<Vec<u8>, ValueEntry>,
    approx_bytes: usize,
    max_seq: u64,
    frozen: bool,
}

impl Default for Memtable {
    fn default() -> Self {
        Self::new()
    }
}

impl Memtable {
    /// Creates a new, empty, active memtable.
    pub fn new() -> Self {
        Self {
            map: BTreeMap::new(),
            approx_bytes: 0,
            max_seq: 0,
            frozen: false,
        }
    }

    /// Inserts a live value for `key` at `seq`.
    ///
    /// Silently ignored if the key already holds an entry with `seq' >= seq`
    /// (stale-write protection — required for idempotent WAL recovery).
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>, seq: u64, ts: u64) {
        self.insert(key, Some(value), seq, ts);
    }

    /// Records a tombstone for `key` at `seq`.
    ///
    /// Same stale-write protection as [`Memtable::put`].
    pub fn delete(&mut self, key: Vec<u8>, seq: u64, ts: u64) {
        self.insert(key, None, seq, ts);
    }

    fn insert(&mut self, key: Vec<u8>, value: Option<Vec<u8>>, seq: u64, ts: u64) {
        debug_assert!(!self.frozen, "write to a frozen memtable");
        if self.frozen {
            return;
        }

        match self.map.get(&key) {
            Some(old) if old.seq >= seq => return,
            Some(old) => {
                if let Some(ref ov) = old.value {
                    self.approx_bytes = self.approx_bytes.saturating_sub(ov.len());
                }
            }
            None => {
                self.approx_bytes = self.approx_bytes.saturating_add(key.len());
            }
        }

        if let Some(ref v) = value {
            self.approx_bytes = self.approx_bytes.saturating_add(v.len());
        }

        self.max_seq = self.max_seq.max(seq);
        self.map.insert(key, ValueEntry { seq, value, ts });
    }

    /// Looks up a key, returning `None` for both "absent" and "tombstoned".
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.map.get(key).and_then(|e| e.value.as_deref())
    }

    /// Looks up a key, returning the raw entry (tombstone included).
    #[must_use]
    pub fn get_entry(&self, key: &[u8]) -> Option<&ValueEntry> {
        self.map.get(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.map.contains_key(key)
    }

    /// Iterates live (non-tombstone) entries in ascending key order.
    pub fn iterate(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.map
            .iter()
            .filter_map(|(k, e)| e.value.as_deref().map(|v| (k.as_slice(), v)))
    }

    /// Iterates every entry (tombstones included) in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &ValueEntry)> {
        self.map.iter().map(|(k, v)| (k.as_slice(), v))
    }

    #[must_use]
    pub fn approx_bytes(&self) -> usize {
        self.approx_bytes
    }

    #[must_use]
    pub fn max_seq(&self) -> u64 {
        self.max_seq
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Transitions *active* -> *immutable*. Irreversible.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }
}
