//! # Sorted Table (SST)
//!
//! An immutable, sorted, two-blob file pair published to the object store:
//! a `.data` blob of length-prefixed `(key, value)` entries and a sparse
//! `.index` blob sampling every `sample_interval(level)`-th key. A third,
//! additive `.bloom` blob accelerates negative lookups without being part of
//! the bit-exact layout (see [`bloom`]).
//!
//! `writer::write_sstable` builds and uploads a table from sorted entries;
//! `reader::SstReader` opens a published table and serves point lookups via
//! a floor-lookup into the sparse index followed by a bounded linear scan,
//! plus full iteration for compaction and tests; `merge::merge_tables` folds
//! several readers into one sorted, deduplicated stream for compaction to
//! consume.
pub mod cache;
pub mod format;
pub mod merge;
pub mod reader;
pub mod writer;

pub use cache::{CachePolicy, ValueCache};
pub use reader::SstReader;
pub use writer::{new_table_id, write_sstable};

use objectstore::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SstError {
    #[error("object store error: {0}")]
    Store(#[from] StoreError),
    #[error("corrupt SST: {0}")]
    Corrupt(String),
    #[error("cannot build an SST from zero entries")]
    EmptyTable,
}

/// Metadata describing a freshly built table, handed back to the LSM
/// coordinator so it can register the table without re-reading it.
#[derive(Debug, Clone)]
pub struct SstMeta {
    pub table_id: String,
    pub level: usize,
    pub min_key: Vec<u8>,
    pub max_key: Vec<u8>,
    pub count: usize,
}

pub fn data_key(level: usize, table_id: &str) -> String {
    format!("data/l{level}/{table_id}.data")
}

pub fn index_key(level: usize, table_id: &str) -> String {
    format!("data/l{level}/{table_id}.index")
}

pub fn bloom_key(level: usize, table_id: &str) -> String {
    format!("data/l{level}/{table_id}.bloom")
}

/// Parses `data/l<k>/<table-id>.data` into `(level, table_id)`. Used by
/// discovery when listing a level's prefix.
pub fn parse_data_key(key: &str) -> Option<(usize, String)> {
    let rest = key.strip_prefix("data/l")?;
    let (level_str, rest) = rest.split_once('/')?;
    let level = level_str.parse().ok()?;
    let table_id = rest.strip_suffix(".data")?.to_string();
    Some((level, table_id))
}

#[cfg(test)]
mod tests;
