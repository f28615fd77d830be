//! # Write-Ahead Log
//!
//! Provides crash-safe durability for the LSM coordinator, with the durable
//! home of every segment being the object store rather than a local disk.
//!
//! Every mutation is serialized into a [`memtable::Row`] and pushed onto an
//! unbounded in-memory queue by [`WalWriter::append`] — no I/O happens on
//! that path. A periodic or explicit [`WalWriter::flush`] drains the queue,
//! concatenates every pending row into one blob, and `PUT`s it under
//! `wal/wal-<ms-timestamp>`.
//!
//! ## Binary format
//!
//! A segment is a concatenation of rows with no framing between them,
//! big-endian throughout:
//!
//! ```text
//! seq:u64 | kind:u8 (0=Put, 1=Delete) | keylen:u32 | key | vallen:u32 | value | ts:u64
//! ```
//!
//! A `Delete` row encodes `vallen=0` with no value bytes. This `keylen` is a
//! `u32`, distinct from the SST format's `u16` length prefix — the two wire
//! formats are independent and must not share decode code.
use byteorder::{ReadBytesExt, WriteBytesExt, BE};
use memtable::{Row, RowKind};
use objectstore::{ObjectStore, StoreError};
use parking_lot::Mutex;
use std::io::{self, Cursor, Read};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

pub const WAL_PREFIX: &str = "wal/";

#[derive(Debug, Error)]
pub enum WalError {
    #[error("object store error: {0}")]
    Store(#[from] StoreError),
    #[error("corrupt WAL segment: {0}")]
    Corrupt(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

const OP_PUT: u8 = 0;
const OP_DELETE: u8 = 1;

/// Serializes a single row into `out`, big-endian, per the format above.
pub fn encode_row(row: &Row, out: &mut Vec<u8>) {
    out.write_u64::<BE>(row.seq).unwrap();
    match row.kind {
        RowKind::Put => {
            out.write_u8(OP_PUT).unwrap();
            out.write_u32::<BE>(row.key.len() as u32).unwrap();
            out.extend_from_slice(&row.key);
            let value = row.value.as_deref().unwrap_or(&[]);
            out.write_u32::<BE>(value.len() as u32).unwrap();
            out.extend_from_slice(value);
        }
        RowKind::Delete => {
            out.write_u8(OP_DELETE).unwrap();
            out.write_u32::<BE>(row.key.len() as u32).unwrap();
            out.extend_from_slice(&row.key);
            out.write_u32::<BE>(0).unwrap();
        }
    }
    out.write_u64::<BE>(row.ts).unwrap();
}

/// Concatenates `rows` into one segment blob.
pub fn encode_segment(rows: &[Row]) -> Vec<u8> {
    let mut out = Vec::new();
    for row in rows {
        encode_row(row, &mut out);
    }
    out
}

/// Decodes a segment blob into its rows.
///
/// A truncated row at the very end of the blob (a crash mid-upload, or an
/// object-store write that never completed) is treated as a clean end —
/// every complete row before it is still returned. Any other malformed data
/// (an impossible length prefix) is `Corrupt`.
pub fn decode_segment(bytes: &[u8]) -> Result<Vec<Row>, WalError> {
    let mut cursor = Cursor::new(bytes);
    let mut rows = Vec::new();

    loop {
        let start = cursor.position();
        match decode_one(&mut cursor) {
            Ok(Some(row)) => rows.push(row),
            Ok(None) => break,
            Err(e) => {
                if cursor.position() == start {
                    break;
                }
                return Err(e);
            }
        }
    }
    Ok(rows)
}

fn decode_one(cursor: &mut Cursor<&[u8]>) -> Result<Option<Row>, WalError> {
    let seq = match cursor.read_u64::<BE>() {
        Ok(v) => v,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let op = read_or_truncated(cursor, |c| c.read_u8())?;
    let op = match op {
        Some(v) => v,
        None => return Ok(None),
    };
    let key_len = match read_or_truncated(cursor, |c| c.read_u32::<BE>())? {
        Some(v) => v as usize,
        None => return Ok(None),
    };
    let remaining = (cursor.get_ref().len() as u64).saturating_sub(cursor.position()) as usize;
    if key_len > remaining {
        return Ok(None);
    }
    let mut key = vec![0u8; key_len];
    if cursor.read_exact(&mut key).is_err() {
        return Ok(None);
    }
    let val_len = match read_or_truncated(cursor, |c| c.read_u32::<BE>())? {
        Some(v) => v as usize,
        None => return Ok(None),
    };
    let remaining = (cursor.get_ref().len() as u64).saturating_sub(cursor.position()) as usize;
    if val_len > remaining {
        return Ok(None);
    }
    let mut value = vec![0u8; val_len];
    if cursor.read_exact(&mut value).is_err() {
        return Ok(None);
    }
    let ts = match read_or_truncated(cursor, |c| c.read_u64::<BE>())? {
        Some(v) => v,
        None => return Ok(None),
    };

    let row = match op {
        OP_PUT => Row::put(seq, key, value, ts),
        OP_DELETE => Row::delete(seq, key, ts),
        other => return Err(WalError::Corrupt(format!("unknown row kind {other}"))),
    };
    Ok(Some(row))
}

fn read_or_truncated<T>(
    cursor: &mut Cursor<&[u8]>,
    read: impl FnOnce(&mut Cursor<&[u8]>) -> io::Result<T>,
) -> Result<Option<T>, WalError> {
    match read(cursor) {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Parses the millisecond timestamp suffix out of a `wal/wal-<ms>` key.
pub fn parse_segment_ts(key: &str) -> Option<u64> {
    key.strip_prefix(WAL_PREFIX)?
        .strip_prefix("wal-")?
        .parse()
        .ok()
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before the epoch")
        .as_millis() as u64
}

/// Buffers rows in memory and periodically (or on explicit `flush`) uploads
/// them as a single WAL segment.
pub struct WalWriter<S: ObjectStore> {
    store: S,
    queue: Mutex<Vec<Row>>,
    /// Serializes concurrent flushers (the periodic timer and an explicit
    /// caller) without blocking `append`, matching the WAL flush lock
    /// described for the concurrency model.
    flush_lock: tokio::sync::Mutex<()>,
    last_segment_ts: AtomicU64,
}

impl<S: ObjectStore> WalWriter<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            queue: Mutex::new(Vec::new()),
            flush_lock: tokio::sync::Mutex::new(()),
            last_segment_ts: AtomicU64::new(0),
        }
    }

    /// Enqueues `row` for the next flush. Never touches the object store.
    pub fn append(&self, row: Row) {
        self.queue.lock().push(row);
    }

    pub fn pending_len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Drains the queue and uploads it as one segment, if non-empty.
    /// Returns the segment key that was written, or `None` if there was
    /// nothing to flush.
    pub async fn flush(&self) -> Result<Option<String>, WalError> {
        let rows = {
            let mut q = self.queue.lock();
            if q.is_empty() {
                return Ok(None);
            }
            std::mem::take(&mut *q)
        };

        let _guard = self.flush_lock.lock().await;
        let segment = encode_segment(&rows);
        let ts = self.next_segment_ts();
        let key = format!("{WAL_PREFIX}wal-{ts}");
        self.store.put(&key, segment).await?;
        Ok(Some(key))
    }

    /// Monotonic millisecond timestamp, bumped past wall-clock time if two
    /// flushes would otherwise collide on the same key.
    fn next_segment_ts(&self) -> u64 {
        let wall = now_ms();
        let mut prev = self.last_segment_ts.load(Ordering::SeqCst);
        loop {
            let candidate = wall.max(prev + 1);
            match self.last_segment_ts.compare_exchange(
                prev,
                candidate,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return candidate,
                Err(actual) => prev = actual,
            }
        }
    }

    /// Drains any pending writes with a final flush. Idempotent if the queue
    /// is already empty.
    pub async fn close(&self) -> Result<(), WalError> {
        self.flush().await?;
        Ok(())
    }
}

/// Lists every WAL segment key under `wal/`, sorted by parsed timestamp.
/// Keys whose suffix fails to parse sort last and are kept (conservative —
/// an unparsable key is still scanned for rows rather than silently
/// skipped).
pub async fn list_segments<S: ObjectStore>(store: &S) -> Result<Vec<String>, WalError> {
    let mut keys = store.list(WAL_PREFIX).await?;
    keys.sort_by_key(|k| parse_segment_ts(k).unwrap_or(u64::MAX));
    Ok(keys)
}
