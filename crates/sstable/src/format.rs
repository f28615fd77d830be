//! Wire format for a table's `.data` and `.index` blobs, and the sparse
//! sampling rule that relates them.
//!
//! Data entries: `keylen:u16 | key | vallen:u32 | value`. A tombstone is
//! encoded as `vallen = 0` with no value bytes — the only representation the
//! bit-exact format leaves room for, so a genuine zero-length PUT value is
//! indistinguishable from a delete. Flush and compaction avoid ever storing
//! a real empty value as a consequence (see `DESIGN.md`).
//!
//! Index entries: `keylen:u16 | key | offset:u64`, a strict subset of the
//! data entries' keys, sampled every `sample_interval(level)` entries
//! starting at the first.
use byteorder::{ReadBytesExt, WriteBytesExt, BE};
use std::io::{self, Cursor, Read};

use crate::SstError;

/// L0 tables are sampled densely since they are read far more often before
/// compaction thins them out; deeper levels sample more sparsely as `level`
/// grows, capped at 50.
pub fn sample_interval(level: usize) -> usize {
    if level == 0 {
        10
    } else {
        (10 * level).min(50)
    }
}

pub fn encode_data_entry(key: &[u8], value: Option<&[u8]>, out: &mut Vec<u8>) {
    out.write_u16::<BE>(key.len() as u16).unwrap();
    out.extend_from_slice(key);
    let v = value.unwrap_or(&[]);
    out.write_u32::<BE>(v.len() as u32).unwrap();
    out.extend_from_slice(v);
}

pub fn encode_index_entry(key: &[u8], offset: u64, out: &mut Vec<u8>) {
    out.write_u16::<BE>(key.len() as u16).unwrap();
    out.extend_from_slice(key);
    out.write_u64::<BE>(offset).unwrap();
}

/// One decoded `(key, value)` data entry plus the byte offset it started at.
pub struct DataEntry {
    pub offset: u64,
    pub key: Vec<u8>,
    /// `None` for a tombstone (the `vallen = 0` sentinel).
    pub value: Option<Vec<u8>>,
}

/// Decodes every entry in a `.data` blob, front to back.
pub fn decode_data(bytes: &[u8]) -> Result<Vec<DataEntry>, SstError> {
    let mut cursor = Cursor::new(bytes);
    let mut entries = Vec::new();
    while (cursor.position() as usize) < bytes.len() {
        let offset = cursor.position();
        let entry = decode_one_data_entry(&mut cursor, offset)?;
        entries.push(entry);
    }
    Ok(entries)
}

/// Decodes entries starting at `start_offset`, stopping at the first key
/// strictly greater than `bound` if one is given (used by point lookups to
/// avoid scanning past the target).
pub fn scan_data_from(
    bytes: &[u8],
    start_offset: u64,
    bound: Option<&[u8]>,
) -> Result<Vec<DataEntry>, SstError> {
    if start_offset as usize > bytes.len() {
        return Err(SstError::Corrupt(format!(
            "offset {start_offset} past end of data blob ({} bytes)",
            bytes.len()
        )));
    }
    let mut cursor = Cursor::new(bytes);
    cursor.set_position(start_offset);
    let mut entries = Vec::new();
    while (cursor.position() as usize) < bytes.len() {
        let offset = cursor.position();
        let entry = decode_one_data_entry(&mut cursor, offset)?;
        let stop = bound.is_some_and(|b| entry.key.as_slice() > b);
        if stop {
            break;
        }
        entries.push(entry);
    }
    Ok(entries)
}

fn decode_one_data_entry(cursor: &mut Cursor<&[u8]>, offset: u64) -> Result<DataEntry, SstError> {
    let key_len = read_field(cursor, |c| c.read_u16::<BE>())? as usize;
    let mut key = vec![0u8; key_len];
    read_exact_checked(cursor, &mut key)?;
    let val_len = read_field(cursor, |c| c.read_u32::<BE>())? as usize;
    let value = if val_len == 0 {
        None
    } else {
        let mut v = vec![0u8; val_len];
        read_exact_checked(cursor, &mut v)?;
        Some(v)
    };
    Ok(DataEntry { offset, key, value })
}

/// Decodes every `(key, offset)` pair in an `.index` blob.
pub fn decode_index(bytes: &[u8]) -> Result<Vec<(Vec<u8>, u64)>, SstError> {
    let mut cursor = Cursor::new(bytes);
    let mut entries = Vec::new();
    while (cursor.position() as usize) < bytes.len() {
        let key_len = read_field(&mut cursor, |c| c.read_u16::<BE>())? as usize;
        let mut key = vec![0u8; key_len];
        read_exact_checked(&mut cursor, &mut key)?;
        let offset = read_field(&mut cursor, |c| c.read_u64::<BE>())?;
        entries.push((key, offset));
    }
    Ok(entries)
}

fn read_field<T>(
    cursor: &mut Cursor<&[u8]>,
    read: impl FnOnce(&mut Cursor<&[u8]>) -> io::Result<T>,
) -> Result<T, SstError> {
    read(cursor).map_err(|e| SstError::Corrupt(format!("truncated field: {e}")))
}

fn read_exact_checked(cursor: &mut Cursor<&[u8]>, buf: &mut [u8]) -> Result<(), SstError> {
    cursor
        .read_exact(buf)
        .map_err(|e| SstError::Corrupt(format!("truncated field: {e}")))
}

/// Finds the greatest indexed key `<= target`, returning its offset, or `0`
/// if every indexed key is greater than `target` (or the index is empty) —
/// the scan still has to start somewhere, and entry 0 is always sampled.
pub fn floor_offset(index: &[(Vec<u8>, u64)], target: &[u8]) -> u64 {
    match index.binary_search_by(|(k, _)| k.as_slice().cmp(target)) {
        Ok(i) => index[i].1,
        Err(0) => 0,
        Err(i) => index[i - 1].1,
    }
}
