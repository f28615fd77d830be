//! # SST bloom filters
//!
//! EchoDB never indexes every key an SST holds — the sparse index (see the
//! `sstable` crate) only samples every `sample_interval(level)`-th entry, so
//! a miss on a table that doesn't hold the key still costs a floor lookup
//! plus a data-blob fetch against the object store. The bloom filter exists
//! purely to make that fetch skippable: one additive `<table-id>.bloom`
//! object per SST, consulted before the index, answering "definitely
//! absent" or "maybe present" for a key.
//!
//! The target false-positive rate is fixed at the crate level rather than
//! threaded through every call site — every filter EchoDB ever builds backs
//! exactly one SST level's key set, so there is nothing for a caller to
//! tune.
use std::io::{self, Read, Write};

/// False-positive rate every SST filter is sized for. A reader never
/// checks this; it only governs how many bits [`BloomFilter::for_keys`]
/// allocates.
pub const TARGET_FALSE_POSITIVE_RATE: f64 = 0.01;

/// A bit vector with `k` independent hash positions per key, built once from
/// a table's full key set and never mutated again after that.
///
/// Membership test uses double hashing: `h(i) = h1 + i * h2`, with `h1`/`h2`
/// both FNV-1a over the key with distinct seeds. No false negatives; false
/// positives bounded by the rate the filter was sized for.
pub struct BloomFilter {
    bits: Vec<u8>,
    num_bits: u64,
    num_hashes: u32,
}

/// Bit/hash-count sizing for a filter holding `key_count` entries at
/// [`TARGET_FALSE_POSITIVE_RATE`]. Split out from [`BloomFilter::for_keys`]
/// so the arithmetic can be exercised without allocating a bit vector.
struct Sizing {
    num_bits: u64,
    num_hashes: u32,
}

impl Sizing {
    fn compute(key_count: usize) -> Self {
        let n = key_count.max(1) as f64;
        let m = (-n * TARGET_FALSE_POSITIVE_RATE.ln() / std::f64::consts::LN_2.powi(2)).ceil() as u64;
        let num_bits = m.max(8);
        let num_hashes = ((num_bits as f64 / n) * std::f64::consts::LN_2).ceil().max(1.0) as u32;
        Self { num_bits, num_hashes }
    }
}

impl BloomFilter {
    /// Builds an empty filter pre-sized for `key_count` entries, ready for
    /// `key_count` calls to [`BloomFilter::insert`]. This is the only way
    /// to construct one outside of [`BloomFilter::read_from`] — EchoDB
    /// never resizes a filter after the fact, it writes one per flush or
    /// compaction output and discards the builder.
    #[must_use]
    pub fn for_keys(key_count: usize) -> Self {
        let sizing = Sizing::compute(key_count);
        let byte_len = ((sizing.num_bits + 7) / 8) as usize;
        Self {
            bits: vec![0u8; byte_len],
            num_bits: sizing.num_bits,
            num_hashes: sizing.num_hashes,
        }
    }

    fn from_parts(bits: Vec<u8>, num_bits: u64, num_hashes: u32) -> Self {
        Self { bits, num_bits, num_hashes }
    }

    pub fn insert(&mut self, key: &[u8]) {
        let (h1, h2) = self.hash_pair(key);
        for i in 0..self.num_hashes {
            let bit_idx = self.get_bit_index(h1, h2, i);
            self.set_bit(bit_idx);
        }
    }

    /// Inserts every key in `keys`, in order. A thin convenience for the
    /// one place this crate is ever driven from: the SST writer building a
    /// filter from a whole, already-sorted entry batch.
    pub fn insert_all<'a, I: IntoIterator<Item = &'a [u8]>>(&mut self, keys: I) {
        for key in keys {
            self.insert(key);
        }
    }

    /// Returns `true` if the key **might** be present, `false` if it is
    /// **definitely not**.
    #[must_use]
    pub fn may_contain(&self, key: &[u8]) -> bool {
        let (h1, h2) = self.hash_pair(key);
        for i in 0..self.num_hashes {
            let bit_idx = self.get_bit_index(h1, h2, i);
            if !self.get_bit(bit_idx) {
                return false;
            }
        }
        true
    }

    #[must_use]
    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    #[must_use]
    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Serialized size in bytes: `num_bits(u64) + num_hashes(u32) + bits_len(u32) + bits`.
    #[must_use]
    pub fn serialized_size(&self) -> usize {
        8 + 4 + 4 + self.bits.len()
    }

    /// Serializes to the wire format the `.bloom` object uses:
    /// `[num_bits: u64][num_hashes: u32][bits_len: u32][bits]`, little-endian.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.num_bits.to_le_bytes())?;
        w.write_all(&self.num_hashes.to_le_bytes())?;
        w.write_all(&(self.bits.len() as u32).to_le_bytes())?;
        w.write_all(&self.bits)?;
        Ok(())
    }

    /// Deserializes a `.bloom` object written by [`BloomFilter::write_to`].
    /// A corrupt or truncated object is the reader's problem, not this
    /// function's — it only guards against a bit-length large enough to be
    /// an obvious decode of garbage.
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut buf8 = [0u8; 8];
        let mut buf4 = [0u8; 4];

        r.read_exact(&mut buf8)?;
        let num_bits = u64::from_le_bytes(buf8);

        r.read_exact(&mut buf4)?;
        let num_hashes = u32::from_le_bytes(buf4);

        r.read_exact(&mut buf4)?;
        let bits_len = u32::from_le_bytes(buf4) as usize;

        const MAX_BLOOM_BYTES: usize = 128 * 1024 * 1024;
        if bits_len > MAX_BLOOM_BYTES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("bloom filter too large: {bits_len} bytes"),
            ));
        }

        let mut bits = vec![0u8; bits_len];
        r.read_exact(&mut bits)?;

        Ok(Self::from_parts(bits, num_bits, num_hashes))
    }

    fn hash_pair(&self, key: &[u8]) -> (u64, u64) {
        let h1 = fnv1a_64(key, 0xcbf2_9ce4_8422_2325);
        let h2 = fnv1a_64(key, 0x517c_c1b7_2722_0a95);
        (h1, h2)
    }

    fn get_bit_index(&self, h1: u64, h2: u64, i: u32) -> u64 {
        h1.wrapping_add((i as u64).wrapping_mul(h2)) % self.num_bits
    }

    fn set_bit(&mut self, idx: u64) {
        let byte_idx = (idx / 8) as usize;
        let bit_offset = (idx % 8) as u8;
        self.bits[byte_idx] |= 1 << bit_offset;
    }

    fn get_bit(&self, idx: u64) -> bool {
        let byte_idx = (idx / 8) as usize;
        let bit_offset = (idx % 8) as u8;
        (self.bits[byte_idx] >> bit_offset) & 1 == 1
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("num_bits", &self.num_bits)
            .field("num_hashes", &self.num_hashes)
            .field("bytes", &self.bits.len())
            .finish()
    }
}

fn fnv1a_64(data: &[u8], basis: u64) -> u64 {
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = basis;
    for &byte in data {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[cfg(test)]
mod tests;
