use super::*;
use std::io::Cursor;

#[test]
fn for_keys_creates_valid_filter() {
    let bf = BloomFilter::for_keys(100);
    assert!(bf.num_bits() > 0);
    assert!(bf.num_hashes() > 0);
}

#[test]
fn for_keys_handles_zero_count() {
    let bf = BloomFilter::for_keys(0);
    assert!(bf.num_bits() >= 8);
    assert!(bf.num_hashes() >= 1);
}

#[test]
fn inserted_key_is_found() {
    let mut bf = BloomFilter::for_keys(100);
    bf.insert(b"hello");
    assert!(bf.may_contain(b"hello"));
}

#[test]
fn insert_all_matches_individual_inserts() {
    let mut bf = BloomFilter::for_keys(3);
    bf.insert_all([b"a".as_slice(), b"b".as_slice(), b"c".as_slice()]);
    assert!(bf.may_contain(b"a"));
    assert!(bf.may_contain(b"b"));
    assert!(bf.may_contain(b"c"));
}

#[test]
fn absent_key_is_usually_rejected() {
    let mut bf = BloomFilter::for_keys(1000);
    for i in 0..500u32 {
        bf.insert(&i.to_le_bytes());
    }
    let false_positives = (500u32..1500)
        .filter(|i| bf.may_contain(&i.to_le_bytes()))
        .count();
    // With a 1% target FPR over 1000 probes we expect roughly 10 false
    // positives; allow generous slack to keep this test non-flaky.
    assert!(false_positives < 100, "too many false positives: {false_positives}");
}

#[test]
fn round_trips_through_write_and_read() {
    let mut bf = BloomFilter::for_keys(200);
    bf.insert(b"alpha");
    bf.insert(b"beta");

    let mut buf = Vec::new();
    bf.write_to(&mut buf).unwrap();
    assert_eq!(buf.len(), bf.serialized_size());

    let restored = BloomFilter::read_from(&mut Cursor::new(buf)).unwrap();
    assert!(restored.may_contain(b"alpha"));
    assert!(restored.may_contain(b"beta"));
    assert_eq!(restored.num_bits(), bf.num_bits());
    assert_eq!(restored.num_hashes(), bf.num_hashes());
}

#[test]
fn read_from_rejects_absurd_bit_length() {
    let mut buf = Vec::new();
    buf.extend_from_slice(&64u64.to_le_bytes());
    buf.extend_from_slice(&4u32.to_le_bytes());
    buf.extend_from_slice(&(200 * 1024 * 1024u32).to_le_bytes());
    let err = BloomFilter::read_from(&mut Cursor::new(buf)).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
}
