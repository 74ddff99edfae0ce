use super::*;

// -------------------- Construction --------------------

#[test]
fn new_creates_valid_filter() {
    let bf = BloomFilter::new(100, 0.01);
    assert!(bf.num_bits() > 0);
    assert!(bf.num_hashes() > 0);
    assert_eq!(bf.items_added(), 0);
}

#[test]
#[should_panic(expected = "expected_items must be > 0")]
fn new_panics_on_zero_items() {
    BloomFilter::new(0, 0.01);
}

#[test]
#[should_panic(expected = "false_positive_rate must be in (0, 1)")]
fn new_panics_on_zero_fpr() {
    BloomFilter::new(100, 0.0);
}

#[test]
#[should_panic(expected = "false_positive_rate must be in (0, 1)")]
fn new_panics_on_one_fpr() {
    BloomFilter::new(100, 1.0);
}

#[test]
fn sizing_follows_formulas() {
    // n=1000, p=0.01: m = ceil(9585.05...) = 9586, k = floor(9.586 * ln2) = 6
    let bf = BloomFilter::new(1000, 0.01);
    assert_eq!(bf.num_bits(), 9586);
    assert_eq!(bf.num_hashes(), 6);
}

#[test]
fn single_item_filter_has_at_least_one_hash() {
    let bf = BloomFilter::new(1, 0.5);
    assert!(bf.num_hashes() >= 1);
    assert!(bf.num_bits() >= 8);
}

// -------------------- Add / Contains --------------------

#[test]
fn added_item_is_found() {
    let mut bf = BloomFilter::new(100, 0.01);
    bf.add(b"hello");
    assert!(bf.contains(b"hello"));
    assert_eq!(bf.items_added(), 1);
}

#[test]
fn missing_item_is_not_found_in_empty_filter() {
    let bf = BloomFilter::new(100, 0.01);
    assert!(!bf.contains(b"hello"));
}

#[test]
fn no_false_negatives() {
    let mut bf = BloomFilter::new(1000, 0.01);
    for i in 0..1000u64 {
        bf.add(format!("key_{i}").as_bytes());
    }
    for i in 0..1000u64 {
        assert!(
            bf.contains(format!("key_{i}").as_bytes()),
            "false negative for key_{i}"
        );
    }
}

#[test]
fn false_positive_rate_is_reasonable() {
    let mut bf = BloomFilter::new(1000, 0.01);
    for i in 0..1000u64 {
        bf.add(format!("key_{i}").as_bytes());
    }
    let mut false_positives = 0;
    for i in 0..10_000u64 {
        if bf.contains(format!("absent_{i}").as_bytes()) {
            false_positives += 1;
        }
    }
    // 1% target; allow generous slack to keep the test deterministic-ish.
    assert!(
        false_positives < 500,
        "false positive rate too high: {false_positives}/10000"
    );
}

#[test]
fn empty_item_is_supported() {
    let mut bf = BloomFilter::new(10, 0.01);
    bf.add(b"");
    assert!(bf.contains(b""));
}

// -------------------- Serialization --------------------

#[test]
fn serialize_roundtrip_preserves_membership() {
    let mut bf = BloomFilter::new(500, 0.02);
    for i in 0..500u64 {
        bf.add(&i.to_be_bytes());
    }

    let data = bf.serialize();
    assert_eq!(data.len(), bf.serialized_size());

    let restored = BloomFilter::deserialize(&data).unwrap();
    assert_eq!(restored.num_bits(), bf.num_bits());
    assert_eq!(restored.num_hashes(), bf.num_hashes());
    assert_eq!(restored.items_added(), 500);
    for i in 0..500u64 {
        assert!(restored.contains(&i.to_be_bytes()));
    }
}

#[test]
fn serialized_header_is_big_endian() {
    let bf = BloomFilter::new(100, 0.01);
    let data = bf.serialize();
    assert_eq!(u64::from_be_bytes(data[0..8].try_into().unwrap()), 100);
    let fp = f32::from_be_bytes(data[8..12].try_into().unwrap());
    assert!((fp - 0.01).abs() < 1e-6);
    assert_eq!(
        u32::from_be_bytes(data[12..16].try_into().unwrap()),
        bf.num_bits()
    );
    assert_eq!(
        u32::from_be_bytes(data[16..20].try_into().unwrap()),
        bf.num_hashes()
    );
}

#[test]
fn deserialize_rejects_truncated_input() {
    let bf = BloomFilter::new(100, 0.01);
    let data = bf.serialize();
    assert!(BloomFilter::deserialize(&data[..10]).is_err());
    assert!(BloomFilter::deserialize(&data[..data.len() - 1]).is_err());
}

#[test]
fn deserialize_rejects_zero_bits() {
    let mut data = vec![0u8; 28];
    // expected_items = 1, everything else zero.
    data[7] = 1;
    assert!(BloomFilter::deserialize(&data).is_err());
}
