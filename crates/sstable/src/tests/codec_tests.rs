use crate::codec::*;
use memtable::Entry;

// -------------------- Varint --------------------

#[test]
fn varint_single_byte_values() {
    for v in [0u64, 1, 127] {
        let mut buf = Vec::new();
        encode_varint(v, &mut buf);
        assert_eq!(buf.len(), 1);
        assert_eq!(decode_varint(&buf), Some((v, 1)));
    }
}

#[test]
fn varint_multi_byte_values() {
    let cases: &[(u64, usize)] = &[
        (128, 2),
        (300, 2),
        (16_384, 3),
        (u32::MAX as u64, 5),
        (u64::MAX, 10),
    ];
    for &(v, expected_len) in cases {
        let mut buf = Vec::new();
        encode_varint(v, &mut buf);
        assert_eq!(buf.len(), expected_len, "length for {v}");
        assert_eq!(decode_varint(&buf), Some((v, expected_len)));
    }
}

#[test]
fn varint_reports_consumed_length_with_trailing_bytes() {
    let mut buf = Vec::new();
    encode_varint(300, &mut buf);
    buf.extend_from_slice(b"trailing");
    assert_eq!(decode_varint(&buf), Some((300, 2)));
}

#[test]
fn varint_decode_rejects_empty_and_unterminated() {
    assert_eq!(decode_varint(&[]), None);
    // All continuation bits set, never terminated.
    assert_eq!(decode_varint(&[0x80; 11]), None);
}

#[test]
fn varint_known_encoding() {
    let mut buf = Vec::new();
    encode_varint(300, &mut buf);
    // 300 = 0b10_0101100 -> [0xAC, 0x02]
    assert_eq!(buf, vec![0xac, 0x02]);
}

// -------------------- Records --------------------

#[test]
fn record_roundtrip_value() {
    let mut buf = Vec::new();
    encode_record(b"key", &Entry::Value(b"value".to_vec()), &mut buf);

    let (key_len, p) = decode_varint(&buf).unwrap();
    assert_eq!(key_len, 3);
    assert_eq!(&buf[p..p + 3], b"key");
    let (val_len, q) = decode_varint(&buf[p + 3..]).unwrap();
    assert_eq!(val_len, 5);
    assert_eq!(&buf[p + 3 + q..], b"value");
}

#[test]
fn tombstone_encodes_as_sentinel() {
    let mut buf = Vec::new();
    encode_record(b"k", &Entry::Tombstone, &mut buf);
    let (_, p) = decode_varint(&buf).unwrap();
    let (val_len, q) = decode_varint(&buf[p + 1..]).unwrap();
    assert_eq!(val_len as usize, TOMBSTONE_MARKER.len());
    assert_eq!(&buf[p + 1 + q..], TOMBSTONE_MARKER);
}

#[test]
fn sentinel_value_decodes_back_to_tombstone() {
    assert_eq!(
        entry_from_value_bytes(TOMBSTONE_MARKER.to_vec()),
        Entry::Tombstone
    );
    assert_eq!(
        entry_from_value_bytes(b"plain".to_vec()),
        Entry::Value(b"plain".to_vec())
    );
}

#[test]
fn encoded_record_len_matches_encoding() {
    for entry in [Entry::Value(vec![7u8; 300]), Entry::Tombstone] {
        let mut buf = Vec::new();
        encode_record(b"some-key", &entry, &mut buf);
        assert_eq!(buf.len(), encoded_record_len(b"some-key", &entry));
    }
}

// -------------------- Index entries --------------------

#[test]
fn index_entry_roundtrip() {
    let mut buf = Vec::new();
    encode_index_entry(b"idx-key", 12_345, &mut buf);
    let (key, offset, consumed) = decode_index_entry(&buf).unwrap();
    assert_eq!(key, b"idx-key");
    assert_eq!(offset, 12_345);
    assert_eq!(consumed, buf.len());
}

#[test]
fn index_entries_parse_sequentially() {
    let mut buf = Vec::new();
    encode_index_entry(b"a", 0, &mut buf);
    encode_index_entry(b"m", 100, &mut buf);
    encode_index_entry(b"z", 200, &mut buf);

    let mut rest = buf.as_slice();
    let mut parsed = Vec::new();
    while !rest.is_empty() {
        let (key, offset, consumed) = decode_index_entry(rest).unwrap();
        parsed.push((key, offset));
        rest = &rest[consumed..];
    }
    assert_eq!(
        parsed,
        vec![
            (b"a".to_vec(), 0),
            (b"m".to_vec(), 100),
            (b"z".to_vec(), 200)
        ]
    );
}

#[test]
fn truncated_index_entry_is_rejected() {
    let mut buf = Vec::new();
    encode_index_entry(b"key", 7, &mut buf);
    assert!(decode_index_entry(&buf[..buf.len() - 1]).is_none());
    assert!(decode_index_entry(&[]).is_none());
}
