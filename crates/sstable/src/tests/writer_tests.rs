use crate::{SSTableReader, SSTableWriter, FOOTER_BYTES};
use memtable::Entry;
use tempfile::tempdir;

fn val(bytes: &[u8]) -> Entry {
    Entry::Value(bytes.to_vec())
}

#[test]
fn write_then_read_all_returns_sorted_records() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.sst");

    let mut w = SSTableWriter::new(&path);
    // Added out of order on purpose; write() sorts.
    w.add(b"c".to_vec(), val(b"3"));
    w.add(b"a".to_vec(), val(b"1"));
    w.add(b"b".to_vec(), val(b"2"));
    w.write().unwrap();

    let r = SSTableReader::open(&path).unwrap();
    let all = r.all().unwrap();
    assert_eq!(
        all,
        vec![
            (b"a".to_vec(), val(b"1")),
            (b"b".to_vec(), val(b"2")),
            (b"c".to_vec(), val(b"3")),
        ]
    );
    assert_eq!(r.key_count(), 3);
}

#[test]
fn duplicate_keys_keep_last_added() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.sst");

    let mut w = SSTableWriter::new(&path);
    w.add(b"k".to_vec(), val(b"old"));
    w.add(b"other".to_vec(), val(b"x"));
    w.add(b"k".to_vec(), val(b"new"));
    w.write().unwrap();

    let r = SSTableReader::open(&path).unwrap();
    assert_eq!(r.key_count(), 2);
    assert_eq!(r.get(b"k").unwrap(), Some(val(b"new")));
}

#[test]
fn duplicate_key_replaced_by_tombstone() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.sst");

    let mut w = SSTableWriter::new(&path);
    w.add(b"k".to_vec(), val(b"v"));
    w.add(b"k".to_vec(), Entry::Tombstone);
    w.write().unwrap();

    let r = SSTableReader::open(&path).unwrap();
    assert_eq!(r.get(b"k").unwrap(), Some(Entry::Tombstone));
}

#[test]
fn writer_creates_missing_parent_directories() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("level_0").join("deep").join("t.sst");

    let mut w = SSTableWriter::new(&path);
    w.add(b"k".to_vec(), val(b"v"));
    w.write().unwrap();

    assert!(path.exists());
}

#[test]
fn writer_leaves_no_temp_file_behind() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.sst");

    let mut w = SSTableWriter::new(&path);
    w.add(b"k".to_vec(), val(b"v"));
    w.write().unwrap();

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["t.sst".to_string()]);
}

#[test]
fn metadata_records_key_range() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.sst");

    let mut w = SSTableWriter::new(&path);
    w.add(b"mango".to_vec(), val(b"1"));
    w.add(b"apple".to_vec(), val(b"2"));
    w.add(b"zebra".to_vec(), val(b"3"));
    w.write().unwrap();

    let r = SSTableReader::open(&path).unwrap();
    let (min, max) = r.key_range();
    assert_eq!(min, b"apple");
    assert_eq!(max, b"zebra");
}

#[test]
fn empty_writer_produces_a_valid_empty_table() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.sst");

    SSTableWriter::new(&path).write().unwrap();

    let r = SSTableReader::open(&path).unwrap();
    assert!(r.exists());
    assert_eq!(r.key_count(), 0);
    assert!(r.all().unwrap().is_empty());
    assert_eq!(r.get(b"anything").unwrap(), None);
}

#[test]
fn footer_is_last_forty_bytes_big_endian() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.sst");

    let mut w = SSTableWriter::new(&path);
    w.add(b"k".to_vec(), val(b"v"));
    w.write().unwrap();

    let data = std::fs::read(&path).unwrap();
    let footer = &data[data.len() - FOOTER_BYTES as usize..];
    let data_start = u64::from_be_bytes(footer[0..8].try_into().unwrap());
    let data_end = u64::from_be_bytes(footer[8..16].try_into().unwrap());
    assert_eq!(data_start, 0);
    // "k" + "v": varint(1) + 1 + varint(1) + 1 = 4 bytes of data.
    assert_eq!(data_end, 4);
}

#[test]
fn index_interval_samples_every_nth_record() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.sst");

    let mut w = SSTableWriter::with_options(&path, 0.01, 4);
    for i in 0..10u32 {
        w.add(format!("key_{i:02}").as_bytes().to_vec(), val(b"v"));
    }
    w.write().unwrap();

    // 10 records at interval 4 -> indexed records 0, 4, 8. Every key must
    // still be findable through the sparse index.
    let r = SSTableReader::open(&path).unwrap();
    for i in 0..10u32 {
        assert_eq!(
            r.get(format!("key_{i:02}").as_bytes()).unwrap(),
            Some(val(b"v")),
            "key_{i:02}"
        );
    }
}

#[test]
fn large_table_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.sst");

    let mut w = SSTableWriter::new(&path);
    for i in 0..1000u32 {
        w.add(
            format!("key_{i:06}").into_bytes(),
            val(format!("value_{i:06}").as_bytes()),
        );
    }
    w.write().unwrap();

    let r = SSTableReader::open(&path).unwrap();
    assert_eq!(r.key_count(), 1000);
    assert_eq!(
        r.get(b"key_000000").unwrap(),
        Some(val(b"value_000000"))
    );
    assert_eq!(
        r.get(b"key_000999").unwrap(),
        Some(val(b"value_000999"))
    );
    assert_eq!(r.get(b"key_001000").unwrap(), None);
}
