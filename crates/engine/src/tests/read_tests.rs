use super::helpers::open_engine;
use tempfile::tempdir;

// --------------------- Point reads across sources ---------------------

#[test]
fn get_reads_from_flushed_runs() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());

    engine.put(b"k", b"v").unwrap();
    engine.flush().unwrap();
    assert_eq!(engine.get(b"k").unwrap(), Some(b"v".to_vec()));
}

#[test]
fn memtable_shadows_flushed_runs() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());

    engine.put(b"k", b"old").unwrap();
    engine.flush().unwrap();
    engine.put(b"k", b"new").unwrap();
    assert_eq!(engine.get(b"k").unwrap(), Some(b"new".to_vec()));
}

#[test]
fn newest_level_0_run_wins() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());

    engine.put(b"k", b"v1").unwrap();
    engine.flush().unwrap();
    engine.put(b"k", b"v2").unwrap();
    engine.flush().unwrap();

    assert_eq!(engine.get(b"k").unwrap(), Some(b"v2".to_vec()));
}

#[test]
fn tombstone_in_memtable_hides_flushed_value() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());

    engine.put(b"k", b"v").unwrap();
    engine.flush().unwrap();
    engine.delete(b"k").unwrap();

    assert!(engine.get(b"k").unwrap().is_none());
}

// --------------------- Range scans ---------------------

#[test]
fn range_scan_basic_window() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());

    for i in 1..=5u32 {
        engine
            .put(format!("k{i}").as_bytes(), format!("v{i}").as_bytes())
            .unwrap();
    }

    let got = engine.range_scan(b"k2", b"k4").unwrap();
    assert_eq!(
        got,
        vec![
            (b"k2".to_vec(), Some(b"v2".to_vec())),
            (b"k3".to_vec(), Some(b"v3".to_vec())),
        ]
    );
}

#[test]
fn range_scan_is_sorted_and_deduplicated() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());

    // Same keys in an old run, a newer run, and the memtable.
    engine.put(b"a", b"old-a").unwrap();
    engine.put(b"b", b"old-b").unwrap();
    engine.flush().unwrap();
    engine.put(b"b", b"mid-b").unwrap();
    engine.put(b"c", b"mid-c").unwrap();
    engine.flush().unwrap();
    engine.put(b"c", b"mem-c").unwrap();

    let got = engine.range_scan(b"", b"z").unwrap();
    assert_eq!(
        got,
        vec![
            (b"a".to_vec(), Some(b"old-a".to_vec())),
            (b"b".to_vec(), Some(b"mid-b".to_vec())),
            (b"c".to_vec(), Some(b"mem-c".to_vec())),
        ]
    );
}

#[test]
fn range_scan_surfaces_tombstones_as_none() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());

    engine.put(b"a", b"1").unwrap();
    engine.put(b"b", b"2").unwrap();
    engine.flush().unwrap();
    engine.delete(b"b").unwrap();

    let got = engine.range_scan(b"", b"z").unwrap();
    assert_eq!(
        got,
        vec![
            (b"a".to_vec(), Some(b"1".to_vec())),
            (b"b".to_vec(), None),
        ]
    );
}

#[test]
fn range_scan_keys_are_strictly_ascending_and_in_bounds() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());

    for i in (0..50u32).rev() {
        engine
            .put(format!("key_{i:03}").as_bytes(), b"v")
            .unwrap();
    }
    engine.flush().unwrap();
    for i in (10..40u32).step_by(3) {
        engine
            .put(format!("key_{i:03}").as_bytes(), b"v2")
            .unwrap();
    }

    let start = b"key_010".to_vec();
    let end = b"key_040".to_vec();
    let got = engine.range_scan(&start, &end).unwrap();
    assert!(!got.is_empty());
    for window in got.windows(2) {
        assert!(window[0].0 < window[1].0, "keys must be strictly ascending");
    }
    for (k, _) in &got {
        assert!(k.as_slice() >= start.as_slice() && k.as_slice() < end.as_slice());
    }
}

#[test]
fn range_scan_empty_window_is_empty() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());

    engine.put(b"k", b"v").unwrap();
    assert!(engine.range_scan(b"k", b"k").unwrap().is_empty());
    assert!(engine.range_scan(b"x", b"z").unwrap().is_empty());
}
