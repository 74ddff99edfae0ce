use anyhow::Result;
use bloom::BloomFilter;
use memtable::Entry;
use std::fs::{rename, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::codec::{encode_index_entry, encode_record};
use crate::format::{Footer, TableMeta};

/// Default bloom filter false positive rate (1%).
const DEFAULT_BLOOM_FPR: f64 = 0.01;
/// Default sparse index sampling interval (one entry per 16 records).
const DEFAULT_INDEX_INTERVAL: usize = 16;

/// Builds an immutable on-disk sorted run.
///
/// Records are accepted via [`add`](SSTableWriter::add) in **any** order and
/// buffered in memory; [`write`](SSTableWriter::write) sorts them, drops older
/// duplicates (last-added occurrence wins), and produces the file sections in
/// order: data, sparse index, bloom filter, metadata, footer.
///
/// # Crash safety
///
/// The file is written to `<path>.sst.tmp`, fsynced, and atomically renamed
/// into place; the parent directory is fsynced afterwards. A crash mid-write
/// leaves only a temp file behind, which is never loaded as a run.
pub struct SSTableWriter {
    path: PathBuf,
    records: Vec<(Vec<u8>, Entry)>,
    fp_rate: f64,
    index_interval: usize,
}

impl SSTableWriter {
    /// Creates a writer targeting `path` with default bloom/index tuning.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self::with_options(path, DEFAULT_BLOOM_FPR, DEFAULT_INDEX_INTERVAL)
    }

    /// Creates a writer with an explicit bloom false-positive rate and sparse
    /// index interval.
    pub fn with_options<P: AsRef<Path>>(path: P, fp_rate: f64, index_interval: usize) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            records: Vec::new(),
            fp_rate,
            index_interval: index_interval.max(1),
        }
    }

    /// Buffers one record. Tombstones are first-class records here.
    pub fn add(&mut self, key: Vec<u8>, entry: Entry) {
        self.records.push((key, entry));
    }

    /// Returns how many records have been buffered (before deduplication).
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no records have been buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sorts, deduplicates, and writes the table to disk.
    ///
    /// Duplicate keys keep the **last-added** occurrence. The bloom filter is
    /// sized for the final record count (lower bound 1); tombstones
    /// participate. Missing parent directories are created.
    ///
    /// # Errors
    ///
    /// Returns an error on any I/O failure. An empty writer produces a valid
    /// zero-record table.
    pub fn write(self) -> Result<()> {
        let Self {
            path,
            records,
            fp_rate,
            index_interval,
        } = self;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Sort (stable) then keep the last-added occurrence of each key: scan
        // from the back, first sighting of a key wins, then restore order.
        let mut sorted = records;
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        let mut deduped: Vec<(Vec<u8>, Entry)> = Vec::with_capacity(sorted.len());
        for (key, entry) in sorted.into_iter().rev() {
            if deduped.last().map(|(k, _)| k == &key).unwrap_or(false) {
                continue;
            }
            deduped.push((key, entry));
        }
        deduped.reverse();

        let tmp_path = path.with_extension("sst.tmp");
        let raw_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        let mut file = BufWriter::new(raw_file);

        let mut bloom = BloomFilter::new(deduped.len().max(1), fp_rate);

        // DATA section, tracking offsets for the sparse index. The first
        // record is always indexed.
        let data_start: u64 = 0;
        let mut data_buf: Vec<u8> = Vec::new();
        let mut index: Vec<(Vec<u8>, u64)> = Vec::new();
        for (i, (key, entry)) in deduped.iter().enumerate() {
            if i % index_interval == 0 {
                index.push((key.clone(), data_buf.len() as u64));
            }
            encode_record(key, entry, &mut data_buf);
            bloom.add(key);
        }
        file.write_all(&data_buf)?;
        let data_end = data_start + data_buf.len() as u64;

        // INDEX section.
        let index_start = data_end;
        let mut index_buf: Vec<u8> = Vec::new();
        for (key, offset) in &index {
            encode_index_entry(key, *offset, &mut index_buf);
        }
        file.write_all(&index_buf)?;
        let index_end = index_start + index_buf.len() as u64;

        // BLOOM section.
        let bloom_start = index_end;
        bloom.write_to(&mut file)?;
        let metadata_start = bloom_start + bloom.serialized_size() as u64;

        // METADATA block.
        let (min_key, max_key) = match (deduped.first(), deduped.last()) {
            (Some((min, _)), Some((max, _))) => (min.clone(), max.clone()),
            _ => (Vec::new(), Vec::new()),
        };
        let meta = TableMeta {
            key_count: deduped.len() as u64,
            index_offset: index_start,
            bloom_offset: bloom_start,
            min_key,
            max_key,
        };
        meta.write_to(&mut file)?;

        // FOOTER.
        let footer = Footer {
            data_start,
            data_end,
            index_start,
            index_end,
            metadata_start,
        };
        footer.write_to(&mut file)?;

        file.flush()?;
        file.into_inner()?.sync_all()?;

        // Atomically move into place, then fsync the parent directory so the
        // rename survives a crash on ext4/XFS.
        rename(&tmp_path, &path)?;
        if let Some(parent) = path.parent() {
            if let Ok(dir) = std::fs::File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        Ok(())
    }
}
