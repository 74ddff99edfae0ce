//! Write path: `put()`, `delete()`, `batch_put()`, and flushing.
//!
//! Every mutation is appended to the WAL before the memtable is touched, so
//! a WAL I/O error surfaces to the caller with the in-memory state unchanged.
//! When the memtable exceeds either flush threshold it is persisted as a new
//! level-0 SSTable.

use crate::{lock, next_sstable_path, Engine, EngineError, Inner, Result};
use memtable::Entry;
use sstable::codec::{MAX_KEY_BYTES, MAX_VALUE_BYTES};
use sstable::{SSTableReader, SSTableWriter};
use std::sync::Arc;
use tracing::info;
use wal::WalOp;

/// Rejects keys/values the SSTable decode caps would later refuse to read.
fn validate_pair(key: &[u8], value: &[u8]) -> Result<()> {
    if key.is_empty() {
        return Err(EngineError::InvalidArgument("empty key".into()));
    }
    if key.len() > MAX_KEY_BYTES {
        return Err(EngineError::InvalidArgument(format!(
            "key too large: {} bytes (max {MAX_KEY_BYTES})",
            key.len()
        )));
    }
    if value.len() > MAX_VALUE_BYTES {
        return Err(EngineError::InvalidArgument(format!(
            "value too large: {} bytes (max {MAX_VALUE_BYTES})",
            value.len()
        )));
    }
    Ok(())
}

impl Engine {
    /// Inserts or overwrites a key-value pair.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty key (reserved as the below-all-keys
    /// sentinel) or an oversize key/value; `Wal`/`Io` if the append cannot be
    /// made durable.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.ensure_open()?;
        validate_pair(key, value)?;

        let mut inner = lock(&self.inner);
        inner.wal.append(WalOp::Put, key, Some(value))?;
        inner.mem.put(key.to_vec(), Entry::Value(value.to_vec()));
        inner.counters.puts += 1;
        self.maybe_flush(&mut inner)
    }

    /// Deletes a key, returning `true` iff it existed under the current read
    /// path. A successful delete writes a tombstone that shadows any older
    /// value in the SSTables.
    pub fn delete(&self, key: &[u8]) -> Result<bool> {
        self.ensure_open()?;
        if key.is_empty() {
            return Ok(false);
        }

        let mut inner = lock(&self.inner);
        let existing = {
            let levels = lock(&self.levels);
            crate::read::read_entry(&inner.mem, &levels, key)?
        };
        if !matches!(existing, Some(Entry::Value(_))) {
            return Ok(false);
        }

        inner.wal.append(WalOp::Delete, key, None)?;
        inner.mem.put(key.to_vec(), Entry::Tombstone);
        inner.counters.deletes += 1;
        self.maybe_flush(&mut inner)?;
        Ok(true)
    }

    /// Inserts many pairs atomically with respect to other operations: all
    /// WAL appends happen first (in order), then all memtable inserts, then a
    /// single flush-threshold check.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when the slices differ in length or any key is empty.
    pub fn batch_put(&self, keys: &[Vec<u8>], values: &[Vec<u8>]) -> Result<()> {
        self.ensure_open()?;
        if keys.len() != values.len() {
            return Err(EngineError::InvalidArgument(format!(
                "batch length mismatch: {} keys, {} values",
                keys.len(),
                values.len()
            )));
        }
        for (key, value) in keys.iter().zip(values) {
            validate_pair(key, value)?;
        }

        let mut inner = lock(&self.inner);
        for (key, value) in keys.iter().zip(values) {
            inner.wal.append(WalOp::Put, key, Some(value))?;
        }
        for (key, value) in keys.iter().zip(values) {
            inner.mem.put(key.clone(), Entry::Value(value.clone()));
        }
        inner.counters.puts += keys.len() as u64;
        self.maybe_flush(&mut inner)
    }

    /// Forces a flush of the current memtable to a level-0 SSTable.
    /// A no-op when the memtable is empty.
    pub fn flush(&self) -> Result<()> {
        self.ensure_open()?;
        let mut inner = lock(&self.inner);
        self.flush_locked(&mut inner)
    }

    /// Flushes when either memtable threshold is exceeded.
    pub(crate) fn maybe_flush(&self, inner: &mut Inner) -> Result<()> {
        if inner.mem.memory_usage() > self.config.memtable_max_bytes
            || inner.mem.len() > self.config.memtable_max_entries
        {
            self.flush_locked(inner)?;
        }
        Ok(())
    }

    /// Flush implementation, serialized by the flush lock.
    ///
    /// # Ordering
    ///
    /// The new SSTable is written, fsynced, and appended to level 0 of the
    /// catalog *before* the memtable and WAL are cleared. A crash between the
    /// write and the install leaves an orphan run that loads harmlessly on
    /// the next startup.
    pub(crate) fn flush_locked(&self, inner: &mut Inner) -> Result<()> {
        let _flush_guard = lock(&self.flush_lock);
        if inner.mem.is_empty() {
            return Ok(());
        }

        let level0_dir = self.data_dir.join("level_0");
        std::fs::create_dir_all(&level0_dir)?;
        let path = next_sstable_path(&level0_dir);

        let mut writer = SSTableWriter::with_options(
            &path,
            self.config.sstable_fp_rate,
            self.config.sstable_index_interval,
        );
        for (key, entry) in inner.mem.all() {
            writer.add(key.to_vec(), entry.clone());
        }
        let entries = inner.mem.len();
        writer.write()?;

        let reader = Arc::new(SSTableReader::open(&path)?);
        lock(&self.levels).push(0, reader);

        inner.mem.clear();
        inner.wal.clear()?;
        inner.counters.flushes += 1;

        info!(path = %path.display(), entries, "flushed memtable");
        Ok(())
    }
}
