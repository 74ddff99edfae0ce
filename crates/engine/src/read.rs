//! Read path: `get()` and `range_scan()`.
//!
//! Point lookups probe the memtable first (freshest data), then every run of
//! level 0 newest-to-oldest, then levels 1..L the same way. The first source
//! holding any state for the key decides; a tombstone decides "absent".
//!
//! Range scans merge the memtable and every run of every level in that same
//! visit order, keeping the first-visited state per key.

use crate::levels::Levels;
use crate::{lock, Engine, Result};
use memtable::{Entry, Memtable};
use sstable::SSTableReader;
use std::collections::BTreeMap;
use std::sync::Arc;

impl Engine {
    /// Looks up a key, returning its live value.
    ///
    /// `Ok(None)` means the key is absent or tombstoned — never an error.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        let mut inner = lock(&self.inner);
        inner.counters.gets += 1;
        let levels = lock(&self.levels);
        Ok(read_entry(&inner.mem, &levels, key)?.and_then(Entry::into_value))
    }

    /// Scans `start <= key < end`, returning each key at most once with its
    /// most recent state, in ascending key order. Tombstoned keys surface as
    /// `(key, None)`.
    ///
    /// The memtable contents and the set of runs are snapshotted up front;
    /// the runs themselves are immutable, so the scan observes a consistent
    /// view even if a flush or compaction lands midway.
    pub fn range_scan(
        &self,
        start: &[u8],
        end: &[u8],
    ) -> Result<Vec<(Vec<u8>, Option<Vec<u8>>)>> {
        self.ensure_open()?;

        let (mem_pairs, readers) = {
            let mut inner = lock(&self.inner);
            inner.counters.range_scans += 1;

            let mem_pairs: Vec<(Vec<u8>, Entry)> = inner
                .mem
                .range(start, end)
                .map(|(k, e)| (k.to_vec(), e.clone()))
                .collect();

            let levels = lock(&self.levels);
            let mut readers: Vec<Arc<SSTableReader>> = Vec::new();
            for level in 0..levels.max_levels() {
                for run in levels.runs(level).iter().rev() {
                    readers.push(Arc::clone(run));
                }
            }
            (mem_pairs, readers)
        };

        // First-visited source wins per key; BTreeMap keeps the output sorted.
        let mut merged: BTreeMap<Vec<u8>, Entry> = BTreeMap::new();
        for (key, entry) in mem_pairs {
            merged.entry(key).or_insert(entry);
        }
        for reader in readers {
            for (key, entry) in reader.range(start, end)? {
                merged.entry(key).or_insert(entry);
            }
        }

        Ok(merged
            .into_iter()
            .map(|(key, entry)| (key, entry.into_value()))
            .collect())
    }
}

/// The shared read path: memtable, then levels top-down, newest run first
/// within each level. Returns the first state found, tombstones included.
pub(crate) fn read_entry(
    mem: &Memtable,
    levels: &Levels,
    key: &[u8],
) -> Result<Option<Entry>> {
    if let Some(entry) = mem.get(key) {
        return Ok(Some(entry.clone()));
    }

    for level in 0..levels.max_levels() {
        for run in levels.runs(level).iter().rev() {
            if let Some(entry) = run.get(key)? {
                return Ok(Some(entry));
            }
        }
    }

    Ok(None)
}
