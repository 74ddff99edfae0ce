//! The level catalog: the canonical in-memory view of the on-disk state.
//!
//! Each level is an ordered list of SSTable readers, oldest first (new runs
//! are appended). Level 0 runs may overlap; higher levels aim at
//! non-overlapping ranges after compaction settles, but readers never assume
//! it and always probe every run.
//!
//! The catalog is shared between the engine and the compaction manager
//! behind an `Arc<Mutex<_>>`; runs themselves are immutable and shared as
//! `Arc<SSTableReader>`.

use sstable::SSTableReader;
use std::path::Path;
use std::sync::Arc;

/// A fixed number of levels, each an ordered list of immutable runs.
#[derive(Debug)]
pub struct Levels {
    runs: Vec<Vec<Arc<SSTableReader>>>,
}

impl Levels {
    /// Creates an empty catalog with `max_levels` levels.
    #[must_use]
    pub fn new(max_levels: usize) -> Self {
        Self {
            runs: (0..max_levels.max(1)).map(|_| Vec::new()).collect(),
        }
    }

    /// Number of levels in the catalog.
    #[must_use]
    pub fn max_levels(&self) -> usize {
        self.runs.len()
    }

    /// The runs at `level`, oldest first. Out-of-range levels are empty.
    #[must_use]
    pub fn runs(&self, level: usize) -> &[Arc<SSTableReader>] {
        self.runs.get(level).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Appends a run to `level` as the newest entry.
    pub fn push(&mut self, level: usize, run: Arc<SSTableReader>) {
        if let Some(slot) = self.runs.get_mut(level) {
            slot.push(run);
        }
    }

    /// Removes the run backed by `path` from `level`, returning it.
    pub fn remove(&mut self, level: usize, path: &Path) -> Option<Arc<SSTableReader>> {
        let slot = self.runs.get_mut(level)?;
        let idx = slot.iter().position(|r| r.path() == path)?;
        Some(slot.remove(idx))
    }

    /// Number of runs at `level`.
    #[must_use]
    pub fn run_count(&self, level: usize) -> usize {
        self.runs.get(level).map(Vec::len).unwrap_or(0)
    }

    /// Total bytes of all runs at `level`.
    #[must_use]
    pub fn level_bytes(&self, level: usize) -> u64 {
        self.runs(level).iter().map(|r| r.file_size()).sum()
    }

    /// Per-level run counts, for statistics.
    #[must_use]
    pub fn counts(&self) -> Vec<usize> {
        self.runs.iter().map(Vec::len).collect()
    }
}
