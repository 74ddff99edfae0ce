//! Cold-start recovery: scanning the level directories and replaying the WAL.

use crate::levels::Levels;
use crate::Result;
use memtable::{Entry, Memtable};
use sstable::SSTableReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use wal::{Wal, WalOp};

/// Scans `<data_dir>/level_<i>/*.sst` for every level and opens readers in
/// filename-sorted order (so newer microsecond-timestamp names come last,
/// matching the catalog's oldest-first convention).
///
/// Corrupt files open as empty runs and are skipped; orphans left behind by
/// an interrupted flush load as normal runs.
pub(crate) fn load_levels(data_dir: &Path, max_levels: usize) -> Result<Levels> {
    let mut levels = Levels::new(max_levels);

    for level in 0..max_levels {
        let dir = data_dir.join(format!("level_{level}"));
        if !dir.is_dir() {
            continue;
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "sst").unwrap_or(false))
            .collect();
        paths.sort();

        for path in paths {
            let reader = SSTableReader::open(&path)?;
            if !reader.exists() {
                continue;
            }
            if reader.key_count() == 0 && reader.file_size() > 0 {
                warn!(path = %path.display(), "loaded sstable as empty run");
            }
            debug!(level, path = %path.display(), keys = reader.key_count(), "loaded sstable");
            levels.push(level, Arc::new(reader));
        }
    }

    Ok(levels)
}

/// Replays the WAL into `mem`, returning how many entries were applied.
///
/// `PUT` becomes a live value, `DELETE` becomes a tombstone. Frame-level
/// corruption is already filtered by [`Wal::replay`].
pub(crate) fn replay_wal(wal: &Wal, mem: &mut Memtable) -> Result<usize> {
    let entries = wal.replay()?;
    let count = entries.len();
    for entry in entries {
        match entry.op {
            WalOp::Put => {
                mem.put(entry.key, Entry::Value(entry.value.unwrap_or_default()));
            }
            WalOp::Delete => {
                mem.put(entry.key, Entry::Tombstone);
            }
        }
    }
    Ok(count)
}
