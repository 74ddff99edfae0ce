//! # Engine - DriftKV Storage Engine
//!
//! The central orchestrator that ties together the [`memtable`], [`wal`], and
//! [`sstable`] crates into a complete LSM-tree key-value store.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌───────────────────────────────────────────────┐
//! │                   ENGINE                      │
//! │                                               │
//! │ write.rs → WAL append → Memtable insert       │
//! │              |                                │
//! │              |  (threshold exceeded?)         │
//! │              |            yes                 │
//! │              v                                │
//! │           flush() → new level-0 SSTable       │
//! │                                               │
//! │ read.rs → Memtable → L0 (newest→oldest)       │
//! │            → L1 … L6  (first match wins)      │
//! └───────────────────────────────────────────────┘
//!                 ▲
//!                 │ shared Arc<Mutex<Levels>>
//!                 ▼
//! ┌───────────────────────────────────────────────┐
//! │           COMPACTION MANAGER                  │
//! │  background workers merging runs up the       │
//! │  level hierarchy (compaction.rs)              │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module         | Purpose                                                |
//! |----------------|--------------------------------------------------------|
//! | `lib.rs`       | `Engine` struct, open/close, stats, errors, dir lock   |
//! | [`levels`]     | The shared level catalog                               |
//! | `recovery`     | Level scanning and WAL replay on startup               |
//! | `write`        | `put()`, `delete()`, `batch_put()`, `flush()`          |
//! | `read`         | `get()`, `range_scan()`                                |
//! | [`compaction`] | Background workers, merge, force compaction            |
//!
//! ## Crash Safety
//!
//! Every write is appended to the WAL **before** the memtable update. A
//! flushed SSTable is written, fsynced, and installed into the catalog before
//! the WAL covering its data is truncated. SSTables are written atomically
//! via temp file + rename.

mod compaction;
mod levels;
mod read;
mod recovery;
mod write;

pub use compaction::{CompactionManager, CompactionStats, CompactionStatsSnapshot};
pub use levels::Levels;

use config::EngineConfig;
use fs2::FileExt;
use memtable::Memtable;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::info;
use wal::Wal;

/// Name of the write-ahead log file within the data directory.
pub const WAL_FILENAME: &str = "wal.log";
/// Name of the advisory lock file enforcing single-writer-per-directory.
pub const LOCK_FILENAME: &str = "LOCK";

/// Errors surfaced by the engine.
///
/// Absence is never an error: `get` returns `Ok(None)` and `delete` returns
/// `Ok(false)`. Corrupt WAL frames and corrupt SSTables are handled
/// internally (skipped / treated as empty runs) and never surfaced.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A caller-supplied argument was rejected (empty key, mismatched batch
    /// lengths).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The engine has been closed; no further operations are accepted.
    #[error("engine is closed")]
    Closed,

    /// Another process holds the data directory.
    #[error("data directory {} is locked by another process", .0.display())]
    Locked(PathBuf),

    /// An unrecoverable error from the write-ahead log.
    #[error("wal error: {0}")]
    Wal(#[from] wal::WalError),

    /// An unrecoverable filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An unrecoverable error from the SSTable layer.
    #[error("storage error: {0}")]
    Storage(anyhow::Error),
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Storage(err)
    }
}

/// Engine result alias.
pub type Result<T> = std::result::Result<T, EngineError>;

/// A point-in-time snapshot of engine counters and gauges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Completed `put` operations (batch puts count each pair).
    pub puts: u64,
    /// Completed `get` operations.
    pub gets: u64,
    /// Completed `delete` operations that found a live key.
    pub deletes: u64,
    /// Completed range scans.
    pub range_scans: u64,
    /// Memtable flushes performed.
    pub flushes: u64,
    /// Compactions completed by the compaction manager.
    pub compactions: u64,
    /// Current memtable entry count.
    pub memtable_size: usize,
    /// Current approximate memtable memory usage in bytes.
    pub memtable_memory: usize,
    /// Current WAL file size in bytes.
    pub wal_size: u64,
    /// Run counts per level, `level_0` first.
    pub sstable_counts: Vec<usize>,
}

/// Mutable engine state guarded by the engine lock.
pub(crate) struct Inner {
    pub(crate) mem: Memtable,
    pub(crate) wal: Wal,
    pub(crate) counters: Counters,
}

/// Operation counters, mutated under the engine lock.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) puts: u64,
    pub(crate) gets: u64,
    pub(crate) deletes: u64,
    pub(crate) range_scans: u64,
    pub(crate) flushes: u64,
}

/// The LSM storage engine.
///
/// All operations take `&self`; a single mutex (the "engine lock") over the
/// memtable, WAL, and counters serializes reads and writes, a second mutex
/// serializes flushes, and the level catalog lives behind an
/// `Arc<Mutex<Levels>>` shared with the [`CompactionManager`]. Lock order is
/// engine lock → flush lock → catalog lock.
///
/// # Example
///
/// ```rust,no_run
/// use config::EngineConfig;
/// use engine::Engine;
///
/// let engine = Engine::open("data", EngineConfig::default()).unwrap();
/// engine.put(b"name", b"alice").unwrap();
/// assert_eq!(engine.get(b"name").unwrap(), Some(b"alice".to_vec()));
/// engine.close().unwrap();
/// ```
pub struct Engine {
    pub(crate) data_dir: PathBuf,
    pub(crate) config: EngineConfig,
    pub(crate) inner: Mutex<Inner>,
    pub(crate) levels: Arc<Mutex<Levels>>,
    pub(crate) flush_lock: Mutex<()>,
    pub(crate) compaction_stats: Arc<CompactionStats>,
    closed: AtomicBool,
    /// Held for the lifetime of the engine; the OS releases it on crash.
    _dir_lock: DirLock,
}

impl Engine {
    /// Opens (or creates) an engine over `data_dir`, performing full recovery.
    ///
    /// # Startup steps
    ///
    /// 1. Create the data directory if missing and take the advisory
    ///    directory lock.
    /// 2. Scan `level_0/ .. level_{L-1}/` for `.sst` files in filename order
    ///    and open readers.
    /// 3. Replay the WAL into a fresh memtable (malformed entries skipped).
    /// 4. If anything was replayed, flush it to a level-0 SSTable — this
    ///    installs the run and truncates the WAL, so the recovered data is
    ///    durable before new writes are accepted. An empty replay just
    ///    truncates.
    /// 5. Open the WAL for subsequent appends.
    pub fn open<P: AsRef<Path>>(data_dir: P, config: EngineConfig) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;
        let dir_lock = DirLock::acquire(&data_dir)?;

        let levels = recovery::load_levels(&data_dir, config.max_levels)?;

        let mut mem = Memtable::new();
        let wal = Wal::new(data_dir.join(WAL_FILENAME), config.wal_sync_on_write);
        let replayed = recovery::replay_wal(&wal, &mut mem)?;

        let engine = Self {
            data_dir,
            config,
            inner: Mutex::new(Inner {
                mem,
                wal,
                counters: Counters::default(),
            }),
            levels: Arc::new(Mutex::new(levels)),
            flush_lock: Mutex::new(()),
            compaction_stats: Arc::new(CompactionStats::default()),
            closed: AtomicBool::new(false),
            _dir_lock: dir_lock,
        };

        {
            let mut inner = lock(&engine.inner);
            if !inner.mem.is_empty() {
                info!(entries = replayed, "recovered entries from wal, flushing");
                engine.flush_locked(&mut inner)?;
            } else {
                inner.wal.clear()?;
            }
            inner.wal.open()?;
        }

        info!(data_dir = %engine.data_dir.display(), "engine opened");
        Ok(engine)
    }

    /// Returns a snapshot of the engine counters and gauges.
    #[must_use]
    pub fn get_stats(&self) -> EngineStats {
        let inner = lock(&self.inner);
        let levels = lock(&self.levels);
        EngineStats {
            puts: inner.counters.puts,
            gets: inner.counters.gets,
            deletes: inner.counters.deletes,
            range_scans: inner.counters.range_scans,
            flushes: inner.counters.flushes,
            compactions: self.compaction_stats.completed(),
            memtable_size: inner.mem.len(),
            memtable_memory: inner.mem.memory_usage(),
            wal_size: inner.wal.size(),
            sstable_counts: levels.counts(),
        }
    }

    /// Flushes the memtable and closes the WAL. Idempotent; all subsequent
    /// operations fail with [`EngineError::Closed`].
    ///
    /// The compaction manager is a separate component and must be stopped by
    /// whoever owns it *before* closing the engine.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut inner = lock(&self.inner);
        if !inner.mem.is_empty() {
            self.flush_locked(&mut inner)?;
        }
        inner.wal.close();
        info!(data_dir = %self.data_dir.display(), "engine closed");
        Ok(())
    }

    /// The shared level catalog, for wiring up a [`CompactionManager`].
    #[must_use]
    pub fn catalog(&self) -> Arc<Mutex<Levels>> {
        Arc::clone(&self.levels)
    }

    /// The shared compaction counters, for wiring up a [`CompactionManager`].
    #[must_use]
    pub fn compaction_counters(&self) -> Arc<CompactionStats> {
        Arc::clone(&self.compaction_stats)
    }

    /// The engine's data directory.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// The engine's configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Closed);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.get_stats();
        f.debug_struct("Engine")
            .field("data_dir", &self.data_dir)
            .field("memtable_size", &stats.memtable_size)
            .field("memtable_memory", &stats.memtable_memory)
            .field("wal_size", &stats.wal_size)
            .field("sstable_counts", &stats.sstable_counts)
            .finish()
    }
}

/// Best-effort close on drop.
///
/// Errors are ignored because `Drop` cannot propagate them — unflushed data
/// is still safe in the WAL and will be recovered on the next startup.
impl Drop for Engine {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Exclusive advisory lock on `<data_dir>/LOCK`.
///
/// Advisory (flock-style) rather than an existence check so that a SIGKILL'd
/// process never leaves a stale lock behind.
struct DirLock {
    _file: File,
}

impl DirLock {
    fn acquire(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(LOCK_FILENAME);
        let file = File::options()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)?;
        file.try_lock_exclusive()
            .map_err(|_| EngineError::Locked(data_dir.to_path_buf()))?;
        Ok(Self { _file: file })
    }
}

/// Locks a mutex, recovering the guard if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Microseconds since the Unix epoch.
pub(crate) fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Picks a fresh `<timestamp_micros>.sst` path in `dir`, bumping the
/// timestamp if two runs land in the same microsecond.
pub(crate) fn next_sstable_path(dir: &Path) -> PathBuf {
    let mut ts = now_micros();
    loop {
        let path = dir.join(format!("{ts}.sst"));
        if !path.exists() {
            return path;
        }
        ts += 1;
    }
}

#[cfg(test)]
mod tests;
