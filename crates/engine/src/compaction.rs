//! Background compaction: merging runs and promoting them up the level
//! hierarchy.
//!
//! Worker threads loop over the shared level catalog looking for a level that
//! needs compaction: level 0 when it holds more than four runs, level i >= 1
//! when its total bytes exceed `10 MiB * multiplier^i`, lower levels first.
//!
//! A compaction selects its sources under the catalog lock, merges them
//! *without* the lock (the `Arc`-cloned readers stay live), and reacquires
//! the lock only to swap the merged run in: sources are removed and their
//! files deleted, overlapping runs at the target are evicted, and the new
//! run is appended. Any error abandons the compaction without mutating the
//! catalog; the worker backs off for five seconds and retries.

use crate::levels::Levels;
use crate::{lock, next_sstable_path, now_micros};
use anyhow::Result;
use config::EngineConfig;
use memtable::Entry;
use sstable::{SSTableReader, SSTableWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info};

/// Level-0 run count that triggers compaction.
const L0_COMPACTION_TRIGGER: usize = 4;
/// Byte budget of level 1 before compaction (scaled by multiplier^i above).
const LEVEL_BASE_BYTES: u64 = 10 * 1024 * 1024;
/// How long a worker sleeps when no level needs compaction.
const IDLE_SLEEP: Duration = Duration::from_secs(1);
/// How long a worker backs off after a failed compaction.
const ERROR_BACKOFF: Duration = Duration::from_secs(5);
/// Granularity at which sleeping workers poll the running flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Monotonic compaction counters, shared between the engine (for
/// `get_stats`) and the manager that increments them.
#[derive(Debug, Default)]
pub struct CompactionStats {
    compactions_completed: AtomicU64,
    sstables_merged: AtomicU64,
    bytes_compacted: AtomicU64,
    last_compaction_micros: AtomicU64,
}

impl CompactionStats {
    /// Number of compactions completed.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.compactions_completed.load(Ordering::Relaxed)
    }

    fn record(&self, sources: u64, bytes: u64) {
        self.compactions_completed.fetch_add(1, Ordering::Relaxed);
        self.sstables_merged.fetch_add(sources, Ordering::Relaxed);
        self.bytes_compacted.fetch_add(bytes, Ordering::Relaxed);
        self.last_compaction_micros
            .store(now_micros(), Ordering::Relaxed);
    }
}

/// A point-in-time snapshot of compaction activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionStatsSnapshot {
    /// Compactions completed since startup.
    pub compactions_completed: u64,
    /// Source runs merged across all compactions.
    pub sstables_merged: u64,
    /// Total bytes of source runs processed.
    pub bytes_compacted: u64,
    /// Microsecond timestamp of the last completed compaction (0 if none).
    pub last_compaction_micros: u64,
    /// Whether background workers are running.
    pub running: bool,
    /// Number of background workers.
    pub worker_count: usize,
}

/// Manages background compaction workers over a shared level catalog.
///
/// The manager and the engine are independent users of the same
/// `Arc<Mutex<Levels>>`; neither holds a reference to the other.
pub struct CompactionManager {
    data_dir: PathBuf,
    levels: Arc<Mutex<Levels>>,
    stats: Arc<CompactionStats>,
    config: EngineConfig,
    running: Arc<AtomicBool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl CompactionManager {
    /// Creates a manager over the engine's catalog and compaction counters
    /// (see [`Engine::catalog`](crate::Engine::catalog) and
    /// [`Engine::compaction_counters`](crate::Engine::compaction_counters)).
    /// Workers are not started until [`start`](CompactionManager::start).
    pub fn new<P: AsRef<Path>>(
        data_dir: P,
        levels: Arc<Mutex<Levels>>,
        stats: Arc<CompactionStats>,
        config: EngineConfig,
    ) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            levels,
            stats,
            config,
            running: Arc::new(AtomicBool::new(false)),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Starts the background workers. Idempotent.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut workers = lock(&self.workers);
        for _ in 0..self.config.compaction_worker_count {
            let data_dir = self.data_dir.clone();
            let levels = Arc::clone(&self.levels);
            let stats = Arc::clone(&self.stats);
            let config = self.config.clone();
            let running = Arc::clone(&self.running);
            workers.push(std::thread::spawn(move || {
                worker_loop(&data_dir, &levels, &stats, &config, &running);
            }));
        }
        info!(workers = workers.len(), "compaction workers started");
    }

    /// Stops the background workers and joins them. Workers poll the running
    /// flag at sub-second granularity, so this returns promptly unless a
    /// merge is mid-flight. Idempotent.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let mut workers = lock(&self.workers);
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
        info!("compaction workers stopped");
    }

    /// Compacts every non-empty level once, in ascending level order.
    pub fn force_compaction(&self) -> Result<()> {
        for level in 0..self.config.max_levels {
            let has_runs = lock(&self.levels).run_count(level) > 0;
            if has_runs {
                compact_level(&self.data_dir, &self.levels, &self.stats, &self.config, level)?;
            }
        }
        Ok(())
    }

    /// Returns a snapshot of compaction activity.
    #[must_use]
    pub fn stats(&self) -> CompactionStatsSnapshot {
        CompactionStatsSnapshot {
            compactions_completed: self.stats.compactions_completed.load(Ordering::Relaxed),
            sstables_merged: self.stats.sstables_merged.load(Ordering::Relaxed),
            bytes_compacted: self.stats.bytes_compacted.load(Ordering::Relaxed),
            last_compaction_micros: self.stats.last_compaction_micros.load(Ordering::Relaxed),
            running: self.running.load(Ordering::SeqCst),
            worker_count: lock(&self.workers).len(),
        }
    }
}

impl Drop for CompactionManager {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(
    data_dir: &Path,
    levels: &Arc<Mutex<Levels>>,
    stats: &Arc<CompactionStats>,
    config: &EngineConfig,
    running: &AtomicBool,
) {
    while running.load(Ordering::SeqCst) {
        let candidate = {
            let lv = lock(levels);
            find_level_to_compact(&lv, config)
        };

        match candidate {
            Some(level) => {
                if let Err(e) = compact_level(data_dir, levels, stats, config, level) {
                    error!(level, error = %e, "compaction failed, backing off");
                    sleep_while_running(running, ERROR_BACKOFF);
                }
            }
            None => sleep_while_running(running, IDLE_SLEEP),
        }
    }
}

fn sleep_while_running(running: &AtomicBool, total: Duration) {
    let mut slept = Duration::ZERO;
    while slept < total && running.load(Ordering::SeqCst) {
        let step = POLL_INTERVAL.min(total - slept);
        std::thread::sleep(step);
        slept += step;
    }
}

/// Selection policy: level 0 past its run-count trigger, else the lowest
/// level past its byte budget.
fn find_level_to_compact(levels: &Levels, config: &EngineConfig) -> Option<usize> {
    if levels.run_count(0) > L0_COMPACTION_TRIGGER {
        return Some(0);
    }
    for level in 1..config.max_levels {
        if levels.run_count(level) == 0 {
            continue;
        }
        let threshold = LEVEL_BASE_BYTES
            .saturating_mul(config.level_size_multiplier.saturating_pow(level as u32));
        if levels.level_bytes(level) > threshold {
            return Some(level);
        }
    }
    None
}

/// Compacts one level into the next (the last level compacts into itself).
fn compact_level(
    data_dir: &Path,
    levels_mutex: &Arc<Mutex<Levels>>,
    stats: &Arc<CompactionStats>,
    config: &EngineConfig,
    level: usize,
) -> Result<()> {
    // Phase 1: choose sources under the catalog lock.
    let sources: Vec<Arc<SSTableReader>> = {
        let lv = lock(levels_mutex);
        select_sources(&lv, level)
    };
    if sources.is_empty() {
        return Ok(());
    }

    let target = (level + 1).min(config.max_levels - 1);
    let target_dir = data_dir.join(format!("level_{target}"));
    std::fs::create_dir_all(&target_dir)?;

    debug!(level, target, sources = sources.len(), "compaction starting");

    // Phase 2: merge without the lock. The cloned Arcs keep the source runs
    // readable even if their files are unlinked concurrently.
    //
    // Sources are streamed oldest-first (select_sources guarantees timestamp
    // order), records stable-sorted by key, and the reverse scan keeps the
    // last pre-reverse occurrence of each key — i.e. the newest state.
    let mut records: Vec<(Vec<u8>, Entry)> = Vec::new();
    for source in &sources {
        records.extend(source.all()?);
    }
    records.sort_by(|a, b| a.0.cmp(&b.0));

    let mut merged: Vec<(Vec<u8>, Entry)> = Vec::with_capacity(records.len());
    for (key, entry) in records.into_iter().rev() {
        if merged.last().map(|(k, _)| k == &key).unwrap_or(false) {
            continue;
        }
        merged.push((key, entry));
    }
    merged.reverse();

    let source_count = sources.len() as u64;
    let source_bytes: u64 = sources.iter().map(|s| s.file_size()).sum();

    if merged.is_empty() {
        // All sources were empty runs; drop them without writing a new one.
        let mut lv = lock(levels_mutex);
        for source in &sources {
            lv.remove(level, source.path());
            let _ = std::fs::remove_file(source.path());
        }
        return Ok(());
    }

    let merged_len = merged.len();
    let out_path = next_sstable_path(&target_dir);
    let mut writer = SSTableWriter::with_options(
        &out_path,
        config.sstable_fp_rate,
        config.sstable_index_interval,
    );
    for (key, entry) in merged {
        writer.add(key, entry);
    }
    writer.write()?;
    let new_run = Arc::new(SSTableReader::open(&out_path)?);

    // Phase 3: swap under the catalog lock. Removal from the catalog always
    // precedes file deletion, so no catalog reader ever points at a deleted
    // run.
    {
        let mut lv = lock(levels_mutex);
        for source in &sources {
            lv.remove(level, source.path());
            let _ = std::fs::remove_file(source.path());
        }

        if target < config.max_levels - 1 {
            let overlapping: Vec<Arc<SSTableReader>> = lv
                .runs(target)
                .iter()
                .filter(|run| ranges_overlap(new_run.key_range(), run.key_range()))
                .cloned()
                .collect();
            for run in overlapping {
                lv.remove(target, run.path());
                let _ = std::fs::remove_file(run.path());
            }
        }

        lv.push(target, Arc::clone(&new_run));
    }

    stats.record(source_count, source_bytes);
    info!(
        level,
        target,
        sources = source_count,
        records = merged_len,
        "compaction completed"
    );
    Ok(())
}

/// Sources for a compaction of `level`, always returned oldest-first by
/// filename timestamp so the merge's last-occurrence-wins dedup keeps the
/// newest record.
///
/// - Level 0: every run.
/// - Level i >= 1: the largest ⌊n/2⌋ runs by file size (empty when the level
///   holds fewer than two runs).
fn select_sources(levels: &Levels, level: usize) -> Vec<Arc<SSTableReader>> {
    let mut sources: Vec<Arc<SSTableReader>> = if level == 0 {
        levels.runs(0).to_vec()
    } else {
        let runs = levels.runs(level);
        if runs.len() <= 1 {
            return Vec::new();
        }
        let mut by_size = runs.to_vec();
        by_size.sort_by(|a, b| b.file_size().cmp(&a.file_size()));
        by_size.truncate(runs.len() / 2);
        by_size
    };
    sources.sort_by_key(|run| file_timestamp(run.path()));
    sources
}

/// Parses the microsecond timestamp embedded in a run's filename; unparsable
/// names sort as oldest.
fn file_timestamp(path: &Path) -> u64 {
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

/// Two key ranges `[a, b]` and `[c, d]` overlap iff `a <= d && c <= b`;
/// empty ranges (empty min or max key) never overlap.
fn ranges_overlap(a: (&[u8], &[u8]), b: (&[u8], &[u8])) -> bool {
    let (min1, max1) = a;
    let (min2, max2) = b;
    if min1.is_empty() || max1.is_empty() || min2.is_empty() || max2.is_empty() {
        return false;
    }
    min1 <= max2 && min2 <= max1
}
