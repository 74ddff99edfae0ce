//! # Config
//!
//! Engine configuration for the DriftKV storage engine.
//!
//! All tunables live in [`EngineConfig`]. The defaults match the shipped
//! engine behavior; tests and the CLI override individual fields via the
//! `with_*` setters or environment variables.

/// Recognized engine options with their defaults.
///
/// | option | effect | default |
/// |---|---|---|
/// | `memtable_max_bytes` | flush threshold (bytes) | 5 MiB |
/// | `memtable_max_entries` | flush threshold (count) | 100 000 |
/// | `sstable_index_interval` | records per sparse index entry | 16 |
/// | `sstable_fp_rate` | bloom target false-positive rate | 0.01 |
/// | `max_levels` | number of LSM levels | 7 |
/// | `level_size_multiplier` | per-level size ratio base | 10 |
/// | `compaction_worker_count` | background compaction workers | 1 |
/// | `wal_sync_on_write` | fsync per WAL append | true |
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Memtable byte-size threshold that triggers a flush.
    pub memtable_max_bytes: usize,
    /// Memtable entry-count threshold that triggers a flush.
    pub memtable_max_entries: usize,
    /// One sparse index entry per this many SSTable records.
    pub sstable_index_interval: usize,
    /// Target false-positive rate for SSTable bloom filters.
    pub sstable_fp_rate: f64,
    /// Number of LSM levels (`level_0` .. `level_{max_levels-1}`).
    pub max_levels: usize,
    /// Base of the per-level size ratio (level i holds ~multiplier^i * 10 MiB).
    pub level_size_multiplier: u64,
    /// Number of background compaction worker threads.
    pub compaction_worker_count: usize,
    /// If `true`, every WAL append is followed by `fsync`.
    pub wal_sync_on_write: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            memtable_max_bytes: 5 * 1024 * 1024,
            memtable_max_entries: 100_000,
            sstable_index_interval: 16,
            sstable_fp_rate: 0.01,
            max_levels: 7,
            level_size_multiplier: 10,
            compaction_worker_count: 1,
            wal_sync_on_write: true,
        }
    }
}

impl EngineConfig {
    /// Returns the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the memtable flush threshold in bytes.
    #[must_use]
    pub fn with_memtable_max_bytes(mut self, bytes: usize) -> Self {
        self.memtable_max_bytes = bytes;
        self
    }

    /// Sets the memtable flush threshold in entries.
    #[must_use]
    pub fn with_memtable_max_entries(mut self, entries: usize) -> Self {
        self.memtable_max_entries = entries;
        self
    }

    /// Sets the sparse index sampling interval.
    #[must_use]
    pub fn with_sstable_index_interval(mut self, interval: usize) -> Self {
        self.sstable_index_interval = interval.max(1);
        self
    }

    /// Sets the bloom filter target false-positive rate.
    #[must_use]
    pub fn with_sstable_fp_rate(mut self, rate: f64) -> Self {
        self.sstable_fp_rate = rate;
        self
    }

    /// Sets the number of LSM levels.
    #[must_use]
    pub fn with_max_levels(mut self, levels: usize) -> Self {
        self.max_levels = levels.max(1);
        self
    }

    /// Sets the per-level size ratio base.
    #[must_use]
    pub fn with_level_size_multiplier(mut self, multiplier: u64) -> Self {
        self.level_size_multiplier = multiplier.max(1);
        self
    }

    /// Sets the number of background compaction workers.
    #[must_use]
    pub fn with_compaction_worker_count(mut self, count: usize) -> Self {
        self.compaction_worker_count = count;
        self
    }

    /// Enables or disables fsync-per-append on the WAL.
    #[must_use]
    pub fn with_wal_sync_on_write(mut self, sync: bool) -> Self {
        self.wal_sync_on_write = sync;
        self
    }

    /// Builds a configuration from `DRIFTKV_*` environment variables,
    /// falling back to the defaults for unset or unparsable values.
    ///
    /// Recognized variables: `DRIFTKV_MEMTABLE_MAX_BYTES`,
    /// `DRIFTKV_MEMTABLE_MAX_ENTRIES`, `DRIFTKV_INDEX_INTERVAL`,
    /// `DRIFTKV_BLOOM_FP_RATE`, `DRIFTKV_MAX_LEVELS`,
    /// `DRIFTKV_LEVEL_MULTIPLIER`, `DRIFTKV_COMPACTION_WORKERS`,
    /// `DRIFTKV_WAL_SYNC`.
    #[must_use]
    pub fn from_env() -> Self {
        fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }

        let d = Self::default();
        Self {
            memtable_max_bytes: env_parse("DRIFTKV_MEMTABLE_MAX_BYTES", d.memtable_max_bytes),
            memtable_max_entries: env_parse("DRIFTKV_MEMTABLE_MAX_ENTRIES", d.memtable_max_entries),
            sstable_index_interval: env_parse("DRIFTKV_INDEX_INTERVAL", d.sstable_index_interval)
                .max(1),
            sstable_fp_rate: env_parse("DRIFTKV_BLOOM_FP_RATE", d.sstable_fp_rate),
            max_levels: env_parse("DRIFTKV_MAX_LEVELS", d.max_levels).max(1),
            level_size_multiplier: env_parse("DRIFTKV_LEVEL_MULTIPLIER", d.level_size_multiplier)
                .max(1),
            compaction_worker_count: env_parse(
                "DRIFTKV_COMPACTION_WORKERS",
                d.compaction_worker_count,
            ),
            wal_sync_on_write: env_parse("DRIFTKV_WAL_SYNC", d.wal_sync_on_write),
        }
    }
}
