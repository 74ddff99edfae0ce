use crate::Engine;
use config::EngineConfig;
use std::path::Path;

/// Default test configuration: no fsync per append (tempdir tests don't need
/// crash durability and sync makes them crawl).
pub(crate) fn test_config() -> EngineConfig {
    EngineConfig::default().with_wal_sync_on_write(false)
}

pub(crate) fn open_engine(dir: &Path) -> Engine {
    Engine::open(dir, test_config()).unwrap()
}

/// Counts `.sst` files in `<data_dir>/level_<level>/`.
pub(crate) fn count_sst_files(data_dir: &Path, level: usize) -> usize {
    let dir = data_dir.join(format!("level_{level}"));
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "sst")
                    .unwrap_or(false)
            })
            .count(),
        Err(_) => 0,
    }
}
