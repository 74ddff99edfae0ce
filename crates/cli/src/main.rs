//! # CLI - DriftKV Interactive Shell
//!
//! A REPL-style front-end for the DriftKV storage engine. Reads commands from
//! stdin, executes them against the engine, and prints results to stdout.
//! Designed for both interactive use and scripted testing (pipe commands via
//! stdin).
//!
//! ## Commands
//!
//! ```text
//! SET key value        Insert or update a key-value pair
//! GET key              Look up a key (prints value or "(nil)")
//! DEL key              Delete a key (prints OK or "(not found)")
//! SCAN [start] [end]   Range scan (inclusive start, exclusive end)
//! BATCH k=v [k=v ...]  Batched insertion
//! FLUSH                Force flush memtable to a level-0 SSTable
//! COMPACT              Force compaction of every non-empty level
//! STATS                Print engine and compaction statistics
//! EXIT / QUIT          Shut down gracefully
//! ```
//!
//! ## Configuration
//!
//! All settings are controlled via environment variables:
//!
//! ```text
//! DRIFTKV_DATA_DIR             data directory            (default: "data")
//! DRIFTKV_MEMTABLE_MAX_BYTES   flush threshold in bytes  (default: 5 MiB)
//! DRIFTKV_MEMTABLE_MAX_ENTRIES flush threshold in count  (default: 100000)
//! DRIFTKV_WAL_SYNC             fsync every WAL append    (default: true)
//! DRIFTKV_COMPACTION_WORKERS   background workers        (default: 1)
//! ```
//! (plus the remaining `DRIFTKV_*` knobs understood by `EngineConfig::from_env`).
//!
//! Set `RUST_LOG=info` (or `debug`) to see engine activity.

use anyhow::Result;
use config::EngineConfig;
use engine::{CompactionManager, Engine};
use std::io::{self, BufRead, Write};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let data_dir = std::env::var("DRIFTKV_DATA_DIR").unwrap_or_else(|_| "data".to_string());
    let cfg = EngineConfig::from_env();

    let engine = Engine::open(&data_dir, cfg.clone())?;
    let compactor = CompactionManager::new(
        &data_dir,
        engine.catalog(),
        engine.compaction_counters(),
        cfg,
    );
    compactor.start();

    println!("DriftKV started (data_dir={data_dir})");
    println!("Commands: SET key value | GET key | DEL key | SCAN [start] [end]");
    println!("          BATCH k=v ... | FLUSH | COMPACT | STATS | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "SET" => {
                    if let Some(k) = parts.next() {
                        let v: String = parts.collect::<Vec<&str>>().join(" ");
                        if v.is_empty() {
                            println!("ERR usage: SET key value");
                        } else {
                            match engine.put(k.as_bytes(), v.as_bytes()) {
                                Ok(()) => println!("OK"),
                                Err(e) => println!("ERR set failed: {e}"),
                            }
                        }
                    } else {
                        println!("ERR usage: SET key value");
                    }
                }
                "GET" => {
                    if let Some(k) = parts.next() {
                        match engine.get(k.as_bytes()) {
                            Ok(Some(v)) => println!("{}", String::from_utf8_lossy(&v)),
                            Ok(None) => println!("(nil)"),
                            Err(e) => println!("ERR read failed: {e}"),
                        }
                    } else {
                        println!("ERR usage: GET key");
                    }
                }
                "DEL" => {
                    if let Some(k) = parts.next() {
                        match engine.delete(k.as_bytes()) {
                            Ok(true) => println!("OK"),
                            Ok(false) => println!("(not found)"),
                            Err(e) => println!("ERR del failed: {e}"),
                        }
                    } else {
                        println!("ERR usage: DEL key");
                    }
                }
                "SCAN" => {
                    let start = parts.next().unwrap_or("").as_bytes().to_vec();
                    // With no explicit end, scan to a key above any printable key.
                    let end = parts
                        .next()
                        .map(|e| e.as_bytes().to_vec())
                        .unwrap_or_else(|| vec![0xff; 64]);
                    match engine.range_scan(&start, &end) {
                        Ok(results) => {
                            let mut live = 0;
                            for (k, v) in &results {
                                if let Some(v) = v {
                                    println!(
                                        "{} -> {}",
                                        String::from_utf8_lossy(k),
                                        String::from_utf8_lossy(v)
                                    );
                                    live += 1;
                                }
                            }
                            if live == 0 {
                                println!("(empty)");
                            } else {
                                println!("({live} entries)");
                            }
                        }
                        Err(e) => println!("ERR scan failed: {e}"),
                    }
                }
                "BATCH" => {
                    let mut keys = Vec::new();
                    let mut values = Vec::new();
                    let mut bad = false;
                    for pair in parts {
                        match pair.split_once('=') {
                            Some((k, v)) => {
                                keys.push(k.as_bytes().to_vec());
                                values.push(v.as_bytes().to_vec());
                            }
                            None => {
                                println!("ERR usage: BATCH key=value [key=value ...]");
                                bad = true;
                                break;
                            }
                        }
                    }
                    if !bad {
                        if keys.is_empty() {
                            println!("ERR usage: BATCH key=value [key=value ...]");
                        } else {
                            match engine.batch_put(&keys, &values) {
                                Ok(()) => println!("OK ({} entries)", keys.len()),
                                Err(e) => println!("ERR batch failed: {e}"),
                            }
                        }
                    }
                }
                "FLUSH" => match engine.flush() {
                    Ok(()) => println!("OK"),
                    Err(e) => println!("ERR flush failed: {e}"),
                },
                "COMPACT" => match compactor.force_compaction() {
                    Ok(()) => {
                        let counts = engine.get_stats().sstable_counts;
                        println!("OK (runs per level: {counts:?})");
                    }
                    Err(e) => println!("ERR compact failed: {e}"),
                },
                "STATS" => {
                    println!("{:#?}", engine.get_stats());
                    println!("{:#?}", compactor.stats());
                }
                "EXIT" | "QUIT" => {
                    println!("bye");
                    break;
                }
                other => {
                    println!("unknown command: {other}");
                }
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    // Shutdown: stop the compactor first, then flush and close the engine.
    compactor.stop();
    engine.close()?;

    Ok(())
}
