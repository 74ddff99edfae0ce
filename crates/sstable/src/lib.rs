//! # SSTable - Sorted String Table
//!
//! Immutable, on-disk storage files for the DriftKV storage engine.
//!
//! When the in-memory [`memtable::Memtable`] exceeds its size threshold the
//! engine flushes it to disk as an SSTable. SSTables are *write-once,
//! read-many* — once created they are never modified (only replaced during
//! compaction).
//!
//! ## File layout
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ DATA SECTION (sorted records)                                 │
//! │                                                               │
//! │ varint(key_len) | key | varint(val_len) | val                 │
//! │                                                               │
//! │ ... repeated for each record; tombstones carry the reserved   │
//! │ value string "__TOMBSTONE__" ...                              │
//! ├───────────────────────────────────────────────────────────────┤
//! │ INDEX SECTION (one entry per 16 records, first always)        │
//! │                                                               │
//! │ varint(key_len) | key | offset_within_data (u64 BE)           │
//! ├───────────────────────────────────────────────────────────────┤
//! │ BLOOM SECTION (serialized BloomFilter over all keys)          │
//! │                                                               │
//! │ expected_items (u64) | fp_rate (f32) | num_bits (u32)         │
//! │ num_hashes (u32) | items_added (u64) | bits                   │
//! ├───────────────────────────────────────────────────────────────┤
//! │ METADATA BLOCK                                                │
//! │                                                               │
//! │ key_count (u64) | index_offset (u64) | bloom_offset (u64)     │
//! │ min_key_len (u32) | max_key_len (u32) | min_key | max_key     │
//! ├───────────────────────────────────────────────────────────────┤
//! │ FOOTER (always the last 40 bytes)                             │
//! │                                                               │
//! │ data_start | data_end | index_start | index_end |             │
//! │ metadata_start (all u64)                                      │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! All fixed-width integers are big-endian. The reader treats too-short or
//! structurally malformed files as empty runs rather than failing, so a
//! single corrupt file never halts the engine.

pub mod codec;
mod format;
mod reader;
mod writer;

pub use codec::TOMBSTONE_MARKER;
pub use format::{Footer, TableMeta, FOOTER_BYTES};
pub use reader::SSTableReader;
pub use writer::SSTableWriter;

#[cfg(test)]
mod tests;
