//! # WAL — Write-Ahead Log
//!
//! Provides crash-safe durability for the DriftKV storage engine.
//!
//! Every mutation (`PUT` or `DELETE`) is serialized into a binary record and
//! appended to the WAL **before** the corresponding in-memory update. On
//! restart the WAL is replayed to reconstruct the memtable, guaranteeing that
//! no acknowledged write is lost.
//!
//! ## Binary Frame Format
//!
//! ```text
//! [crc32: u32 BE][payload_len: u32 BE][payload ...]
//! ```
//!
//! Payload: `[op_len: u32][op][key_len: u32][key][val_len: u32][val][timestamp: u64]`,
//! all big-endian. `op` is the ASCII string `PUT` or `DELETE`; `val_len` is 0
//! for deletes. The CRC32 covers the payload only.
//!
//! ## Replay semantics
//!
//! - A frame failing CRC verification is skipped (the payload length is still
//!   trusted to find the next frame) and replay continues.
//! - A malformed payload is skipped; replay continues.
//! - A truncated trailing frame ends the stream cleanly.
//!
//! ## Example
//!
//! ```rust,no_run
//! use wal::{Wal, WalOp};
//!
//! let mut w = Wal::new("wal.log", true);
//! w.open().unwrap();
//! w.append(WalOp::Put, b"hello", Some(b"world")).unwrap();
//! for entry in w.replay().unwrap() {
//!     println!("{:?}", entry);
//! }
//! ```

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{trace, warn};

/// Upper bound on a single payload (a value is capped at 100 MiB downstream,
/// so anything beyond this is corruption, not data).
const MAX_PAYLOAD_BYTES: u32 = 128 * 1024 * 1024;

/// The logical operation recorded by a WAL entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalOp {
    /// A key-value insertion.
    Put,
    /// A key deletion (tombstone).
    Delete,
}

impl WalOp {
    fn as_bytes(self) -> &'static [u8] {
        match self {
            WalOp::Put => b"PUT",
            WalOp::Delete => b"DELETE",
        }
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes {
            b"PUT" => Some(WalOp::Put),
            b"DELETE" => Some(WalOp::Delete),
            _ => None,
        }
    }
}

/// A single decoded WAL entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalEntry {
    /// The logged operation.
    pub op: WalOp,
    /// The lookup key.
    pub key: Vec<u8>,
    /// The payload value (`None` for deletes).
    pub value: Option<Vec<u8>>,
    /// Microseconds since the Unix epoch at append time.
    pub timestamp_micros: u64,
}

/// Errors that can occur during WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The WAL is not open for appends.
    #[error("wal is not open")]
    Closed,
}

/// Append-only write-ahead log.
///
/// Frames are serialized into a reusable in-memory buffer, CRC-checksummed,
/// and written to the underlying file in a single `write_all` call. When
/// `sync_on_write` is `true` (the default engine configuration), every append
/// is followed by `sync_all()` so the record is durable before the caller is
/// acknowledged.
pub struct Wal {
    path: PathBuf,
    sync_on_write: bool,
    file: Option<File>,
    /// Reusable scratch buffer to avoid allocation on every append.
    buf: Vec<u8>,
}

impl Wal {
    /// Creates a WAL handle for `path`. The file is not opened until
    /// [`open`](Wal::open) is called.
    pub fn new<P: AsRef<Path>>(path: P, sync_on_write: bool) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            sync_on_write,
            file: None,
            buf: Vec::with_capacity(256),
        }
    }

    /// Opens (or creates) the log file for appends. Idempotent.
    pub fn open(&mut self) -> Result<(), WalError> {
        if self.file.is_some() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.file = Some(file);
        Ok(())
    }

    /// Serializes and appends one mutation.
    ///
    /// Frame layout: `[crc32: u32][payload_len: u32][payload]`, CRC over the
    /// payload only. Flushes, and fsyncs when sync-on-write is enabled, before
    /// returning — an `Ok` from this method means the record is durable (or at
    /// least handed to the OS when syncing is disabled).
    pub fn append(
        &mut self,
        op: WalOp,
        key: &[u8],
        value: Option<&[u8]>,
    ) -> Result<(), WalError> {
        let file = self.file.as_mut().ok_or(WalError::Closed)?;

        let timestamp = now_micros();

        // Build the payload in the reusable buffer, leaving 8 bytes for the
        // frame header to be filled in afterwards.
        self.buf.clear();
        self.buf.extend_from_slice(&[0u8; 8]);

        let op_bytes = op.as_bytes();
        self.buf.write_u32::<BigEndian>(op_bytes.len() as u32)?;
        self.buf.extend_from_slice(op_bytes);
        self.buf.write_u32::<BigEndian>(key.len() as u32)?;
        self.buf.extend_from_slice(key);
        let val = value.unwrap_or(&[]);
        self.buf.write_u32::<BigEndian>(val.len() as u32)?;
        self.buf.extend_from_slice(val);
        self.buf.write_u64::<BigEndian>(timestamp)?;

        let payload_len = (self.buf.len() - 8) as u64;
        if payload_len > u64::from(MAX_PAYLOAD_BYTES) {
            return Err(WalError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "wal record too large",
            )));
        }

        let mut hasher = Crc32::new();
        hasher.update(&self.buf[8..]);
        let crc = hasher.finalize();

        self.buf[0..4].copy_from_slice(&crc.to_be_bytes());
        self.buf[4..8].copy_from_slice(&(payload_len as u32).to_be_bytes());

        // Single write call for the entire frame.
        file.write_all(&self.buf)?;
        file.flush()?;
        if self.sync_on_write {
            file.sync_all()?;
        }

        trace!(op = ?op, key_len = key.len(), "wal append");
        Ok(())
    }

    /// Replays every recoverable entry from the current log file.
    ///
    /// Corrupt frames (CRC mismatch) and malformed payloads are dropped with a
    /// warning but do not abort the stream; the stream ends at EOF or at the
    /// first truncated frame. A missing file yields an empty stream.
    pub fn replay(&self) -> Result<Vec<WalEntry>, WalError> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(WalError::Io(e)),
        };
        let mut rdr = BufReader::new(file);
        let mut entries = Vec::new();
        let mut payload = Vec::with_capacity(256);

        loop {
            let crc = match rdr.read_u32::<BigEndian>() {
                Ok(v) => v,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(WalError::Io(e)),
            };
            let payload_len = match rdr.read_u32::<BigEndian>() {
                Ok(v) => v,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(WalError::Io(e)),
            };

            if payload_len > MAX_PAYLOAD_BYTES {
                // The length field itself is garbage; there is no way to find
                // the next frame boundary. Treat as truncation.
                warn!(payload_len, "wal frame with absurd length, stopping replay");
                break;
            }

            payload.clear();
            payload.resize(payload_len as usize, 0);
            match rdr.read_exact(&mut payload) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(WalError::Io(e)),
            }

            let mut hasher = Crc32::new();
            hasher.update(&payload);
            if hasher.finalize() != crc {
                warn!("wal frame failed crc check, skipping");
                continue;
            }

            match decode_payload(&payload) {
                Some(entry) => entries.push(entry),
                None => {
                    warn!("wal frame with malformed payload, skipping");
                    continue;
                }
            }
        }

        Ok(entries)
    }

    /// Truncates the log: closes the file, removes it, and reopens a fresh
    /// empty one. Used after a successful memtable flush.
    pub fn clear(&mut self) -> Result<(), WalError> {
        self.file = None;
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(WalError::Io(e)),
        }
        self.open()
    }

    /// Returns the current log file size in bytes (0 if the file is missing).
    #[must_use]
    pub fn size(&self) -> u64 {
        std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    /// Closes the log file. Appends fail until [`open`](Wal::open) is called again.
    pub fn close(&mut self) {
        self.file = None;
    }

    /// Returns `true` if the log is open for appends.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Returns the log file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Decodes one payload, returning `None` if it is malformed.
fn decode_payload(payload: &[u8]) -> Option<WalEntry> {
    let mut rdr = payload;

    let op_len = rdr.read_u32::<BigEndian>().ok()? as usize;
    if op_len > rdr.len() {
        return None;
    }
    let (op_bytes, rest) = rdr.split_at(op_len);
    let op = WalOp::from_bytes(op_bytes)?;
    rdr = rest;

    let key_len = rdr.read_u32::<BigEndian>().ok()? as usize;
    if key_len > rdr.len() {
        return None;
    }
    let (key, rest) = rdr.split_at(key_len);
    rdr = rest;

    let val_len = rdr.read_u32::<BigEndian>().ok()? as usize;
    if val_len > rdr.len() {
        return None;
    }
    let (val, rest) = rdr.split_at(val_len);
    rdr = rest;

    let timestamp_micros = rdr.read_u64::<BigEndian>().ok()?;

    let value = match op {
        WalOp::Put => Some(val.to_vec()),
        WalOp::Delete => None,
    };

    Some(WalEntry {
        op,
        key: key.to_vec(),
        value,
        timestamp_micros,
    })
}

/// Microseconds since the Unix epoch.
fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
