use anyhow::Result;
use bloom::BloomFilter;
use memtable::Entry;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

use crate::codec::{
    decode_index_entry, decode_varint, entry_from_value_bytes, MAX_KEY_BYTES, MAX_VALUE_BYTES,
};
use crate::format::{Footer, TableMeta, FOOTER_BYTES, METADATA_FIXED_BYTES};

/// Reads an immutable on-disk sorted run.
///
/// On [`open`](SSTableReader::open) the footer, metadata block, sparse index,
/// and bloom filter are loaded and cached; point lookups then cost one seek
/// plus a short sequential decode of at most one index interval.
///
/// A persistent file handle is kept open for the lifetime of the reader,
/// wrapped in a `Mutex` so `get`/`range` work through a shared `&self`. The
/// handle also makes it safe for compaction to unlink the file while a scan
/// is in flight.
///
/// A too-short or structurally corrupt file is treated as an **empty run**
/// (zero keys, no index, no bloom) rather than an error; the engine simply
/// never finds anything in it.
pub struct SSTableReader {
    path: PathBuf,
    meta: TableMeta,
    footer: Footer,
    /// Sparse index: every Nth key, ascending, with its offset in the data section.
    index: Vec<(Vec<u8>, u64)>,
    bloom: Option<BloomFilter>,
    file: Option<Mutex<BufReader<File>>>,
    file_size: u64,
    exists: bool,
}

impl SSTableReader {
    /// Opens an SSTable file, caching its footer, metadata, index, and bloom
    /// filter.
    ///
    /// # Errors
    ///
    /// Only I/O failures are errors. A missing file yields an empty run with
    /// `exists() == false`; malformed contents yield an empty run with a
    /// warning.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::empty(path, 0, false, None));
            }
            Err(e) => return Err(e.into()),
        };
        let file_size = file.metadata()?.len();

        // Too small to hold a footer plus the fixed metadata prefix.
        if file_size < FOOTER_BYTES + METADATA_FIXED_BYTES as u64 {
            warn!(path = %path.display(), file_size, "sstable too short, treating as empty run");
            let handle = Mutex::new(BufReader::new(file));
            return Ok(Self::empty(path, file_size, true, Some(handle)));
        }

        // Footer: last 40 bytes.
        file.seek(SeekFrom::Start(file_size - FOOTER_BYTES))?;
        let mut footer_buf = [0u8; FOOTER_BYTES as usize];
        file.read_exact(&mut footer_buf)?;
        let footer = match Footer::parse(&footer_buf) {
            Some(f) if Self::footer_is_plausible(&f, file_size) => f,
            _ => {
                warn!(path = %path.display(), "sstable footer malformed, treating as empty run");
                let handle = Mutex::new(BufReader::new(file));
                return Ok(Self::empty(path, file_size, true, Some(handle)));
            }
        };

        // Metadata block sits between metadata_start and the footer.
        let metadata_len = (file_size - FOOTER_BYTES - footer.metadata_start) as usize;
        file.seek(SeekFrom::Start(footer.metadata_start))?;
        let mut meta_buf = vec![0u8; metadata_len];
        file.read_exact(&mut meta_buf)?;
        let meta = match TableMeta::parse(&meta_buf) {
            Some(m) => m,
            None => {
                warn!(path = %path.display(), "sstable metadata malformed, treating as empty run");
                let handle = Mutex::new(BufReader::new(file));
                return Ok(Self::empty(path, file_size, true, Some(handle)));
            }
        };

        // Sparse index: [index_start, index_end).
        let mut index = Vec::new();
        if footer.index_end > footer.index_start {
            let index_len = (footer.index_end - footer.index_start) as usize;
            file.seek(SeekFrom::Start(footer.index_start))?;
            let mut index_buf = vec![0u8; index_len];
            file.read_exact(&mut index_buf)?;
            let mut rest = index_buf.as_slice();
            while !rest.is_empty() {
                match decode_index_entry(rest) {
                    Some((key, offset, consumed)) => {
                        index.push((key, offset));
                        rest = &rest[consumed..];
                    }
                    None => {
                        warn!(path = %path.display(), "sstable index truncated, keeping parsed prefix");
                        break;
                    }
                }
            }
        }

        // Bloom filter: [bloom_offset, metadata_start).
        let bloom = if meta.bloom_offset < footer.metadata_start {
            file.seek(SeekFrom::Start(meta.bloom_offset))?;
            let bloom_len = (footer.metadata_start - meta.bloom_offset) as usize;
            let mut bloom_buf = vec![0u8; bloom_len];
            file.read_exact(&mut bloom_buf)?;
            match BloomFilter::deserialize(&bloom_buf) {
                Ok(b) => Some(b),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "sstable bloom filter unreadable");
                    None
                }
            }
        } else {
            None
        };

        file.seek(SeekFrom::Start(0))?;

        Ok(Self {
            path,
            meta,
            footer,
            index,
            bloom,
            file: Some(Mutex::new(BufReader::new(file))),
            file_size,
            exists: true,
        })
    }

    /// Offsets must be ordered and inside the file for the footer to be trusted.
    fn footer_is_plausible(f: &Footer, file_size: u64) -> bool {
        f.data_start <= f.data_end
            && f.data_end <= f.index_start
            && f.index_start <= f.index_end
            && f.index_end <= f.metadata_start
            && f.metadata_start
                .checked_add(METADATA_FIXED_BYTES as u64 + FOOTER_BYTES)
                .map(|end| end <= file_size)
                .unwrap_or(false)
    }

    fn empty(
        path: PathBuf,
        file_size: u64,
        exists: bool,
        file: Option<Mutex<BufReader<File>>>,
    ) -> Self {
        Self {
            path,
            meta: TableMeta::default(),
            footer: Footer::default(),
            index: Vec::new(),
            bloom: None,
            file,
            file_size,
            exists,
        }
    }

    /// Point lookup for a single key.
    ///
    /// 1. If a bloom filter is present and rejects the key, return `None`
    ///    without touching the file.
    /// 2. Find the greatest indexed key `<=` the query key; none means the
    ///    key precedes every record in the table.
    /// 3. Decode records sequentially from that offset until the key is met,
    ///    a greater key is read, or the data section ends.
    ///
    /// Returns `Ok(Some(entry))` when the table holds state for the key — the
    /// entry may be a tombstone. `Ok(None)` means this run says nothing.
    pub fn get(&self, key: &[u8]) -> Result<Option<Entry>> {
        if let Some(ref bloom) = self.bloom {
            if !bloom.contains(key) {
                return Ok(None);
            }
        }

        // Greatest indexed key <= query key.
        let idx = self.index.partition_point(|(k, _)| k.as_slice() <= key);
        if idx == 0 {
            return Ok(None);
        }
        let start_offset = self.index[idx - 1].1;

        let Some(ref file) = self.file else {
            return Ok(None);
        };
        let mut f = file
            .lock()
            .map_err(|e| anyhow::anyhow!("sstable handle lock poisoned: {e}"))?;

        let mut pos = self.footer.data_start + start_offset;
        f.seek(SeekFrom::Start(pos))?;
        while pos < self.footer.data_end {
            match read_record(&mut *f, &mut pos, self.footer.data_end)? {
                Some((record_key, value)) => {
                    if record_key.as_slice() == key {
                        return Ok(Some(entry_from_value_bytes(value)));
                    }
                    if record_key.as_slice() > key {
                        return Ok(None);
                    }
                }
                None => break, // truncation or decode cap hit
            }
        }
        Ok(None)
    }

    /// Returns all records with `start <= key < end` in ascending key order,
    /// tombstones included.
    pub fn range(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Entry)>> {
        self.scan(Some((start, end)))
    }

    /// Returns every record in the table in ascending key order.
    pub fn all(&self) -> Result<Vec<(Vec<u8>, Entry)>> {
        self.scan(None)
    }

    fn scan(&self, bounds: Option<(&[u8], &[u8])>) -> Result<Vec<(Vec<u8>, Entry)>> {
        let mut out = Vec::new();
        let Some(ref file) = self.file else {
            return Ok(out);
        };
        if self.footer.data_end == self.footer.data_start {
            return Ok(out);
        }

        let mut f = file
            .lock()
            .map_err(|e| anyhow::anyhow!("sstable handle lock poisoned: {e}"))?;
        let mut pos = self.footer.data_start;
        f.seek(SeekFrom::Start(pos))?;

        while pos < self.footer.data_end {
            match read_record(&mut *f, &mut pos, self.footer.data_end)? {
                Some((key, value)) => {
                    if let Some((start, end)) = bounds {
                        if key.as_slice() >= end {
                            break;
                        }
                        if key.as_slice() < start {
                            continue;
                        }
                    }
                    out.push((key, entry_from_value_bytes(value)));
                }
                None => break,
            }
        }
        Ok(out)
    }

    /// Returns the `(min_key, max_key)` range recorded in the metadata.
    /// Both are empty for an empty run.
    #[must_use]
    pub fn key_range(&self) -> (&[u8], &[u8]) {
        (&self.meta.min_key, &self.meta.max_key)
    }

    /// Returns the number of records recorded in the metadata.
    #[must_use]
    pub fn key_count(&self) -> u64 {
        self.meta.key_count
    }

    /// Returns the file size in bytes at open time.
    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Returns `true` if the backing file existed when the reader was opened.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.exists
    }

    /// Returns the path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for SSTableReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SSTableReader")
            .field("path", &self.path)
            .field("key_count", &self.meta.key_count)
            .field("file_size", &self.file_size)
            .field("index_entries", &self.index.len())
            .field("has_bloom", &self.bloom.is_some())
            .finish()
    }
}

/// Decodes one record at `*pos`, advancing it. Returns `Ok(None)` when the
/// record is truncated or a length exceeds the decode caps — both are treated
/// as the end of the readable data in this file.
fn read_record<R: Read>(
    r: &mut R,
    pos: &mut u64,
    data_end: u64,
) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
    let key_len = match read_varint_bounded(r, pos, data_end)? {
        Some(v) => v as usize,
        None => return Ok(None),
    };
    if key_len > MAX_KEY_BYTES || *pos + key_len as u64 > data_end {
        return Ok(None);
    }
    let mut key = vec![0u8; key_len];
    r.read_exact(&mut key)?;
    *pos += key_len as u64;

    let val_len = match read_varint_bounded(r, pos, data_end)? {
        Some(v) => v as usize,
        None => return Ok(None),
    };
    if val_len > MAX_VALUE_BYTES || *pos + val_len as u64 > data_end {
        return Ok(None);
    }
    let mut value = vec![0u8; val_len];
    r.read_exact(&mut value)?;
    *pos += val_len as u64;

    Ok(Some((key, value)))
}

/// Reads a varint one byte at a time without crossing `data_end`.
fn read_varint_bounded<R: Read>(r: &mut R, pos: &mut u64, data_end: u64) -> Result<Option<u64>> {
    let mut buf = [0u8; 1];
    let mut raw = [0u8; 10];
    let mut n = 0;
    loop {
        if *pos >= data_end || n >= raw.len() {
            return Ok(None);
        }
        r.read_exact(&mut buf)?;
        *pos += 1;
        raw[n] = buf[0];
        n += 1;
        if buf[0] & 0x80 == 0 {
            break;
        }
    }
    Ok(decode_varint(&raw[..n]).map(|(v, _)| v))
}
