//! SSTable metadata block and footer framing.
//!
//! ## Metadata block (big-endian)
//!
//! ```text
//! [key_count: u64][index_offset: u64][bloom_offset: u64]
//! [min_key_len: u32][max_key_len: u32][min_key][max_key]
//! ```
//!
//! ## Footer (always the last 40 bytes, big-endian)
//!
//! ```text
//! [data_start: u64][data_end: u64][index_start: u64][index_end: u64][metadata_start: u64]
//! ```

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Result as IoResult, Write};

/// Size of the fixed footer in bytes.
pub const FOOTER_BYTES: u64 = 5 * 8;

/// Fixed-width prefix of the metadata block (three u64s + two u32s).
pub const METADATA_FIXED_BYTES: usize = 3 * 8 + 2 * 4;

/// Section boundaries recorded in the footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Footer {
    /// First byte of the data section.
    pub data_start: u64,
    /// One past the last byte of the data section.
    pub data_end: u64,
    /// First byte of the sparse index section.
    pub index_start: u64,
    /// One past the last byte of the sparse index section.
    pub index_end: u64,
    /// First byte of the metadata block.
    pub metadata_start: u64,
}

impl Footer {
    /// Writes the 40-byte footer to `w`.
    pub fn write_to<W: Write>(&self, w: &mut W) -> IoResult<()> {
        w.write_u64::<BigEndian>(self.data_start)?;
        w.write_u64::<BigEndian>(self.data_end)?;
        w.write_u64::<BigEndian>(self.index_start)?;
        w.write_u64::<BigEndian>(self.index_end)?;
        w.write_u64::<BigEndian>(self.metadata_start)?;
        Ok(())
    }

    /// Parses a footer from exactly [`FOOTER_BYTES`] bytes.
    ///
    /// Returns `None` if the slice is the wrong size.
    #[must_use]
    pub fn parse(mut data: &[u8]) -> Option<Self> {
        if data.len() != FOOTER_BYTES as usize {
            return None;
        }
        Some(Self {
            data_start: data.read_u64::<BigEndian>().ok()?,
            data_end: data.read_u64::<BigEndian>().ok()?,
            index_start: data.read_u64::<BigEndian>().ok()?,
            index_end: data.read_u64::<BigEndian>().ok()?,
            metadata_start: data.read_u64::<BigEndian>().ok()?,
        })
    }
}

/// The metadata block: key count, section offsets, and key range.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableMeta {
    /// Number of records in the data section.
    pub key_count: u64,
    /// Byte offset of the sparse index section.
    pub index_offset: u64,
    /// Byte offset of the serialized bloom filter.
    pub bloom_offset: u64,
    /// Smallest key in the table (empty for an empty table).
    pub min_key: Vec<u8>,
    /// Largest key in the table (empty for an empty table).
    pub max_key: Vec<u8>,
}

impl TableMeta {
    /// Writes the metadata block to `w`.
    pub fn write_to<W: Write>(&self, w: &mut W) -> IoResult<()> {
        w.write_u64::<BigEndian>(self.key_count)?;
        w.write_u64::<BigEndian>(self.index_offset)?;
        w.write_u64::<BigEndian>(self.bloom_offset)?;
        w.write_u32::<BigEndian>(self.min_key.len() as u32)?;
        w.write_u32::<BigEndian>(self.max_key.len() as u32)?;
        w.write_all(&self.min_key)?;
        w.write_all(&self.max_key)?;
        Ok(())
    }

    /// Parses a metadata block. Returns `None` if the slice is too short or
    /// the recorded key lengths exceed it.
    #[must_use]
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < METADATA_FIXED_BYTES {
            return None;
        }
        let mut rdr = data;
        let key_count = rdr.read_u64::<BigEndian>().ok()?;
        let index_offset = rdr.read_u64::<BigEndian>().ok()?;
        let bloom_offset = rdr.read_u64::<BigEndian>().ok()?;
        let min_key_len = rdr.read_u32::<BigEndian>().ok()? as usize;
        let max_key_len = rdr.read_u32::<BigEndian>().ok()? as usize;

        if rdr.len() < min_key_len + max_key_len {
            return None;
        }
        let min_key = rdr[..min_key_len].to_vec();
        let max_key = rdr[min_key_len..min_key_len + max_key_len].to_vec();

        Some(Self {
            key_count,
            index_offset,
            bloom_offset,
            min_key,
            max_key,
        })
    }
}
