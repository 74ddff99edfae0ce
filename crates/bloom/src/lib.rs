//! # Bloom Filter
//!
//! A space-efficient probabilistic data structure for set membership testing.
//!
//! A bloom filter can tell you with certainty that a key is **not** in the set
//! (no false negatives), but may occasionally report that a key **is** in the
//! set when it isn't (false positives). The false positive rate is chosen at
//! construction time and determines the bit array size.
//!
//! ## Usage in DriftKV
//!
//! Each SSTable embeds a bloom filter built from its keys. During point
//! lookups the engine checks the bloom filter first -- if it says "not
//! present", the SSTable's index and data sections are never touched.
//!
//! ## Example
//!
//! ```rust
//! use bloom::BloomFilter;
//!
//! let mut bf = BloomFilter::new(1000, 0.01);
//! bf.add(b"hello");
//! assert!(bf.contains(b"hello"));
//! ```

use sha2::{Digest, Sha256};
use std::io::{self, Read, Write};

/// A bloom filter backed by a bit vector with `k` independent hash functions.
///
/// Each hash function is SHA-256 over `item ‖ big_endian_u32(i)`, taking the
/// first 8 digest bytes as a big-endian integer modulo the bit count.
pub struct BloomFilter {
    /// Item count the filter was sized for.
    expected_items: u64,
    /// Target false positive rate the filter was sized for.
    fp_rate: f32,
    /// Number of bits in the filter (m).
    num_bits: u32,
    /// Number of hash functions (k).
    num_hashes: u32,
    /// How many items have been added so far.
    items_added: u64,
    /// The bit vector storing the filter state.
    bits: Vec<u8>,
}

impl BloomFilter {
    /// Creates a new bloom filter sized for `expected_items` with the given
    /// target `false_positive_rate`.
    ///
    /// Sizing: `m = ceil(-n * ln(p) / ln(2)^2)`, `k = max(1, floor((m/n) * ln(2)))`.
    ///
    /// # Panics
    ///
    /// Panics if `expected_items` is 0 or `false_positive_rate` is not in `(0, 1)`.
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        assert!(expected_items > 0, "expected_items must be > 0");
        assert!(
            false_positive_rate > 0.0 && false_positive_rate < 1.0,
            "false_positive_rate must be in (0, 1)"
        );

        let n = expected_items as f64;
        let m = (-n * false_positive_rate.ln() / std::f64::consts::LN_2.powi(2)).ceil() as u32;
        let m = m.max(8);

        let k = ((f64::from(m) / n) * std::f64::consts::LN_2).floor() as u32;
        let k = k.max(1);

        let byte_len = ((m as usize) + 7) / 8;

        Self {
            expected_items: expected_items as u64,
            fp_rate: false_positive_rate as f32,
            num_bits: m,
            num_hashes: k,
            items_added: 0,
            bits: vec![0u8; byte_len],
        }
    }

    /// Adds an item to the bloom filter, setting `k` bits.
    pub fn add(&mut self, item: &[u8]) {
        for i in 0..self.num_hashes {
            let bit_idx = self.bit_index(item, i);
            self.set_bit(bit_idx);
        }
        self.items_added += 1;
    }

    /// Returns `true` if the item **might** be in the set, `false` if it is
    /// **definitely not** in the set.
    #[must_use]
    pub fn contains(&self, item: &[u8]) -> bool {
        for i in 0..self.num_hashes {
            let bit_idx = self.bit_index(item, i);
            if !self.get_bit(bit_idx) {
                return false;
            }
        }
        true
    }

    /// Returns the number of bits in the filter.
    #[must_use]
    pub fn num_bits(&self) -> u32 {
        self.num_bits
    }

    /// Returns the number of hash functions.
    #[must_use]
    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Returns how many items have been added.
    #[must_use]
    pub fn items_added(&self) -> u64 {
        self.items_added
    }

    /// Returns the size of the serialized filter in bytes.
    ///
    /// Layout: `expected_items(u64) + fp_rate(f32) + num_bits(u32) +
    /// num_hashes(u32) + items_added(u64) + bits`.
    #[must_use]
    pub fn serialized_size(&self) -> usize {
        8 + 4 + 4 + 4 + 8 + self.bits.len()
    }

    /// Serializes the bloom filter to a writer.
    ///
    /// Wire format (all big-endian):
    /// ```text
    /// [expected_items: u64][fp_rate: f32][num_bits: u32][num_hashes: u32]
    /// [items_added: u64][bits: bytes]
    /// ```
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.expected_items.to_be_bytes())?;
        w.write_all(&self.fp_rate.to_be_bytes())?;
        w.write_all(&self.num_bits.to_be_bytes())?;
        w.write_all(&self.num_hashes.to_be_bytes())?;
        w.write_all(&self.items_added.to_be_bytes())?;
        w.write_all(&self.bits)?;
        Ok(())
    }

    /// Serializes the bloom filter into a byte vector.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.serialized_size());
        self.write_to(&mut buf).expect("writing to Vec cannot fail");
        buf
    }

    /// Deserializes a bloom filter from a reader.
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut buf8 = [0u8; 8];
        let mut buf4 = [0u8; 4];

        r.read_exact(&mut buf8)?;
        let expected_items = u64::from_be_bytes(buf8);

        r.read_exact(&mut buf4)?;
        let fp_rate = f32::from_be_bytes(buf4);

        r.read_exact(&mut buf4)?;
        let num_bits = u32::from_be_bytes(buf4);

        r.read_exact(&mut buf4)?;
        let num_hashes = u32::from_be_bytes(buf4);

        r.read_exact(&mut buf8)?;
        let items_added = u64::from_be_bytes(buf8);

        if num_bits == 0 || num_hashes == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "bloom filter with zero bits or hashes",
            ));
        }

        // Safety cap: bloom filter should not exceed 128 MiB
        let byte_len = ((num_bits as usize) + 7) / 8;
        const MAX_BLOOM_BYTES: usize = 128 * 1024 * 1024;
        if byte_len > MAX_BLOOM_BYTES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("bloom filter too large: {} bytes", byte_len),
            ));
        }

        let mut bits = vec![0u8; byte_len];
        r.read_exact(&mut bits)?;

        Ok(Self {
            expected_items,
            fp_rate,
            num_bits,
            num_hashes,
            items_added,
            bits,
        })
    }

    /// Deserializes a bloom filter from a byte slice.
    pub fn deserialize(data: &[u8]) -> io::Result<Self> {
        let mut cursor = data;
        Self::read_from(&mut cursor)
    }

    // ---- Internal helpers ----

    /// Hash `i` of the item: first 8 bytes of SHA-256(item ‖ BE u32(i)),
    /// big-endian, modulo the bit count.
    fn bit_index(&self, item: &[u8], i: u32) -> u32 {
        let mut hasher = Sha256::new();
        hasher.update(item);
        hasher.update(i.to_be_bytes());
        let digest = hasher.finalize();
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        (u64::from_be_bytes(prefix) % u64::from(self.num_bits)) as u32
    }

    fn set_bit(&mut self, idx: u32) {
        let byte_idx = (idx / 8) as usize;
        let bit_offset = idx % 8;
        self.bits[byte_idx] |= 1 << bit_offset;
    }

    fn get_bit(&self, idx: u32) -> bool {
        let byte_idx = (idx / 8) as usize;
        let bit_offset = idx % 8;
        (self.bits[byte_idx] >> bit_offset) & 1 == 1
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("num_bits", &self.num_bits)
            .field("num_hashes", &self.num_hashes)
            .field("items_added", &self.items_added)
            .field("bytes", &self.bits.len())
            .finish()
    }
}

#[cfg(test)]
mod tests;
