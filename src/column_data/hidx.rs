//! Hash index (`.hidx`) parsing.
//!
//! The hash index maps value hashes to dense ids: a fixed-size bin array
//! (each bin holding a chain pointer and a small local entry array) plus
//! an overflow list. Read-only decoding never needs it when a dictionary
//! is present; it is parsed for completeness and exposed as a lookup
//! table.

use std::collections::HashMap;

use crate::error::{ArtifactKind, ModelError};

use super::ByteReader;

/// One `(m_hash, m_key)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashEntry {
    pub hash: u32,
    pub key: u32,
}

/// Optional statistics block present when the header's stats flag is set.
#[derive(Debug, Clone)]
pub struct HashStatistics {
    pub number_of_elements: u64,
    pub number_of_bins: u64,
    pub number_of_used_bins: u64,
    pub fast_access_elements: u64,
    pub locals_size_per_bin: u64,
    pub maximum_chain: u64,
    pub histogram: Vec<u64>,
}

/// A parsed `.hidx` artifact.
#[derive(Debug, Clone)]
pub struct HashIndex {
    pub hash_algorithm: i32,
    pub hash_entry_size: u32,
    pub hash_bin_size: u32,
    pub local_entry_count: u32,
    pub number_of_records: i64,
    pub current_mask: i64,
    pub statistics: Option<HashStatistics>,
    /// Non-zero entries from every bin, in bin order.
    pub bin_entries: Vec<HashEntry>,
    /// Non-zero entries from the overflow list.
    pub overflow_entries: Vec<HashEntry>,
}

impl HashIndex {
    /// Parses a hash index buffer.
    pub fn parse(data: &[u8], name: &str) -> Result<HashIndex, ModelError> {
        let mut r = ByteReader::new(data, ArtifactKind::Hidx, name);

        r.section("header");
        let hash_algorithm = r.i32()?;
        let hash_entry_size = r.u32()?;
        let hash_bin_size = r.u32()?;
        let local_entry_count = r.u32()?;
        let bin_count = r.u64()?;
        let number_of_records = r.i64()?;
        let current_mask = r.i64()?;
        let has_stats = r.u8()? != 0;

        let statistics = if has_stats {
            r.section("statistics");
            let number_of_elements = r.u64()?;
            let number_of_bins = r.u64()?;
            let number_of_used_bins = r.u64()?;
            let fast_access_elements = r.u64()?;
            let locals_size_per_bin = r.u64()?;
            let maximum_chain = r.u64()?;
            let element_count = r.u64()?;
            let element_size = r.u32()?;
            if element_size != 4 && element_size != 8 {
                return Err(r.error(format!("unsupported histogram element size {}", element_size)));
            }
            if element_count > (r.remaining() / element_size as usize) as u64 {
                return Err(r.error(format!(
                    "declared {} histogram elements, only {} bytes remain",
                    element_count,
                    r.remaining()
                )));
            }
            let mut histogram = Vec::with_capacity(element_count as usize);
            for _ in 0..element_count {
                histogram.push(if element_size == 4 {
                    u64::from(r.u32()?)
                } else {
                    r.u64()?
                });
            }
            Some(HashStatistics {
                number_of_elements,
                number_of_bins,
                number_of_used_bins,
                fast_access_elements,
                locals_size_per_bin,
                maximum_chain,
                histogram,
            })
        } else {
            None
        };

        // Each bin occupies exactly hash_bin_size bytes: a chain pointer,
        // a count, the local entry array, and padding.
        r.section("hash bins");
        let local_bytes = 8 + 4 + 8 * local_entry_count as usize + 4;
        if (hash_bin_size as usize) < local_bytes {
            return Err(r.error(format!(
                "bin size {} cannot hold {} local entries",
                hash_bin_size, local_entry_count
            )));
        }
        if bin_count > (r.remaining() / hash_bin_size.max(1) as usize) as u64 {
            return Err(r.error(format!(
                "declared {} bins of {} bytes, only {} bytes remain",
                bin_count,
                hash_bin_size,
                r.remaining()
            )));
        }

        let mut bin_entries = Vec::new();
        for _ in 0..bin_count {
            let bin = r.bytes(hash_bin_size as usize)?;
            let mut br = ByteReader::new(bin, ArtifactKind::Hidx, name);
            br.section("hash bin");
            let _chain = br.u64()?;
            let _count = br.u32()?;
            for _ in 0..local_entry_count {
                let hash = br.u32()?;
                let key = br.u32()?;
                if hash != 0 {
                    bin_entries.push(HashEntry { hash, key });
                }
            }
        }

        r.section("overflow entries");
        let overflow_count = r.u64()?;
        if overflow_count > (r.remaining() / 8) as u64 {
            return Err(r.error(format!(
                "declared {} overflow entries, only {} bytes remain",
                overflow_count,
                r.remaining()
            )));
        }
        let mut overflow_entries = Vec::new();
        for _ in 0..overflow_count {
            let hash = r.u32()?;
            let key = r.u32()?;
            if hash != 0 {
                overflow_entries.push(HashEntry { hash, key });
            }
        }

        Ok(HashIndex {
            hash_algorithm,
            hash_entry_size,
            hash_bin_size,
            local_entry_count,
            number_of_records,
            current_mask,
            statistics,
            bin_entries,
            overflow_entries,
        })
    }

    /// Hash-to-key lookup table over bin and overflow entries (overflow
    /// wins on duplicate hashes, matching insertion order).
    pub fn lookup(&self) -> HashMap<u32, u32> {
        let mut table = HashMap::new();
        for e in &self.bin_entries {
            table.insert(e.hash, e.key);
        }
        for e in &self.overflow_entries {
            table.insert(e.hash, e.key);
        }
        table
    }
}
