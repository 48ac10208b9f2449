//! Index data file (`.idf`) parsing and id-stream decoding.
//!
//! An IDF is a sequence of segments; each segment carries a *primary
//! segment* of `(data_value, repeat_value)` RLE pairs and a *sub-segment*
//! of bit-packed 64-bit words. A primary entry whose `data_value` plus
//! the current bit-pack cursor equals `0xFFFF_FFFF` is a marker: the next
//! `repeat_value` rows come from the bit-packed region. Only segment 0 is
//! decoded; later segments are parsed structurally so truncation is still
//! detected.

use crate::error::{ArtifactKind, ModelError};

use super::idfmeta::IdfMeta;
use super::ByteReader;

/// Sentinel announcing a run of bit-packed rows.
const BIT_PACK_MARKER: u64 = 0xFFFF_FFFF;

/// One IDF segment.
#[derive(Debug, Clone)]
pub struct IdfSegment {
    /// RLE pairs and bit-pack markers, in emission order.
    pub primary: Vec<(u32, u32)>,
    /// Bit-packed words, ids packed LSB first.
    pub sub: Vec<u64>,
}

/// A parsed `.idf` artifact.
#[derive(Debug, Clone)]
pub struct IdfFile {
    pub segments: Vec<IdfSegment>,
}

impl IdfFile {
    /// Parses every segment in the buffer.
    pub fn parse(data: &[u8], name: &str) -> Result<IdfFile, ModelError> {
        let mut r = ByteReader::new(data, ArtifactKind::Idf, name);
        let mut segments = Vec::new();

        while !r.is_empty() {
            r.section("primary segment");
            let primary_count = r.u64()?;
            if primary_count > (r.remaining() / 8) as u64 {
                return Err(r.error(format!(
                    "declared {} primary entries, only {} bytes remain",
                    primary_count,
                    r.remaining()
                )));
            }
            let mut primary = Vec::with_capacity(primary_count as usize);
            for _ in 0..primary_count {
                let data_value = r.u32()?;
                let repeat_value = r.u32()?;
                primary.push((data_value, repeat_value));
            }

            r.section("sub segment");
            let sub_count = r.u64()?;
            if sub_count > (r.remaining() / 8) as u64 {
                return Err(r.error(format!(
                    "declared {} sub-segment words, only {} bytes remain",
                    sub_count,
                    r.remaining()
                )));
            }
            let mut sub = Vec::with_capacity(sub_count as usize);
            for _ in 0..sub_count {
                sub.push(r.u64()?);
            }

            segments.push(IdfSegment { primary, sub });
        }

        if segments.is_empty() {
            return Err(r.error("no segments"));
        }
        Ok(IdfFile { segments })
    }
}

impl IdfSegment {
    /// Unpacks the sub-segment into ids, already offset by `min_data_id`.
    ///
    /// Each word holds `64 / bit_width` ids (trailing bits are padding).
    /// A sub-segment consisting of a single zero word is the empty-string
    /// shortcut: the column is `count_bit_packed` copies of the minimum
    /// id.
    fn unpack_ids(&self, meta: &IdfMeta, name: &str) -> Result<Vec<u32>, ModelError> {
        if meta.count_bit_packed == 0 {
            return Ok(Vec::new());
        }
        if self.sub.len() == 1 && self.sub[0] == 0 {
            return Ok(vec![meta.min_data_id; meta.count_bit_packed as usize]);
        }
        if meta.bit_width == 0 {
            return Err(ModelError::artifact(
                ArtifactKind::Idf,
                name,
                "sub segment",
                0,
                format!(
                    "bit width 0 with {} bit-packed rows",
                    meta.count_bit_packed
                ),
            ));
        }

        let per_word = (64 / meta.bit_width) as usize;
        let mask = (1u64 << meta.bit_width) - 1;
        let mut ids = Vec::with_capacity(self.sub.len() * per_word);
        for &word in &self.sub {
            let mut w = word;
            for _ in 0..per_word {
                ids.push(meta.min_data_id + (w & mask) as u32);
                w >>= meta.bit_width;
            }
        }
        Ok(ids)
    }

    /// Builds the lazy id stream for this segment.
    ///
    /// Marker discipline is validated up front: the markers must consume
    /// exactly `count_bit_packed` ids from the bit-packed region.
    pub fn id_stream(&self, meta: &IdfMeta, name: &str) -> Result<IdStream<'_>, ModelError> {
        let bit_packed = self.unpack_ids(meta, name)?;

        let mut cursor = 0u64;
        for &(value, repeat) in &self.primary {
            if u64::from(value) + cursor == BIT_PACK_MARKER {
                cursor += u64::from(repeat);
            }
        }
        if cursor > bit_packed.len() as u64 {
            return Err(ModelError::artifact(
                ArtifactKind::Idf,
                name,
                "primary segment",
                0,
                format!(
                    "markers consume {} bit-packed ids, only {} are present",
                    cursor,
                    bit_packed.len()
                ),
            ));
        }
        if cursor != meta.count_bit_packed {
            return Err(ModelError::artifact(
                ArtifactKind::Idf,
                name,
                "primary segment",
                0,
                format!(
                    "markers consume {} bit-packed ids, metadata declares {}",
                    cursor, meta.count_bit_packed
                ),
            ));
        }

        Ok(IdStream {
            primary: &self.primary,
            bit_packed,
            entry: 0,
            remaining: 0,
            run_value: 0,
            run_is_marker: false,
            cursor: 0,
        })
    }
}

/// Finite, restartable, lazy sequence of column ids in emission order.
///
/// Cloning restarts the walk from the beginning; the unpacked bit-packed
/// buffer is shared state computed once.
#[derive(Debug, Clone)]
pub struct IdStream<'a> {
    primary: &'a [(u32, u32)],
    bit_packed: Vec<u32>,
    entry: usize,
    remaining: u32,
    run_value: u32,
    /// Whether the current run draws from the bit-packed region. A run is
    /// classified once, on entry, against the cursor value at that point.
    run_is_marker: bool,
    cursor: usize,
}

impl IdStream<'_> {
    /// Total rows the stream will emit.
    pub fn len(&self) -> u64 {
        let mut cursor = 0u64;
        let mut total = 0u64;
        for &(value, repeat) in self.primary {
            total += u64::from(repeat);
            if u64::from(value) + cursor == BIT_PACK_MARKER {
                cursor += u64::from(repeat);
            }
        }
        total
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Iterator for IdStream<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        while self.remaining == 0 {
            let &(value, repeat) = self.primary.get(self.entry)?;
            self.entry += 1;
            self.remaining = repeat;
            self.run_value = value;
            self.run_is_marker = u64::from(value) + self.cursor as u64 == BIT_PACK_MARKER;
        }

        self.remaining -= 1;
        if self.run_is_marker {
            let id = self.bit_packed[self.cursor];
            self.cursor += 1;
            Some(id)
        } else {
            Some(self.run_value)
        }
    }
}
