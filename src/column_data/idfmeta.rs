//! IDF metadata sidecar reader.
//!
//! The `.idfmeta` blob is a nested tag-delimited structure: every section
//! opens with `<1:NAME\0` and closes with `NAME:1>\0`, byte-exact. The
//! reader descends `CP -> CS -> SS`, then an inner `CS` of the same outer
//! `CS`, then the `SDOs`/`CSDOs` sub-segment bookkeeping, collecting the
//! constants the id-stream decoder needs.

use crate::error::{ArtifactKind, ModelError};

use super::ByteReader;

/// Decoding constants for one column segment.
///
/// The decoder consumes `min_data_id`, `count_bit_packed`, and
/// `bit_width`; the statistics fields back the testable row-count and
/// cardinality properties.
#[derive(Debug, Clone)]
pub struct IdfMeta {
    /// Distinct value states in the segment.
    pub distinct_states: u64,
    /// Added to every decoded id to produce the dictionary key.
    pub min_data_id: u32,
    /// Largest data id in the segment.
    pub max_data_id: u32,
    pub original_min_segment_data_id: u32,
    pub rle_sort_order: i64,
    /// Logical rows in the segment.
    pub row_count: u64,
    pub has_nulls: bool,
    /// RLE runs in the primary segment.
    pub rle_runs: u64,
    pub others_rle_runs: u64,
    /// Rows encoded via bit-packing rather than RLE.
    pub count_bit_packed: u64,
    /// Width in bits of each bit-packed id.
    pub bit_width: u32,
    /// Declared primary-segment entry count.
    pub primary_segment_size: u64,
    pub sub_segment_offset: u64,
    /// Declared sub-segment word count.
    pub sub_segment_size: u64,
}

impl IdfMeta {
    /// Parses an `.idfmeta` buffer. Any tag mismatch is fatal and names
    /// the section that failed.
    pub fn parse(data: &[u8], name: &str) -> Result<IdfMeta, ModelError> {
        let mut r = ByteReader::new(data, ArtifactKind::IdfMeta, name);

        // CP wraps the whole column partition description.
        r.section("CP");
        open_tag(&mut r, "CP")?;
        let _version_one = r.u64()?;

        // Outer CS: segment storage header.
        r.section("CS");
        open_tag(&mut r, "CS")?;
        let _records = r.u64()?;
        let _one = r.u64()?;
        // Bit-width adjustment base; the on-disk layout offers no better
        // name for this field.
        let a_b_a_5_a = r.u32()?;
        let iterator = r.u32()?;
        let _bookmark_bits = r.u64()?;
        let _storage_alloc_size = r.u64()?;
        let _storage_used_size = r.u64()?;
        let _segment_needs_resizing = r.u8()?;
        let _compression_info = r.u32()?;

        // SS: segment statistics.
        r.section("SS");
        open_tag(&mut r, "SS")?;
        let distinct_states = r.u64()?;
        let min_data_id = r.u32()?;
        let max_data_id = r.u32()?;
        let original_min_segment_data_id = r.u32()?;
        let rle_sort_order = r.i64()?;
        let row_count = r.u64()?;
        let has_nulls = r.u8()? != 0;
        let rle_runs = r.u64()?;
        let others_rle_runs = r.u64()?;
        close_tag(&mut r, "SS")?;

        r.section("CS");
        let _has_bit_packed_sub_seg = r.u8()?;

        // Inner CS: the bit-packed sub-segment descriptor.
        open_tag(&mut r, "CS")?;
        let count_bit_packed = r.u64()?;
        r.bytes(9)?;
        close_tag(&mut r, "CS")?;

        close_tag(&mut r, "CS")?;
        r.section("CP");
        close_tag(&mut r, "CP")?;

        // SDOs/CSDOs: sub-segment offsets bookkeeping.
        r.section("SDOs");
        open_tag(&mut r, "SDOs")?;
        r.section("CSDOs");
        open_tag(&mut r, "CSDOs")?;
        let _zero_csdo = r.u64()?;
        let primary_segment_size = r.u64()?;
        open_tag(&mut r, "CSDOs")?;
        let sub_segment_offset = r.u64()?;
        let sub_segment_size = r.u64()?;
        close_tag(&mut r, "CSDOs")?;
        close_tag(&mut r, "CSDOs")?;
        r.section("SDOs");
        close_tag(&mut r, "SDOs")?;

        let bit_width = i64::from(iterator) + 36 - i64::from(a_b_a_5_a);
        if !(0..=63).contains(&bit_width) {
            return Err(r.error(format!(
                "derived bit width {} outside [0, 63] (base {}, iterator {})",
                bit_width, a_b_a_5_a, iterator
            )));
        }

        if count_bit_packed > row_count {
            return Err(r.error(format!(
                "count_bit_packed {} exceeds row count {}",
                count_bit_packed, row_count
            )));
        }

        Ok(IdfMeta {
            distinct_states,
            min_data_id,
            max_data_id,
            original_min_segment_data_id,
            rle_sort_order,
            row_count,
            has_nulls,
            rle_runs,
            others_rle_runs,
            count_bit_packed,
            bit_width: bit_width as u32,
            primary_segment_size,
            sub_segment_offset,
            sub_segment_size,
        })
    }
}

/// Opening tag: `<1:` + name + NUL.
fn open_tag(r: &mut ByteReader<'_>, name: &str) -> Result<(), ModelError> {
    let mut expected = Vec::with_capacity(name.len() + 4);
    expected.extend_from_slice(b"<1:");
    expected.extend_from_slice(name.as_bytes());
    expected.push(0);
    expect_tag(r, &expected, "opening")
}

/// Closing tag: name + `:1>` + NUL.
fn close_tag(r: &mut ByteReader<'_>, name: &str) -> Result<(), ModelError> {
    let mut expected = Vec::with_capacity(name.len() + 4);
    expected.extend_from_slice(name.as_bytes());
    expected.extend_from_slice(b":1>");
    expected.push(0);
    expect_tag(r, &expected, "closing")
}

fn expect_tag(r: &mut ByteReader<'_>, expected: &[u8], which: &str) -> Result<(), ModelError> {
    let start = r.position();
    let actual = r.bytes(expected.len())?;
    if actual != expected {
        return Err(r.error_at(
            start,
            format!(
                "{} tag mismatch: expected {:02x?}, found {:02x?}",
                which, expected, actual
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    /// Builds a syntactically valid `.idfmeta` blob for tests.
    pub fn build_idfmeta(
        min_data_id: u32,
        row_count: u64,
        count_bit_packed: u64,
        bit_width: u32,
        distinct_states: u64,
    ) -> Vec<u8> {
        fn open(buf: &mut Vec<u8>, name: &str) {
            buf.extend_from_slice(b"<1:");
            buf.extend_from_slice(name.as_bytes());
            buf.push(0);
        }
        fn close(buf: &mut Vec<u8>, name: &str) {
            buf.extend_from_slice(name.as_bytes());
            buf.extend_from_slice(b":1>");
            buf.push(0);
        }

        let mut b = Vec::new();
        open(&mut b, "CP");
        b.extend_from_slice(&1u64.to_le_bytes()); // version_one
        open(&mut b, "CS");
        b.extend_from_slice(&row_count.to_le_bytes()); // records
        b.extend_from_slice(&1u64.to_le_bytes()); // one
        // a_b_a_5_a / iterator chosen so 36 - a + i == bit_width
        b.extend_from_slice(&36u32.to_le_bytes());
        b.extend_from_slice(&bit_width.to_le_bytes());
        b.extend_from_slice(&0u64.to_le_bytes()); // bookmark bits
        b.extend_from_slice(&0u64.to_le_bytes()); // storage alloc
        b.extend_from_slice(&0u64.to_le_bytes()); // storage used
        b.push(0); // segment_needs_resizing
        b.extend_from_slice(&0u32.to_le_bytes()); // compression_info
        open(&mut b, "SS");
        b.extend_from_slice(&distinct_states.to_le_bytes());
        b.extend_from_slice(&min_data_id.to_le_bytes());
        b.extend_from_slice(&(min_data_id + distinct_states.max(1) as u32 - 1).to_le_bytes());
        b.extend_from_slice(&min_data_id.to_le_bytes()); // original min
        b.extend_from_slice(&(-1i64).to_le_bytes()); // rle sort order
        b.extend_from_slice(&row_count.to_le_bytes());
        b.push(0); // has_nulls
        b.extend_from_slice(&0u64.to_le_bytes()); // rle_runs
        b.extend_from_slice(&0u64.to_le_bytes()); // others_rle_runs
        close(&mut b, "SS");
        b.push(if count_bit_packed > 0 { 1 } else { 0 });
        open(&mut b, "CS");
        b.extend_from_slice(&count_bit_packed.to_le_bytes());
        b.extend_from_slice(&[0u8; 9]);
        close(&mut b, "CS");
        close(&mut b, "CS");
        close(&mut b, "CP");
        open(&mut b, "SDOs");
        open(&mut b, "CSDOs");
        b.extend_from_slice(&0u64.to_le_bytes()); // zero_csdo
        b.extend_from_slice(&0u64.to_le_bytes()); // primary_segment_size
        open(&mut b, "CSDOs");
        b.extend_from_slice(&0u64.to_le_bytes()); // sub_segment_offset
        b.extend_from_slice(&0u64.to_le_bytes()); // sub_segment_size
        close(&mut b, "CSDOs");
        close(&mut b, "CSDOs");
        close(&mut b, "SDOs");
        b
    }
}
