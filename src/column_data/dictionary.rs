//! Column dictionary parsing: the id-to-value mapping.
//!
//! A dictionary is one of three physical shapes, dispatched on the
//! header's type tag: a paged string store (possibly Huffman-compressed
//! per page), or a flat vector of longs or reals. Lookup is dense over
//! `[min_data_id, min_data_id + len)`.

use log::trace;

use crate::error::{ArtifactKind, ModelError};
use crate::value::Value;

use super::huffman::HuffmanPage;
use super::ByteReader;

/// On-disk dictionary type tags.
const TYPE_LONG: i32 = 0;
const TYPE_REAL: i32 = 1;
const TYPE_STRING: i32 = 2;

/// The typed value store, a tagged union over the three dictionary
/// shapes.
#[derive(Debug, Clone)]
pub enum DictionaryValues {
    /// String pages, concatenated in page order.
    Strings(Vec<String>),
    /// Long vector (element size 4 widened from `i32`).
    Longs(Vec<i64>),
    /// Real vector.
    Reals(Vec<f64>),
}

/// A parsed `.dictionary` artifact.
#[derive(Debug, Clone)]
pub struct Dictionary {
    min_data_id: u32,
    values: DictionaryValues,
}

impl Dictionary {
    /// Parses a dictionary buffer. `min_data_id` comes from the column's
    /// `.idfmeta` and anchors the dense id range.
    pub fn parse(data: &[u8], min_data_id: u32, name: &str) -> Result<Dictionary, ModelError> {
        let mut r = ByteReader::new(data, ArtifactKind::Dictionary, name);

        r.section("header");
        let type_tag = r.i32()?;
        // Hash info: six i32 slots unused by read-only decoding.
        for _ in 0..6 {
            r.i32()?;
        }

        let values = match type_tag {
            TYPE_STRING => DictionaryValues::Strings(parse_string_data(&mut r, name)?),
            TYPE_LONG | TYPE_REAL => parse_number_data(&mut r, type_tag)?,
            _ => {
                return Err(ModelError::UnknownDictionaryKind {
                    name: name.to_string(),
                    type_tag,
                })
            }
        };

        let dictionary = Dictionary { min_data_id, values };
        trace!("dictionary '{}': {} values", name, dictionary.len());
        Ok(dictionary)
    }

    /// Number of values (the dense id range's width).
    pub fn len(&self) -> usize {
        match &self.values {
            DictionaryValues::Strings(v) => v.len(),
            DictionaryValues::Longs(v) => v.len(),
            DictionaryValues::Reals(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First id of the dense range.
    pub fn min_data_id(&self) -> u32 {
        self.min_data_id
    }

    /// Looks up an id, returning `None` outside the dense range.
    pub fn get(&self, id: u32) -> Option<Value> {
        let index = id.checked_sub(self.min_data_id)? as usize;
        match &self.values {
            DictionaryValues::Strings(v) => v.get(index).map(|s| Value::Text(s.clone())),
            DictionaryValues::Longs(v) => v.get(index).map(|&n| Value::Int(n)),
            DictionaryValues::Reals(v) => v.get(index).map(|&x| Value::Double(x)),
        }
    }

    /// The underlying tagged union.
    pub fn values(&self) -> &DictionaryValues {
        &self.values
    }
}

/// A record handle: the bit (or byte) offset of one string within a
/// page's store.
#[derive(Debug, Clone, Copy)]
struct RecordHandle {
    page_id: u32,
    bit_offset: u32,
}

fn parse_number_data(
    r: &mut ByteReader<'_>,
    type_tag: i32,
) -> Result<DictionaryValues, ModelError> {
    r.section("vector of vectors");
    let element_count = r.u64()?;
    let element_size = r.u32()?;

    if element_size != 4 && element_size != 8 {
        return Err(r.error(format!("unsupported element size {}", element_size)));
    }
    if element_count > (r.remaining() / element_size as usize) as u64 {
        return Err(r.error(format!(
            "declared {} elements of size {}, only {} bytes remain",
            element_count,
            element_size,
            r.remaining()
        )));
    }

    let count = element_count as usize;
    if element_size == 4 {
        // Four-byte elements are i32 regardless of the declared type.
        let mut longs = Vec::with_capacity(count);
        for _ in 0..count {
            longs.push(i64::from(r.i32()?));
        }
        if type_tag == TYPE_REAL {
            return Ok(DictionaryValues::Reals(
                longs.into_iter().map(|n| n as f64).collect(),
            ));
        }
        return Ok(DictionaryValues::Longs(longs));
    }

    if type_tag == TYPE_LONG {
        let mut longs = Vec::with_capacity(count);
        for _ in 0..count {
            longs.push(r.i64()?);
        }
        Ok(DictionaryValues::Longs(longs))
    } else {
        let mut reals = Vec::with_capacity(count);
        for _ in 0..count {
            reals.push(r.f64()?);
        }
        Ok(DictionaryValues::Reals(reals))
    }
}

fn parse_string_data(r: &mut ByteReader<'_>, name: &str) -> Result<Vec<String>, ModelError> {
    r.section("page layout");
    let _store_string_count = r.i64()?;
    let _store_compressed = r.u8()?;
    let _store_longest_string = r.i64()?;
    let page_count = r.i64()?;

    if page_count < 0 || page_count as u64 > (r.remaining() / 30) as u64 {
        return Err(r.error(format!("implausible page count {}", page_count)));
    }

    // Pages are parsed structurally first; compressed stores decode once
    // the record handles at the tail are known.
    let mut pages = Vec::with_capacity(page_count as usize);
    for page_index in 0..page_count as usize {
        pages.push(parse_page(r, page_index)?);
    }

    r.section("record handles");
    let handle_count = r.u64()?;
    let handle_size = r.u32()?;
    if handle_size != 4 && handle_size != 8 {
        return Err(r.error(format!("unsupported record handle size {}", handle_size)));
    }
    if handle_count > (r.remaining() / handle_size as usize) as u64 {
        return Err(r.error(format!(
            "declared {} record handles, only {} bytes remain",
            handle_count,
            r.remaining()
        )));
    }
    let mut handles = Vec::with_capacity(handle_count as usize);
    for _ in 0..handle_count {
        if handle_size == 4 {
            handles.push(RecordHandle {
                page_id: 0,
                bit_offset: r.u32()?,
            });
        } else {
            let page_id = r.u32()?;
            let bit_offset = r.u32()?;
            handles.push(RecordHandle { page_id, bit_offset });
        }
    }

    // Materialize strings in page order; ids are assigned densely across
    // the concatenation.
    let mut strings = Vec::new();
    for (page_index, page) in pages.iter().enumerate() {
        match page {
            Page::Uncompressed { buffer } => {
                strings.extend(split_utf16_strings(buffer));
            }
            Page::Compressed {
                store_total_bits,
                encode_array,
                bitstream,
            } => {
                let decoder = HuffmanPage::new(encode_array, name, page_index)?;
                let offsets: Vec<u64> = handles
                    .iter()
                    .filter(|h| h.page_id as usize == page_index)
                    .map(|h| u64::from(h.bit_offset))
                    .collect();
                for (i, &start) in offsets.iter().enumerate() {
                    let end = offsets.get(i + 1).copied().unwrap_or(*store_total_bits);
                    strings.push(decoder.decode_range(bitstream, start, end)?);
                }
            }
        }
    }

    Ok(strings)
}

enum Page {
    Uncompressed {
        /// Raw UTF-16LE character buffer, strings separated by NUL.
        buffer: Vec<u8>,
    },
    Compressed {
        store_total_bits: u64,
        encode_array: Box<[u8; 128]>,
        bitstream: Vec<u8>,
    },
}

fn parse_page(r: &mut ByteReader<'_>, page_index: usize) -> Result<Page, ModelError> {
    // Section labels are static; page indices appear in huffman errors.
    r.section("dictionary page");
    let _page_mask = r.u64()?;
    let _page_contains_nulls = r.u8()?;
    let _page_start_index = r.u64()?;
    let _page_string_count = r.u64()?;
    let page_compressed = r.u8()? != 0;
    let _begin_mark = r.u32()?;

    let page = if page_compressed {
        r.section("compressed string store");
        let store_total_bits = r.u64()?;
        let _ui_decode_bits = r.u64()?;
        let mut encode_array = Box::new([0u8; 128]);
        encode_array.copy_from_slice(r.bytes(128)?);
        let allocation_size = r.u64()?;
        if allocation_size > r.remaining() as u64 {
            return Err(r.error(format!(
                "page {} store declares {} bytes, {} remain",
                page_index,
                allocation_size,
                r.remaining()
            )));
        }
        let bitstream = r.bytes(allocation_size as usize)?.to_vec();
        Page::Compressed {
            store_total_bits,
            encode_array,
            bitstream,
        }
    } else {
        r.section("string store");
        let _remaining_store_available = r.u64()?;
        let _buffer_used_characters = r.u64()?;
        let allocation_size = r.u64()?;
        if allocation_size > r.remaining() as u64 {
            return Err(r.error(format!(
                "page {} store declares {} bytes, {} remain",
                page_index,
                allocation_size,
                r.remaining()
            )));
        }
        let buffer = r.bytes(allocation_size as usize)?.to_vec();
        Page::Uncompressed { buffer }
    };

    r.section("dictionary page");
    let _end_mark = r.u32()?;
    Ok(page)
}

/// Splits an UTF-16LE character buffer on NUL separators, dropping the
/// trailing empty string.
fn split_utf16_strings(buffer: &[u8]) -> Vec<String> {
    let (text, _, _) = encoding_rs::UTF_16LE.decode(buffer);
    let mut parts: Vec<String> = text.split('\0').map(str::to_string).collect();
    if let Some(last) = parts.last() {
        if last.is_empty() {
            parts.pop();
        }
    }
    parts
}
