//! Xpress9 per-frame decompressor context.
//!
//! The ABF container wraps its payload in Xpress9 frames (see
//! [`crate::unpack`] for the single- and multi-threaded frame layouts).
//! Each frame is an independent LZ77 + canonical-Huffman block stream:
//! a 256-byte table packs 4-bit code lengths for 512 symbols (256
//! literals + 256 match headers), followed by a bit stream refilled in
//! 16-bit little-endian words and consumed MSB first. Match extension
//! bytes interleave with the word refills in the byte stream. A block
//! covers at most 64 KiB of output, which bounds every frame the
//! container layer produces.
//!
//! A context owns the decode-table allocation and reuses it across
//! frames. Contexts are cheap but not shareable: parallel group decode
//! creates one per worker and drops it when the worker finishes.

use crate::error::ModelError;

/// Number of symbols in the per-block prefix code.
const SYMBOL_COUNT: usize = 512;
/// Longest admissible codeword, and the width of the direct lookup table.
const MAX_CODE_LENGTH: u32 = 15;
/// Largest output a single block (and so a single frame) may produce.
const BLOCK_SIZE: usize = 65_536;
/// Sentinel for lookup-table slots not covered by any codeword.
const UNASSIGNED: u16 = u16::MAX;

fn fail(message: String) -> ModelError {
    ModelError::DecompressionFailed {
        codec: "xpress9",
        message,
    }
}

/// Owned decoder state: `new` initializes, [`Xpress9::decompress`] runs
/// one frame, teardown happens on drop.
pub struct Xpress9 {
    /// Direct lookup: 15-bit prefix -> symbol index, `UNASSIGNED` where
    /// the code is incomplete.
    table_symbol: Vec<u16>,
    /// Codeword length per symbol for the current block.
    lengths: [u8; SYMBOL_COUNT],
}

impl Xpress9 {
    /// Creates a decoder context with its scratch table allocated.
    pub fn new() -> Self {
        Xpress9 {
            table_symbol: vec![UNASSIGNED; 1 << MAX_CODE_LENGTH],
            lengths: [0; SYMBOL_COUNT],
        }
    }

    /// Decompresses one frame to exactly `uncompressed_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::DecompressionFailed`] when the prefix code
    /// table is empty or oversubscribed, a match points before the start
    /// of the output, or the byte stream is exhausted mid-block.
    pub fn decompress(
        &mut self,
        input: &[u8],
        uncompressed_size: usize,
    ) -> Result<Vec<u8>, ModelError> {
        if uncompressed_size > BLOCK_SIZE {
            return Err(fail(format!(
                "frame declares {} bytes, above the {} block bound",
                uncompressed_size, BLOCK_SIZE
            )));
        }

        let mut output: Vec<u8> = Vec::with_capacity(uncompressed_size);
        if uncompressed_size == 0 {
            return Ok(output);
        }

        let pos = self.read_code_lengths(input, 0)?;
        self.build_table()?;
        self.decode_block(input, pos, &mut output, uncompressed_size)?;
        Ok(output)
    }

    /// Reads the 256-byte packed length table (two 4-bit lengths per
    /// byte, low nibble first).
    fn read_code_lengths(&mut self, input: &[u8], pos: usize) -> Result<usize, ModelError> {
        let table_bytes = SYMBOL_COUNT / 2;
        if pos + table_bytes > input.len() {
            return Err(fail(format!(
                "truncated code length table at position {}",
                pos
            )));
        }
        for (i, &byte) in input[pos..pos + table_bytes].iter().enumerate() {
            self.lengths[2 * i] = byte & 0x0F;
            self.lengths[2 * i + 1] = byte >> 4;
        }
        Ok(pos + table_bytes)
    }

    /// Builds the canonical prefix code and fills the direct lookup
    /// table. Symbols are ordered by (length, symbol); codes count up
    /// from zero, shifting left on each length increase.
    fn build_table(&mut self) -> Result<(), ModelError> {
        self.table_symbol.fill(UNASSIGNED);

        let mut code: u32 = 0;
        let mut last_length: u32 = 0;
        let mut assigned = false;

        for length in 1..=MAX_CODE_LENGTH {
            for symbol in 0..SYMBOL_COUNT {
                if u32::from(self.lengths[symbol]) != length {
                    continue;
                }
                code <<= length - last_length;
                last_length = length;

                if code >= (1u32 << length) {
                    return Err(fail(format!(
                        "oversubscribed prefix code at symbol {}",
                        symbol
                    )));
                }

                // Every table slot sharing this codeword prefix maps to
                // the symbol.
                let shift = MAX_CODE_LENGTH - length;
                let first = (code << shift) as usize;
                let last = ((code + 1) << shift) as usize;
                for slot in &mut self.table_symbol[first..last] {
                    *slot = symbol as u16;
                }

                code += 1;
                assigned = true;
            }
        }

        if !assigned {
            return Err(fail("empty prefix code table".to_string()));
        }
        Ok(())
    }

    /// Decodes symbols until `block_end` bytes of output exist.
    fn decode_block(
        &self,
        input: &[u8],
        start: usize,
        output: &mut Vec<u8>,
        block_end: usize,
    ) -> Result<(), ModelError> {
        let mut bits = BitReader::new(input, start);

        while output.len() < block_end {
            let prefix = bits.peek(MAX_CODE_LENGTH);
            let symbol = self.table_symbol[prefix as usize];
            if symbol == UNASSIGNED {
                return Err(fail(format!(
                    "bit pattern {:015b} matches no codeword at output position {}",
                    prefix,
                    output.len()
                )));
            }
            bits.consume(u32::from(self.lengths[symbol as usize]));

            if symbol < 256 {
                output.push(symbol as u8);
                continue;
            }

            let header = symbol as usize - 256;
            let mut length = header & 15;
            let offset_bit_count = (header >> 4) as u32;

            if length == 15 {
                length = bits.read_extension_byte()? as usize;
                if length == 255 {
                    length = bits.read_extension_u16()? as usize;
                    if length < 15 {
                        return Err(fail(format!(
                            "extended match length {} below minimum at output position {}",
                            length,
                            output.len()
                        )));
                    }
                    length -= 15;
                }
                length += 15;
            }
            length += 3;

            let mut offset = 1usize << offset_bit_count;
            if offset_bit_count > 0 {
                offset += bits.peek(offset_bit_count) as usize;
                bits.consume(offset_bit_count);
            }

            if offset > output.len() {
                return Err(fail(format!(
                    "match offset {} exceeds output position {}",
                    offset,
                    output.len()
                )));
            }

            // Overlap-safe copy; clamp at the block boundary so the
            // caller's length check stays authoritative.
            for _ in 0..length {
                if output.len() >= block_end {
                    break;
                }
                let byte = output[output.len() - offset];
                output.push(byte);
            }
        }

        Ok(())
    }
}

impl Default for Xpress9 {
    fn default() -> Self {
        Xpress9::new()
    }
}

/// Bit reader over the frame payload: 32-bit window refilled from 16-bit
/// little-endian words, bits consumed from the most significant end.
/// Extension bytes for long matches are pulled from the same cursor,
/// interleaved with word refills. Refills past the end of the frame read
/// as zero padding; explicit byte reads past the end are errors.
struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    window: u32,
    /// Valid bits beyond the guaranteed 16 in the window.
    extra: i32,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8], pos: usize) -> Self {
        let mut reader = BitReader {
            data,
            pos,
            window: 0,
            extra: 0,
        };
        let w0 = reader.next_word();
        let w1 = reader.next_word();
        reader.window = (u32::from(w0) << 16) | u32::from(w1);
        reader.extra = 16;
        reader
    }

    fn next_word(&mut self) -> u16 {
        if self.pos + 2 > self.data.len() {
            self.pos += 2;
            return 0;
        }
        let w = u16::from_le_bytes([self.data[self.pos], self.data[self.pos + 1]]);
        self.pos += 2;
        w
    }

    fn peek(&self, count: u32) -> u32 {
        self.window >> (32 - count)
    }

    fn consume(&mut self, count: u32) {
        self.window <<= count;
        self.extra -= count as i32;
        if self.extra < 0 {
            let w = self.next_word();
            self.window |= u32::from(w) << (-self.extra);
            self.extra += 16;
        }
    }

    fn read_extension_byte(&mut self) -> Result<u8, ModelError> {
        if self.pos >= self.data.len() {
            return Err(fail(format!(
                "premature end of input reading match extension at position {}",
                self.pos
            )));
        }
        let b = self.data[self.pos];
        self.pos += 1;
        Ok(b)
    }

    fn read_extension_u16(&mut self) -> Result<u16, ModelError> {
        if self.pos + 2 > self.data.len() {
            return Err(fail(format!(
                "premature end of input reading 16-bit match extension at position {}",
                self.pos
            )));
        }
        let w = u16::from_le_bytes([self.data[self.pos], self.data[self.pos + 1]]);
        self.pos += 2;
        Ok(w)
    }
}
