//! Decompression codecs used by the ABF container.
//!
//! - `xpress9` - frame-level decoder driven by the container layouts in
//!   [`crate::unpack`]
//! - `xpress8` - bit-flag LZ77 decoder for optionally compressed
//!   embedded files

pub mod xpress8;
pub mod xpress9;

pub use xpress9::Xpress9;
