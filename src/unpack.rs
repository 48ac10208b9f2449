//! Container opening and ABF stream decompression.
//!
//! Both recognized containers are zip archives: `.pbix` holds the model
//! stream in a `DataModel` entry, `.xlsx`/`.xlsm` under
//! `xl/model/item.data`. The inner stream takes one of three forms,
//! distinguished by its first bytes:
//!
//! - an uncompressed ABF stream (storage signature at offset 0)
//! - single-threaded Xpress9: a UTF-16 banner followed by sized frames
//! - multi-threaded Xpress9: a banner, five header words, then frame
//!   groups laid out per compressing thread
//!
//! Multi-threaded groups decode in parallel, one decoder context per
//! group, and concatenate in group-index order: all prefix groups first,
//! then all main groups.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use log::debug;
use rayon::prelude::*;
use zip::ZipArchive;

use crate::abf::AbfStream;
use crate::error::ModelError;
use crate::xpress::Xpress9;

/// UTF-16LE banner of a single-threaded Xpress9 stream.
const SINGLE_THREAD_SIGNATURE: &str = "This backup was created using XPress9 compression.";
/// UTF-16LE banner of a multi-threaded Xpress9 stream.
const MULTI_THREAD_SIGNATURE: &str = "This backup was created using multithreaded XPrs9.";
/// Length of the banner region (BOM + 50 UTF-16 code units).
const SIGNATURE_LEN: usize = 102;

/// Which container the model came from; decides the catalog backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// Power BI `.pbix` with an embedded relational catalog.
    Pbix,
    /// Excel Power Pivot `.xlsx`/`.xlsm` with an AS XML catalog.
    Xlsx,
}

/// The unpacked model: parsed ABF stream plus container provenance.
#[derive(Debug)]
pub struct DataModel {
    pub stream: AbfStream,
    pub kind: ContainerKind,
}

/// Opens a container file, decompresses the model stream, and parses the
/// ABF structures.
pub fn unpack(path: &Path) -> Result<DataModel, ModelError> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file)?;

    let (kind, inner) = read_inner_entry(&mut archive, path)?;
    debug!(
        "container '{}': {:?} model stream, {} bytes compressed",
        path.display(),
        kind,
        inner.len()
    );

    let decompressed = decompress_stream(&inner)?;
    let stream = AbfStream::parse(decompressed)?;
    Ok(DataModel { stream, kind })
}

fn read_inner_entry(
    archive: &mut ZipArchive<File>,
    path: &Path,
) -> Result<(ContainerKind, Vec<u8>), ModelError> {
    for (entry_name, kind) in [
        ("DataModel", ContainerKind::Pbix),
        ("xl/model/item.data", ContainerKind::Xlsx),
    ] {
        match archive.by_name(entry_name) {
            Ok(mut entry) => {
                let mut data = Vec::with_capacity(entry.size() as usize);
                entry.read_to_end(&mut data)?;
                return Ok((kind, data));
            }
            Err(zip::result::ZipError::FileNotFound) => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(ModelError::UnsupportedContainer {
        path: path.display().to_string(),
    })
}

/// The stream storage signature: BOM plus the marker text, UTF-16LE.
fn storage_signature() -> Vec<u8> {
    let mut sig = vec![0xFF, 0xFE];
    sig.extend(
        "STREAM_STORAGE_SIGNATURE_)!@#$%^&*("
            .encode_utf16()
            .flat_map(|u| u.to_le_bytes()),
    );
    sig
}

/// Dispatches on the stream signature and produces the decompressed ABF
/// byte buffer.
pub fn decompress_stream(data: &[u8]) -> Result<Vec<u8>, ModelError> {
    let signature = storage_signature();
    if data.len() >= signature.len() && data[..signature.len()] == signature[..] {
        debug!("uncompressed ABF stream, {} bytes", data.len());
        return Ok(data.to_vec());
    }

    if data.len() >= SIGNATURE_LEN {
        let (banner, _, _) = encoding_rs::UTF_16LE.decode(&data[..SIGNATURE_LEN]);
        if banner.contains(SINGLE_THREAD_SIGNATURE) {
            return decompress_single_threaded(&data[SIGNATURE_LEN..]);
        }
        if banner.contains(MULTI_THREAD_SIGNATURE) {
            return decompress_multi_threaded(&data[SIGNATURE_LEN..]);
        }
    }

    Err(ModelError::UnknownStreamFormat)
}

/// One compressed frame: declared output size plus payload.
struct Frame<'a> {
    uncompressed_size: usize,
    payload: &'a [u8],
}

/// Reads `<uncompressed_size: u32le, compressed_size: u32le, payload>`
/// at `pos`.
fn read_frame<'a>(data: &'a [u8], pos: &mut usize) -> Result<Frame<'a>, ModelError> {
    if *pos + 8 > data.len() {
        return Err(ModelError::DecompressionFailed {
            codec: "xpress9",
            message: format!("truncated frame header at stream offset {}", *pos),
        });
    }
    let uncompressed_size =
        u32::from_le_bytes(data[*pos..*pos + 4].try_into().unwrap()) as usize;
    let compressed_size =
        u32::from_le_bytes(data[*pos + 4..*pos + 8].try_into().unwrap()) as usize;
    *pos += 8;

    if *pos + compressed_size > data.len() {
        return Err(ModelError::DecompressionFailed {
            codec: "xpress9",
            message: format!(
                "frame at stream offset {} declares {} compressed bytes, {} remain",
                *pos - 8,
                compressed_size,
                data.len() - *pos
            ),
        });
    }
    let payload = &data[*pos..*pos + compressed_size];
    *pos += compressed_size;
    Ok(Frame {
        uncompressed_size,
        payload,
    })
}

/// Sequential frame decode on a single decoder context.
fn decompress_single_threaded(data: &[u8]) -> Result<Vec<u8>, ModelError> {
    let mut decoder = Xpress9::new();
    let mut output = Vec::new();
    let mut pos = 0usize;
    let mut frames = 0usize;

    while pos < data.len() {
        let frame = read_frame(data, &mut pos)?;
        let chunk = decoder.decompress(frame.payload, frame.uncompressed_size)?;
        output.extend_from_slice(&chunk);
        frames += 1;
    }
    debug!(
        "single-threaded Xpress9: {} frames, {} bytes out",
        frames,
        output.len()
    );
    Ok(output)
}

/// Group-parallel frame decode.
///
/// The header declares prefix and main chunk grids; frames are read in
/// file order, grouped per compressing thread, decoded in parallel (one
/// context per group), and concatenated in group-index order.
fn decompress_multi_threaded(data: &[u8]) -> Result<Vec<u8>, ModelError> {
    if data.len() < 40 {
        return Err(ModelError::DecompressionFailed {
            codec: "xpress9",
            message: format!("multi-threaded header needs 40 bytes, {} remain", data.len()),
        });
    }
    let word = |i: usize| u64::from_le_bytes(data[i * 8..i * 8 + 8].try_into().unwrap());
    let main_chunks_per_thread = word(0) as usize;
    let prefix_chunks_per_thread = word(1) as usize;
    let prefix_thread_count = word(2) as usize;
    let main_thread_count = word(3) as usize;
    let _chunk_uncompressed_size = word(4);
    let mut pos = 40usize;

    debug!(
        "multi-threaded Xpress9: {} prefix groups x {} chunks, {} main groups x {} chunks",
        prefix_thread_count, prefix_chunks_per_thread, main_thread_count, main_chunks_per_thread
    );

    let mut output = Vec::new();
    for (thread_count, chunks_per_thread) in [
        (prefix_thread_count, prefix_chunks_per_thread),
        (main_thread_count, main_chunks_per_thread),
    ] {
        if thread_count == 0 || chunks_per_thread == 0 {
            continue;
        }

        let mut groups: Vec<Vec<Frame<'_>>> = Vec::with_capacity(thread_count);
        for _ in 0..thread_count {
            let mut group = Vec::with_capacity(chunks_per_thread);
            for _ in 0..chunks_per_thread {
                group.push(read_frame(data, &mut pos)?);
            }
            groups.push(group);
        }

        let decoded: Result<Vec<Vec<u8>>, ModelError> = groups
            .par_iter()
            .map(|group| {
                // One context per worker; contexts are not shared across
                // concurrent frames.
                let mut decoder = Xpress9::new();
                let mut buf = Vec::new();
                for frame in group {
                    let chunk = decoder.decompress(frame.payload, frame.uncompressed_size)?;
                    buf.extend_from_slice(&chunk);
                }
                Ok(buf)
            })
            .collect();

        for group in decoded? {
            output.extend_from_slice(&group);
        }
    }

    Ok(output)
}
