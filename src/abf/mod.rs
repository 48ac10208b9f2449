//! ABF (Analysis Services Backup) container parsing.
//!
//! A decompressed ABF stream is a flat byte buffer with three XML
//! structures threaded through it:
//!
//! 1. the backup log header, a NUL-padded UTF-16 page at offset 72
//! 2. the virtual directory, locating every embedded file by offset/size
//! 3. the backup log, whose file groups give each file its
//!    catalog-visible name
//!
//! Parsing cross-joins (2) and (3) into a file log; everything downstream
//! reads immutable sub-slices of the single stream buffer through
//! [`AbfStream::slice`].

pub mod backup_log;
pub mod backup_log_header;
pub mod virtual_directory;

use std::borrow::Cow;

use log::debug;

use crate::error::ModelError;
use crate::xpress::xpress8;

use self::backup_log::BackupLog;
use self::backup_log_header::BackupLogHeader;
use self::virtual_directory::VirtualDirectory;

/// Byte length of the stream storage signature preceding the header page.
pub const STREAM_SIGNATURE_LEN: usize = 72;
/// The backup log header occupies one page.
pub const HEADER_PAGE_SIZE: usize = 4096;

/// One embedded file, named as the catalog sees it.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Logical path with the persist-location prefix stripped.
    pub file_name: String,
    /// Physical storage path inside the container.
    pub storage_path: String,
    /// Byte length recorded by the virtual directory.
    pub size: u64,
    /// Byte length recorded by the backup log (authoritative for
    /// Xpress8-compressed payloads).
    pub size_from_log: u64,
    /// Byte offset of the payload within the ABF stream.
    pub offset: u64,
}

/// The decompressed ABF stream plus its parsed file log.
#[derive(Debug)]
pub struct AbfStream {
    data: Vec<u8>,
    files: Vec<FileEntry>,
    error_code: bool,
    apply_compression: bool,
}

impl AbfStream {
    /// Parses the header page, virtual directory, and backup log, and
    /// builds the file log.
    pub fn parse(data: Vec<u8>) -> Result<AbfStream, ModelError> {
        if data.len() < HEADER_PAGE_SIZE {
            return Err(ModelError::MalformedAbf {
                message: format!(
                    "stream is {} bytes, shorter than the {}-byte header page",
                    data.len(),
                    HEADER_PAGE_SIZE
                ),
            });
        }

        let header = BackupLogHeader::parse(&data[STREAM_SIGNATURE_LEN..HEADER_PAGE_SIZE])?;

        let dir_start = header.offset_header as usize;
        let dir_end = dir_start
            .checked_add(header.data_size as usize)
            .filter(|&end| end <= data.len())
            .ok_or_else(|| ModelError::MalformedAbf {
                message: format!(
                    "virtual directory range [{}, +{}) lies outside the {}-byte stream",
                    dir_start,
                    header.data_size,
                    data.len()
                ),
            })?;
        let directory = VirtualDirectory::parse(&data[dir_start..dir_end])?;

        // Every declared range must lie inside the stream before anything
        // dereferences it.
        for entry in &directory.entries {
            let end = entry.offset.checked_add(entry.size);
            if end.is_none() || end.unwrap() > data.len() as u64 {
                return Err(ModelError::MalformedAbf {
                    message: format!(
                        "entry '{}' range [{}, {}) overruns the {}-byte stream",
                        entry.path,
                        entry.offset,
                        entry.offset.saturating_add(entry.size),
                        data.len()
                    ),
                });
            }
        }

        let log_entry = directory.entries.last().ok_or_else(|| ModelError::MalformedAbf {
            message: "virtual directory contains no entries".to_string(),
        })?;
        let log_start = log_entry.offset as usize;
        let log_end = log_start + log_entry.size as usize;
        let log = BackupLog::parse(&data[log_start..log_end], header.error_code)?;

        let files = build_file_log(&directory, &log)?;
        debug!(
            "ABF stream: {} bytes, {} embedded files, error_code={}, apply_compression={}",
            data.len(),
            files.len(),
            header.error_code,
            header.apply_compression
        );

        Ok(AbfStream {
            data,
            files,
            error_code: header.error_code,
            apply_compression: header.apply_compression,
        })
    }

    /// File log entries in backup-log order.
    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    /// Sum of all embedded file sizes.
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    /// Looks up a file-log entry by catalog-visible name.
    pub fn entry(&self, file_name: &str) -> Option<&FileEntry> {
        self.files.iter().find(|f| f.file_name == file_name)
    }

    /// Returns the raw bytes of an embedded file.
    ///
    /// When the header's error-code bit is set, the final four bytes (a
    /// trailing error word) are trimmed. When the header requests
    /// per-file compression, the payload is Xpress8-chunk decompressed
    /// and validated against the backup log's size.
    pub fn slice(&self, file_name: &str) -> Result<Cow<'_, [u8]>, ModelError> {
        let entry = self
            .entry(file_name)
            .ok_or_else(|| ModelError::CatalogMismatch {
                file_name: file_name.to_string(),
            })?;

        let start = entry.offset as usize;
        let mut end = start + entry.size as usize;
        if self.error_code {
            end = end.saturating_sub(4).max(start);
        }
        let raw = &self.data[start..end];

        if self.apply_compression {
            let decompressed = xpress8::decompress_chunked(raw)?;
            if decompressed.len() as u64 != entry.size_from_log {
                return Err(ModelError::MalformedAbf {
                    message: format!(
                        "decompressed size mismatch for '{}': expected {} bytes, got {}",
                        file_name,
                        entry.size_from_log,
                        decompressed.len()
                    ),
                });
            }
            return Ok(Cow::Owned(decompressed));
        }

        Ok(Cow::Borrowed(raw))
    }
}

/// Cross-joins backup-log file groups with the virtual directory,
/// stripping the second file group's persist-location prefix to obtain
/// catalog-visible names.
fn build_file_log(
    directory: &VirtualDirectory,
    log: &BackupLog,
) -> Result<Vec<FileEntry>, ModelError> {
    if log.file_groups.len() < 2 {
        return Err(ModelError::MalformedAbf {
            message: format!(
                "backup log declares {} file groups, expected at least 2",
                log.file_groups.len()
            ),
        });
    }
    let persist_root = format!("{}\\", log.file_groups[1].persist_location_path);

    let mut entries = Vec::new();
    for group in &log.file_groups {
        for file in &group.file_list {
            let matched = directory
                .entries
                .iter()
                .find(|e| e.path == file.storage_path)
                .ok_or_else(|| ModelError::MalformedAbf {
                    message: format!(
                        "backup log path '{}' has no virtual directory match",
                        file.storage_path
                    ),
                })?;

            let file_name = match file.path.strip_prefix(&persist_root) {
                Some(stripped) => stripped.to_string(),
                None => file.path.clone(),
            };

            entries.push(FileEntry {
                file_name,
                storage_path: file.storage_path.clone(),
                size: matched.size,
                size_from_log: file.size,
                offset: matched.offset,
            });
        }
    }
    Ok(entries)
}

/// Decodes a UTF-16 XML page to a string, dropping NUL padding.
///
/// ABF XML pages are UTF-16 little-endian, usually carrying a BOM; the
/// header page is additionally NUL-padded to its full page size.
pub(crate) fn decode_utf16_xml(bytes: &[u8]) -> String {
    let (text, _, _) = encoding_rs::UTF_16LE.decode(bytes);
    text.trim_matches('\0').to_string()
}

/// `findtext`-style child lookup on an XML node.
pub(crate) fn child_text<'a>(node: roxmltree::Node<'a, 'a>, name: &str) -> Option<&'a str> {
    node.children()
        .find(|c| c.has_tag_name(name))
        .and_then(|c| c.text())
}

/// Parses a required integer child element, naming the element on failure.
pub(crate) fn child_u64(node: roxmltree::Node<'_, '_>, name: &str) -> Result<u64, ModelError> {
    child_text(node, name)
        .and_then(|t| t.trim().parse().ok())
        .ok_or_else(|| ModelError::MalformedAbf {
            message: format!("missing or non-numeric element '{}'", name),
        })
}

/// Parses an optional boolean child element (`"true"` is true, anything
/// else false).
pub(crate) fn child_bool(node: roxmltree::Node<'_, '_>, name: &str) -> bool {
    child_text(node, name).map(|t| t.trim() == "true").unwrap_or(false)
}
