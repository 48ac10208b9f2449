//! Virtual directory: the flat list locating every embedded file.

use crate::error::ModelError;

use super::{child_bool, child_text, child_u64, decode_utf16_xml};

/// One `BackupFile` element of the virtual directory.
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    /// Physical storage path (unique within the directory).
    pub path: String,
    /// Payload byte length.
    pub size: u64,
    /// Payload byte offset within the stream (`m_cbOffsetHeader` on disk).
    pub offset: u64,
    pub delete: bool,
    pub last_write_time: u64,
}

/// The parsed directory. Entries keep XML order; the last entry points at
/// the backup log.
#[derive(Debug, Clone)]
pub struct VirtualDirectory {
    pub entries: Vec<DirectoryEntry>,
}

impl VirtualDirectory {
    /// Parses the directory XML (UTF-16).
    pub fn parse(bytes: &[u8]) -> Result<VirtualDirectory, ModelError> {
        let text = decode_utf16_xml(bytes);
        let doc = roxmltree::Document::parse(&text).map_err(|e| ModelError::MalformedAbf {
            message: format!("virtual directory XML: {}", e),
        })?;

        let mut entries = Vec::new();
        for node in doc
            .root_element()
            .children()
            .filter(|c| c.has_tag_name("BackupFile"))
        {
            let path = child_text(node, "Path")
                .ok_or_else(|| ModelError::MalformedAbf {
                    message: "virtual directory entry without a Path".to_string(),
                })?
                .to_string();
            let size = child_u64(node, "Size")?;
            let offset = child_u64(node, "m_cbOffsetHeader")?;
            entries.push(DirectoryEntry {
                path,
                size,
                offset,
                delete: child_bool(node, "Delete"),
                last_write_time: child_u64(node, "LastWriteTime").unwrap_or(0),
            });
        }

        Ok(VirtualDirectory { entries })
    }
}
