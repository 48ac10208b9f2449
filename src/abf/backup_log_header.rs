//! Backup log header: the fixed UTF-16 XML page following the stream
//! storage signature.

use crate::error::ModelError;

use super::{child_bool, child_u64, decode_utf16_xml};

/// Fields of the backup log header page.
///
/// The decoder consumes `offset_header`, `data_size`, `error_code`, and
/// `apply_compression`; the remaining fields are carried through for
/// diagnostics.
#[derive(Debug, Clone)]
pub struct BackupLogHeader {
    pub backup_restore_sync_version: u64,
    pub fault: bool,
    pub error_code: bool,
    pub encryption_flag: bool,
    pub apply_compression: bool,
    /// Byte offset of the virtual directory within the stream
    /// (`m_cbOffsetHeader` on disk).
    pub offset_header: u64,
    /// Byte length of the virtual directory XML (`DataSize` on disk).
    pub data_size: u64,
    /// Declared number of embedded files.
    pub files: u64,
    pub object_id: Option<String>,
}

impl BackupLogHeader {
    /// Parses the header page (NUL padding between the last element and
    /// the end of the page is stripped before XML parsing).
    pub fn parse(page: &[u8]) -> Result<BackupLogHeader, ModelError> {
        let text = decode_utf16_xml(page);
        let doc = roxmltree::Document::parse(&text).map_err(|e| ModelError::MalformedAbf {
            message: format!("backup log header XML: {}", e),
        })?;
        let root = doc.root_element();

        Ok(BackupLogHeader {
            backup_restore_sync_version: child_u64(root, "BackupRestoreSyncVersion")?,
            fault: child_bool(root, "Fault"),
            error_code: child_bool(root, "ErrorCode"),
            encryption_flag: child_bool(root, "EncryptionFlag"),
            apply_compression: child_bool(root, "ApplyCompression"),
            offset_header: child_u64(root, "m_cbOffsetHeader")?,
            data_size: child_u64(root, "DataSize")?,
            files: child_u64(root, "Files")?,
            object_id: super::child_text(root, "ObjectID").map(str::to_string),
        })
    }
}
