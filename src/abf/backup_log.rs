//! Backup log: file groups assigning catalog-visible paths to stored
//! files.

use crate::error::ModelError;

use super::{child_bool, child_text, child_u64, decode_utf16_xml};

/// One `BackupFile` element inside a file group.
#[derive(Debug, Clone)]
pub struct LogFile {
    /// Logical path (persist-location prefixed).
    pub path: String,
    /// Physical storage path matching a virtual directory entry.
    pub storage_path: String,
    pub last_write_time: u64,
    /// Logical payload size (pre-compression, when per-file compression
    /// applies).
    pub size: u64,
}

/// One `FileGroup` element.
#[derive(Debug, Clone)]
pub struct FileGroup {
    pub class: u64,
    pub id: Option<String>,
    pub name: Option<String>,
    pub object_version: u64,
    pub persist_location: u64,
    /// Prefix stripped from logical paths to obtain catalog names (the
    /// second group's value is authoritative).
    pub persist_location_path: String,
    pub storage_location_path: Option<String>,
    pub file_list: Vec<LogFile>,
}

/// The backup log document.
#[derive(Debug, Clone)]
pub struct BackupLog {
    pub server_root: Option<String>,
    pub compression_flag: bool,
    pub encryption_flag: bool,
    pub object_name: Option<String>,
    pub object_id: Option<String>,
    pub file_groups: Vec<FileGroup>,
}

impl BackupLog {
    /// Parses the backup log XML; when the header's error-code bit is
    /// set, the blob carries a trailing 4-byte error word that is trimmed
    /// before decoding.
    pub fn parse(bytes: &[u8], error_code: bool) -> Result<BackupLog, ModelError> {
        let bytes = if error_code && bytes.len() >= 4 {
            &bytes[..bytes.len() - 4]
        } else {
            bytes
        };
        let text = decode_utf16_xml(bytes);
        let doc = roxmltree::Document::parse(&text).map_err(|e| ModelError::MalformedAbf {
            message: format!("backup log XML: {}", e),
        })?;
        let root = doc.root_element();

        let mut file_groups = Vec::new();
        if let Some(groups) = root.children().find(|c| c.has_tag_name("FileGroups")) {
            for group in groups.children().filter(|c| c.has_tag_name("FileGroup")) {
                file_groups.push(parse_file_group(group)?);
            }
        }

        Ok(BackupLog {
            server_root: child_text(root, "ServerRoot").map(str::to_string),
            compression_flag: child_bool(root, "CompressionFlag"),
            encryption_flag: child_bool(root, "EncryptionFlag"),
            object_name: child_text(root, "ObjectName").map(str::to_string),
            object_id: child_text(root, "ObjectId").map(str::to_string),
            file_groups,
        })
    }
}

fn parse_file_group(node: roxmltree::Node<'_, '_>) -> Result<FileGroup, ModelError> {
    let persist_location_path = child_text(node, "PersistLocationPath")
        .ok_or_else(|| ModelError::MalformedAbf {
            message: "file group without a PersistLocationPath".to_string(),
        })?
        .to_string();

    let mut file_list = Vec::new();
    if let Some(list) = node.children().find(|c| c.has_tag_name("FileList")) {
        for file in list.children().filter(|c| c.has_tag_name("BackupFile")) {
            let path = child_text(file, "Path")
                .ok_or_else(|| ModelError::MalformedAbf {
                    message: "backup log file without a Path".to_string(),
                })?
                .to_string();
            let storage_path = child_text(file, "StoragePath")
                .ok_or_else(|| ModelError::MalformedAbf {
                    message: format!("backup log file '{}' without a StoragePath", path),
                })?
                .to_string();
            file_list.push(LogFile {
                path,
                storage_path,
                last_write_time: child_u64(file, "LastWriteTime").unwrap_or(0),
                size: child_u64(file, "Size")?,
            });
        }
    }

    Ok(FileGroup {
        class: child_u64(node, "Class").unwrap_or(0),
        id: child_text(node, "ID").map(str::to_string),
        name: child_text(node, "Name").map(str::to_string),
        object_version: child_u64(node, "ObjectVersion").unwrap_or(0),
        persist_location: child_u64(node, "PersistLocation").unwrap_or(0),
        persist_location_path,
        storage_location_path: child_text(node, "StorageLocationPath").map(str::to_string),
        file_list,
    })
}
