//! Error types for data model unpacking and decoding.
//!
//! Every failure mode surfaces the offending artifact name and, where
//! meaningful, the byte offset and section label that failed. The inputs
//! are immutable, so nothing here is retriable; the only recovery the
//! crate offers is column-level null substitution in the table assembler
//! (see [`crate::model::TableOptions`]).

use std::fmt;

use thiserror::Error;

/// Which on-disk column artifact a [`ModelError::MalformedArtifact`]
/// refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// `.idf` index data file (RLE + bit-packed id stream).
    Idf,
    /// `.idfmeta` sidecar holding decoding constants.
    IdfMeta,
    /// `.dictionary` id-to-value container.
    Dictionary,
    /// `.hidx` hash index.
    Hidx,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArtifactKind::Idf => "idf",
            ArtifactKind::IdfMeta => "idfmeta",
            ArtifactKind::Dictionary => "dictionary",
            ArtifactKind::Hidx => "hidx",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while opening a file or decoding its data model.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The zip archive opened fine but holds no recognized inner entry
    /// (`DataModel` for .pbix, `xl/model/item.data` for .xlsx).
    #[error("unsupported container: no DataModel or xl/model/item.data entry in '{path}'")]
    UnsupportedContainer {
        /// Path of the file that was opened.
        path: String,
    },

    /// The first 102 bytes of the inner stream match none of the three
    /// accepted forms (uncompressed, single-threaded Xpress9,
    /// multi-threaded Xpress9).
    #[error("unknown data model stream format: signature matches no accepted form")]
    UnknownStreamFormat,

    /// Xpress9/Xpress8 produced the wrong number of bytes, consumed past
    /// the end of the input, or hit an invalid back-reference.
    #[error("decompression failed ({codec}): {message}")]
    DecompressionFailed {
        /// `"xpress9"` or `"xpress8"`.
        codec: &'static str,
        /// Detailed failure description with positions.
        message: String,
    },

    /// The ABF container itself is inconsistent: unparseable directory
    /// XML, a range outside the stream, or a log path with no
    /// virtual-directory match.
    #[error("malformed ABF container: {message}")]
    MalformedAbf {
        /// Detailed failure description naming the offending entry.
        message: String,
    },

    /// A column artifact is structurally invalid (tag mismatch, truncated
    /// section, or a declared count exceeding the buffer).
    #[error("malformed {kind} artifact '{name}': {section} at byte {offset}: {message}")]
    MalformedArtifact {
        /// Which artifact family failed.
        kind: ArtifactKind,
        /// Catalog-visible file name of the artifact.
        name: String,
        /// Section label that failed (e.g. `CS`, `page 0`).
        section: String,
        /// Byte offset within the artifact where the failure was detected.
        offset: usize,
        /// Detailed failure description.
        message: String,
    },

    /// Dictionary header declares type `invalid` or an unrecognized tag.
    #[error("unknown dictionary kind {type_tag} in '{name}'")]
    UnknownDictionaryKind {
        /// Catalog-visible file name of the dictionary.
        name: String,
        /// Raw on-disk type tag.
        type_tag: i32,
    },

    /// The column descriptor has neither a dictionary nor a hash index,
    /// so its ids cannot be resolved to values.
    #[error("column '{table}'[{column}] has neither dictionary nor hidx and cannot be decoded")]
    UndecodableColumn {
        /// Table the column belongs to.
        table: String,
        /// Column name.
        column: String,
    },

    /// Two columns of the same table disagree on row count.
    #[error(
        "ragged table '{table}': column '{column}' has {actual} rows, expected {expected}"
    )]
    RaggedTable {
        /// Table being assembled.
        table: String,
        /// First column whose length disagrees.
        column: String,
        /// Length agreed by the preceding columns.
        expected: usize,
        /// Length of the offending column.
        actual: usize,
    },

    /// A catalog descriptor references an embedded file name that the
    /// virtual directory does not contain.
    #[error("catalog references embedded file '{file_name}' not present in the virtual directory")]
    CatalogMismatch {
        /// The unresolved catalog-visible file name.
        file_name: String,
    },

    /// The requested table name is absent from the catalog.
    #[error("no table named '{table}' in the model catalog")]
    NoSuchTable {
        /// The name that was requested.
        table: String,
    },

    /// The embedded relational catalog could not be opened or queried.
    #[error("catalog error: {0}")]
    Catalog(#[from] rusqlite::Error),

    /// Zip archive error while opening the container.
    #[error("container archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// I/O error while reading the source file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ModelError {
    /// Shorthand for a [`ModelError::MalformedArtifact`] with positional
    /// context, used by the per-artifact readers.
    pub(crate) fn artifact(
        kind: ArtifactKind,
        name: &str,
        section: &str,
        offset: usize,
        message: impl Into<String>,
    ) -> Self {
        ModelError::MalformedArtifact {
            kind,
            name: name.to_string(),
            section: section.to_string(),
            offset,
            message: message.into(),
        }
    }
}
