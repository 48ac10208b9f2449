//! The top-level model facade.
//!
//! [`Model::open`] drives the whole pipeline: container detection,
//! stream decompression, ABF parsing, and catalog loading. Tables are
//! decoded on demand, column by column, in catalog order.

use std::path::Path;

use log::{debug, warn};

use crate::abf::AbfStream;
use crate::catalog::sqlite::SqliteCatalog;
use crate::catalog::xml::XmlCatalog;
use crate::catalog::{
    Annotation, Catalog, ColumnDescriptor, Measure, Relationship, TableExpression,
};
use crate::column_data::hidx::HashIndex;
use crate::decoder::decode_column;
use crate::error::ModelError;
use crate::unpack::{unpack, ContainerKind};
use crate::value::{Column, SchemaEntry, Table, Value};

/// What to do when a single column fails to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnErrorPolicy {
    /// Fail the whole `get_table` call (the default).
    #[default]
    Fail,
    /// Substitute a null-valued column of the table's agreed length.
    NullColumn,
}

/// Options for table assembly.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableOptions {
    pub on_column_error: ColumnErrorPolicy,
}

/// Per-column size statistics, reported from the catalog and file log.
#[derive(Debug, Clone)]
pub struct ColumnStatistics {
    pub table: String,
    pub column: String,
    pub cardinality: u64,
    pub dictionary_size: u64,
    pub hidx_size: u64,
    pub idf_size: u64,
}

/// An opened data model: the immutable ABF stream plus its catalog.
pub struct Model {
    stream: AbfStream,
    kind: ContainerKind,
    catalog: Box<dyn Catalog>,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model").field("kind", &self.kind).finish_non_exhaustive()
    }
}

impl Model {
    /// Opens a `.pbix` or `.xlsx`/`.xlsm` file and loads its catalog.
    pub fn open(path: impl AsRef<Path>) -> Result<Model, ModelError> {
        let data_model = unpack(path.as_ref())?;
        let stream = data_model.stream;

        let catalog: Box<dyn Catalog> = match data_model.kind {
            ContainerKind::Pbix => {
                let buffer = stream.slice("metadata.sqlitedb")?;
                Box::new(SqliteCatalog::from_buffer(&buffer)?)
            }
            ContainerKind::Xlsx => Box::new(XmlCatalog::from_stream(&stream)?),
        };

        Ok(Model {
            stream,
            kind: data_model.kind,
            catalog,
        })
    }

    /// Which container kind the model came from.
    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    /// Table names, catalog order, de-duplicated.
    pub fn tables(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for desc in self.catalog.descriptors() {
            if !names.iter().any(|n| n == &desc.table_name) {
                names.push(desc.table_name.clone());
            }
        }
        names
    }

    /// The full (table, column, type) schema listing.
    pub fn schema(&self) -> Vec<SchemaEntry> {
        self.catalog
            .descriptors()
            .iter()
            .map(|d| SchemaEntry {
                table: d.table_name.clone(),
                column: d.column_name.clone(),
                semantic_type: d.data_type,
            })
            .collect()
    }

    /// Sum of all embedded file sizes.
    pub fn size(&self) -> u64 {
        self.stream.total_size()
    }

    /// Per-column artifact sizes and cardinality.
    pub fn statistics(&self) -> Vec<ColumnStatistics> {
        let file_size = |name: &Option<String>| -> u64 {
            name.as_deref()
                .and_then(|n| self.stream.entry(n))
                .map_or(0, |e| e.size)
        };
        self.catalog
            .descriptors()
            .iter()
            .map(|d| ColumnStatistics {
                table: d.table_name.clone(),
                column: d.column_name.clone(),
                cardinality: d.cardinality,
                dictionary_size: file_size(&d.dictionary),
                hidx_size: file_size(&d.hidx),
                idf_size: self.stream.entry(&d.idf).map_or(0, |e| e.size),
            })
            .collect()
    }

    /// Decodes a table with default options.
    pub fn get_table(&self, name: &str) -> Result<Table, ModelError> {
        self.get_table_with(name, TableOptions::default())
    }

    /// Decodes a table, with explicit recovery policy for failing
    /// columns.
    pub fn get_table_with(&self, name: &str, options: TableOptions) -> Result<Table, ModelError> {
        let descriptors: Vec<&ColumnDescriptor> = self
            .catalog
            .descriptors()
            .iter()
            .filter(|d| d.table_name == name)
            .collect();
        if descriptors.is_empty() {
            return Err(ModelError::NoSuchTable {
                table: name.to_string(),
            });
        }

        let mut decoded: Vec<Result<Column, ModelError>> = Vec::with_capacity(descriptors.len());
        for &desc in &descriptors {
            decoded.push(decode_column(&self.stream, desc));
        }

        // The agreed length comes from the first successfully decoded
        // column; all others must match it.
        let agreed_length = decoded
            .iter()
            .find_map(|r| r.as_ref().ok().map(|c| c.values.len()));

        let mut columns = Vec::with_capacity(decoded.len());
        for (desc, result) in descriptors.iter().zip(decoded) {
            match result {
                Ok(column) => {
                    if let Some(expected) = agreed_length {
                        if column.values.len() != expected {
                            return Err(ModelError::RaggedTable {
                                table: name.to_string(),
                                column: column.name,
                                expected,
                                actual: column.values.len(),
                            });
                        }
                    }
                    columns.push(column);
                }
                Err(error) => match options.on_column_error {
                    ColumnErrorPolicy::Fail => return Err(error),
                    ColumnErrorPolicy::NullColumn => {
                        let Some(length) = agreed_length else {
                            // Nothing decoded at all; there is no agreed
                            // length to substitute against.
                            return Err(error);
                        };
                        warn!(
                            "substituting null column for '{}'[{}]: {}",
                            name, desc.column_name, error
                        );
                        columns.push(Column {
                            name: desc.column_name.clone(),
                            semantic_type: desc.data_type,
                            values: vec![Value::Null; length],
                        });
                    }
                },
            }
        }

        debug!(
            "table '{}': {} columns x {} rows",
            name,
            columns.len(),
            columns.first().map_or(0, |c| c.values.len())
        );
        Ok(Table {
            name: name.to_string(),
            columns,
        })
    }

    /// Parses a column's hash index, if the catalog declares one.
    ///
    /// The hash index never participates in value resolution; it is
    /// exposed for callers inspecting the physical storage.
    pub fn column_hash_index(
        &self,
        table: &str,
        column: &str,
    ) -> Result<Option<HashIndex>, ModelError> {
        let Some(desc) = self
            .catalog
            .descriptors()
            .iter()
            .find(|d| d.table_name == table && d.column_name == column)
        else {
            return Err(ModelError::NoSuchTable {
                table: format!("{}[{}]", table, column),
            });
        };
        let Some(hidx_name) = &desc.hidx else {
            return Ok(None);
        };
        let bytes = self.stream.slice(hidx_name)?;
        Ok(Some(HashIndex::parse(&bytes, hidx_name)?))
    }

    /// Model relationships (catalog pass-through).
    pub fn relationships(&self) -> &[Relationship] {
        self.catalog.relationships()
    }

    /// Model measures (catalog pass-through).
    pub fn measures(&self) -> &[Measure] {
        self.catalog.measures()
    }

    /// Power Query (M) expressions per table (catalog pass-through).
    pub fn m_expressions(&self) -> &[TableExpression] {
        self.catalog.m_expressions()
    }

    /// Calculated-table definitions (catalog pass-through).
    pub fn dax_tables(&self) -> &[TableExpression] {
        self.catalog.dax_tables()
    }

    /// Model-level annotations (catalog pass-through).
    pub fn annotations(&self) -> &[Annotation] {
        self.catalog.annotations()
    }
}
