//! Model catalog adapters.
//!
//! The decoding core depends on a single catalog capability: enumerating
//! the column descriptors of the model, each naming the embedded
//! artifacts that materialize one column. Two backends provide it: the
//! embedded relational catalog of `.pbix` files (`sqlite`) and the bundle
//! of Analysis Services XML documents in `.xlsx` models (`xml`). The
//! remaining views (relationships, measures, expressions, annotations)
//! are pass-throughs of catalog content, not part of decoding.

pub mod sqlite;
pub mod xml;

use crate::value::SemanticType;

/// Everything the column decoder needs to know about one column.
#[derive(Debug, Clone)]
pub struct ColumnDescriptor {
    pub table_name: String,
    pub column_name: String,
    /// `.dictionary` artifact name, when the column is
    /// dictionary-encoded.
    pub dictionary: Option<String>,
    /// `.hidx` artifact name, when a hash index exists.
    pub hidx: Option<String>,
    /// `.idf` artifact name (always present).
    pub idf: String,
    /// Distinct state count, informational.
    pub cardinality: u64,
    pub data_type: SemanticType,
    /// Added to ids on the scaled (no-dictionary) path.
    pub base_id: f64,
    /// Divisor on the scaled path; `0` means the catalog did not supply
    /// one.
    pub magnitude: f64,
    pub is_nullable: bool,
}

/// A model relationship.
#[derive(Debug, Clone)]
pub struct Relationship {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
    pub is_active: bool,
    /// `"M:1"`-style cardinality label.
    pub cardinality: String,
    /// `"Single"`, `"Both"`, or the raw behavior code.
    pub cross_filtering_behavior: String,
    pub from_key_count: u64,
    pub to_key_count: u64,
    pub rely_on_referential_integrity: bool,
}

/// A model measure.
#[derive(Debug, Clone)]
pub struct Measure {
    pub table: String,
    pub name: String,
    pub expression: String,
    pub display_folder: String,
    pub description: String,
}

/// A per-table expression: a Power Query (M) source or a calculated
/// (DAX) table definition.
#[derive(Debug, Clone)]
pub struct TableExpression {
    pub table: String,
    pub expression: String,
}

/// A model-level annotation.
#[derive(Debug, Clone)]
pub struct Annotation {
    pub name: String,
    pub value: String,
}

/// The catalog capability the decoding core consumes, plus pass-through
/// metadata views.
pub trait Catalog {
    /// Column descriptors in table name / storage position order.
    fn descriptors(&self) -> &[ColumnDescriptor];

    /// Model relationships.
    fn relationships(&self) -> &[Relationship];

    /// Model measures.
    fn measures(&self) -> &[Measure];

    /// Power Query (M) expressions per table.
    fn m_expressions(&self) -> &[TableExpression];

    /// Calculated-table (DAX) definitions per table.
    fn dax_tables(&self) -> &[TableExpression];

    /// Model-level annotations.
    fn annotations(&self) -> &[Annotation];
}
