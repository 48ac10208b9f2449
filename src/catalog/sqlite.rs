//! Relational catalog backend for `.pbix` models.
//!
//! The `metadata.sqlitedb` embedded file is a complete SQLite database
//! describing the model. The buffer is staged to a temporary file and
//! opened read-only; the schema query joins the storage tables so each
//! column row carries its artifact file names.

use std::io::Write;

use log::debug;
use rusqlite::{Connection, OpenFlags};
use tempfile::NamedTempFile;

use crate::error::ModelError;
use crate::value::SemanticType;

use super::{
    Annotation, Catalog, ColumnDescriptor, Measure, Relationship, TableExpression,
};

/// Column descriptors with artifact names resolved through the storage
/// tables, ordered by table then storage position.
const SCHEMA_SQL: &str = "
    SELECT
        t.Name AS TableName,
        c.ExplicitName AS ColumnName,
        sfd.FileName AS Dictionary,
        sfh.FileName AS HIDX,
        sfi.FileName AS IDF,
        cs.Statistics_DistinctStates AS Cardinality,
        c.ExplicitDataType AS DataType,
        ds.BaseId,
        ds.Magnitude,
        ds.IsNullable
    FROM Column c
    JOIN [Table] t ON c.TableId = t.ID
    JOIN ColumnStorage cs ON c.ColumnStorageID = cs.ID
    JOIN AttributeHierarchy ah ON ah.ColumnID = c.ID
    JOIN AttributeHierarchyStorage ahs ON ah.AttributeHierarchyStorageID = ahs.ID
    LEFT JOIN StorageFile sfh ON sfh.ID = ahs.StorageFileID
    LEFT JOIN DictionaryStorage ds ON ds.ID = cs.DictionaryStorageID
    LEFT JOIN StorageFile sfd ON sfd.ID = ds.StorageFileID
    JOIN ColumnPartitionStorage cps ON cps.ColumnStorageID = cs.ID
    JOIN StorageFile sfi ON sfi.ID = cps.StorageFileID
    WHERE c.Type = 1
    ORDER BY t.Name, cs.StoragePosition
";

const M_SQL: &str = "
    SELECT t.Name AS TableName, p.QueryDefinition AS Expression
    FROM partition p
    JOIN [Table] t ON t.ID = p.TableID
    WHERE p.Type = 4
";

const DAX_TABLES_SQL: &str = "
    SELECT t.Name AS TableName, p.QueryDefinition AS Expression
    FROM partition p
    JOIN [Table] t ON t.ID = p.TableID
    WHERE p.Type = 2
";

const MEASURES_SQL: &str = "
    SELECT t.Name AS TableName, m.Name, m.Expression, m.DisplayFolder, m.Description
    FROM Measure m
    JOIN [Table] t ON m.TableID = t.ID
";

const ANNOTATIONS_SQL: &str = "
    SELECT Name, Value FROM Annotation WHERE ObjectType = 1
";

const RELATIONSHIPS_SQL: &str = "
    SELECT
        ft.Name AS FromTableName,
        fc.ExplicitName AS FromColumnName,
        tt.Name AS ToTableName,
        tc.ExplicitName AS ToColumnName,
        rel.IsActive,
        CASE WHEN rel.FromCardinality = 2 THEN 'M' ELSE '1' END || ':' ||
        CASE WHEN rel.ToCardinality = 2 THEN 'M' ELSE '1' END AS Cardinality,
        CASE
            WHEN rel.CrossFilteringBehavior = 1 THEN 'Single'
            WHEN rel.CrossFilteringBehavior = 2 THEN 'Both'
            ELSE CAST(rel.CrossFilteringBehavior AS TEXT)
        END AS CrossFilteringBehavior,
        rid.RecordCount AS FromKeyCount,
        rid2.RecordCount AS ToKeyCount,
        rel.RelyOnReferentialIntegrity
    FROM Relationship rel
        LEFT JOIN [Table] ft ON rel.FromTableID = ft.id
        LEFT JOIN [Column] fc ON rel.FromColumnID = fc.id
        LEFT JOIN [Table] tt ON rel.ToTableID = tt.id AND tt.systemflags = 0
        LEFT JOIN [Column] tc ON rel.ToColumnID = tc.id
        LEFT JOIN RelationshipStorage rs ON rs.id = rel.RelationshipStorageID
        LEFT JOIN RelationshipIndexStorage rid ON rs.RelationshipIndexStorageID = rid.id
        LEFT JOIN RelationshipStorage rs2 ON rs2.id = rel.RelationshipStorage2ID
        LEFT JOIN RelationshipIndexStorage rid2 ON rs2.RelationshipIndexStorageID = rid2.id
";

/// The `.pbix` catalog, fully materialized at construction.
#[derive(Debug)]
pub struct SqliteCatalog {
    descriptors: Vec<ColumnDescriptor>,
    relationships: Vec<Relationship>,
    measures: Vec<Measure>,
    m_expressions: Vec<TableExpression>,
    dax_tables: Vec<TableExpression>,
    annotations: Vec<Annotation>,
}

impl SqliteCatalog {
    /// Stages the database buffer to a temp file and loads every view.
    pub fn from_buffer(buffer: &[u8]) -> Result<SqliteCatalog, ModelError> {
        let mut staged = NamedTempFile::new()?;
        staged.write_all(buffer)?;
        staged.flush()?;

        let conn = Connection::open_with_flags(
            staged.path(),
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        let catalog = SqliteCatalog {
            descriptors: load_descriptors(&conn)?,
            relationships: load_relationships(&conn)?,
            measures: load_measures(&conn)?,
            m_expressions: load_expressions(&conn, M_SQL)?,
            dax_tables: load_expressions(&conn, DAX_TABLES_SQL)?,
            annotations: load_annotations(&conn)?,
        };
        debug!(
            "sqlite catalog: {} columns, {} relationships, {} measures",
            catalog.descriptors.len(),
            catalog.relationships.len(),
            catalog.measures.len()
        );
        Ok(catalog)
    }
}

impl Catalog for SqliteCatalog {
    fn descriptors(&self) -> &[ColumnDescriptor] {
        &self.descriptors
    }

    fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    fn measures(&self) -> &[Measure] {
        &self.measures
    }

    fn m_expressions(&self) -> &[TableExpression] {
        &self.m_expressions
    }

    fn dax_tables(&self) -> &[TableExpression] {
        &self.dax_tables
    }

    fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }
}

fn load_descriptors(conn: &Connection) -> Result<Vec<ColumnDescriptor>, ModelError> {
    let mut stmt = conn.prepare(SCHEMA_SQL)?;
    let rows = stmt.query_map([], |row| {
        Ok(ColumnDescriptor {
            table_name: row.get("TableName")?,
            column_name: row.get("ColumnName")?,
            dictionary: row.get::<_, Option<String>>("Dictionary")?,
            hidx: row.get::<_, Option<String>>("HIDX")?,
            idf: row.get("IDF")?,
            cardinality: row.get::<_, Option<i64>>("Cardinality")?.unwrap_or(0) as u64,
            data_type: SemanticType::from_amo_code(
                row.get::<_, Option<i64>>("DataType")?.unwrap_or(0),
            ),
            base_id: row.get::<_, Option<f64>>("BaseId")?.unwrap_or(0.0),
            magnitude: row.get::<_, Option<f64>>("Magnitude")?.unwrap_or(0.0),
            is_nullable: row.get::<_, Option<i64>>("IsNullable")?.unwrap_or(1) != 0,
        })
    })?;
    collect_rows(rows)
}

fn load_relationships(conn: &Connection) -> Result<Vec<Relationship>, ModelError> {
    let mut stmt = conn.prepare(RELATIONSHIPS_SQL)?;
    let rows = stmt.query_map([], |row| {
        Ok(Relationship {
            from_table: row.get::<_, Option<String>>("FromTableName")?.unwrap_or_default(),
            from_column: row
                .get::<_, Option<String>>("FromColumnName")?
                .unwrap_or_default(),
            to_table: row.get::<_, Option<String>>("ToTableName")?.unwrap_or_default(),
            to_column: row.get::<_, Option<String>>("ToColumnName")?.unwrap_or_default(),
            is_active: row.get::<_, Option<i64>>("IsActive")?.unwrap_or(0) != 0,
            cardinality: row.get::<_, Option<String>>("Cardinality")?.unwrap_or_default(),
            cross_filtering_behavior: row
                .get::<_, Option<String>>("CrossFilteringBehavior")?
                .unwrap_or_default(),
            from_key_count: row.get::<_, Option<i64>>("FromKeyCount")?.unwrap_or(0) as u64,
            to_key_count: row.get::<_, Option<i64>>("ToKeyCount")?.unwrap_or(0) as u64,
            rely_on_referential_integrity: row
                .get::<_, Option<i64>>("RelyOnReferentialIntegrity")?
                .unwrap_or(0)
                != 0,
        })
    })?;
    collect_rows(rows)
}

fn load_measures(conn: &Connection) -> Result<Vec<Measure>, ModelError> {
    let mut stmt = conn.prepare(MEASURES_SQL)?;
    let rows = stmt.query_map([], |row| {
        Ok(Measure {
            table: row.get("TableName")?,
            name: row.get("Name")?,
            expression: row.get::<_, Option<String>>("Expression")?.unwrap_or_default(),
            display_folder: row
                .get::<_, Option<String>>("DisplayFolder")?
                .unwrap_or_default(),
            description: row
                .get::<_, Option<String>>("Description")?
                .unwrap_or_default(),
        })
    })?;
    collect_rows(rows)
}

fn load_expressions(conn: &Connection, sql: &str) -> Result<Vec<TableExpression>, ModelError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |row| {
        Ok(TableExpression {
            table: row.get("TableName")?,
            expression: row.get::<_, Option<String>>("Expression")?.unwrap_or_default(),
        })
    })?;
    collect_rows(rows)
}

fn load_annotations(conn: &Connection) -> Result<Vec<Annotation>, ModelError> {
    let mut stmt = conn.prepare(ANNOTATIONS_SQL)?;
    let rows = stmt.query_map([], |row| {
        Ok(Annotation {
            name: row.get("Name")?,
            value: row.get::<_, Option<String>>("Value")?.unwrap_or_default(),
        })
    })?;
    collect_rows(rows)
}

fn collect_rows<T>(
    rows: impl Iterator<Item = Result<T, rusqlite::Error>>,
) -> Result<Vec<T>, ModelError> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
