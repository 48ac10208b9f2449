//! Analysis Services XML catalog backend for `.xlsx` Power Pivot models.
//!
//! Excel models carry no relational catalog; the schema is reassembled
//! from the AS XML documents embedded alongside the column artifacts:
//! `Model.<N>.cub.xml` names the dimensions (tables), each dimension's
//! `.tbl.xml` lists its raw columns with statistics, `.prt.xml` holds
//! partition query definitions, and `.det.xml` holds measure groups. All
//! XML traversal stays inside this adapter.

use log::{debug, warn};

use crate::abf::AbfStream;
use crate::error::ModelError;
use crate::value::SemanticType;

use super::{
    Annotation, Catalog, ColumnDescriptor, Measure, Relationship, TableExpression,
};

/// The `.xlsx` catalog, fully materialized at construction.
pub struct XmlCatalog {
    descriptors: Vec<ColumnDescriptor>,
    relationships: Vec<Relationship>,
    measures: Vec<Measure>,
    dax_tables: Vec<TableExpression>,
}

impl XmlCatalog {
    /// Reassembles the catalog from the stream's XML documents.
    pub fn from_stream(stream: &AbfStream) -> Result<XmlCatalog, ModelError> {
        let cub_name = stream
            .files()
            .iter()
            .map(|f| f.file_name.as_str())
            .find(|n| matches_numbered(n, "Model.", ".cub.xml"))
            .ok_or_else(|| ModelError::MalformedAbf {
                message: "no Model.<N>.cub.xml document in the data model".to_string(),
            })?
            .to_string();

        let cub_bytes = stream.slice(&cub_name)?;
        let cub_text = String::from_utf8_lossy(&cub_bytes).into_owned();
        let cub = roxmltree::Document::parse(&cub_text).map_err(|e| ModelError::MalformedAbf {
            message: format!("'{}': {}", cub_name, e),
        })?;

        let mut descriptors = Vec::new();
        let mut dimensions = Vec::new();
        for dimension in cub
            .descendants()
            .filter(|n| n.tag_name().name() == "Dimension")
        {
            let id = find_child_text(dimension, "ID");
            let name = find_child_text(dimension, "Name");
            let (Some(id), Some(name)) = (id, name) else {
                continue;
            };
            dimensions.push((id.to_string(), name.to_string()));
        }

        for (dimension_id, table_name) in &dimensions {
            match extract_table_columns(stream, dimension_id, table_name) {
                Ok(mut columns) => descriptors.append(&mut columns),
                Err(e) => {
                    // A dimension without a parseable table document is
                    // skipped rather than failing the whole catalog.
                    warn!("dimension '{}': {}", dimension_id, e);
                }
            }
        }

        let dax_tables = extract_partitions(stream);
        let (measures, relationships) = extract_measure_groups(stream, &dimensions);

        debug!(
            "xml catalog: {} tables, {} columns, {} measures",
            dimensions.len(),
            descriptors.len(),
            measures.len()
        );

        Ok(XmlCatalog {
            descriptors,
            relationships,
            measures,
            dax_tables,
        })
    }
}

impl Catalog for XmlCatalog {
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
        // Excel models define sources via partitions, not M expressions.
        &[]
    }

    fn dax_tables(&self) -> &[TableExpression] {
        &self.dax_tables
    }

    fn annotations(&self) -> &[Annotation] {
        &[]
    }
}

/// Matches `<prefix><digits><suffix>` file names.
fn matches_numbered(name: &str, prefix: &str, suffix: &str) -> bool {
    name.strip_prefix(prefix)
        .and_then(|rest| rest.strip_suffix(suffix))
        .is_some_and(|middle| !middle.is_empty() && middle.bytes().all(|b| b.is_ascii_digit()))
}

fn find_child_text<'a>(node: roxmltree::Node<'a, 'a>, name: &str) -> Option<&'a str> {
    node.children()
        .find(|c| c.tag_name().name() == name)
        .and_then(|c| c.text())
}

/// Column statistics pulled from an `XMColumnStats` object.
#[derive(Default)]
struct ColumnStats {
    cardinality: u64,
    data_type: Option<SemanticType>,
    base_id: f64,
    magnitude: f64,
    has_nulls: bool,
}

fn extract_table_columns(
    stream: &AbfStream,
    dimension_id: &str,
    table_name: &str,
) -> Result<Vec<ColumnDescriptor>, ModelError> {
    let tbl_prefix = format!("{}.", dimension_id);
    let tbl_name = stream
        .files()
        .iter()
        .map(|f| f.file_name.as_str())
        .find(|n| matches_numbered(n, &tbl_prefix, ".tbl.xml"))
        .ok_or_else(|| ModelError::MalformedAbf {
            message: format!("no .tbl.xml document for dimension '{}'", dimension_id),
        })?
        .to_string();

    let bytes = stream.slice(&tbl_name)?;
    let text = String::from_utf8_lossy(&bytes).into_owned();
    let doc = roxmltree::Document::parse(&text).map_err(|e| ModelError::MalformedAbf {
        message: format!("'{}': {}", tbl_name, e),
    })?;

    let mut columns = Vec::new();
    for column in doc.descendants().filter(|n| {
        n.tag_name().name() == "XMObject" && n.attribute("class") == Some("XMRawColumn")
    }) {
        let Some(column_name) = column.attribute("name") else {
            continue;
        };

        let stats = extract_column_stats(column);
        let files = find_column_files(stream, dimension_id, column_name);
        let Some(idf) = files.idf else {
            warn!(
                "column '{}'[{}] has no .idf artifact, skipped",
                table_name, column_name
            );
            continue;
        };

        columns.push(ColumnDescriptor {
            table_name: table_name.to_string(),
            column_name: column_name.to_string(),
            dictionary: files.dictionary,
            hidx: files.hidx,
            idf,
            cardinality: stats.cardinality,
            data_type: stats.data_type.unwrap_or(SemanticType::Object),
            base_id: stats.base_id,
            magnitude: stats.magnitude,
            is_nullable: stats.has_nulls,
        });
    }
    Ok(columns)
}

fn extract_column_stats(column: roxmltree::Node<'_, '_>) -> ColumnStats {
    let mut stats = ColumnStats::default();

    let Some(stats_object) = column.descendants().find(|n| {
        n.tag_name().name() == "XMObject" && n.attribute("class") == Some("XMColumnStats")
    }) else {
        return stats;
    };
    let Some(properties) = stats_object
        .children()
        .find(|n| n.tag_name().name() == "Properties")
    else {
        return stats;
    };

    for prop in properties.children().filter(|n| n.is_element()) {
        let tag = prop.tag_name().name();
        let text = prop.text().unwrap_or("").trim();
        if tag.ends_with("DistinctStates") {
            stats.cardinality = text.parse().unwrap_or(0);
        } else if tag.ends_with("HasNulls") {
            stats.has_nulls = text.eq_ignore_ascii_case("true");
        } else if tag.ends_with("BaseId") {
            stats.base_id = text.parse().unwrap_or(0.0);
        } else if tag.ends_with("Magnitude") {
            stats.magnitude = text.parse().unwrap_or(0.0);
        } else if tag.ends_with("DBType") {
            stats.data_type = Some(dbtype_to_semantic(text.parse().unwrap_or(0)));
        }
    }
    stats
}

/// Maps an OLE DB type code to a semantic tag, as the model's column
/// statistics declare them.
fn dbtype_to_semantic(db_type: i64) -> SemanticType {
    match db_type {
        3 => SemanticType::Int64,     // DBTYPE_I4
        5 => SemanticType::Float64,   // DBTYPE_R8
        7 => SemanticType::DateTime,  // DBTYPE_DATE
        11 => SemanticType::Boolean,  // DBTYPE_BOOL
        _ => SemanticType::Object,
    }
}

struct ColumnFiles {
    dictionary: Option<String>,
    hidx: Option<String>,
    idf: Option<String>,
}

/// Resolves a column's artifacts by scanning the file log for names
/// carrying both the dimension id and the column name. Positional index
/// files (`ID_TO_POS`/`POS_TO_ID`) are not column data.
fn find_column_files(stream: &AbfStream, dimension_id: &str, column_name: &str) -> ColumnFiles {
    let mut files = ColumnFiles {
        dictionary: None,
        hidx: None,
        idf: None,
    };

    for entry in stream.files() {
        let name = &entry.file_name;
        if !name.contains(dimension_id) || !name.contains(column_name) {
            continue;
        }
        if name.ends_with(".dictionary") {
            files.dictionary = Some(name.clone());
        } else if name.ends_with(".hidx") {
            files.hidx = Some(name.clone());
        } else if name.ends_with(".idf")
            && !name.contains(".ID_TO_POS.")
            && !name.contains(".POS_TO_ID.")
        {
            files.idf = Some(name.clone());
        }
    }
    files
}

/// Pulls partition query definitions from every `.prt.xml` document.
fn extract_partitions(stream: &AbfStream) -> Vec<TableExpression> {
    let mut out = Vec::new();
    let names: Vec<String> = stream
        .files()
        .iter()
        .map(|f| f.file_name.clone())
        .filter(|n| n.ends_with(".prt.xml"))
        .collect();

    for name in names {
        let Ok(bytes) = stream.slice(&name) else {
            continue;
        };
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let Ok(doc) = roxmltree::Document::parse(&text) else {
            warn!("unparseable partition document '{}'", name);
            continue;
        };
        let Some(partition) = doc
            .descendants()
            .find(|n| n.tag_name().name() == "Partition")
        else {
            continue;
        };
        let table = find_child_text(partition, "Name").unwrap_or("").to_string();
        let expression = partition
            .descendants()
            .find(|n| n.tag_name().name() == "QueryDefinition")
            .and_then(|n| n.text())
            .unwrap_or("")
            .to_string();
        out.push(TableExpression { table, expression });
    }
    out
}

/// Pulls measures and relationship stubs from every `.det.xml` measure
/// group document.
fn extract_measure_groups(
    stream: &AbfStream,
    dimensions: &[(String, String)],
) -> (Vec<Measure>, Vec<Relationship>) {
    let mut measures = Vec::new();
    let mut relationships = Vec::new();

    let names: Vec<String> = stream
        .files()
        .iter()
        .map(|f| f.file_name.clone())
        .filter(|n| n.ends_with(".det.xml"))
        .collect();

    for name in names {
        let own_dimension_id = name.split('.').next().unwrap_or("");
        let Ok(bytes) = stream.slice(&name) else {
            continue;
        };
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let Ok(doc) = roxmltree::Document::parse(&text) else {
            warn!("unparseable measure group document '{}'", name);
            continue;
        };
        let Some(group) = doc
            .descendants()
            .find(|n| n.tag_name().name() == "MeasureGroup")
        else {
            continue;
        };
        let table_name = find_child_text(group, "Name").unwrap_or("").to_string();

        for measure in group.descendants().filter(|n| n.tag_name().name() == "Measure") {
            measures.push(Measure {
                table: table_name.clone(),
                name: find_child_text(measure, "Name").unwrap_or("").to_string(),
                expression: String::new(),
                display_folder: String::new(),
                description: String::new(),
            });
        }

        // A measure group referencing another cube dimension implies a
        // fact-to-dimension relationship; column names are not recorded
        // in this document.
        for dimension in group
            .descendants()
            .filter(|n| n.tag_name().name() == "Dimension")
        {
            let Some(cube_dimension_id) = find_child_text(dimension, "CubeDimensionID") else {
                continue;
            };
            if cube_dimension_id == own_dimension_id {
                continue;
            }
            let to_table = dimensions
                .iter()
                .find(|(id, _)| id == cube_dimension_id)
                .map(|(_, n)| n.clone())
                .unwrap_or_default();
            relationships.push(Relationship {
                from_table: table_name.clone(),
                from_column: String::new(),
                to_table,
                to_column: String::new(),
                is_active: true,
                cardinality: "M:1".to_string(),
                cross_filtering_behavior: "Single".to_string(),
                from_key_count: 0,
                to_key_count: 0,
                rely_on_referential_integrity: false,
            });
        }
    }

    (measures, relationships)
}
