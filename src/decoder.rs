//! Column decoding: from artifact names to a typed value stream.
//!
//! Two resolution paths exist. A dictionary-encoded column maps every id
//! through its `.dictionary` artifact. A hash-indexed numeric column
//! (hidx present, no dictionary) recovers fixed-point values as
//! `(id + base_id) / magnitude` without materializing a dictionary. A
//! descriptor with neither is undecodable.

use log::{debug, trace};

use crate::abf::AbfStream;
use crate::catalog::ColumnDescriptor;
use crate::column_data::dictionary::Dictionary;
use crate::column_data::idf::IdfFile;
use crate::column_data::idfmeta::IdfMeta;
use crate::error::ModelError;
use crate::value::{Column, Value};

/// Decodes one column to a materialized value vector, cast to the
/// descriptor's semantic type.
pub(crate) fn decode_column(
    stream: &AbfStream,
    desc: &ColumnDescriptor,
) -> Result<Column, ModelError> {
    // The metadata sidecar's catalog name is the IDF name with a literal
    // `meta` suffix, no separator.
    let meta_name = format!("{}meta", desc.idf);
    let meta_bytes = stream.slice(&meta_name)?;
    let meta = IdfMeta::parse(&meta_bytes, &meta_name)?;

    let idf_bytes = stream.slice(&desc.idf)?;
    let idf = IdfFile::parse(&idf_bytes, &desc.idf)?;
    let ids = idf.segments[0].id_stream(&meta, &desc.idf)?;

    trace!(
        "column '{}'[{}]: {} rows, min_data_id={}, bit_width={}, count_bit_packed={}",
        desc.table_name,
        desc.column_name,
        ids.len(),
        meta.min_data_id,
        meta.bit_width,
        meta.count_bit_packed
    );

    let raw: Vec<Value> = if let Some(dictionary_name) = &desc.dictionary {
        let dict_bytes = stream.slice(dictionary_name)?;
        let dictionary = Dictionary::parse(&dict_bytes, meta.min_data_id, dictionary_name)?;
        // Ids outside the dense range (null states) materialize as nulls.
        ids.map(|id| dictionary.get(id).unwrap_or(Value::Null)).collect()
    } else if desc.hidx.is_some() {
        let magnitude = if desc.magnitude > 0.0 { desc.magnitude } else { 1.0 };
        ids.map(|id| Value::Double((f64::from(id) + desc.base_id) / magnitude))
            .collect()
    } else {
        return Err(ModelError::UndecodableColumn {
            table: desc.table_name.clone(),
            column: desc.column_name.clone(),
        });
    };

    let values: Vec<Value> = raw.into_iter().map(|v| v.cast(desc.data_type)).collect();
    debug!(
        "decoded '{}'[{}]: {} values as {}",
        desc.table_name,
        desc.column_name,
        values.len(),
        desc.data_type.name()
    );

    Ok(Column {
        name: desc.column_name.clone(),
        semantic_type: desc.data_type,
        values,
    })
}
