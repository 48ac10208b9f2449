//! Vertiray: read-only access to the analytical data model embedded in
//! Power BI (`.pbix`) and Excel Power Pivot (`.xlsx`/`.xlsm`) files.
//!
//! The model inside these containers is an Analysis Services Backup
//! (ABF) stream holding VertiPaq column-store artifacts. This crate
//! decompresses the stream (Xpress9 at the container level, Xpress8 for
//! optionally compressed embedded files), parses the container's virtual
//! directory, loads the model catalog (relational for `.pbix`, AS XML
//! for `.xlsx`), and reconstructs row-level table contents by composing
//! each column's dictionary, index data file, and metadata sidecar.
//!
//! # Module structure
//!
//! - `unpack` - zip container detection and stream decompression driver
//! - `xpress` - Xpress9 and Xpress8 decompressors
//! - `abf` - ABF container parsing (header, virtual directory, backup log)
//! - `column_data` - per-column artifact readers (idf, idfmeta,
//!   dictionary, hidx, huffman)
//! - `catalog` - column descriptor enumeration and metadata views
//! - `decoder` - id-stream to typed-value decoding
//! - `model` - the public facade
//!
//! # Example
//!
//! ```no_run
//! use vertiray::Model;
//!
//! # fn main() -> Result<(), vertiray::ModelError> {
//! let model = Model::open("report.pbix")?;
//! for name in model.tables() {
//!     let table = model.get_table(&name)?;
//!     println!("{}: {} rows", name, table.row_count());
//! }
//! # Ok(())
//! # }
//! ```

pub mod abf;
pub mod catalog;
pub mod column_data;
mod decoder;
pub mod error;
pub mod model;
pub mod unpack;
pub mod value;
pub mod xpress;

pub use error::{ArtifactKind, ModelError};
pub use model::{ColumnErrorPolicy, ColumnStatistics, Model, TableOptions};
pub use unpack::ContainerKind;
pub use value::{
    windows_ticks_to_datetime, Column, SchemaEntry, SemanticType, Table, Value,
};
