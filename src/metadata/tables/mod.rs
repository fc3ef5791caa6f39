//! Metadata table infrastructure: identifiers, schemas, layout and the row codec.
//!
//! The tables stream is decoded in two phases. First the **layout** is computed: from
//! the valid mask, the row counts, the heap-size flags and the force-large flag, a
//! [`TableInfo`] fixes the byte width of every column of every table. Then **rows** are
//! decoded on demand against that layout through the schema-driven codec in [`row`].
//!
//! # Key Components
//!
//! - [`TableId`] - the 45 table identifiers
//! - [`Column`], [`ColumnKind`] - per-table schemas, via [`TableId::schema`]
//! - [`TableInfo`] - large-column selection, computed once per stream
//! - [`CodedIndex`], [`CodedIndexType`] - packed cross-table references
//! - [`TableRow`] - generic decoded row with bit-exact re-encoding

mod codedindex;
mod row;
mod schema;
mod tableid;
mod tableinfo;

pub use codedindex::{CodedIndex, CodedIndexType};
pub use row::TableRow;
pub use schema::{Column, ColumnKind};
pub use tableid::{TableId, MAX_TABLE_ID};
pub use tableinfo::{
    TableInfo, TableInfoRef, TableRowInfo, HEAP_FLAG_EXTRA_DATA, HEAP_FLAG_LARGE_BLOB,
    HEAP_FLAG_LARGE_GUID, HEAP_FLAG_LARGE_STRINGS,
};
