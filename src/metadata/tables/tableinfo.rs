//! Layout selection for the tables stream.
//!
//! Column widths in the tables stream are a global function of (row counts, heap-size
//! flags, force-large flag): a simple index into a table is 2 bytes unless that table
//! has more than 0xFFFF rows; a coded index widens when the largest selectable table
//! row count, shifted by the tag bits, no longer fits 16 bits; heap indices follow the
//! heap-size flag bits, and the `#JTD` stream forces everything to 4 bytes. This module
//! computes that layout once per tables-stream load and caches it.

use std::sync::Arc;

use strum::{EnumCount, IntoEnumIterator};

use crate::metadata::tables::{CodedIndexType, TableId, MAX_TABLE_ID};

/// Heap-size flag: `#Strings` indices are 4 bytes
pub const HEAP_FLAG_LARGE_STRINGS: u8 = 0x01;
/// Heap-size flag: `#GUID` indices are 4 bytes
pub const HEAP_FLAG_LARGE_GUID: u8 = 0x02;
/// Heap-size flag: `#Blob` indices are 4 bytes
pub const HEAP_FLAG_LARGE_BLOB: u8 = 0x04;
/// Heap-size flag: an extra data dword follows the row counts
pub const HEAP_FLAG_EXTRA_DATA: u8 = 0x40;

/// Row count and derived index-width information for one table.
#[derive(Clone, Copy, Default, PartialEq, Debug)]
pub struct TableRowInfo {
    /// The count of rows in this table
    pub rows: u32,
    /// Number of bits required to represent any valid row index
    pub bits: u8,
    /// True when indices into this table need 4 bytes
    pub is_large: bool,
}

impl TableRowInfo {
    /// Derive the index-width information for a table of `rows` rows
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(rows: u32) -> Self {
        let bits = if rows == 0 {
            1
        } else {
            (32 - rows.leading_zeros()) as u8
        };

        Self {
            rows,
            bits,
            is_large: rows > u32::from(u16::MAX),
        }
    }
}

/// The computed column layout of one tables stream.
///
/// Holds row counts for every table, the heap-size selections, and the cached
/// bit widths of every coded index kind. When `force_large` is set (the `#JTD`
/// stream is present), every heap and index column reports 4 bytes regardless
/// of the computed widths.
#[derive(Clone, Default)]
pub struct TableInfo {
    rows: Vec<TableRowInfo>,
    coded_bits: Vec<u8>,
    large_strings: bool,
    large_guid: bool,
    large_blob: bool,
    force_large: bool,
}

/// Cheap-copy reference to a [`TableInfo`]
pub type TableInfoRef = Arc<TableInfo>;

impl TableInfo {
    /// Build the layout from per-table row counts and the heap-size flags.
    ///
    /// ## Arguments
    /// * 'row_counts' - Row count per table index (0x00..=0x2C); missing entries count as empty
    /// * 'heap_sizes' - The heap-size flag byte from the tables stream header
    /// * 'force_large' - Widen every heap and index column to 4 bytes (`#JTD` present)
    #[must_use]
    pub fn new(row_counts: &[u32], heap_sizes: u8, force_large: bool) -> TableInfo {
        let mut rows = vec![TableRowInfo::default(); MAX_TABLE_ID + 1];
        for (index, &count) in row_counts.iter().enumerate().take(MAX_TABLE_ID + 1) {
            if count != 0 {
                rows[index] = TableRowInfo::new(count);
            }
        }

        let mut info = TableInfo {
            rows,
            coded_bits: vec![0; CodedIndexType::COUNT],
            large_strings: heap_sizes & HEAP_FLAG_LARGE_STRINGS != 0,
            large_guid: heap_sizes & HEAP_FLAG_LARGE_GUID != 0,
            large_blob: heap_sizes & HEAP_FLAG_LARGE_BLOB != 0,
            force_large,
        };
        info.cache_coded_bits();
        info
    }

    /// Build a layout from (table, row count) pairs; used by builders and tests.
    #[must_use]
    pub fn with_tables(
        valid_tables: &[(TableId, u32)],
        heap_sizes: u8,
        force_large: bool,
    ) -> TableInfo {
        let mut counts = vec![0_u32; MAX_TABLE_ID + 1];
        for (table, rows) in valid_tables {
            counts[*table as usize] = *rows;
        }
        TableInfo::new(&counts, heap_sizes, force_large)
    }

    fn cache_coded_bits(&mut self) {
        for ci_type in CodedIndexType::iter() {
            let max_bits = ci_type
                .tables()
                .iter()
                .flatten()
                .map(|table| self.rows[*table as usize].bits)
                .max()
                .unwrap_or(1);
            self.coded_bits[ci_type as usize] = max_bits + ci_type.tag_bits();
        }
    }

    /// Row-count information for a table
    #[must_use]
    pub fn get(&self, table: TableId) -> &TableRowInfo {
        &self.rows[table as usize]
    }

    /// Row count of a table, zero when absent
    #[must_use]
    pub fn row_count(&self, table: TableId) -> u32 {
        self.rows[table as usize].rows
    }

    /// True when every heap and index column is forced to 4 bytes
    #[must_use]
    pub fn is_forced_large(&self) -> bool {
        self.force_large
    }

    /// Byte width of `#Strings` heap indices
    #[must_use]
    pub fn str_bytes(&self) -> u8 {
        if self.force_large || self.large_strings {
            4
        } else {
            2
        }
    }

    /// Byte width of `#GUID` heap indices
    #[must_use]
    pub fn guid_bytes(&self) -> u8 {
        if self.force_large || self.large_guid {
            4
        } else {
            2
        }
    }

    /// Byte width of `#Blob` heap indices
    #[must_use]
    pub fn blob_bytes(&self) -> u8 {
        if self.force_large || self.large_blob {
            4
        } else {
            2
        }
    }

    /// Byte width of a simple index into `table`
    #[must_use]
    pub fn table_index_bytes(&self, table: TableId) -> u8 {
        if self.force_large || self.rows[table as usize].is_large {
            4
        } else {
            2
        }
    }

    /// Bit width of a coded index of the given kind
    #[must_use]
    pub fn coded_index_bits(&self, ci_type: CodedIndexType) -> u8 {
        self.coded_bits[ci_type as usize]
    }

    /// Byte width of a coded index of the given kind
    #[must_use]
    pub fn coded_index_bytes(&self, ci_type: CodedIndexType) -> u8 {
        if self.force_large || self.coded_bits[ci_type as usize] > 16 {
            4
        } else {
            2
        }
    }

    /// The heap-size flag byte corresponding to this layout (extra-data bit excluded)
    #[must_use]
    pub fn heap_sizes(&self) -> u8 {
        let mut flags = 0;
        if self.large_strings {
            flags |= HEAP_FLAG_LARGE_STRINGS;
        }
        if self.large_guid {
            flags |= HEAP_FLAG_LARGE_GUID;
        }
        if self.large_blob {
            flags |= HEAP_FLAG_LARGE_BLOB;
        }
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_tables_use_short_indices() {
        let info = TableInfo::with_tables(&[(TableId::TypeDef, 100), (TableId::Field, 500)], 0, false);

        assert_eq!(info.table_index_bytes(TableId::TypeDef), 2);
        assert_eq!(info.table_index_bytes(TableId::Field), 2);
        assert_eq!(info.str_bytes(), 2);
        assert_eq!(info.blob_bytes(), 2);
        assert_eq!(info.coded_index_bytes(CodedIndexType::TypeDefOrRef), 2);
    }

    #[test]
    fn oversized_table_widens_simple_indices() {
        let info = TableInfo::with_tables(&[(TableId::Field, 0x1_0000)], 0, false);

        assert_eq!(info.table_index_bytes(TableId::Field), 4);
        assert_eq!(info.table_index_bytes(TableId::TypeDef), 2);
    }

    #[test]
    fn coded_index_widens_at_tag_shifted_boundary() {
        // TypeDefOrRef has 2 tag bits, so 2^14 rows is the last short size
        let info = TableInfo::with_tables(&[(TableId::TypeDef, 0x3FFF)], 0, false);
        assert_eq!(info.coded_index_bytes(CodedIndexType::TypeDefOrRef), 2);

        let info = TableInfo::with_tables(&[(TableId::TypeDef, 0x4000)], 0, false);
        assert_eq!(info.coded_index_bits(CodedIndexType::TypeDefOrRef), 17);
        assert_eq!(info.coded_index_bytes(CodedIndexType::TypeDefOrRef), 4);
    }

    #[test]
    fn heap_flags_select_widths() {
        let info = TableInfo::with_tables(&[], HEAP_FLAG_LARGE_STRINGS | HEAP_FLAG_LARGE_BLOB, false);

        assert_eq!(info.str_bytes(), 4);
        assert_eq!(info.blob_bytes(), 4);
        assert_eq!(info.guid_bytes(), 2);
        assert_eq!(
            info.heap_sizes(),
            HEAP_FLAG_LARGE_STRINGS | HEAP_FLAG_LARGE_BLOB
        );
    }

    #[test]
    fn forced_large_overrides_everything() {
        let info = TableInfo::with_tables(&[(TableId::TypeDef, 3)], 0, true);

        assert_eq!(info.str_bytes(), 4);
        assert_eq!(info.guid_bytes(), 4);
        assert_eq!(info.blob_bytes(), 4);
        assert_eq!(info.table_index_bytes(TableId::TypeDef), 4);
        assert_eq!(info.coded_index_bytes(CodedIndexType::TypeDefOrRef), 4);
        assert_eq!(info.coded_index_bytes(CodedIndexType::HasCustomAttribute), 4);
    }
}
