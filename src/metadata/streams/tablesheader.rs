//! The tables stream (`#~` compressed, `#-` uncompressed) reader and builder.
//!
//! The stream starts with a header (reserved dword, schema version, heap-size flags,
//! valid and sorted bitmasks, one row count per valid table, an optional extra-data
//! dword), followed by the packed row data of every valid table in tag order.
//!
//! # Reference
//! - [ECMA-335 II.24.2.6](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use std::collections::BTreeMap;
use std::sync::Arc;

use strum::IntoEnumIterator;

use crate::{
    file::writer::Writer,
    metadata::tables::{
        TableId, TableInfo, TableInfoRef, TableRow, HEAP_FLAG_EXTRA_DATA, MAX_TABLE_ID,
    },
    Parser, Result,
};

/// Decoded view over a tables stream.
///
/// Row data stays in place; rows are decoded on demand against the layout
/// computed at construction.
pub struct TablesStream<'a> {
    /// Leading reserved dword, observed 0
    pub reserved: u32,
    /// Schema major version, 2
    pub major_version: u8,
    /// Schema minor version, 0
    pub minor_version: u8,
    /// Heap-size flag byte
    pub heap_sizes: u8,
    /// Trailing reserved byte, observed 1
    pub reserved2: u8,
    /// Bit vector of present tables
    pub valid: u64,
    /// Bit vector of sorted tables
    pub sorted: u64,
    /// Extra data dword following the row counts, when the flag is set
    pub extra_data: Option<u32>,
    info: TableInfoRef,
    row_data: &'a [u8],
    offsets: Vec<usize>,
}

impl<'a> TablesStream<'a> {
    /// Decode a tables stream.
    ///
    /// ## Arguments
    /// * 'data' - The stream bytes
    /// * 'force_large' - Widen all heap and index columns to 4 bytes (`#JTD` present)
    ///
    /// # Errors
    /// Returns an error on truncation, on valid bits above the known table
    /// range, or when the declared rows exceed the stream.
    pub fn read(data: &'a [u8], force_large: bool) -> Result<TablesStream<'a>> {
        let mut parser = Parser::new(data);

        let reserved = parser.read_le::<u32>()?;
        let major_version = parser.read_le::<u8>()?;
        let minor_version = parser.read_le::<u8>()?;
        let heap_sizes = parser.read_le::<u8>()?;
        let reserved2 = parser.read_le::<u8>()?;
        let valid = parser.read_le::<u64>()?;
        let sorted = parser.read_le::<u64>()?;

        if valid == 0 {
            return Err(malformed_error!("No valid rows in any of the tables"));
        }
        if valid >> (MAX_TABLE_ID + 1) != 0 {
            return Err(malformed_error!(
                "Valid mask 0x{:X} references tables beyond 0x{:X}",
                valid,
                MAX_TABLE_ID
            ));
        }

        let mut counts = vec![0_u32; MAX_TABLE_ID + 1];
        for (index, count) in counts.iter_mut().enumerate() {
            if valid & (1 << index) != 0 {
                *count = parser.read_le::<u32>()?;
            }
        }

        let extra_data = if heap_sizes & HEAP_FLAG_EXTRA_DATA != 0 {
            Some(parser.read_le::<u32>()?)
        } else {
            None
        };

        let info = Arc::new(TableInfo::new(&counts, heap_sizes, force_large));

        // Lay the tables out back to back in tag order
        let mut offsets = vec![0_usize; MAX_TABLE_ID + 1];
        let mut cursor = 0_usize;
        for table in TableId::iter() {
            offsets[table as usize] = cursor;
            let rows = info.row_count(table) as usize;
            cursor += rows * table.row_size(&info) as usize;
        }

        let row_data = &data[parser.pos()..];
        if cursor > row_data.len() {
            return Err(crate::Error::OutOfBounds(parser.pos() + row_data.len()));
        }

        Ok(TablesStream {
            reserved,
            major_version,
            minor_version,
            heap_sizes,
            reserved2,
            valid,
            sorted,
            extra_data,
            info,
            row_data,
            offsets,
        })
    }

    /// The layout computed for this stream
    #[must_use]
    pub fn info(&self) -> &TableInfoRef {
        &self.info
    }

    /// Number of present tables
    #[must_use]
    pub fn table_count(&self) -> u32 {
        self.valid.count_ones()
    }

    /// True when the table's bit is set in the valid mask
    #[must_use]
    pub fn has_table(&self, table: TableId) -> bool {
        self.valid & (1 << (table as u8)) != 0
    }

    /// True when the table's bit is set in the sorted mask
    #[must_use]
    pub fn is_sorted(&self, table: TableId) -> bool {
        self.sorted & (1 << (table as u8)) != 0
    }

    /// Row count of a table, zero when absent
    #[must_use]
    pub fn row_count(&self, table: TableId) -> u32 {
        self.info.row_count(table)
    }

    /// Typed access to one table, `None` when absent
    #[must_use]
    pub fn table(&self, table: TableId) -> Option<TableSlice<'a>> {
        if !self.has_table(table) || self.info.row_count(table) == 0 {
            return None;
        }

        let rows = self.info.row_count(table);
        let row_size = table.row_size(&self.info) as usize;
        let start = self.offsets[table as usize];
        let end = start + rows as usize * row_size;

        Some(TableSlice {
            data: &self.row_data[start..end],
            table,
            rows,
            row_size,
            info: self.info.clone(),
            sorted: self.is_sorted(table),
        })
    }

    /// Iterator over the present tables
    pub fn present_tables(&self) -> impl Iterator<Item = TableId> + '_ {
        TableId::iter().filter(|&table| self.has_table(table))
    }
}

/// A bounds-checked view over one table's packed rows.
pub struct TableSlice<'a> {
    data: &'a [u8],
    table: TableId,
    rows: u32,
    row_size: usize,
    info: TableInfoRef,
    sorted: bool,
}

impl TableSlice<'_> {
    /// The table this slice covers
    #[must_use]
    pub fn id(&self) -> TableId {
        self.table
    }

    /// Number of rows
    #[must_use]
    pub fn row_count(&self) -> u32 {
        self.rows
    }

    /// Whether the stream flags this table as sorted
    #[must_use]
    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    /// Decode the row with the given 1-based identifier.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidToken`] when the identifier is out of range.
    pub fn row(&self, rid: u32) -> Result<TableRow> {
        if rid == 0 || rid > self.rows {
            return Err(crate::Error::InvalidToken(
                crate::metadata::token::Token::from_parts(self.table as u8, rid),
            ));
        }

        let mut offset = (rid - 1) as usize * self.row_size;
        TableRow::read(self.data, &mut offset, self.table, &self.info)
    }

    /// Iterate over all rows in identifier order
    pub fn iter(&self) -> impl Iterator<Item = Result<TableRow>> + '_ {
        (1..=self.rows).map(move |rid| self.row(rid))
    }

    /// Find the first row whose `column` holds `key`.
    ///
    /// Uses binary search when the stream's sorted bit is set for this table,
    /// linear scan otherwise.
    ///
    /// # Errors
    /// Propagates row decoding failures.
    pub fn find_by_key(&self, column: usize, key: u64) -> Result<Option<TableRow>> {
        if !self.sorted {
            for row in self.iter() {
                let row = row?;
                if row.value(column) == key {
                    return Ok(Some(row));
                }
            }
            return Ok(None);
        }

        let mut low = 1_u32;
        let mut high = self.rows;
        let mut hit = None;

        while low <= high {
            let mid = low + (high - low) / 2;
            let row = self.row(mid)?;
            let value = row.value(column);

            if value >= key {
                if value == key {
                    hit = Some(row);
                }
                if mid == 1 {
                    break;
                }
                high = mid - 1;
            } else {
                low = mid + 1;
            }
        }

        Ok(hit)
    }
}

/// Builder that assembles a tables stream from rows.
///
/// The valid mask, row counts and layout are derived from the staged rows;
/// tables covered by the sorted mask are emitted in ascending key order.
pub struct TablesStreamBuilder {
    /// Leading reserved dword
    pub reserved: u32,
    /// Schema major version
    pub major_version: u8,
    /// Schema minor version
    pub minor_version: u8,
    /// Heap-size flag bits (large-heap selections; the extra-data bit is derived)
    pub heap_sizes: u8,
    /// Trailing reserved byte
    pub reserved2: u8,
    /// Sorted-tables mask to declare and honor
    pub sorted: u64,
    /// Extra data dword, present in EnC streams
    pub extra_data: Option<u32>,
    /// Widen all heap and index columns (building alongside `#JTD`)
    pub force_large: bool,
    rows: BTreeMap<TableId, Vec<TableRow>>,
}

impl Default for TablesStreamBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TablesStreamBuilder {
    /// An empty builder with the standard header values and sorted mask
    #[must_use]
    pub fn new() -> TablesStreamBuilder {
        TablesStreamBuilder {
            reserved: 0,
            major_version: 2,
            minor_version: 0,
            heap_sizes: 0,
            reserved2: 1,
            sorted: TableId::default_sorted_mask(),
            extra_data: None,
            force_large: false,
            rows: BTreeMap::new(),
        }
    }

    /// Seed a builder with every row and header field of an existing stream.
    ///
    /// # Errors
    /// Propagates row decoding failures.
    pub fn from_stream(stream: &TablesStream) -> Result<TablesStreamBuilder> {
        let mut builder = TablesStreamBuilder {
            reserved: stream.reserved,
            major_version: stream.major_version,
            minor_version: stream.minor_version,
            heap_sizes: stream.heap_sizes & !HEAP_FLAG_EXTRA_DATA,
            reserved2: stream.reserved2,
            sorted: stream.sorted,
            extra_data: stream.extra_data,
            force_large: stream.info().is_forced_large(),
            rows: BTreeMap::new(),
        };

        for table in stream.present_tables() {
            if let Some(slice) = stream.table(table) {
                let rows: Result<Vec<TableRow>> = slice.iter().collect();
                builder.rows.insert(table, rows?);
            }
        }

        Ok(builder)
    }

    /// Append a row, returning its 1-based identifier
    #[allow(clippy::cast_possible_truncation)]
    pub fn push_row(&mut self, row: TableRow) -> u32 {
        let rows = self.rows.entry(row.table).or_default();
        rows.push(row);
        rows.len() as u32
    }

    /// The staged rows of a table
    #[must_use]
    pub fn rows(&self, table: TableId) -> Option<&[TableRow]> {
        self.rows.get(&table).map(Vec::as_slice)
    }

    /// Mutable access to the staged rows of a table
    pub fn rows_mut(&mut self, table: TableId) -> &mut Vec<TableRow> {
        self.rows.entry(table).or_default()
    }

    /// The layout the emitted stream will use
    #[must_use]
    pub fn layout(&self) -> TableInfo {
        let mut counts = vec![0_u32; MAX_TABLE_ID + 1];
        for (table, rows) in &self.rows {
            #[allow(clippy::cast_possible_truncation)]
            let len = rows.len() as u32;
            counts[*table as usize] = len;
        }
        TableInfo::new(&counts, self.heap_sizes, self.force_large)
    }

    /// Emit the stream.
    ///
    /// # Errors
    /// Returns an error when a staged value does not fit its column under the
    /// derived layout.
    pub fn build(&self) -> Result<Vec<u8>> {
        let info = self.layout();

        let mut valid = 0_u64;
        for (table, rows) in &self.rows {
            if !rows.is_empty() {
                valid |= 1 << (*table as u8);
            }
        }
        if valid == 0 {
            return Err(crate::Error::Error(
                "Cannot emit a tables stream with no rows".to_string(),
            ));
        }

        let mut writer = Writer::new();
        writer.write_le::<u32>(self.reserved);
        writer.write_le::<u8>(self.major_version);
        writer.write_le::<u8>(self.minor_version);

        let mut heap_sizes = self.heap_sizes;
        if self.extra_data.is_some() {
            heap_sizes |= HEAP_FLAG_EXTRA_DATA;
        }
        writer.write_le::<u8>(heap_sizes);
        writer.write_le::<u8>(self.reserved2);
        writer.write_le::<u64>(valid);
        writer.write_le::<u64>(self.sorted);

        for table in TableId::iter() {
            if let Some(rows) = self.rows.get(&table) {
                if !rows.is_empty() {
                    #[allow(clippy::cast_possible_truncation)]
                    writer.write_le::<u32>(rows.len() as u32);
                }
            }
        }

        if let Some(extra) = self.extra_data {
            writer.write_le::<u32>(extra);
        }

        let header_len = writer.pos();
        let mut total_rows = 0_usize;
        for (table, rows) in &self.rows {
            total_rows += rows.len() * table.row_size(&info) as usize;
        }

        let mut data = vec![0_u8; header_len + total_rows];
        data[..header_len].copy_from_slice(writer.as_slice());

        let mut offset = header_len;
        for table in TableId::iter() {
            let Some(rows) = self.rows.get(&table) else {
                continue;
            };

            if self.sorted & (1 << (table as u8)) != 0 {
                if let Some(key_column) = table.sort_column() {
                    let mut sorted_rows: Vec<&TableRow> = rows.iter().collect();
                    sorted_rows.sort_by_key(|row| row.value(key_column));
                    for row in sorted_rows {
                        row.write(&mut data, &mut offset, &info)?;
                    }
                    continue;
                }
            }

            for row in rows {
                row.write(&mut data, &mut offset, &info)?;
            }
        }

        Ok(data)
    }
}
