//! Generic row codec driven by table schemas.
//!
//! Rows are stored as one `u64` per column, wide enough for every column kind. The
//! codec reads and writes exactly the widths the layout dictates, so decoding and
//! re-encoding a row under the same layout is bit-identical.

use crate::{
    file::io::{read_le_at, write_le_at},
    metadata::tables::{CodedIndex, Column, ColumnKind, TableId, TableInfo},
    Result,
};

/// One decoded table row: raw column values in schema order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    /// The table this row belongs to
    pub table: TableId,
    /// Raw column values, one per schema column
    pub values: Vec<u64>,
}

impl TableRow {
    /// An all-zero row of the given table
    #[must_use]
    pub fn new(table: TableId) -> TableRow {
        TableRow {
            table,
            values: vec![0; table.schema().len()],
        }
    }

    /// A row from explicit column values.
    ///
    /// # Errors
    /// Returns [`crate::Error::Error`] when the value count does not match the schema.
    pub fn from_values(table: TableId, values: Vec<u64>) -> Result<TableRow> {
        if values.len() != table.schema().len() {
            return Err(crate::Error::Error(format!(
                "{:?} expects {} columns, got {}",
                table,
                table.schema().len(),
                values.len()
            )));
        }
        Ok(TableRow { table, values })
    }

    /// Decode a row from the tables stream.
    ///
    /// ## Arguments
    /// * 'data' - The row data region
    /// * 'offset' - Read position, advanced past the row
    /// * 'table' - Which table's schema governs the columns
    /// * 'info' - The layout computed for this stream
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncated row data.
    pub fn read(
        data: &[u8],
        offset: &mut usize,
        table: TableId,
        info: &TableInfo,
    ) -> Result<TableRow> {
        let schema = table.schema();
        let mut values = Vec::with_capacity(schema.len());

        for column in schema {
            let value = match column.kind.width(info) {
                1 => u64::from(read_le_at::<u8>(data, offset)?),
                2 => u64::from(read_le_at::<u16>(data, offset)?),
                8 => read_le_at::<u64>(data, offset)?,
                _ => u64::from(read_le_at::<u32>(data, offset)?),
            };
            values.push(value);
        }

        Ok(TableRow { table, values })
    }

    /// Encode this row under the given layout.
    ///
    /// ## Arguments
    /// * 'data' - The output buffer
    /// * 'offset' - Write position, advanced past the row
    /// * 'info' - The layout computed for this stream
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] when a value does not fit its column width.
    #[allow(clippy::cast_possible_truncation)]
    pub fn write(&self, data: &mut [u8], offset: &mut usize, info: &TableInfo) -> Result<()> {
        let schema = self.table.schema();

        for (column, &value) in schema.iter().zip(&self.values) {
            let width = column.kind.width(info);
            let max = match width {
                8 => u64::MAX,
                w => (1_u64 << (u64::from(w) * 8)) - 1,
            };
            if value > max {
                return Err(malformed_error!(
                    "Value 0x{:X} does not fit the {}-byte column {}.{}",
                    value,
                    width,
                    format!("{:?}", self.table),
                    column.name
                ));
            }

            match width {
                1 => write_le_at::<u8>(data, offset, value as u8)?,
                2 => write_le_at::<u16>(data, offset, value as u16)?,
                8 => write_le_at::<u64>(data, offset, value)?,
                _ => write_le_at::<u32>(data, offset, value as u32)?,
            }
        }

        Ok(())
    }

    /// The schema column at `index`
    #[must_use]
    pub fn column(&self, index: usize) -> Option<&'static Column> {
        self.table.schema().get(index)
    }

    /// Raw value of the column at `index`
    #[must_use]
    pub fn value(&self, index: usize) -> u64 {
        self.values[index]
    }

    /// Raw value of the column named `name`, if the schema has one
    #[must_use]
    pub fn value_named(&self, name: &str) -> Option<u64> {
        let index = self
            .table
            .schema()
            .iter()
            .position(|column| column.name == name)?;
        Some(self.values[index])
    }

    /// Set the value of the column at `index`
    pub fn set(&mut self, index: usize, value: u64) {
        self.values[index] = value;
    }

    /// Decode a coded-index column.
    ///
    /// # Errors
    /// Returns [`crate::Error::Error`] when the column is not a coded index, or
    /// [`crate::Error::Malformed`] when the stored tag is invalid.
    #[allow(clippy::cast_possible_truncation)]
    pub fn coded_index(&self, index: usize) -> Result<CodedIndex> {
        let Some(column) = self.column(index) else {
            return Err(crate::Error::Error(format!(
                "Column {} out of range for {:?}",
                index, self.table
            )));
        };

        match column.kind {
            ColumnKind::Coded(ci_type) => CodedIndex::decode(self.values[index] as u32, ci_type),
            _ => Err(crate::Error::Error(format!(
                "Column {}.{} is not a coded index",
                format!("{:?}", self.table),
                column.name
            ))),
        }
    }

    /// Store a coded index into a coded-index column.
    ///
    /// # Errors
    /// Returns [`crate::Error::Error`] when the column is not a coded index or
    /// the table is not a member of the column's tag set.
    pub fn set_coded_index(&mut self, index: usize, value: CodedIndex) -> Result<()> {
        let Some(column) = self.column(index) else {
            return Err(crate::Error::Error(format!(
                "Column {} out of range for {:?}",
                index, self.table
            )));
        };

        match column.kind {
            ColumnKind::Coded(ci_type) => {
                self.values[index] = u64::from(value.encode(ci_type)?);
                Ok(())
            }
            _ => Err(crate::Error::Error(format!(
                "Column {}.{} is not a coded index",
                format!("{:?}", self.table),
                column.name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typeref_roundtrip_short_layout() {
        let info = TableInfo::with_tables(&[(TableId::TypeRef, 1)], 0, false);

        let data = [
            0x01, 0x01, // ResolutionScope
            0x02, 0x02, // TypeName
            0x03, 0x03, // TypeNamespace
        ];

        let mut offset = 0;
        let row = TableRow::read(&data, &mut offset, TableId::TypeRef, &info).unwrap();
        assert_eq!(offset, 6);
        assert_eq!(row.value_named("TypeName"), Some(0x0202));
        assert_eq!(row.value_named("TypeNamespace"), Some(0x0303));

        let scope = row.coded_index(0).unwrap();
        assert_eq!(scope.tag, TableId::ModuleRef);
        assert_eq!(scope.row, 64);

        let mut out = vec![0_u8; 6];
        let mut write_offset = 0;
        row.write(&mut out, &mut write_offset, &info).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn typeref_roundtrip_large_layout() {
        let info = TableInfo::with_tables(
            &[
                (TableId::TypeRef, 1),
                (TableId::AssemblyRef, u32::from(u16::MAX) + 2),
            ],
            0x07,
            false,
        );

        let data = [
            0x01, 0x01, 0x01, 0x01, // ResolutionScope (widened by AssemblyRef row count)
            0x02, 0x02, 0x02, 0x02, // TypeName
            0x03, 0x03, 0x03, 0x03, // TypeNamespace
        ];

        let mut offset = 0;
        let row = TableRow::read(&data, &mut offset, TableId::TypeRef, &info).unwrap();
        assert_eq!(offset, 12);
        assert_eq!(row.value(1), 0x0202_0202);

        let mut out = vec![0_u8; 12];
        let mut write_offset = 0;
        row.write(&mut out, &mut write_offset, &info).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn constant_mixed_widths() {
        let info = TableInfo::with_tables(&[(TableId::Constant, 1)], 0, false);

        let data = [
            0x08, // Type = ELEMENT_TYPE_I4
            0x00, // Padding
            0x05, 0x00, // Parent
            0x20, 0x00, // Value
        ];

        let mut offset = 0;
        let row = TableRow::read(&data, &mut offset, TableId::Constant, &info).unwrap();
        assert_eq!(row.value_named("Type"), Some(0x08));
        assert_eq!(row.value_named("Value"), Some(0x20));

        let parent = row.coded_index(2).unwrap();
        assert_eq!(parent.tag, TableId::Param);
        assert_eq!(parent.row, 1);
    }

    #[test]
    fn oversized_value_is_rejected_on_write() {
        let info = TableInfo::with_tables(&[], 0, false);
        let mut row = TableRow::new(TableId::ModuleRef);
        row.set(0, 0x1_0000); // Name index past the 2-byte layout

        let mut out = vec![0_u8; 8];
        let mut offset = 0;
        assert!(row.write(&mut out, &mut offset, &info).is_err());
    }

    #[test]
    fn coded_index_set_and_get() {
        let mut row = TableRow::new(TableId::TypeRef);
        row.set_coded_index(0, CodedIndex::new(TableId::AssemblyRef, 1))
            .unwrap();

        // (1 << 2) | 2 for ResolutionScope's AssemblyRef tag
        assert_eq!(row.value(0), 0x6);
        let back = row.coded_index(0).unwrap();
        assert_eq!(back.tag, TableId::AssemblyRef);
        assert_eq!(back.row, 1);

        assert!(row.coded_index(1).is_err());
        assert!(row
            .set_coded_index(1, CodedIndex::new(TableId::Module, 0))
            .is_err());
    }
}
