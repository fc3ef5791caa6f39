//! PE export directory model.
//!
//! Reads the Export data directory into an editable [`ExportDirectory`] and emits it back
//! as a self-contained blob (directory header, export address table, name pointer table,
//! ordinal table, string table). Symbols keep their export address table order across a
//! round trip; appended symbols land at the end of the table.

use crate::{file::writer::Writer, Parser, Result};

/// A single exported symbol: an RVA, optionally reachable by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedSymbol {
    /// RVA the export points at
    pub rva: u32,
    /// Exported name; `None` for ordinal-only exports
    pub name: Option<String>,
}

impl ExportedSymbol {
    /// Create a named export
    #[must_use]
    pub fn new(rva: u32, name: &str) -> ExportedSymbol {
        ExportedSymbol {
            rva,
            name: Some(name.to_string()),
        }
    }
}

/// The decoded export directory of an image.
#[derive(Debug, Clone, Default)]
pub struct ExportDirectory {
    /// Reserved, observed zero
    pub flags: u32,
    /// Time stamp of the export data
    pub time_date_stamp: u32,
    /// Major version, unused by the loader
    pub major_version: u16,
    /// Minor version, unused by the loader
    pub minor_version: u16,
    /// The DLL name recorded in the directory
    pub name: String,
    /// First ordinal, conventionally 1
    pub ordinal_base: u32,
    /// Exports in export address table order
    pub entries: Vec<ExportedSymbol>,
}

impl ExportDirectory {
    /// Decode an export directory.
    ///
    /// ## Arguments
    /// * 'image' - The full image bytes
    /// * 'dir_offset' - File offset of the 40-byte directory within `image`
    /// * 'resolve' - RVA to file offset translation for the surrounding container
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] or [`crate::Error::Malformed`] on damaged
    /// tables; the container treats those as a recoverable absence.
    pub fn read(
        image: &[u8],
        dir_offset: usize,
        resolve: impl Fn(u32) -> Result<u32>,
    ) -> Result<ExportDirectory> {
        let mut parser = Parser::new(image);
        parser.seek(dir_offset)?;

        let flags = parser.read_le::<u32>()?;
        let time_date_stamp = parser.read_le::<u32>()?;
        let major_version = parser.read_le::<u16>()?;
        let minor_version = parser.read_le::<u16>()?;
        let name_rva = parser.read_le::<u32>()?;
        let ordinal_base = parser.read_le::<u32>()?;
        let number_of_functions = parser.read_le::<u32>()?;
        let number_of_names = parser.read_le::<u32>()?;
        let address_table_rva = parser.read_le::<u32>()?;
        let name_pointer_rva = parser.read_le::<u32>()?;
        let ordinal_table_rva = parser.read_le::<u32>()?;

        if number_of_functions > 0x10_0000 || number_of_names > number_of_functions {
            return Err(malformed_error!(
                "Implausible export counts - {} functions, {} names",
                number_of_functions,
                number_of_names
            ));
        }

        let read_string = |rva: u32| -> Result<String> {
            let offset = resolve(rva)? as usize;
            let mut cursor = Parser::new(image);
            cursor.seek(offset)?;
            cursor.read_string_utf8()
        };

        let name = read_string(name_rva)?;

        let mut entries = Vec::with_capacity(number_of_functions as usize);
        {
            let mut eat = Parser::new(image);
            eat.seek(resolve(address_table_rva)? as usize)?;
            for _ in 0..number_of_functions {
                entries.push(ExportedSymbol {
                    rva: eat.read_le::<u32>()?,
                    name: None,
                });
            }
        }

        let mut names = Parser::new(image);
        names.seek(resolve(name_pointer_rva)? as usize)?;
        let mut ordinals = Parser::new(image);
        ordinals.seek(resolve(ordinal_table_rva)? as usize)?;

        for _ in 0..number_of_names {
            let symbol_name_rva = names.read_le::<u32>()?;
            let index = ordinals.read_le::<u16>()? as usize;

            let Some(entry) = entries.get_mut(index) else {
                return Err(malformed_error!("Export ordinal {} out of range", index));
            };
            entry.name = Some(read_string(symbol_name_rva)?);
        }

        Ok(ExportDirectory {
            flags,
            time_date_stamp,
            major_version,
            minor_version,
            name,
            ordinal_base,
            entries,
        })
    }

    /// Append a symbol at the end of the export address table
    pub fn append(&mut self, symbol: ExportedSymbol) {
        self.entries.push(symbol);
    }

    /// Emit the directory as one self-contained blob placed at `base_rva`.
    ///
    /// Layout: 40-byte directory, address table, name pointer table, ordinal
    /// table, then the string table. The name pointer table is emitted in
    /// lexical order as the loader's binary search requires; address table
    /// order is what [`ExportDirectory::read`] reports back.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_bytes(&self, base_rva: u32) -> Vec<u8> {
        let function_count = self.entries.len() as u32;

        let mut named: Vec<(usize, &str)> = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| entry.name.as_deref().map(|name| (index, name)))
            .collect();
        named.sort_by(|a, b| a.1.cmp(b.1));
        let name_count = named.len() as u32;

        let directory_size = 40_u32;
        let address_table_rva = base_rva + directory_size;
        let name_pointer_rva = address_table_rva + function_count * 4;
        let ordinal_table_rva = name_pointer_rva + name_count * 4;
        let string_table_rva = ordinal_table_rva + name_count * 2;

        // DLL name first, then export names in pointer table order
        let mut string_rvas = Vec::with_capacity(named.len());
        let mut strings = Writer::new();
        let dll_name_rva = string_table_rva;
        strings.write_bytes(self.name.as_bytes());
        strings.write_le::<u8>(0);
        for (_, name) in &named {
            string_rvas.push(string_table_rva + strings.pos() as u32);
            strings.write_bytes(name.as_bytes());
            strings.write_le::<u8>(0);
        }

        let mut writer = Writer::new();
        writer.write_le::<u32>(self.flags);
        writer.write_le::<u32>(self.time_date_stamp);
        writer.write_le::<u16>(self.major_version);
        writer.write_le::<u16>(self.minor_version);
        writer.write_le::<u32>(dll_name_rva);
        writer.write_le::<u32>(self.ordinal_base);
        writer.write_le::<u32>(function_count);
        writer.write_le::<u32>(name_count);
        writer.write_le::<u32>(address_table_rva);
        writer.write_le::<u32>(name_pointer_rva);
        writer.write_le::<u32>(ordinal_table_rva);

        for entry in &self.entries {
            writer.write_le::<u32>(entry.rva);
        }

        for rva in &string_rvas {
            writer.write_le::<u32>(*rva);
        }

        for (index, _) in &named {
            writer.write_le::<u16>(*index as u16);
        }

        writer.write_bytes(strings.as_slice());
        writer.into_inner()
    }
}
