//! DOS, COFF and optional header structures of the PE container.
//!
//! These types model the physical header block of a PE image: the DOS header with its
//! embedded stub, the COFF file header, the optional header in both PE32 and PE32+
//! flavors, and the data directory array. Each type reads from a [`crate::Parser`] and
//! writes itself back through a [`crate::Writer`] bit-exactly.
//!
//! # Reference
//! - Microsoft PE/COFF specification, "MS-DOS Stub", "COFF File Header", "Optional Header"

use bitflags::bitflags;

use crate::{file::writer::Writer, Parser, Result};

/// `MZ` signature at offset 0 of every PE file
pub const DOS_MAGIC: u16 = 0x5A4D;

/// `PE\0\0` signature at `e_lfanew`
pub const PE_SIGNATURE: u32 = 0x0000_4550;

/// Optional header magic for 32-bit images
pub const PE32_MAGIC: u16 = 0x010B;

/// Optional header magic for 64-bit images
pub const PE32_PLUS_MAGIC: u16 = 0x020B;

/// Number of data directory slots in the optional header
pub const DATA_DIRECTORY_COUNT: usize = 16;

/// Target machine of a PE image.
///
/// The three variants this library can re-execute through its collaborators are
/// modeled explicitly; anything else passes through untouched via [`Machine::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Machine {
    /// 32-bit Intel x86 (`0x014C`)
    X86,
    /// 64-bit x86-64 (`0x8664`)
    X64,
    /// 64-bit ARM (`0xAA64`)
    Arm64,
    /// Any other machine value, carried through verbatim
    Other(u16),
}

impl Machine {
    /// Decode from the raw COFF machine field
    #[must_use]
    pub fn from_raw(value: u16) -> Machine {
        match value {
            0x014C => Machine::X86,
            0x8664 => Machine::X64,
            0xAA64 => Machine::Arm64,
            other => Machine::Other(other),
        }
    }

    /// The raw COFF machine value
    #[must_use]
    pub fn to_raw(self) -> u16 {
        match self {
            Machine::X86 => 0x014C,
            Machine::X64 => 0x8664,
            Machine::Arm64 => 0xAA64,
            Machine::Other(value) => value,
        }
    }
}

bitflags! {
    /// COFF characteristics flags of the file header
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileCharacteristics: u16 {
        /// Relocation information stripped
        const RELOCS_STRIPPED = 0x0001;
        /// The image is valid and can be run
        const EXECUTABLE_IMAGE = 0x0002;
        /// Application can handle > 2GB addresses
        const LARGE_ADDRESS_AWARE = 0x0020;
        /// Machine is based on a 32-bit word architecture
        const MACHINE_32BIT = 0x0100;
        /// Debugging information removed
        const DEBUG_STRIPPED = 0x0200;
        /// The image is a DLL
        const DLL = 0x2000;
    }
}

/// The DOS header plus the stub program preceding the PE signature.
///
/// Only `e_lfanew` is interpreted; everything before the PE signature, stub
/// included, is captured verbatim so a rebuild reproduces it byte-exactly.
pub struct DosHeader {
    /// Offset of the `PE\0\0` signature
    pub e_lfanew: u32,
    /// The raw bytes from offset 0 up to `e_lfanew` (headers and stub)
    pub stub: Vec<u8>,
}

impl DosHeader {
    /// Read the DOS header and stub from the start of an image.
    ///
    /// ## Arguments
    /// * 'parser' - Cursor positioned at offset 0 of the image
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidPe`] when the `MZ` signature is absent or
    /// `e_lfanew` points outside the file.
    pub fn read(parser: &mut Parser) -> Result<DosHeader> {
        let magic = parser.read_le::<u16>()?;
        if magic != DOS_MAGIC {
            return Err(invalid_pe!("Missing MZ signature (found 0x{:04X})", magic));
        }

        parser.seek(0x3C)?;
        let e_lfanew = parser.read_le::<u32>()?;
        if e_lfanew < 0x40 || e_lfanew as usize >= parser.len() {
            return Err(invalid_pe!("e_lfanew 0x{:X} out of range", e_lfanew));
        }

        parser.seek(0)?;
        let stub = parser.read_bytes(e_lfanew as usize)?.to_vec();

        Ok(DosHeader { e_lfanew, stub })
    }

    /// Emit the DOS header and stub
    pub fn write(&self, writer: &mut Writer) {
        writer.write_bytes(&self.stub);
    }

    /// A minimal DOS header for synthesized images: no stub program, with
    /// `e_lfanew` immediately after the 64 header bytes.
    #[must_use]
    pub fn minimal() -> DosHeader {
        let mut stub = vec![0_u8; 0x40];
        stub[0] = 0x4D;
        stub[1] = 0x5A;
        stub[0x3C] = 0x40;

        DosHeader {
            e_lfanew: 0x40,
            stub,
        }
    }
}

/// The COFF file header following the PE signature.
pub struct CoffHeader {
    /// Target machine
    pub machine: Machine,
    /// Number of entries in the section table
    pub number_of_sections: u16,
    /// Low 32 bits of the link time
    pub time_date_stamp: u32,
    /// File offset of the deprecated COFF symbol table, zero for images
    pub pointer_to_symbol_table: u32,
    /// Number of entries in the deprecated COFF symbol table
    pub number_of_symbols: u32,
    /// Size in bytes of the optional header that follows
    pub size_of_optional_header: u16,
    /// COFF characteristics
    pub characteristics: u16,
}

impl CoffHeader {
    /// Size of the COFF file header on disk
    pub const SIZE: usize = 20;

    /// Read the COFF header.
    ///
    /// ## Arguments
    /// * 'parser' - Cursor positioned directly after the `PE\0\0` signature
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncated input.
    pub fn read(parser: &mut Parser) -> Result<CoffHeader> {
        Ok(CoffHeader {
            machine: Machine::from_raw(parser.read_le::<u16>()?),
            number_of_sections: parser.read_le::<u16>()?,
            time_date_stamp: parser.read_le::<u32>()?,
            pointer_to_symbol_table: parser.read_le::<u32>()?,
            number_of_symbols: parser.read_le::<u32>()?,
            size_of_optional_header: parser.read_le::<u16>()?,
            characteristics: parser.read_le::<u16>()?,
        })
    }

    /// Emit the COFF header
    pub fn write(&self, writer: &mut Writer) {
        writer.write_le::<u16>(self.machine.to_raw());
        writer.write_le::<u16>(self.number_of_sections);
        writer.write_le::<u32>(self.time_date_stamp);
        writer.write_le::<u32>(self.pointer_to_symbol_table);
        writer.write_le::<u32>(self.number_of_symbols);
        writer.write_le::<u16>(self.size_of_optional_header);
        writer.write_le::<u16>(self.characteristics);
    }
}

/// An (RVA, size) pair in the optional header's data directory array.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataDirectory {
    /// RVA of the directory contents, zero if absent
    pub rva: u32,
    /// Size of the directory contents in bytes
    pub size: u32,
}

impl DataDirectory {
    /// Returns true if this directory slot is unused
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rva == 0 && self.size == 0
    }
}

/// Well-known data directory slots.
///
/// Values are indices into [`OptionalHeader::data_directories`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum DirectoryIndex {
    /// Export directory
    Export = 0,
    /// Import directory
    Import = 1,
    /// Resource directory
    Resource = 2,
    /// Exception directory
    Exception = 3,
    /// Certificate (security) directory
    Certificate = 4,
    /// Base relocation directory
    BaseRelocation = 5,
    /// Debug directory
    Debug = 6,
    /// Architecture-specific data
    Architecture = 7,
    /// Global pointer register RVA
    GlobalPtr = 8,
    /// Thread local storage directory
    Tls = 9,
    /// Load configuration directory
    LoadConfig = 10,
    /// Bound import directory
    BoundImport = 11,
    /// Import address table
    Iat = 12,
    /// Delay-load import descriptors
    DelayImport = 13,
    /// CLI (COM descriptor) header
    CliHeader = 14,
    /// Reserved, must be zero
    Reserved = 15,
}

/// The optional header of a PE image, covering both PE32 and PE32+ layouts.
///
/// Fields that only exist in one of the two layouts (`base_of_data`) or that
/// widen between them (image base, stack and heap sizes) are stored in their
/// widest form and narrowed on write.
pub struct OptionalHeader {
    /// `PE32_MAGIC` or `PE32_PLUS_MAGIC`
    pub magic: u16,
    /// Linker major version
    pub major_linker_version: u8,
    /// Linker minor version
    pub minor_linker_version: u8,
    /// Sum of all code section sizes
    pub size_of_code: u32,
    /// Sum of all initialized data section sizes
    pub size_of_initialized_data: u32,
    /// Sum of all uninitialized data section sizes
    pub size_of_uninitialized_data: u32,
    /// RVA of the entry point, zero when none
    pub address_of_entry_point: u32,
    /// RVA of the first code byte
    pub base_of_code: u32,
    /// RVA of the first data byte (PE32 only, absent in PE32+)
    pub base_of_data: u32,
    /// Preferred load address
    pub image_base: u64,
    /// Alignment of sections in memory
    pub section_alignment: u32,
    /// Alignment of section data in the file
    pub file_alignment: u32,
    /// Required OS major version
    pub major_operating_system_version: u16,
    /// Required OS minor version
    pub minor_operating_system_version: u16,
    /// Image major version
    pub major_image_version: u16,
    /// Image minor version
    pub minor_image_version: u16,
    /// Subsystem major version
    pub major_subsystem_version: u16,
    /// Subsystem minor version
    pub minor_subsystem_version: u16,
    /// Reserved, must be zero
    pub win32_version_value: u32,
    /// Size of the image in memory, multiple of `section_alignment`
    pub size_of_image: u32,
    /// Size of the header block, multiple of `file_alignment`
    pub size_of_headers: u32,
    /// Image checksum, zero when unchecked
    pub checksum: u32,
    /// Required subsystem
    pub subsystem: u16,
    /// DLL characteristics
    pub dll_characteristics: u16,
    /// Stack reserve size
    pub size_of_stack_reserve: u64,
    /// Stack commit size
    pub size_of_stack_commit: u64,
    /// Heap reserve size
    pub size_of_heap_reserve: u64,
    /// Heap commit size
    pub size_of_heap_commit: u64,
    /// Reserved, must be zero
    pub loader_flags: u32,
    /// Number of data directory entries that follow
    pub number_of_rva_and_sizes: u32,
    /// The data directory array; slots past `number_of_rva_and_sizes` are zero
    pub data_directories: [DataDirectory; DATA_DIRECTORY_COUNT],
}

impl OptionalHeader {
    /// Returns true for PE32+ (64-bit) images
    #[must_use]
    pub fn is_pe32_plus(&self) -> bool {
        self.magic == PE32_PLUS_MAGIC
    }

    /// Size of this header on disk, including the data directory array
    #[must_use]
    pub fn physical_size(&self) -> usize {
        let fixed = if self.is_pe32_plus() { 112 } else { 96 };
        fixed + self.number_of_rva_and_sizes as usize * 8
    }

    /// Access a well-known data directory slot
    #[must_use]
    pub fn directory(&self, index: DirectoryIndex) -> DataDirectory {
        self.data_directories[index as usize]
    }

    /// Replace a well-known data directory slot
    pub fn set_directory(&mut self, index: DirectoryIndex, directory: DataDirectory) {
        self.data_directories[index as usize] = directory;
    }

    /// Read the optional header, dispatching on the PE32 / PE32+ magic.
    ///
    /// ## Arguments
    /// * 'parser' - Cursor positioned at the optional header magic
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidPe`] on an unknown magic or an oversized
    /// directory count, [`crate::Error::OutOfBounds`] on truncation.
    pub fn read(parser: &mut Parser) -> Result<OptionalHeader> {
        let magic = parser.read_le::<u16>()?;
        if magic != PE32_MAGIC && magic != PE32_PLUS_MAGIC {
            return Err(invalid_pe!("Unknown optional header magic 0x{:04X}", magic));
        }
        let plus = magic == PE32_PLUS_MAGIC;

        let major_linker_version = parser.read_le::<u8>()?;
        let minor_linker_version = parser.read_le::<u8>()?;
        let size_of_code = parser.read_le::<u32>()?;
        let size_of_initialized_data = parser.read_le::<u32>()?;
        let size_of_uninitialized_data = parser.read_le::<u32>()?;
        let address_of_entry_point = parser.read_le::<u32>()?;
        let base_of_code = parser.read_le::<u32>()?;

        let (base_of_data, image_base) = if plus {
            (0, parser.read_le::<u64>()?)
        } else {
            (
                parser.read_le::<u32>()?,
                u64::from(parser.read_le::<u32>()?),
            )
        };

        let section_alignment = parser.read_le::<u32>()?;
        let file_alignment = parser.read_le::<u32>()?;
        if !section_alignment.is_power_of_two() || !file_alignment.is_power_of_two() {
            return Err(invalid_pe!(
                "Alignments must be powers of two - section 0x{:X}, file 0x{:X}",
                section_alignment,
                file_alignment
            ));
        }
        if file_alignment > section_alignment {
            return Err(invalid_pe!(
                "FileAlignment 0x{:X} exceeds SectionAlignment 0x{:X}",
                file_alignment,
                section_alignment
            ));
        }

        let major_operating_system_version = parser.read_le::<u16>()?;
        let minor_operating_system_version = parser.read_le::<u16>()?;
        let major_image_version = parser.read_le::<u16>()?;
        let minor_image_version = parser.read_le::<u16>()?;
        let major_subsystem_version = parser.read_le::<u16>()?;
        let minor_subsystem_version = parser.read_le::<u16>()?;
        let win32_version_value = parser.read_le::<u32>()?;
        let size_of_image = parser.read_le::<u32>()?;
        let size_of_headers = parser.read_le::<u32>()?;
        let checksum = parser.read_le::<u32>()?;
        let subsystem = parser.read_le::<u16>()?;
        let dll_characteristics = parser.read_le::<u16>()?;

        let (size_of_stack_reserve, size_of_stack_commit, size_of_heap_reserve, size_of_heap_commit) =
            if plus {
                (
                    parser.read_le::<u64>()?,
                    parser.read_le::<u64>()?,
                    parser.read_le::<u64>()?,
                    parser.read_le::<u64>()?,
                )
            } else {
                (
                    u64::from(parser.read_le::<u32>()?),
                    u64::from(parser.read_le::<u32>()?),
                    u64::from(parser.read_le::<u32>()?),
                    u64::from(parser.read_le::<u32>()?),
                )
            };

        let loader_flags = parser.read_le::<u32>()?;
        let number_of_rva_and_sizes = parser.read_le::<u32>()?;
        if number_of_rva_and_sizes as usize > DATA_DIRECTORY_COUNT {
            return Err(invalid_pe!(
                "Data directory count {} exceeds {}",
                number_of_rva_and_sizes,
                DATA_DIRECTORY_COUNT
            ));
        }

        let mut data_directories = [DataDirectory::default(); DATA_DIRECTORY_COUNT];
        for directory in data_directories
            .iter_mut()
            .take(number_of_rva_and_sizes as usize)
        {
            directory.rva = parser.read_le::<u32>()?;
            directory.size = parser.read_le::<u32>()?;
        }

        Ok(OptionalHeader {
            magic,
            major_linker_version,
            minor_linker_version,
            size_of_code,
            size_of_initialized_data,
            size_of_uninitialized_data,
            address_of_entry_point,
            base_of_code,
            base_of_data,
            image_base,
            section_alignment,
            file_alignment,
            major_operating_system_version,
            minor_operating_system_version,
            major_image_version,
            minor_image_version,
            major_subsystem_version,
            minor_subsystem_version,
            win32_version_value,
            size_of_image,
            size_of_headers,
            checksum,
            subsystem,
            dll_characteristics,
            size_of_stack_reserve,
            size_of_stack_commit,
            size_of_heap_reserve,
            size_of_heap_commit,
            loader_flags,
            number_of_rva_and_sizes,
            data_directories,
        })
    }

    /// Emit the optional header, narrowing wide fields for PE32.
    pub fn write(&self, writer: &mut Writer) {
        let plus = self.is_pe32_plus();

        writer.write_le::<u16>(self.magic);
        writer.write_le::<u8>(self.major_linker_version);
        writer.write_le::<u8>(self.minor_linker_version);
        writer.write_le::<u32>(self.size_of_code);
        writer.write_le::<u32>(self.size_of_initialized_data);
        writer.write_le::<u32>(self.size_of_uninitialized_data);
        writer.write_le::<u32>(self.address_of_entry_point);
        writer.write_le::<u32>(self.base_of_code);

        #[allow(clippy::cast_possible_truncation)]
        if plus {
            writer.write_le::<u64>(self.image_base);
        } else {
            writer.write_le::<u32>(self.base_of_data);
            writer.write_le::<u32>(self.image_base as u32);
        }

        writer.write_le::<u32>(self.section_alignment);
        writer.write_le::<u32>(self.file_alignment);
        writer.write_le::<u16>(self.major_operating_system_version);
        writer.write_le::<u16>(self.minor_operating_system_version);
        writer.write_le::<u16>(self.major_image_version);
        writer.write_le::<u16>(self.minor_image_version);
        writer.write_le::<u16>(self.major_subsystem_version);
        writer.write_le::<u16>(self.minor_subsystem_version);
        writer.write_le::<u32>(self.win32_version_value);
        writer.write_le::<u32>(self.size_of_image);
        writer.write_le::<u32>(self.size_of_headers);
        writer.write_le::<u32>(self.checksum);
        writer.write_le::<u16>(self.subsystem);
        writer.write_le::<u16>(self.dll_characteristics);

        #[allow(clippy::cast_possible_truncation)]
        if plus {
            writer.write_le::<u64>(self.size_of_stack_reserve);
            writer.write_le::<u64>(self.size_of_stack_commit);
            writer.write_le::<u64>(self.size_of_heap_reserve);
            writer.write_le::<u64>(self.size_of_heap_commit);
        } else {
            writer.write_le::<u32>(self.size_of_stack_reserve as u32);
            writer.write_le::<u32>(self.size_of_stack_commit as u32);
            writer.write_le::<u32>(self.size_of_heap_reserve as u32);
            writer.write_le::<u32>(self.size_of_heap_commit as u32);
        }

        writer.write_le::<u32>(self.loader_flags);
        writer.write_le::<u32>(self.number_of_rva_and_sizes);

        for directory in self
            .data_directories
            .iter()
            .take(self.number_of_rva_and_sizes as usize)
        {
            writer.write_le::<u32>(directory.rva);
            writer.write_le::<u32>(directory.size);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pe32_plus() -> OptionalHeader {
        OptionalHeader {
            magic: PE32_PLUS_MAGIC,
            major_linker_version: 14,
            minor_linker_version: 0,
            size_of_code: 0x1000,
            size_of_initialized_data: 0x800,
            size_of_uninitialized_data: 0,
            address_of_entry_point: 0x1234,
            base_of_code: 0x1000,
            base_of_data: 0,
            image_base: 0x1_8000_0000,
            section_alignment: 0x2000,
            file_alignment: 0x200,
            major_operating_system_version: 6,
            minor_operating_system_version: 0,
            major_image_version: 0,
            minor_image_version: 0,
            major_subsystem_version: 6,
            minor_subsystem_version: 0,
            win32_version_value: 0,
            size_of_image: 0x8000,
            size_of_headers: 0x400,
            checksum: 0,
            subsystem: 3,
            dll_characteristics: 0x8560,
            size_of_stack_reserve: 0x10_0000,
            size_of_stack_commit: 0x1000,
            size_of_heap_reserve: 0x10_0000,
            size_of_heap_commit: 0x1000,
            loader_flags: 0,
            number_of_rva_and_sizes: 16,
            data_directories: [DataDirectory::default(); DATA_DIRECTORY_COUNT],
        }
    }

    #[test]
    fn machine_mapping() {
        assert_eq!(Machine::from_raw(0x014C), Machine::X86);
        assert_eq!(Machine::from_raw(0x8664), Machine::X64);
        assert_eq!(Machine::from_raw(0xAA64), Machine::Arm64);
        assert_eq!(Machine::from_raw(0x01C4), Machine::Other(0x01C4));
        assert_eq!(Machine::Other(0x01C4).to_raw(), 0x01C4);
    }

    #[test]
    fn optional_header_roundtrip_pe32_plus() {
        let mut header = sample_pe32_plus();
        header.data_directories[DirectoryIndex::CliHeader as usize] = DataDirectory {
            rva: 0x2008,
            size: 72,
        };

        let mut writer = Writer::new();
        header.write(&mut writer);
        let bytes = writer.into_inner();
        assert_eq!(bytes.len(), header.physical_size());

        let mut parser = Parser::new(&bytes);
        let reparsed = OptionalHeader::read(&mut parser).unwrap();

        assert!(reparsed.is_pe32_plus());
        assert_eq!(reparsed.image_base, 0x1_8000_0000);
        assert_eq!(reparsed.section_alignment, 0x2000);
        assert_eq!(
            reparsed.directory(DirectoryIndex::CliHeader),
            DataDirectory {
                rva: 0x2008,
                size: 72
            }
        );

        // Re-emit is bit identical
        let mut writer = Writer::new();
        reparsed.write(&mut writer);
        assert_eq!(writer.into_inner(), bytes);
    }

    #[test]
    fn optional_header_roundtrip_pe32() {
        let mut header = sample_pe32_plus();
        header.magic = PE32_MAGIC;
        header.image_base = 0x40_0000;
        header.base_of_data = 0x2000;

        let mut writer = Writer::new();
        header.write(&mut writer);
        let bytes = writer.into_inner();
        assert_eq!(bytes.len(), header.physical_size());

        let mut parser = Parser::new(&bytes);
        let reparsed = OptionalHeader::read(&mut parser).unwrap();
        assert!(!reparsed.is_pe32_plus());
        assert_eq!(reparsed.image_base, 0x40_0000);
        assert_eq!(reparsed.base_of_data, 0x2000);
    }

    #[test]
    fn rejects_bad_alignment() {
        let mut header = sample_pe32_plus();
        header.section_alignment = 0x1800;

        let mut writer = Writer::new();
        header.write(&mut writer);
        let bytes = writer.into_inner();

        let mut parser = Parser::new(&bytes);
        assert!(OptionalHeader::read(&mut parser).is_err());
    }

    #[test]
    fn dos_header_minimal_roundtrip() {
        let dos = DosHeader::minimal();

        let mut writer = Writer::new();
        dos.write(&mut writer);
        // Something must follow e_lfanew for the bounds check to pass
        writer.write_le::<u32>(PE_SIGNATURE);
        let bytes = writer.into_inner();

        let mut parser = Parser::new(&bytes);
        let reparsed = DosHeader::read(&mut parser).unwrap();
        assert_eq!(reparsed.e_lfanew, 0x40);
        assert_eq!(reparsed.stub.len(), 0x40);
    }

    #[test]
    fn dos_header_rejects_non_mz() {
        let data = [0x00_u8; 0x48];
        let mut parser = Parser::new(&data);
        assert!(DosHeader::read(&mut parser).is_err());
    }
}
