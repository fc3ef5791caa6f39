//! PE container model: headers, sections, address translation, and rebuild.
//!
//! This module owns the physical layout of a PE image. [`PeFile`] parses the DOS stub,
//! COFF header, optional header (PE32 and PE32+), the section table and data directory
//! array, and keeps section bodies as lazily sliced views into the backing store. The
//! same structure rebuilds itself: [`PeFile::update_headers`] re-derives every size,
//! offset and directory RVA from current contents, and [`PeFile::write_to_vec`] emits a
//! byte-exact image, zero-padded to `FileAlignment`.
//!
//! # Mapping modes
//!
//! An image parsed from disk is *unmapped*: section bodies live at their file offsets.
//! An image captured from a loaded process is *mapped*: every file offset equals the
//! RVA. [`MappingMode`] selects the translation applied by [`PeFile::rva_to_offset`].
//!
//! # Example
//!
//! ```rust,no_run
//! use dotforge::PeFile;
//! use std::path::Path;
//!
//! let pe = PeFile::from_file(Path::new("assembly.dll"))?;
//! println!("{} sections, image base 0x{:x}", pe.sections().len(), pe.optional_header().image_base);
//!
//! let cli = pe.cli_directory();
//! println!("CLI header at RVA 0x{:x} ({} bytes)", cli.rva, cli.size);
//! # Ok::<(), dotforge::Error>(())
//! ```

pub mod io;
pub mod parser;
pub mod writer;

mod exports;
mod headers;
mod memory;
mod physical;
mod section;
mod segment;

use std::path::Path;

use crate::{Error::Empty, Error::OutOfBounds, Parser, Result};

pub use exports::{ExportDirectory, ExportedSymbol};
pub use headers::{
    CoffHeader, DataDirectory, DirectoryIndex, DosHeader, FileCharacteristics, Machine,
    OptionalHeader, DATA_DIRECTORY_COUNT, DOS_MAGIC, PE32_MAGIC, PE32_PLUS_MAGIC, PE_SIGNATURE,
};
pub use memory::Memory;
pub use physical::Physical;
pub use section::{Section, SectionCharacteristics, SECTION_HEADER_SIZE};
pub use segment::{RelocationParameters, Segment};

use io::align_up;
use writer::Writer;

/// Backend trait for file data sources.
///
/// This trait abstracts over the source of PE data, allowing for both in-memory and
/// on-disk representations. All implementations must be thread-safe.
pub trait Backend: Send + Sync {
    /// Returns a slice of the data at the given offset and length.
    ///
    /// # Arguments
    ///
    /// * `offset` - The starting offset within the data.
    /// * `len` - The length of the slice in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the requested range is out of bounds.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// Returns the entire data buffer.
    fn data(&self) -> &[u8];

    /// Returns the total length of the data buffer.
    fn len(&self) -> usize;
}

/// Address translation mode of a parsed image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingMode {
    /// On-disk layout: section bodies at their file offsets
    Unmapped,
    /// Loaded layout: file offsets equal RVAs for every segment
    Mapped,
}

/// A parsed PE image with editable sections and a rebuild pass.
///
/// `PeFile` is the entry point of the container layer. It validates the header
/// chain on construction and keeps the original bytes so unmodified section
/// bodies are never copied. Mutations (replacing section contents, adding
/// sections, repointing directories) are applied on top; a subsequent
/// [`PeFile::update_headers`] renders the layout consistent again.
pub struct PeFile {
    backend: Box<dyn Backend>,
    mode: MappingMode,
    dos: DosHeader,
    coff: CoffHeader,
    optional: OptionalHeader,
    sections: Vec<Section>,
    /// Backing-store range (start, len) each section body was parsed from;
    /// stays put even when a rebuild re-slots the section
    original_ranges: Vec<(u32, u32)>,
    /// Bytes between the end of the section table and `SizeOfHeaders`
    extra_header_data: Vec<u8>,
    /// Bytes past the last section's raw data
    eof_data: Vec<u8>,
}

impl PeFile {
    /// Loads a PE file from the given path via a memory map.
    ///
    /// # Arguments
    ///
    /// * `file` - Path to the PE file on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is empty, or is not a
    /// structurally valid PE image.
    pub fn from_file(file: &Path) -> Result<PeFile> {
        Self::load(Physical::new(file)?, MappingMode::Unmapped)
    }

    /// Loads a PE file from a memory buffer.
    ///
    /// # Arguments
    ///
    /// * `data` - The bytes of the PE file.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is empty or not a valid PE image.
    pub fn from_vec(data: Vec<u8>) -> Result<PeFile> {
        Self::load(Memory::new(data), MappingMode::Unmapped)
    }

    /// Loads a memory-captured (already mapped) PE image.
    ///
    /// In mapped mode every file offset equals its RVA, so section bodies are
    /// sliced at their virtual addresses.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is empty or not a valid PE image.
    pub fn from_mapped_vec(data: Vec<u8>) -> Result<PeFile> {
        Self::load(Memory::new(data), MappingMode::Mapped)
    }

    fn load<T: Backend + 'static>(backend: T, mode: MappingMode) -> Result<PeFile> {
        if backend.len() == 0 {
            return Err(Empty);
        }

        let data = backend.data();
        let mut parser = Parser::new(data);

        let dos = DosHeader::read(&mut parser)?;

        parser.seek(dos.e_lfanew as usize)?;
        let signature = parser.read_le::<u32>()?;
        if signature != PE_SIGNATURE {
            return Err(invalid_pe!(
                "Missing PE signature at 0x{:X} (found 0x{:08X})",
                dos.e_lfanew,
                signature
            ));
        }

        let coff = CoffHeader::read(&mut parser)?;
        let optional_start = parser.pos();
        let optional = OptionalHeader::read(&mut parser)?;

        // The declared optional header size governs where the section table starts
        parser.seek(optional_start + coff.size_of_optional_header as usize)?;

        let mut sections = Vec::with_capacity(coff.number_of_sections as usize);
        for _ in 0..coff.number_of_sections {
            sections.push(Section::read_header(&mut parser)?);
        }

        for window in sections.windows(2) {
            if window[1].rva <= window[0].rva {
                return Err(invalid_pe!(
                    "Section RVAs are not monotone - 0x{:X} follows 0x{:X}",
                    window[1].rva,
                    window[0].rva
                ));
            }
            let first_end = u64::from(window[0].rva)
                + align_up(
                    u64::from(window[0].virtual_size.max(1)),
                    u64::from(optional.section_alignment),
                );
            if u64::from(window[1].rva) < first_end {
                return Err(invalid_pe!(
                    "Sections overlap - 0x{:X} begins inside the previous section",
                    window[1].rva
                ));
            }
        }

        let header_end = parser.pos();
        let extra_header_data = if (optional.size_of_headers as usize) > header_end
            && (optional.size_of_headers as usize) <= data.len()
        {
            data[header_end..optional.size_of_headers as usize].to_vec()
        } else {
            Vec::new()
        };

        let eof_data = match mode {
            MappingMode::Mapped => Vec::new(),
            MappingMode::Unmapped => {
                let raw_end = sections
                    .iter()
                    .map(|s| s.pointer_to_raw_data as usize + s.size_of_raw_data as usize)
                    .max()
                    .unwrap_or(header_end);
                if raw_end < data.len() {
                    data[raw_end..].to_vec()
                } else {
                    Vec::new()
                }
            }
        };

        let original_ranges = sections
            .iter()
            .map(|section| {
                let start = match mode {
                    MappingMode::Mapped => section.rva,
                    MappingMode::Unmapped => section.pointer_to_raw_data,
                };
                (start, section.size_of_raw_data)
            })
            .collect();

        Ok(PeFile {
            backend: Box::new(backend),
            mode,
            dos,
            coff,
            optional,
            sections,
            original_ranges,
            extra_header_data,
            eof_data,
        })
    }

    /// The translation mode this image was loaded with
    #[must_use]
    pub fn mode(&self) -> MappingMode {
        self.mode
    }

    /// The DOS header and stub
    #[must_use]
    pub fn dos_header(&self) -> &DosHeader {
        &self.dos
    }

    /// The COFF file header
    #[must_use]
    pub fn coff_header(&self) -> &CoffHeader {
        &self.coff
    }

    /// The optional header
    #[must_use]
    pub fn optional_header(&self) -> &OptionalHeader {
        &self.optional
    }

    /// Mutable access to the optional header, for directory repointing
    pub fn optional_header_mut(&mut self) -> &mut OptionalHeader {
        &mut self.optional
    }

    /// The section list in file order
    #[must_use]
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// The CLI (COM descriptor) data directory
    #[must_use]
    pub fn cli_directory(&self) -> DataDirectory {
        self.optional.directory(DirectoryIndex::CliHeader)
    }

    /// Translate an RVA to a file offset.
    ///
    /// In mapped mode this is the identity. In unmapped mode the section list
    /// is scanned linearly; section counts are small enough that anything
    /// cleverer would not pay for itself.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] when the RVA is outside every section.
    pub fn rva_to_offset(&self, rva: u32) -> Result<u32> {
        match self.mode {
            MappingMode::Mapped => Ok(rva),
            MappingMode::Unmapped => self
                .sections
                .iter()
                .find_map(|section| section.rva_to_offset(rva))
                .ok_or(OutOfBounds(rva as usize)),
        }
    }

    /// Translate a file offset to an RVA.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] when the offset is outside every section.
    pub fn offset_to_rva(&self, offset: u32) -> Result<u32> {
        match self.mode {
            MappingMode::Mapped => Ok(offset),
            MappingMode::Unmapped => self
                .sections
                .iter()
                .find_map(|section| section.offset_to_rva(offset))
                .ok_or(OutOfBounds(offset as usize)),
        }
    }

    /// The body of a section, without trailing alignment padding.
    ///
    /// Unmodified bodies are served as views into the backing store; replaced
    /// bodies come from the section itself.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the section's raw range lies
    /// outside the file.
    pub fn section_data(&self, index: usize) -> Result<&[u8]> {
        let Some(section) = self.sections.get(index) else {
            return Err(crate::Error::Error(format!(
                "Section index {} out of range",
                index
            )));
        };

        if !section.data.is_empty() {
            return Ok(&section.data);
        }

        let (start, len) = self.original_ranges.get(index).copied().unwrap_or((0, 0));
        if len == 0 {
            return Ok(&[]);
        }
        self.backend.data_slice(start as usize, len as usize)
    }

    /// Read `size` bytes at an RVA, crossing no section boundary.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] when the range is not backed by a section.
    pub fn data_at_rva(&self, rva: u32, size: usize) -> Result<&[u8]> {
        if self.mode == MappingMode::Mapped {
            return self.backend.data_slice(rva as usize, size);
        }

        for (index, section) in self.sections.iter().enumerate() {
            if section.contains_rva(rva) {
                let delta = (rva - section.rva) as usize;
                let body = self.section_data(index)?;
                if delta + size > body.len() {
                    return Err(OutOfBounds(rva as usize));
                }
                return Ok(&body[delta..delta + size]);
            }
        }

        Err(OutOfBounds(rva as usize))
    }

    /// Locate a section by name
    #[must_use]
    pub fn section_by_name(&self, name: &str) -> Option<usize> {
        self.sections
            .iter()
            .position(|section| section.name_str() == Some(name))
    }

    /// Replace the body of a section.
    ///
    /// The virtual size follows the new body length; the file layout is
    /// reconciled by the next [`PeFile::update_headers`].
    ///
    /// # Errors
    /// Returns [`crate::Error::Error`] for an out-of-range index.
    #[allow(clippy::cast_possible_truncation)]
    pub fn set_section_data(&mut self, index: usize, data: Vec<u8>) -> Result<()> {
        let Some(section) = self.sections.get_mut(index) else {
            return Err(crate::Error::Error(format!(
                "Section index {} out of range",
                index
            )));
        };

        section.virtual_size = data.len() as u32;
        section.size_of_raw_data = data.len() as u32;
        section.data = data;
        Ok(())
    }

    /// Append a section. Its RVA and file offset are assigned by the next
    /// [`PeFile::update_headers`].
    pub fn add_section(&mut self, section: Section) {
        self.sections.push(section);
        self.original_ranges.push((0, 0));
    }

    /// Parse the export data directory, if present and intact.
    ///
    /// Damage inside the export tables is a recoverable condition and reported
    /// as absence, per the container's propagation policy for optional
    /// substructures.
    #[must_use]
    pub fn exports(&self) -> Option<ExportDirectory> {
        let directory = self.optional.directory(DirectoryIndex::Export);
        if directory.is_empty() {
            return None;
        }

        let dir_offset = self.rva_to_offset(directory.rva).ok()? as usize;
        ExportDirectory::read(self.backend.data(), dir_offset, |rva| {
            self.rva_to_offset(rva)
        })
        .ok()
    }

    /// Replace (or install) the export directory.
    ///
    /// The directory blob is placed in a section named `.edata`; an existing
    /// section of that name is reused, otherwise one is appended. The Export
    /// data directory slot is repointed and headers are rebuilt.
    ///
    /// # Errors
    /// Propagates layout failures from the rebuild.
    #[allow(clippy::cast_possible_truncation)]
    pub fn set_exports(&mut self, directory: &ExportDirectory) -> Result<()> {
        let index = match self.section_by_name(".edata") {
            Some(index) => index,
            None => {
                self.add_section(Section::new(
                    ".edata",
                    SectionCharacteristics::CNT_INITIALIZED_DATA | SectionCharacteristics::MEM_READ,
                    Vec::new(),
                )?);
                self.sections.len() - 1
            }
        };

        // Two passes: place the section, then emit the blob against its final RVA
        self.set_section_data(index, vec![0_u8; directory.to_bytes(0).len()])?;
        self.update_headers();

        let base_rva = self.sections[index].rva;
        let bytes = directory.to_bytes(base_rva);
        let size = bytes.len() as u32;
        self.set_section_data(index, bytes)?;

        self.optional.set_directory(
            DirectoryIndex::Export,
            DataDirectory {
                rva: base_rva,
                size,
            },
        );
        self.update_headers();
        Ok(())
    }

    /// Rebuild the header block from current contents.
    ///
    /// Re-derives `NumberOfSections`, `SizeOfOptionalHeader`, `SizeOfHeaders`,
    /// per-section offsets and RVAs, shifts data directory RVAs that live
    /// inside displaced sections, and recomputes `SizeOfImage`. Section
    /// positions that still satisfy alignment and monotonicity are preserved,
    /// so rebuilding an untouched file reproduces its layout.
    #[allow(clippy::cast_possible_truncation)]
    pub fn update_headers(&mut self) {
        let file_alignment = u64::from(self.optional.file_alignment);
        let section_alignment = u64::from(self.optional.section_alignment);

        self.coff.number_of_sections = self.sections.len() as u16;
        self.coff.size_of_optional_header = self.optional.physical_size() as u16;

        let header_size = self.dos.e_lfanew as u64
            + 4
            + CoffHeader::SIZE as u64
            + self.optional.physical_size() as u64
            + self.sections.len() as u64 * SECTION_HEADER_SIZE as u64
            + self.extra_header_data.len() as u64;
        let size_of_headers = align_up(header_size, file_alignment);
        self.optional.size_of_headers = size_of_headers as u32;

        let mut file_cursor = size_of_headers;
        let mut rva_cursor = align_up(size_of_headers.max(1), section_alignment) as u32;

        let mut shifts: Vec<(u32, u32, i64)> = Vec::with_capacity(self.sections.len());

        for section in &mut self.sections {
            let old_rva = section.rva;
            let old_span = section.virtual_size.max(section.size_of_raw_data);

            let body_len = if section.data.is_empty() {
                u64::from(section.size_of_raw_data)
            } else {
                section.data.len() as u64
            };
            let raw_size = align_up(body_len, file_alignment);

            let keep_offset = u64::from(section.pointer_to_raw_data) >= file_cursor
                && u64::from(section.pointer_to_raw_data) % file_alignment == 0
                && section.pointer_to_raw_data != 0;
            if keep_offset {
                file_cursor = u64::from(section.pointer_to_raw_data);
            } else {
                file_cursor = align_up(file_cursor, file_alignment);
            }
            section.pointer_to_raw_data = file_cursor as u32;
            section.size_of_raw_data = raw_size as u32;

            let keep_rva = section.rva >= rva_cursor
                && u64::from(section.rva) % section_alignment == 0
                && section.rva != 0;
            if keep_rva {
                rva_cursor = section.rva;
            }
            section.rva = rva_cursor;

            shifts.push((
                old_rva,
                old_span,
                i64::from(section.rva) - i64::from(old_rva),
            ));

            file_cursor += raw_size;
            rva_cursor += align_up(u64::from(section.virtual_size.max(1)), section_alignment) as u32;
        }

        // Data directories owned by a displaced section move with it
        for directory in &mut self.optional.data_directories {
            if directory.is_empty() {
                continue;
            }
            for &(old_rva, old_span, delta) in &shifts {
                if old_rva != 0
                    && directory.rva >= old_rva
                    && directory.rva < old_rva.saturating_add(old_span)
                {
                    directory.rva = (i64::from(directory.rva) + delta) as u32;
                    break;
                }
            }
        }

        self.optional.size_of_image = match self.sections.last() {
            Some(last) => {
                last.rva
                    + align_up(u64::from(last.virtual_size.max(1)), section_alignment) as u32
            }
            None => align_up(size_of_headers, section_alignment) as u32,
        };
    }

    /// Emit the image as bytes, rebuilding headers first.
    ///
    /// The optional-header checksum is recomputed over the final bytes.
    ///
    /// # Errors
    /// Returns an error only on internal layout inconsistencies.
    pub fn write_to_vec(&mut self) -> Result<Vec<u8>> {
        self.update_headers();

        let mut writer = Writer::with_capacity(self.optional.size_of_headers as usize);
        self.dos.write(&mut writer);
        writer.write_le::<u32>(PE_SIGNATURE);
        self.coff.write(&mut writer);
        self.optional.write(&mut writer);
        for section in &self.sections {
            section.write_header(&mut writer);
        }
        writer.write_bytes(&self.extra_header_data);
        writer.pad_to(self.optional.size_of_headers as usize)?;

        for index in 0..self.sections.len() {
            let section = &self.sections[index];
            writer.pad_to(section.pointer_to_raw_data as usize)?;

            let body_owned;
            let body: &[u8] = if section.data.is_empty() && section.size_of_raw_data != 0 {
                body_owned = self.section_data(index)?.to_vec();
                &body_owned
            } else {
                &section.data
            };

            writer.write_bytes(body);
            writer.pad_to(section.pointer_to_raw_data as usize + section.size_of_raw_data as usize)?;
        }

        writer.write_bytes(&self.eof_data);

        let mut image = writer.into_inner();
        let checksum_offset = self.dos.e_lfanew as usize + 4 + CoffHeader::SIZE + 64;
        let checksum = pe_checksum(&image, checksum_offset);
        image[checksum_offset..checksum_offset + 4].copy_from_slice(&checksum.to_le_bytes());
        self.optional.checksum = checksum;

        Ok(image)
    }

    /// Emit the image to a file on disk.
    ///
    /// # Errors
    /// Propagates layout and I/O failures.
    pub fn write_to_file(&mut self, path: &Path) -> Result<()> {
        let bytes = self.write_to_vec()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

/// The standard PE checksum: a folded 16-bit word sum over the whole file with
/// the checksum field itself skipped, plus the file length.
#[allow(clippy::cast_possible_truncation)]
fn pe_checksum(image: &[u8], checksum_offset: usize) -> u32 {
    let mut sum: u64 = 0;

    let mut index = 0;
    while index < image.len() {
        if index >= checksum_offset && index < checksum_offset + 4 {
            index += 2;
            continue;
        }

        let word = if index + 1 < image.len() {
            u16::from_le_bytes([image[index], image[index + 1]])
        } else {
            u16::from(image[index])
        };

        sum += u64::from(word);
        sum = (sum & 0xFFFF) + (sum >> 16);
        index += 2;
    }

    sum = (sum & 0xFFFF) + (sum >> 16);
    sum as u32 + image.len() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A minimal but complete PE32+ image with two sections
    pub(crate) fn build_sample() -> PeFile {
        let mut pe = PeFile::from_vec(synthesize_image()).unwrap();
        pe.update_headers();
        pe
    }

    pub(crate) fn synthesize_image() -> Vec<u8> {
        let dos = DosHeader::minimal();

        let mut text = Section::new(
            ".text",
            SectionCharacteristics::CNT_CODE
                | SectionCharacteristics::MEM_EXECUTE
                | SectionCharacteristics::MEM_READ,
            vec![0xC3; 0x40],
        )
        .unwrap();
        text.rva = 0x1000;
        text.pointer_to_raw_data = 0x200;
        text.size_of_raw_data = 0x200;

        let mut rdata = Section::new(
            ".rdata",
            SectionCharacteristics::CNT_INITIALIZED_DATA | SectionCharacteristics::MEM_READ,
            vec![0x11; 0x20],
        )
        .unwrap();
        rdata.rva = 0x2000;
        rdata.pointer_to_raw_data = 0x400;
        rdata.size_of_raw_data = 0x200;

        let optional = OptionalHeader {
            magic: PE32_PLUS_MAGIC,
            major_linker_version: 14,
            minor_linker_version: 0,
            size_of_code: 0x200,
            size_of_initialized_data: 0x200,
            size_of_uninitialized_data: 0,
            address_of_entry_point: 0x1000,
            base_of_code: 0x1000,
            base_of_data: 0,
            image_base: 0x1_4000_0000,
            section_alignment: 0x1000,
            file_alignment: 0x200,
            major_operating_system_version: 6,
            minor_operating_system_version: 0,
            major_image_version: 0,
            minor_image_version: 0,
            major_subsystem_version: 6,
            minor_subsystem_version: 0,
            win32_version_value: 0,
            size_of_image: 0x3000,
            size_of_headers: 0x200,
            checksum: 0,
            subsystem: 3,
            dll_characteristics: 0x8160,
            size_of_stack_reserve: 0x10_0000,
            size_of_stack_commit: 0x1000,
            size_of_heap_reserve: 0x10_0000,
            size_of_heap_commit: 0x1000,
            loader_flags: 0,
            number_of_rva_and_sizes: 16,
            data_directories: [DataDirectory::default(); DATA_DIRECTORY_COUNT],
        };

        let coff = CoffHeader {
            machine: Machine::X64,
            number_of_sections: 2,
            time_date_stamp: 0,
            pointer_to_symbol_table: 0,
            number_of_symbols: 0,
            size_of_optional_header: optional.physical_size() as u16,
            characteristics: (FileCharacteristics::EXECUTABLE_IMAGE
                | FileCharacteristics::LARGE_ADDRESS_AWARE)
                .bits(),
        };

        let mut writer = Writer::new();
        dos.write(&mut writer);
        writer.write_le::<u32>(PE_SIGNATURE);
        coff.write(&mut writer);
        optional.write(&mut writer);
        text.write_header(&mut writer);
        rdata.write_header(&mut writer);
        writer.pad_to(0x200).unwrap();
        writer.write_bytes(&text.data);
        writer.pad_to(0x400).unwrap();
        writer.write_bytes(&rdata.data);
        writer.pad_to(0x600).unwrap();
        writer.into_inner()
    }

    #[test]
    fn parse_synthesized_image() {
        let pe = build_sample();

        assert_eq!(pe.coff_header().machine, Machine::X64);
        assert!(pe.optional_header().is_pe32_plus());
        assert_eq!(pe.sections().len(), 2);
        assert_eq!(pe.sections()[0].name_str(), Some(".text"));
        assert_eq!(pe.sections()[1].name_str(), Some(".rdata"));
        assert_eq!(pe.section_data(0).unwrap()[0], 0xC3);
    }

    #[test]
    fn address_translation_roundtrip() {
        let pe = build_sample();

        // Property: offset_to_rva(rva_to_offset(r)) == r for every section RVA
        for rva in [0x1000_u32, 0x1004, 0x103F, 0x2000, 0x201F] {
            let offset = pe.rva_to_offset(rva).unwrap();
            assert_eq!(pe.offset_to_rva(offset).unwrap(), rva);
        }

        assert!(pe.rva_to_offset(0x8000).is_err());
        assert!(pe.rva_to_offset(0).is_err());
    }

    #[test]
    fn mapped_mode_is_identity() {
        // Build a flat mapped view: headers followed by bodies at their RVAs
        let mut pe = build_sample();
        let mut mapped = vec![0_u8; pe.optional_header().size_of_image as usize];
        let file = pe.write_to_vec().unwrap();
        mapped[..pe.optional_header().size_of_headers as usize]
            .copy_from_slice(&file[..pe.optional_header().size_of_headers as usize]);
        for index in 0..pe.sections().len() {
            let section = &pe.sections()[index];
            let body = pe.section_data(index).unwrap();
            let start = section.rva as usize;
            mapped[start..start + body.len()].copy_from_slice(body);
        }

        let view = PeFile::from_mapped_vec(mapped).unwrap();
        assert_eq!(view.rva_to_offset(0x1234).unwrap(), 0x1234);
        assert_eq!(view.section_data(0).unwrap()[0], 0xC3);
    }

    #[test]
    fn rebuild_is_stable() {
        let mut pe = build_sample();
        let first = pe.write_to_vec().unwrap();

        let mut reparsed = PeFile::from_vec(first.clone()).unwrap();
        let second = reparsed.write_to_vec().unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn growing_a_section_shifts_its_successors() {
        let mut pe = build_sample();
        let old_rdata_rva = pe.sections()[1].rva;
        pe.optional_header_mut().set_directory(
            DirectoryIndex::Debug,
            DataDirectory {
                rva: old_rdata_rva + 0x10,
                size: 0x20,
            },
        );

        // Grow .text past its virtual slot
        pe.set_section_data(0, vec![0xC3; 0x1800]).unwrap();
        pe.update_headers();

        let new_rdata_rva = pe.sections()[1].rva;
        assert!(new_rdata_rva > old_rdata_rva);

        // The debug directory lived inside .rdata and moved with it
        let debug = pe.optional_header().directory(DirectoryIndex::Debug);
        assert_eq!(debug.rva, new_rdata_rva + 0x10);

        // Image stays parseable and monotone
        let bytes = pe.write_to_vec().unwrap();
        let reparsed = PeFile::from_vec(bytes).unwrap();
        assert_eq!(reparsed.sections().len(), 2);
        assert!(reparsed.sections()[0].rva < reparsed.sections()[1].rva);
    }

    #[test]
    fn added_section_is_placed_and_readable() {
        let mut pe = build_sample();
        pe.add_section(
            Section::new(
                ".fresh",
                SectionCharacteristics::CNT_INITIALIZED_DATA | SectionCharacteristics::MEM_READ,
                vec![0xAB; 0x30],
            )
            .unwrap(),
        );

        let bytes = pe.write_to_vec().unwrap();
        let reparsed = PeFile::from_vec(bytes).unwrap();

        let index = reparsed.section_by_name(".fresh").unwrap();
        let body = reparsed.section_data(index).unwrap();
        assert_eq!(&body[..0x30], &[0xAB; 0x30][..]);

        let section = &reparsed.sections()[index];
        assert_eq!(section.rva % reparsed.optional_header().section_alignment, 0);
        assert_eq!(
            section.pointer_to_raw_data % reparsed.optional_header().file_alignment,
            0
        );
    }

    #[test]
    fn export_roundtrip_with_append() {
        let mut pe = build_sample();

        let mut directory = ExportDirectory {
            name: "sample.dll".to_string(),
            ordinal_base: 1,
            ..Default::default()
        };
        directory.append(ExportedSymbol::new(0x1000, "Original"));
        pe.set_exports(&directory).unwrap();

        let bytes = pe.write_to_vec().unwrap();
        let mut reparsed = PeFile::from_vec(bytes).unwrap();

        let mut exports = reparsed.exports().unwrap();
        assert_eq!(exports.entries.len(), 1);
        assert_eq!(exports.entries[0], ExportedSymbol::new(0x1000, "Original"));

        exports.append(ExportedSymbol::new(0x13371337, "MySymbol"));
        reparsed.set_exports(&exports).unwrap();

        let bytes = reparsed.write_to_vec().unwrap();
        let reparsed = PeFile::from_vec(bytes).unwrap();
        let exports = reparsed.exports().unwrap();

        assert_eq!(exports.entries.len(), 2);
        assert_eq!(exports.entries[0], ExportedSymbol::new(0x1000, "Original"));
        assert_eq!(
            exports.entries[1],
            ExportedSymbol::new(0x13371337, "MySymbol")
        );
    }

    #[test]
    fn eof_data_survives_rebuild() {
        let mut image = synthesize_image();
        image.extend_from_slice(b"trailing-signature-data");

        let mut pe = PeFile::from_vec(image).unwrap();
        let rebuilt = pe.write_to_vec().unwrap();

        assert!(rebuilt.ends_with(b"trailing-signature-data"));
    }

    #[test]
    fn rejects_garbage() {
        assert!(PeFile::from_vec(vec![]).is_err());
        assert!(PeFile::from_vec(vec![0x4D, 0x5A]).is_err());
        assert!(PeFile::from_vec(vec![0_u8; 0x100]).is_err());
    }
}
