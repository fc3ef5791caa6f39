//! Shared fixtures: synthetic managed PE images built entirely in memory.

use dotforge::file::{
    CoffHeader, DataDirectory, DirectoryIndex, DosHeader, FileCharacteristics, Machine,
    OptionalHeader, Section, SectionCharacteristics, DATA_DIRECTORY_COUNT, PE32_PLUS_MAGIC,
    PE_SIGNATURE,
};
use dotforge::metadata::cor20header::{Cor20Header, CLI_HEADER_SIZE};
use dotforge::metadata::directory::MetadataBuilder;
use dotforge::metadata::streams::{
    BlobBuilder, GuidBuilder, StringsBuilder, TablesStreamBuilder, UserStringsBuilder,
};
use dotforge::metadata::tables::{TableId, TableRow};
use dotforge::{PeFile, Writer};

/// RVA of the one section every fixture image carries
pub const SECTION_RVA: u32 = 0x1000;

/// RVA of the metadata blob inside the section (the CLI header comes first)
pub const METADATA_RVA: u32 = SECTION_RVA + ((CLI_HEADER_SIZE + 3) & !3);

/// A minimal but complete metadata blob with the canonical five streams.
pub fn build_metadata_blob() -> Vec<u8> {
    let mut strings = StringsBuilder::new();
    let mut guids = GuidBuilder::new();
    let mut tables = TablesStreamBuilder::new();

    let name = strings.add("app.exe");
    let mvid = guids.add(uguid::guid!("0f0e0d0c-0b0a-0908-0706-050403020100"));
    tables.push_row(
        TableRow::from_values(
            TableId::Module,
            vec![0, u64::from(name), u64::from(mvid), 0, 0],
        )
        .unwrap(),
    );

    let mut builder = MetadataBuilder::new("v4.0.30319");
    builder.add_stream("#~", tables.build().unwrap());
    builder.add_stream("#Strings", strings.into_bytes());
    builder.add_stream("#US", UserStringsBuilder::new().into_bytes());
    builder.add_stream("#GUID", guids.into_bytes());
    builder.add_stream("#Blob", BlobBuilder::new().into_bytes());
    builder.build().unwrap()
}

/// The section body: CLI header, padding to 4, then the metadata blob.
#[allow(clippy::cast_possible_truncation)]
pub fn build_cli_section(metadata: &[u8]) -> Vec<u8> {
    let cor20 = Cor20Header::new(METADATA_RVA, metadata.len() as u32);

    let mut writer = Writer::new();
    cor20.write(&mut writer);
    writer.align(4);
    writer.write_bytes(metadata);
    writer.into_inner()
}

/// A full PE32+ image carrying the given metadata blob in its only section.
#[allow(clippy::cast_possible_truncation)]
pub fn build_managed_pe(metadata: &[u8]) -> Vec<u8> {
    let body = build_cli_section(metadata);

    let dos = DosHeader::minimal();

    let mut section = Section::new(
        ".text",
        SectionCharacteristics::CNT_CODE
            | SectionCharacteristics::MEM_EXECUTE
            | SectionCharacteristics::MEM_READ,
        body.clone(),
    )
    .unwrap();
    section.rva = SECTION_RVA;
    section.pointer_to_raw_data = 0x200;
    section.size_of_raw_data = ((body.len() as u32) + 0x1FF) & !0x1FF;

    let mut optional = OptionalHeader {
        magic: PE32_PLUS_MAGIC,
        major_linker_version: 48,
        minor_linker_version: 0,
        size_of_code: section.size_of_raw_data,
        size_of_initialized_data: 0,
        size_of_uninitialized_data: 0,
        address_of_entry_point: 0,
        base_of_code: SECTION_RVA,
        base_of_data: 0,
        image_base: 0x1_4000_0000,
        section_alignment: 0x1000,
        file_alignment: 0x200,
        major_operating_system_version: 4,
        minor_operating_system_version: 0,
        major_image_version: 0,
        minor_image_version: 0,
        major_subsystem_version: 4,
        minor_subsystem_version: 0,
        win32_version_value: 0,
        size_of_image: SECTION_RVA + ((body.len() as u32 + 0xFFF) & !0xFFF),
        size_of_headers: 0x200,
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
    };
    optional.set_directory(
        DirectoryIndex::CliHeader,
        DataDirectory {
            rva: SECTION_RVA,
            size: CLI_HEADER_SIZE,
        },
    );

    let coff = CoffHeader {
        machine: Machine::X64,
        number_of_sections: 1,
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
    section.write_header(&mut writer);
    writer.pad_to(0x200).unwrap();
    writer.write_bytes(&body);
    writer
        .pad_to(0x200 + section.size_of_raw_data as usize)
        .unwrap();
    writer.into_inner()
}

/// Slice the metadata blob out of a parsed image.
pub fn metadata_bytes(pe: &PeFile) -> Vec<u8> {
    let cli = pe.cli_directory();
    let header_bytes = pe.data_at_rva(cli.rva, cli.size as usize).unwrap();
    let cor20 = Cor20Header::read(header_bytes).unwrap();
    pe.data_at_rva(cor20.meta_data_rva, cor20.meta_data_size as usize)
        .unwrap()
        .to_vec()
}

/// Swap a new metadata blob into the image's CLI section.
pub fn embed_metadata(pe: &mut PeFile, metadata: &[u8]) {
    let index = pe.section_by_name(".text").unwrap();
    pe.set_section_data(index, build_cli_section(metadata)).unwrap();
    pe.update_headers();
}
