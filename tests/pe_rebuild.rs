//! Container round trips: rebuild stability, address mapping, and the export
//! directory through on-disk files.

mod common;

use common::{build_managed_pe, build_metadata_blob};
use dotforge::file::{ExportDirectory, ExportedSymbol};
use dotforge::PeFile;
use tempfile::NamedTempFile;

#[test]
fn reparse_after_rebuild_preserves_the_image() {
    let image = build_managed_pe(&build_metadata_blob());
    let mut pe = PeFile::from_vec(image).unwrap();
    let first = pe.write_to_vec().unwrap();

    let mut reparsed = PeFile::from_vec(first.clone()).unwrap();
    let second = reparsed.write_to_vec().unwrap();

    // Header fields, section table and contents all agree
    assert_eq!(first, second);

    let a = PeFile::from_vec(first).unwrap();
    assert_eq!(a.sections().len(), pe.sections().len());
    for (left, right) in a.sections().iter().zip(pe.sections()) {
        assert_eq!(left.name, right.name);
        assert_eq!(left.characteristics, right.characteristics);
        assert_eq!(left.rva, right.rva);
        assert_eq!(left.virtual_size, right.virtual_size);
    }
}

#[test]
fn rva_offset_mapping_inverts() {
    let image = build_managed_pe(&build_metadata_blob());
    let pe = PeFile::from_vec(image).unwrap();

    let section = &pe.sections()[0];
    for delta in [0_u32, 1, 7, section.size_of_raw_data - 1] {
        let rva = section.rva + delta;
        let offset = pe.rva_to_offset(rva).unwrap();
        assert_eq!(pe.offset_to_rva(offset).unwrap(), rva);
    }

    assert!(pe.rva_to_offset(0).is_err());
    assert!(pe.rva_to_offset(0x00FF_FFFF).is_err());
}

#[test]
fn exports_append_through_disk() {
    let image = build_managed_pe(&build_metadata_blob());
    let mut pe = PeFile::from_vec(image).unwrap();

    let mut exports = ExportDirectory {
        name: "SimpleDll.dll".to_string(),
        ordinal_base: 1,
        ..Default::default()
    };
    exports.append(ExportedSymbol::new(0x1010, "First"));
    exports.append(ExportedSymbol::new(0x1020, "Second"));
    pe.set_exports(&exports).unwrap();

    let first_file = NamedTempFile::new().unwrap();
    pe.write_to_file(first_file.path()).unwrap();

    // Load from disk, append a symbol, write again
    let mut reloaded = PeFile::from_file(first_file.path()).unwrap();
    let mut exports = reloaded.exports().unwrap();
    assert_eq!(exports.entries.len(), 2);

    exports.append(ExportedSymbol::new(0x13371337, "MySymbol"));
    reloaded.set_exports(&exports).unwrap();

    let second_file = NamedTempFile::new().unwrap();
    reloaded.write_to_file(second_file.path()).unwrap();

    // The original names survive in order, the appended one comes last
    let last = PeFile::from_file(second_file.path()).unwrap();
    let exports = last.exports().unwrap();
    let names: Vec<Option<&str>> = exports
        .entries
        .iter()
        .map(|entry| entry.name.as_deref())
        .collect();

    assert_eq!(
        names,
        vec![Some("First"), Some("Second"), Some("MySymbol")]
    );
    assert_eq!(exports.entries[2].rva, 0x13371337);
}

#[test]
fn metadata_survives_export_surgery() {
    use common::metadata_bytes;
    use dotforge::metadata::directory::MetadataDirectory;

    let image = build_managed_pe(&build_metadata_blob());
    let mut pe = PeFile::from_vec(image).unwrap();

    let mut exports = ExportDirectory {
        name: "mixed.dll".to_string(),
        ordinal_base: 1,
        ..Default::default()
    };
    exports.append(ExportedSymbol::new(0x1000, "Entry"));
    pe.set_exports(&exports).unwrap();

    let written = pe.write_to_vec().unwrap();
    let reparsed = PeFile::from_vec(written).unwrap();

    // The CLI directory still decodes after sections were appended
    let blob = metadata_bytes(&reparsed);
    let metadata = MetadataDirectory::parse(&blob).unwrap();
    assert!(metadata.root().version.contains("v4.0.30319"));
    assert!(reparsed.exports().is_some());
}
