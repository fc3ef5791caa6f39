//! Heap modification through the write pipeline: add entries, rebuild the
//! directory, and verify the additions after a full re-parse.

mod common;

use common::{build_managed_pe, build_metadata_blob, embed_metadata, metadata_bytes};
use dotforge::metadata::directory::{MetadataBuilder, MetadataDirectory};
use dotforge::metadata::streams::{BlobBuilder, StringsBuilder, UserStringsBuilder};
use dotforge::PeFile;

/// Apply a modification to the metadata of a fixture image, write it out,
/// re-parse, and hand the fresh directory bytes to the verifier.
fn round_trip<M, V>(modify: M, verify: V)
where
    M: FnOnce(&mut MetadataBuilder),
    V: FnOnce(&MetadataDirectory),
{
    let image = build_managed_pe(&build_metadata_blob());
    let mut pe = PeFile::from_vec(image).unwrap();

    let blob = metadata_bytes(&pe);
    let metadata = MetadataDirectory::parse(&blob).unwrap();
    let mut builder = MetadataBuilder::from_directory(&metadata);
    modify(&mut builder);

    embed_metadata(&mut pe, &builder.build().unwrap());
    let written = pe.write_to_vec().unwrap();

    let reparsed = PeFile::from_vec(written).unwrap();
    let blob = metadata_bytes(&reparsed);
    verify(&MetadataDirectory::parse(&blob).unwrap());
}

#[test]
fn string_heap_addition_is_persisted() {
    let added = "TestAddedString";

    round_trip(
        |builder| {
            let existing = builder
                .streams()
                .iter()
                .find(|(name, _)| name == "#Strings")
                .map(|(_, data)| data.clone())
                .unwrap();

            let mut strings = StringsBuilder::from_existing(&existing).unwrap();
            strings.add(added);
            builder.set_stream("#Strings", strings.into_bytes());
        },
        |metadata| {
            let strings = metadata.strings().unwrap();
            assert!(
                strings.iter().any(|(_, value)| value == added),
                "added string should be present after the round trip"
            );
            // The module name written by the fixture is still reachable
            assert!(strings.iter().any(|(_, value)| value == "app.exe"));
        },
    );
}

#[test]
fn blob_heap_addition_is_persisted() {
    let added = [0x06_u8, 0x08, 0xFF, 0xAA];

    round_trip(
        |builder| {
            let mut blobs = BlobBuilder::new();
            let offset = blobs.add(&added).unwrap();
            assert_eq!(offset, 1);
            builder.set_stream("#Blob", blobs.into_bytes());
        },
        |metadata| {
            let blobs = metadata.blob().unwrap();
            assert_eq!(blobs.get(1).unwrap(), &added);
        },
    );
}

#[test]
fn user_string_addition_keeps_its_flag() {
    round_trip(
        |builder| {
            let mut user_strings = UserStringsBuilder::new();
            user_strings.add("plain").unwrap();
            user_strings.add("curly 'quote'").unwrap();
            builder.set_stream("#US", user_strings.into_bytes());
        },
        |metadata| {
            let heap = metadata.user_strings().unwrap();
            let entries: Vec<_> = heap.iter().collect();
            assert_eq!(entries.len(), 2);

            let (offset, value) = &entries[0];
            assert_eq!(value.to_string_lossy(), "plain");
            assert_eq!(heap.get_with_flag(*offset).unwrap().1, 0);

            // The apostrophe forces the high-char flag
            let (offset, value) = &entries[1];
            assert_eq!(value.to_string_lossy(), "curly 'quote'");
            assert_eq!(heap.get_with_flag(*offset).unwrap().1, 1);
        },
    );
}

#[test]
fn heap_offsets_stay_stable_while_growing() {
    let image = build_managed_pe(&build_metadata_blob());
    let pe = PeFile::from_vec(image).unwrap();
    let blob = metadata_bytes(&pe);
    let metadata = MetadataDirectory::parse(&blob).unwrap();

    let existing = metadata.stream("#Strings").unwrap();
    let mut strings = StringsBuilder::from_existing(existing).unwrap();

    let first = strings.add("GrowthOne");
    let len_after_first = strings.len();
    let second = strings.add("GrowthTwo");
    let first_again = strings.add("GrowthOne");

    // Offsets previously handed out never move
    assert_eq!(first, first_again);
    assert!(second as usize >= len_after_first - "GrowthTwo".len() - 1);
    assert!(strings.len() > existing.len());
}
