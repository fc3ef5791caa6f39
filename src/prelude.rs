//! Convenient re-exports of the most commonly used types.
//!
//! ```rust,no_run
//! use dotforge::prelude::*;
//! use std::path::Path;
//!
//! let pe = PeFile::from_file(Path::new("assembly.dll"))?;
//! let metadata_dir = pe.cli_directory();
//! println!("metadata at RVA 0x{:x}", metadata_dir.rva);
//! # Ok::<(), dotforge::Error>(())
//! ```

pub use crate::{
    file::{
        DataDirectory, DirectoryIndex, ExportDirectory, ExportedSymbol, Machine, MappingMode,
        Section, SectionCharacteristics,
    },
    metadata::{
        cor20header::Cor20Header,
        directory::{MetadataBuilder, MetadataDirectory},
        root::Root,
        signatures::{
            SignatureField, SignatureMethod, SignatureParser, SignatureProperty, TypeSignature,
        },
        streams::{
            Blob, BlobBuilder, GuidBuilder, GuidHeap, StreamHeader, Strings, StringsBuilder,
            TablesStream, TablesStreamBuilder, UserStrings, UserStringsBuilder,
        },
        tables::{CodedIndex, CodedIndexType, TableId, TableInfo, TableRow},
        token::Token,
        typesystem::{
            AssemblyIdentity, AssemblyResolver, AssemblyVersion, Module, SignatureComparer,
            TypeReference, TypeScope,
        },
    },
    Error, Parser, PeFile, Result, Writer,
};
