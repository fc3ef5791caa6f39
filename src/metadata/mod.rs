//! ECMA-335 metadata: the CLI header, the metadata directory, heaps, tables,
//! signatures, and the semantic model layered on top.
//!
//! # Architecture
//!
//! Reading proceeds outside-in. The PE container ([`crate::PeFile`]) locates the CLI
//! data directory; [`cor20header::Cor20Header`] points at the metadata blob;
//! [`directory::MetadataDirectory`] parses the root and dispatches stream names under
//! the normal or Edit-and-Continue policy; [`streams`] decode the heaps and the tables
//! stream; [`signatures`] decode blobs on demand; and [`typesystem`] resolves the raw
//! rows into assemblies, modules and types with configurable identity semantics.
//!
//! Writing runs the same path in reverse: heap and tables builders produce stream
//! bytes, [`directory::MetadataBuilder`] reassembles the directory, and the container
//! realigns and emits the image.

pub mod cor20header;
pub mod directory;
pub mod root;
pub mod signatures;
pub mod streams;
pub mod tables;
/// Metadata tokens identifying table rows.
pub mod token;
pub mod typesystem;
