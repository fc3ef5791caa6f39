// Copyright 2025-2026 The dotforge contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]

//! # dotforge
//!
//! A pure-Rust library for reading, transforming, and re-emitting Portable Executable
//! (PE) files that carry an ECMA-335 (.NET CLI) managed payload. `dotforge` models both
//! the physical PE container and the CLI metadata it embeds, and can rebuild either
//! side bit-faithfully after modification, without Windows or the .NET runtime.
//!
//! # Architecture
//!
//! The library is layered bottom-up:
//!
//! - **Binary I/O** - bounded cursors over byte slices with the ECMA-335 compressed
//!   encodings ([`Parser`], [`Writer`])
//! - **PE container** - DOS/COFF/optional headers, sections, data directories,
//!   RVA↔offset mapping, and header rebuild ([`PeFile`])
//! - **Metadata directory** - the `BSJB` root, stream dispatch with Edit-and-Continue
//!   policy, heaps and the tables stream ([`metadata::directory`], [`metadata::streams`])
//! - **Tables** - the 45 row schemas with computed column layouts
//!   ([`metadata::tables`])
//! - **Signatures** - type, method, field, property and local-variable blobs
//!   ([`metadata::signatures`])
//! - **Type system** - assemblies, modules, type definitions and references, with a
//!   configurable comparer and an injectable resolver ([`metadata::typesystem`])
//!
//! # Example
//!
//! ```rust,no_run
//! use dotforge::{PeFile, metadata::directory::MetadataDirectory};
//! use std::path::Path;
//!
//! let pe = PeFile::from_file(Path::new("assembly.dll"))?;
//!
//! let cli = pe.cli_directory();
//! let header_bytes = pe.data_at_rva(cli.rva, cli.size as usize)?;
//! let cor20 = dotforge::metadata::cor20header::Cor20Header::read(header_bytes)?;
//!
//! let blob = pe.data_at_rva(cor20.meta_data_rva, cor20.meta_data_size as usize)?;
//! let metadata = MetadataDirectory::parse(blob)?;
//! println!("runtime {}", metadata.root().version);
//! for (name, data) in metadata.streams() {
//!     println!("  {} ({} bytes)", name, data.len());
//! }
//! # Ok::<(), dotforge::Error>(())
//! ```
//!
//! # Error Handling
//!
//! All fallible operations return [`Result`]. Parse errors on the PE headers, the CLI
//! header, or required heaps are fatal for that file; damage inside optional
//! substructures (export directory, member signatures) degrades to absence, and
//! comparisons and lookups never fail - they return `false` or `None`.

#[macro_use]
pub(crate) mod error;

pub mod file;
pub mod metadata;
pub mod prelude;

/// Convenience alias for `std::result::Result<T, dotforge::Error>`
pub type Result<T> = std::result::Result<T, Error>;

pub use error::Error;
pub use file::{parser::Parser, writer::Writer, Backend, MappingMode, PeFile};
