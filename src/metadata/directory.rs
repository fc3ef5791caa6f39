//! The metadata directory: stream dispatch, Edit-and-Continue policy, and rebuild.
//!
//! [`MetadataDirectory`] wraps a metadata blob (the bytes the CLI header points at) and
//! resolves stream names to stream contents. Name resolution is where the two metadata
//! flavors diverge:
//!
//! - **Normal** metadata (`#~` tables stream): lookups are case-sensitive and the
//!   **last** of several identically named streams wins.
//! - **Edit-and-Continue** metadata (detected by a `#-` tables stream or a schema
//!   stream such as `#Schema` / `#JTD`): lookups are case-insensitive and the **first**
//!   occurrence wins. When `#JTD` is present, every heap and table index in the tables
//!   stream widens to 4 bytes.
//!
//! [`MetadataBuilder`] re-emits a directory, preserving unknown streams byte-exactly
//! and allowing streams to be added or replaced.

use std::sync::OnceLock;

use crate::{
    metadata::{
        root::Root,
        streams::{
            Blob, GuidHeap, StreamHeader, Strings, TablesStream, UserStrings,
        },
    },
    Result, Writer,
};

/// Stream names with tables-stream or schema roles
const TABLES_COMPRESSED: &str = "#~";
const TABLES_UNCOMPRESSED: &str = "#-";
const SCHEMA_STREAM: &str = "#Schema";
const JTD_STREAM: &str = "#JTD";

/// A parsed metadata directory with policy-driven stream access.
///
/// Construction parses the root header, validates the stream layout, and
/// detects the metadata flavor. Heap views are cheap and constructed per
/// access; the tables stream is decoded once on first use.
pub struct MetadataDirectory<'a> {
    data: &'a [u8],
    root: Root,
    is_enc: bool,
    force_large: bool,
    tables_cell: OnceLock<Option<TablesStream<'a>>>,
}

impl<'a> MetadataDirectory<'a> {
    /// Parse a metadata directory from the blob the CLI header points at.
    ///
    /// # Errors
    /// Returns a fatal error when the root header is damaged or streams
    /// overlap; individual stream contents are validated on access.
    pub fn parse(data: &'a [u8]) -> Result<MetadataDirectory<'a>> {
        let root = Root::read(data)?;
        root.validate_stream_layout()?;

        let is_enc = root.stream_headers.iter().any(|header| {
            header.name.eq_ignore_ascii_case(TABLES_UNCOMPRESSED)
                || header.name.eq_ignore_ascii_case(SCHEMA_STREAM)
                || header.name.eq_ignore_ascii_case(JTD_STREAM)
        });

        let force_large = root
            .stream_headers
            .iter()
            .any(|header| header.name.eq_ignore_ascii_case(JTD_STREAM));

        Ok(MetadataDirectory {
            data,
            root,
            is_enc,
            force_large,
            tables_cell: OnceLock::new(),
        })
    }

    /// The parsed root header
    #[must_use]
    pub fn root(&self) -> &Root {
        &self.root
    }

    /// True when this directory uses Edit-and-Continue conventions
    #[must_use]
    pub fn is_enc(&self) -> bool {
        self.is_enc
    }

    /// True when `#JTD` forces all heap and table indices to 4 bytes
    #[must_use]
    pub fn has_forced_large_columns(&self) -> bool {
        self.force_large
    }

    /// Resolve a stream name under the flavor's duplicate and case policy.
    #[must_use]
    pub fn stream_header(&self, name: &str) -> Option<&StreamHeader> {
        if self.is_enc {
            self.root
                .stream_headers
                .iter()
                .find(|header| header.name.eq_ignore_ascii_case(name))
        } else {
            self.root
                .stream_headers
                .iter()
                .rev()
                .find(|header| header.name == name)
        }
    }

    /// Contents of the stream resolved for `name`, `None` when absent
    #[must_use]
    pub fn stream(&self, name: &str) -> Option<&'a [u8]> {
        let header = self.stream_header(name)?;
        self.slice(header)
    }

    fn slice(&self, header: &StreamHeader) -> Option<&'a [u8]> {
        let start = header.offset as usize;
        let end = start + header.size as usize;
        self.data.get(start..end)
    }

    /// Every stream in directory order as (name, contents) pairs, duplicates
    /// and unknown streams included
    pub fn streams(&self) -> impl Iterator<Item = (&str, &'a [u8])> + '_ {
        self.root
            .stream_headers
            .iter()
            .filter_map(move |header| self.slice(header).map(|data| (header.name.as_str(), data)))
    }

    fn required(&self, name: &str) -> Result<&'a [u8]> {
        self.stream(name)
            .ok_or_else(|| crate::Error::MissingStream(name.to_string()))
    }

    /// The `#Strings` heap.
    ///
    /// # Errors
    /// Returns [`crate::Error::MissingStream`] when absent, or a parse error
    /// when the heap is structurally damaged.
    pub fn strings(&self) -> Result<Strings<'a>> {
        Strings::from(self.required("#Strings")?)
    }

    /// The `#US` heap.
    ///
    /// # Errors
    /// Returns [`crate::Error::MissingStream`] when absent, or a parse error
    /// when the heap is structurally damaged.
    pub fn user_strings(&self) -> Result<UserStrings<'a>> {
        UserStrings::from(self.required("#US")?)
    }

    /// The `#Blob` heap.
    ///
    /// # Errors
    /// Returns [`crate::Error::MissingStream`] when absent, or a parse error
    /// when the heap is structurally damaged.
    pub fn blob(&self) -> Result<Blob<'a>> {
        Blob::from(self.required("#Blob")?)
    }

    /// The `#GUID` heap.
    ///
    /// # Errors
    /// Returns [`crate::Error::MissingStream`] when absent, or a parse error
    /// when the heap is structurally damaged.
    pub fn guid(&self) -> Result<GuidHeap<'a>> {
        GuidHeap::from(self.required("#GUID")?)
    }

    /// The tables stream, `#~` or `#-` per flavor. Decoded once; later calls
    /// return the published result.
    ///
    /// # Errors
    /// Returns [`crate::Error::MissingStream`] when neither stream is present,
    /// or the decode error when the stream is damaged.
    pub fn tables(&self) -> Result<&TablesStream<'a>> {
        let slice = self.tables_stream_bytes()?;

        let initialized = self
            .tables_cell
            .get_or_init(|| TablesStream::read(slice, self.force_large).ok());

        match initialized {
            Some(stream) => Ok(stream),
            // Re-derive the original error; the cell only publishes successes
            None => match TablesStream::read(slice, self.force_large) {
                Err(error) => Err(error),
                Ok(_) => Err(malformed_error!("Tables stream failed to initialize")),
            },
        }
    }

    fn tables_stream_bytes(&self) -> Result<&'a [u8]> {
        if self.is_enc {
            if let Some(stream) = self.stream(TABLES_UNCOMPRESSED) {
                return Ok(stream);
            }
            return self.required(TABLES_COMPRESSED);
        }

        self.required(TABLES_COMPRESSED)
    }
}

/// Builder re-emitting a metadata directory.
///
/// Streams are kept in order as (name, bytes) pairs; unknown streams pass
/// through untouched. Stream data is aligned to 4 bytes in the output, with
/// each header recording the unpadded size.
pub struct MetadataBuilder {
    /// Major version of the root header
    pub major_version: u16,
    /// Minor version of the root header
    pub minor_version: u16,
    /// Runtime version string
    pub version: String,
    /// Root flags field
    pub flags: u16,
    streams: Vec<(String, Vec<u8>)>,
}

impl MetadataBuilder {
    /// An empty directory with the standard header values
    #[must_use]
    pub fn new(version: &str) -> MetadataBuilder {
        MetadataBuilder {
            major_version: 1,
            minor_version: 1,
            version: version.to_string(),
            flags: 0,
            streams: Vec::new(),
        }
    }

    /// Seed a builder with every stream of an existing directory, order
    /// preserved and duplicates included.
    #[must_use]
    pub fn from_directory(directory: &MetadataDirectory) -> MetadataBuilder {
        MetadataBuilder {
            major_version: directory.root().major_version,
            minor_version: directory.root().minor_version,
            version: directory.root().version.clone(),
            flags: directory.root().flags,
            streams: directory
                .streams()
                .map(|(name, data)| (name.to_string(), data.to_vec()))
                .collect(),
        }
    }

    /// Append a stream at the end of the directory
    pub fn add_stream(&mut self, name: &str, data: Vec<u8>) {
        self.streams.push((name.to_string(), data));
    }

    /// Replace the first stream with this exact name, or append one
    pub fn set_stream(&mut self, name: &str, data: Vec<u8>) {
        match self.streams.iter_mut().find(|(existing, _)| existing == name) {
            Some((_, existing)) => *existing = data,
            None => self.streams.push((name.to_string(), data)),
        }
    }

    /// Remove every stream with this exact name
    pub fn remove_stream(&mut self, name: &str) {
        self.streams.retain(|(existing, _)| existing != name);
    }

    /// The staged streams in directory order
    #[must_use]
    pub fn streams(&self) -> &[(String, Vec<u8>)] {
        &self.streams
    }

    /// Emit the directory blob.
    ///
    /// # Errors
    /// Returns an error when a stream name is oversized or the layout cannot
    /// be represented.
    #[allow(clippy::cast_possible_truncation)]
    pub fn build(&self) -> Result<Vec<u8>> {
        // First pass with zero offsets fixes the header size
        let mut headers: Vec<StreamHeader> = self
            .streams
            .iter()
            .map(|(name, data)| StreamHeader {
                offset: 0,
                size: data.len() as u32,
                name: name.clone(),
            })
            .collect();

        let root_probe = Root {
            signature: crate::metadata::root::METADATA_SIGNATURE,
            major_version: self.major_version,
            minor_version: self.minor_version,
            reserved: 0,
            version: self.version.clone(),
            flags: self.flags,
            stream_headers: headers.clone(),
        };
        let header_size = root_probe.header_size();

        let mut cursor = ((header_size + 3) & !3) as u32;
        for header in &mut headers {
            header.offset = cursor;
            cursor += (header.size + 3) & !3;
        }

        let root = Root {
            stream_headers: headers,
            ..root_probe
        };

        let mut writer = Writer::with_capacity(cursor as usize);
        root.write(&mut writer);

        for (header, (_, data)) in root.stream_headers.iter().zip(&self.streams) {
            writer.pad_to(header.offset as usize)?;
            writer.write_bytes(data);
        }
        writer.align(4);

        Ok(writer.into_inner())
    }
}
