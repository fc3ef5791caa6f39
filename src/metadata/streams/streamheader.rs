//! Stream headers of the metadata directory.
//!
//! Each stream header carries the offset (relative to the metadata root), size, and
//! NUL-terminated name of one stream, with the name padded to a 4-byte boundary. Names
//! are not restricted to the well-known set: tools embed custom streams, and this crate
//! preserves them.
//!
//! # Reference
//! - [ECMA-335 II.24.2.2](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use crate::{file::writer::Writer, Parser, Result};

/// Longest stream name accepted, terminator included
pub const MAX_STREAM_NAME: usize = 32;

/// A stream header: name, position and extent of one stream.
///
/// The header length is not fixed; it depends on the length of the name field,
/// which is NUL-terminated and padded to the next 4-byte boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    /// Offset of the stream, relative to the start of the metadata root
    pub offset: u32,
    /// Size of the stream in bytes
    pub size: u32,
    /// Stream name, at most 31 characters plus the terminator
    pub name: String,
}

impl StreamHeader {
    /// Read a stream header.
    ///
    /// # Arguments
    /// * 'parser' - Cursor positioned at the header; left after the name padding
    ///
    /// # Errors
    /// Returns an error if the data is too short, the name is unterminated
    /// within the 32-byte limit, or the name is not ASCII.
    pub fn read(parser: &mut Parser) -> Result<StreamHeader> {
        let offset = parser.read_le::<u32>()?;
        let size = parser.read_le::<u32>()?;

        let name_start = parser.pos();
        let mut name = String::new();
        loop {
            if name.len() >= MAX_STREAM_NAME {
                return Err(malformed_error!(
                    "Stream name exceeds {} bytes",
                    MAX_STREAM_NAME
                ));
            }

            let byte = parser.read_le::<u8>()?;
            if byte == 0 {
                break;
            }
            if !byte.is_ascii() {
                return Err(malformed_error!("Stream name contains non-ASCII byte {}", byte));
            }
            name.push(char::from(byte));
        }

        if name.is_empty() {
            return Err(malformed_error!("Stream name is empty"));
        }

        // Name is padded with NULs to the next 4-byte boundary
        let consumed = parser.pos() - name_start;
        let padded = (consumed + 3) & !3;
        parser.skip(padded - consumed)?;

        Ok(StreamHeader { offset, size, name })
    }

    /// Emit this header, NUL-padding the name to a 4-byte boundary
    pub fn write(&self, writer: &mut Writer) {
        writer.write_le::<u32>(self.offset);
        writer.write_le::<u32>(self.size);
        writer.write_bytes(self.name.as_bytes());
        writer.write_le::<u8>(0);
        writer.align(4);
    }

    /// On-disk size of this header
    #[must_use]
    pub fn header_size(&self) -> usize {
        8 + ((self.name.len() + 1 + 3) & !3)
    }
}
