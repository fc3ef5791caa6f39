//! Metadata root header and stream directory.
//!
//! The root is the entry point of the CLI metadata blob: the `BSJB` signature, the
//! version string (length-prefixed, NUL-padded to 4 bytes), two reserved version fields,
//! flags, and the ordered list of stream headers. Duplicate stream names are legal here;
//! which duplicate wins is a policy of the stream dispatcher, not of the root.
//!
//! # Reference
//! - [ECMA-335 II.24.2.1](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use crate::{
    file::writer::Writer, metadata::streams::StreamHeader, Error::OutOfBounds, Parser, Result,
};

/// The MAGIC value indicating the metadata root (`BSJB`)
pub const METADATA_SIGNATURE: u32 = 0x424A_5342;

/// The root metadata header of a CLI image.
pub struct Root {
    /// Magic signature for physical metadata: 0x424A5342
    pub signature: u32,
    /// Major version, 1
    pub major_version: u16,
    /// Minor version, 1
    pub minor_version: u16,
    /// Reserved, always 0
    pub reserved: u32,
    /// Runtime version string, without padding or terminator
    pub version: String,
    /// Reserved flags field, always 0
    pub flags: u16,
    /// Stream headers in directory order, duplicates included
    pub stream_headers: Vec<StreamHeader>,
}

impl Root {
    /// Reads a [`Root`] metadata header from the start of a metadata blob.
    ///
    /// # Arguments
    /// * `data` - The metadata blob, starting at the `BSJB` signature
    ///
    /// # Errors
    /// Returns an error if the signature is wrong, the version string is
    /// damaged, or any stream header lies outside the blob.
    pub fn read(data: &[u8]) -> Result<Root> {
        if data.len() < 20 {
            return Err(OutOfBounds(data.len()));
        }

        let mut parser = Parser::new(data);

        let signature = parser.read_le::<u32>()?;
        if signature != METADATA_SIGNATURE {
            return Err(malformed_error!(
                "Metadata signature does not match BSJB - 0x{:08X}",
                signature
            ));
        }

        let major_version = parser.read_le::<u16>()?;
        let minor_version = parser.read_le::<u16>()?;
        let reserved = parser.read_le::<u32>()?;

        let version_length = parser.read_le::<u32>()? as usize;
        if version_length == 0 || version_length > 255 {
            return Err(malformed_error!(
                "Version string length {} out of range",
                version_length
            ));
        }

        let version_buffer = parser.read_bytes(version_length)?;
        let version_end = version_buffer
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(version_buffer.len());
        let version = std::str::from_utf8(&version_buffer[..version_end])
            .map_err(|_| malformed_error!("Version string is not valid UTF-8"))?
            .to_string();

        let flags = parser.read_le::<u16>()?;
        let stream_count = parser.read_le::<u16>()?;
        if stream_count > 64 {
            return Err(malformed_error!("Implausible stream count {}", stream_count));
        }

        let mut stream_headers = Vec::with_capacity(stream_count as usize);
        for _ in 0..stream_count {
            let header = StreamHeader::read(&mut parser)?;

            let Some(end) = header.offset.checked_add(header.size) else {
                return Err(malformed_error!(
                    "Stream '{}' offset and size overflow - {} + {}",
                    header.name,
                    header.offset,
                    header.size
                ));
            };
            if end as usize > data.len() {
                return Err(malformed_error!(
                    "Stream '{}' extends past the metadata blob ({} > {})",
                    header.name,
                    end,
                    data.len()
                ));
            }

            stream_headers.push(header);
        }

        Ok(Root {
            signature,
            major_version,
            minor_version,
            reserved,
            version,
            flags,
            stream_headers,
        })
    }

    /// Validates that the streams do not overlap each other.
    ///
    /// Offsets are relative to the metadata root, so this needs no knowledge
    /// of the surrounding file.
    ///
    /// # Errors
    /// Returns an error naming the first overlapping pair.
    pub fn validate_stream_layout(&self) -> Result<()> {
        let mut ranges: Vec<(u32, u32, &str)> = self
            .stream_headers
            .iter()
            .map(|header| (header.offset, header.offset + header.size, header.name.as_str()))
            .collect();
        ranges.sort_by_key(|&(start, _, _)| start);

        for window in ranges.windows(2) {
            let (start1, end1, name1) = window[0];
            let (start2, end2, name2) = window[1];
            if start2 < end1 {
                return Err(malformed_error!(
                    "Stream '{}' ({}..{}) overlaps with stream '{}' ({}..{})",
                    name1,
                    start1,
                    end1,
                    name2,
                    start2,
                    end2
                ));
            }
        }

        Ok(())
    }

    /// Size of the root header on disk, stream headers included
    #[must_use]
    pub fn header_size(&self) -> usize {
        16 + padded_version_length(&self.version)
            + 4
            + self
                .stream_headers
                .iter()
                .map(StreamHeader::header_size)
                .sum::<usize>()
    }

    /// Emit the root header and stream directory
    #[allow(clippy::cast_possible_truncation)]
    pub fn write(&self, writer: &mut Writer) {
        writer.write_le::<u32>(self.signature);
        writer.write_le::<u16>(self.major_version);
        writer.write_le::<u16>(self.minor_version);
        writer.write_le::<u32>(self.reserved);

        let padded = padded_version_length(&self.version);
        writer.write_le::<u32>(padded as u32);
        writer.write_bytes(self.version.as_bytes());
        writer.write_zeroes(padded - self.version.len());

        writer.write_le::<u16>(self.flags);
        writer.write_le::<u16>(self.stream_headers.len() as u16);

        for header in &self.stream_headers {
            header.write(writer);
        }
    }
}

/// Version string storage length: terminator included, rounded up to 4
fn padded_version_length(version: &str) -> usize {
    (version.len() + 1 + 3) & !3
}
