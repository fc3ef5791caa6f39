//! Blob heap (`#Blob`) view and builder.
//!
//! The `#Blob` heap stores binary data such as signatures, public keys and custom
//! attribute values. Each entry is a compressed unsigned length followed by that many
//! bytes; offset 0 is the empty blob.
//!
//! # Reference
//! - [ECMA-335 II.24.2.4](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use rustc_hash::FxHashMap;

use crate::{Error::OutOfBounds, Parser, Result};

/// Read-only view over a `#Blob` heap.
///
/// # Examples
///
/// ```rust
/// use dotforge::metadata::streams::Blob;
/// let data = &[0u8, 0x03, 0x41, 0x42, 0x43];
/// let blob = Blob::from(data).unwrap();
/// assert_eq!(blob.get(1).unwrap(), &[0x41, 0x42, 0x43]);
/// ```
pub struct Blob<'a> {
    data: &'a [u8],
}

impl<'a> Blob<'a> {
    /// Create a `Blob` view from a sequence of bytes
    ///
    /// # Arguments
    /// * 'data'    - The byte slice from which this object shall be created
    ///
    /// # Errors
    /// Returns an error if the heap is empty or does not start with the empty entry
    pub fn from(data: &'a [u8]) -> Result<Blob<'a>> {
        if data.is_empty() || data[0] != 0 {
            return Err(malformed_error!("Invalid memory for #Blob heap"));
        }

        Ok(Blob { data })
    }

    /// Raw bytes of the heap
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Get the bytes of the blob at the provided heap offset.
    ///
    /// ## Arguments
    /// * 'index' - The offset within the heap (comes from metadata tables)
    ///
    /// # Errors
    /// Returns an error if the offset is out of bounds or the length prefix is corrupt
    pub fn get(&self, index: usize) -> Result<&'a [u8]> {
        if index >= self.data.len() {
            return Err(OutOfBounds(index));
        }

        let mut parser = Parser::new(self.data);
        parser.seek(index)?;
        let len = parser.read_compressed_uint()? as usize;

        let data_start = parser.pos();
        let Some(data_end) = data_start.checked_add(len) else {
            return Err(OutOfBounds(index));
        };
        if data_end > self.data.len() {
            return Err(OutOfBounds(index));
        }

        Ok(&self.data[data_start..data_end])
    }
}

/// Append-only builder for a `#Blob` heap with deduplication.
///
/// Identical byte sequences receive identical offsets; the heap only grows,
/// so previously handed-out offsets stay valid.
pub struct BlobBuilder {
    data: Vec<u8>,
    dedup: FxHashMap<Vec<u8>, u32>,
}

impl Default for BlobBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobBuilder {
    /// An empty heap containing only the empty entry
    #[must_use]
    pub fn new() -> BlobBuilder {
        BlobBuilder {
            data: vec![0],
            dedup: FxHashMap::default(),
        }
    }

    /// Add a blob, returning its heap offset.
    ///
    /// # Errors
    /// Returns an error when the blob exceeds the compressed length range.
    #[allow(clippy::cast_possible_truncation)]
    pub fn add(&mut self, value: &[u8]) -> Result<u32> {
        if value.is_empty() {
            return Ok(0);
        }

        if let Some(&offset) = self.dedup.get(value) {
            return Ok(offset);
        }

        let offset = self.data.len() as u32;

        let mut writer = crate::Writer::new();
        writer.write_compressed_uint(value.len() as u32)?;
        self.data.extend_from_slice(writer.as_slice());
        self.data.extend_from_slice(value);

        self.dedup.insert(value.to_vec(), offset);
        Ok(offset)
    }

    /// Current size of the heap in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false; the heap contains at least the empty entry
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Finish and return the heap bytes
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        let mut data = vec![0_u8];
        data.push(0x03);
        data.extend_from_slice(&[0xAA, 0xBB, 0xCC]);
        // Two-byte length encoding for a 256-byte blob
        data.extend_from_slice(&[0x81, 0x00]);
        let long_offset = 5;
        data.extend_from_slice(&[0xEE; 256]);

        let blob = Blob::from(&data).unwrap();

        assert_eq!(blob.get(0).unwrap().len(), 0);
        assert_eq!(blob.get(1).unwrap(), &[0xAA, 0xBB, 0xCC]);
        assert_eq!(blob.get(long_offset).unwrap(), &[0xEE; 256][..]);
        assert!(blob.get(data.len() + 1).is_err());
    }

    #[test]
    fn truncated_blob_rejected() {
        let data = [0_u8, 0x05, 0x01, 0x02];
        let blob = Blob::from(&data).unwrap();
        assert!(blob.get(1).is_err());
    }

    #[test]
    fn builder_dedup() {
        let mut builder = BlobBuilder::new();

        let sig = builder.add(&[0x06, 0x08]).unwrap();
        let other = builder.add(&[0x06, 0x0E]).unwrap();
        let sig_again = builder.add(&[0x06, 0x08]).unwrap();

        assert_eq!(sig, sig_again);
        assert_ne!(sig, other);
        assert_eq!(builder.add(&[]).unwrap(), 0);

        let bytes = builder.into_bytes();
        let blob = Blob::from(&bytes).unwrap();
        assert_eq!(blob.get(sig as usize).unwrap(), &[0x06, 0x08]);
        assert_eq!(blob.get(other as usize).unwrap(), &[0x06, 0x0E]);
    }

    #[test]
    fn builder_long_blob() {
        let mut builder = BlobBuilder::new();
        let payload = vec![0x5A_u8; 0x300];
        let offset = builder.add(&payload).unwrap();

        let bytes = builder.into_bytes();
        let blob = Blob::from(&bytes).unwrap();
        assert_eq!(blob.get(offset as usize).unwrap(), &payload[..]);
    }
}
