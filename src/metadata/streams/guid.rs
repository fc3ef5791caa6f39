//! GUID heap (`#GUID`) view and builder.
//!
//! The `#GUID` heap is a fixed-size array of 16-byte GUIDs with 1-based indexing; index
//! 0 means "no GUID". Unlike the other heaps there is no leading empty entry.
//!
//! # Reference
//! - [ECMA-335 II.24.2.5](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use rustc_hash::FxHashMap;

use crate::{Error::OutOfBounds, Result};

/// Read-only view over a `#GUID` heap.
///
/// # Examples
///
/// ```rust
/// use dotforge::metadata::streams::GuidHeap;
/// let data = &[0u8; 32]; // two zero GUIDs
/// let guids = GuidHeap::from(data).unwrap();
/// assert_eq!(guids.count(), 2);
/// ```
pub struct GuidHeap<'a> {
    data: &'a [u8],
}

impl<'a> GuidHeap<'a> {
    /// Create a `GuidHeap` view from a sequence of bytes
    ///
    /// # Arguments
    /// * 'data'    - The byte slice from which this object shall be created
    ///
    /// # Errors
    /// Returns an error if the length is not a multiple of 16
    pub fn from(data: &'a [u8]) -> Result<GuidHeap<'a>> {
        if data.len() % 16 != 0 {
            return Err(malformed_error!(
                "#GUID heap length {} is not a multiple of 16",
                data.len()
            ));
        }

        Ok(GuidHeap { data })
    }

    /// Raw bytes of the heap
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Number of GUIDs stored
    #[must_use]
    pub fn count(&self) -> usize {
        self.data.len() / 16
    }

    /// Returns the GUID at the specified 1-based index
    ///
    /// ## Arguments
    /// * 'index' - The 1-based index of the GUID (comes from metadata tables)
    ///
    /// # Errors
    /// Returns an error if the index is zero or past the end of the heap
    pub fn get(&self, index: usize) -> Result<uguid::Guid> {
        if index == 0 || index > self.count() {
            return Err(OutOfBounds(index));
        }

        let start = (index - 1) * 16;
        let mut buffer = [0_u8; 16];
        buffer.copy_from_slice(&self.data[start..start + 16]);

        Ok(uguid::Guid::from_bytes(buffer))
    }

    /// Iterate over (1-based index, GUID) pairs
    pub fn iter(&self) -> impl Iterator<Item = (usize, uguid::Guid)> + '_ {
        (1..=self.count()).filter_map(move |index| self.get(index).ok().map(|guid| (index, guid)))
    }
}

/// Append-only builder for a `#GUID` heap with deduplication.
pub struct GuidBuilder {
    data: Vec<u8>,
    dedup: FxHashMap<[u8; 16], u32>,
}

impl Default for GuidBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GuidBuilder {
    /// An empty heap
    #[must_use]
    pub fn new() -> GuidBuilder {
        GuidBuilder {
            data: Vec::new(),
            dedup: FxHashMap::default(),
        }
    }

    /// Add a GUID, returning its 1-based index
    #[allow(clippy::cast_possible_truncation)]
    pub fn add(&mut self, guid: uguid::Guid) -> u32 {
        let bytes = guid.to_bytes();
        if let Some(&index) = self.dedup.get(&bytes) {
            return index;
        }

        let index = (self.data.len() / 16) as u32 + 1;
        self.data.extend_from_slice(&bytes);
        self.dedup.insert(bytes, index);
        index
    }

    /// Current size of the heap in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when no GUID has been added
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
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
    use uguid::guid;

    #[test]
    fn crafted() {
        let mut data = Vec::new();
        data.extend_from_slice(&[0x11; 16]);
        data.extend_from_slice(&[0x22; 16]);

        let heap = GuidHeap::from(&data).unwrap();
        assert_eq!(heap.count(), 2);

        assert_eq!(heap.get(1).unwrap().to_bytes(), [0x11; 16]);
        assert_eq!(heap.get(2).unwrap().to_bytes(), [0x22; 16]);
        assert!(heap.get(0).is_err());
        assert!(heap.get(3).is_err());
    }

    #[test]
    fn rejects_ragged_heap() {
        assert!(GuidHeap::from(&[0_u8; 17]).is_err());
    }

    #[test]
    fn builder_roundtrip() {
        let module_id = guid!("12345678-1234-5678-1234-567812345678");
        let other_id = guid!("87654321-4321-8765-4321-876543218765");

        let mut builder = GuidBuilder::new();
        let first = builder.add(module_id);
        let second = builder.add(other_id);
        let first_again = builder.add(module_id);

        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(first, first_again);

        let bytes = builder.into_bytes();
        let heap = GuidHeap::from(&bytes).unwrap();
        assert_eq!(heap.get(1).unwrap(), module_id);
        assert_eq!(heap.get(2).unwrap(), other_id);
    }

    #[test]
    fn iteration() {
        let mut builder = GuidBuilder::new();
        builder.add(guid!("12345678-1234-5678-1234-567812345678"));
        let bytes = builder.into_bytes();

        let heap = GuidHeap::from(&bytes).unwrap();
        let entries: Vec<_> = heap.iter().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, 1);
    }
}
