//! String heap (`#Strings`) view and builder.
//!
//! The `#Strings` heap stores UTF-8 identifier strings, each NUL-terminated. Offset 0 is
//! the empty string. Offsets handed out by tables are arbitrary byte indices and may
//! point into the middle of a longer entry, which the reader supports naturally.
//!
//! # Reference
//! - [ECMA-335 II.24.2.3](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use std::{ffi::CStr, str};

use rustc_hash::FxHashMap;

use crate::{Error::OutOfBounds, Result};

/// Read-only view over a `#Strings` heap.
///
/// # Examples
///
/// ```rust
/// use dotforge::metadata::streams::Strings;
/// let data = &[0u8, b'H', b'e', b'l', b'l', b'o', 0u8];
/// let strings = Strings::from(data).unwrap();
/// assert_eq!(strings.get(1).unwrap(), "Hello");
/// ```
pub struct Strings<'a> {
    data: &'a [u8],
}

impl<'a> Strings<'a> {
    /// Create a `Strings` view from a sequence of bytes
    ///
    /// # Arguments
    /// * 'data' - The byte slice from which this object shall be created
    ///
    /// # Errors
    /// Returns an error if the heap is empty or does not start with the empty entry
    pub fn from(data: &'a [u8]) -> Result<Strings<'a>> {
        if data.is_empty() || data[0] != 0 {
            return Err(malformed_error!("Provided #Strings heap is invalid"));
        }

        Ok(Strings { data })
    }

    /// Raw bytes of the heap
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Get the string starting at the provided heap offset.
    ///
    /// ## Arguments
    /// * 'index' - The offset within the heap (comes from metadata tables)
    ///
    /// # Errors
    /// Returns an error if the offset is out of bounds or the bytes are not valid UTF-8
    pub fn get(&self, index: usize) -> Result<&'a str> {
        if index >= self.data.len() {
            return Err(OutOfBounds(index));
        }

        match CStr::from_bytes_until_nul(&self.data[index..]) {
            Ok(result) => match result.to_str() {
                Ok(result) => Ok(result),
                Err(_) => Err(malformed_error!("Invalid string at index - {}", index)),
            },
            Err(_) => Err(malformed_error!("Invalid string at index - {}", index)),
        }
    }

    /// Iterate over (offset, string) pairs of whole entries, front to back
    pub fn iter(&self) -> StringsIterator<'a> {
        StringsIterator {
            data: self.data,
            position: 1,
        }
    }
}

/// Iterator over whole entries of a `#Strings` heap
pub struct StringsIterator<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Iterator for StringsIterator<'a> {
    type Item = (usize, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        while self.position < self.data.len() {
            let start = self.position;
            let rest = &self.data[start..];
            let end = rest.iter().position(|&b| b == 0)?;

            self.position = start + end + 1;
            if let Ok(s) = str::from_utf8(&rest[..end]) {
                return Some((start, s));
            }
            // Skip undecodable garbage between valid entries
        }
        None
    }
}

/// Append-only builder for a `#Strings` heap with deduplication.
///
/// Identical strings receive identical offsets, offset 0 stays the empty
/// string, and previously returned offsets remain stable for the lifetime of
/// the builder.
pub struct StringsBuilder {
    data: Vec<u8>,
    dedup: FxHashMap<String, u32>,
}

impl Default for StringsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StringsBuilder {
    /// An empty heap containing only the empty entry
    #[must_use]
    pub fn new() -> StringsBuilder {
        StringsBuilder {
            data: vec![0],
            dedup: FxHashMap::default(),
        }
    }

    /// Seed a builder from an existing heap, preserving every byte and
    /// indexing its whole entries for deduplication.
    ///
    /// # Errors
    /// Returns an error if the existing heap is structurally invalid.
    pub fn from_existing(existing: &[u8]) -> Result<StringsBuilder> {
        let view = Strings::from(existing)?;

        let mut dedup = FxHashMap::default();
        for (offset, value) in view.iter() {
            #[allow(clippy::cast_possible_truncation)]
            dedup.entry(value.to_string()).or_insert(offset as u32);
        }

        Ok(StringsBuilder {
            data: existing.to_vec(),
            dedup,
        })
    }

    /// Add a string, returning its heap offset. The same string always
    /// returns the same offset.
    #[allow(clippy::cast_possible_truncation)]
    pub fn add(&mut self, value: &str) -> u32 {
        if value.is_empty() {
            return 0;
        }

        if let Some(&offset) = self.dedup.get(value) {
            return offset;
        }

        let offset = self.data.len() as u32;
        self.data.extend_from_slice(value.as_bytes());
        self.data.push(0);
        self.dedup.insert(value.to_string(), offset);
        offset
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
