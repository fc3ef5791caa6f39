//! User string heap (`#US`) view and builder.
//!
//! The `#US` heap stores string literals referenced by IL `ldstr`. Each entry is a
//! compressed length, UTF-16 LE code units, and one trailing flag byte recording whether
//! any character needs handling beyond simple ASCII. The length covers the UTF-16 bytes
//! plus the flag byte.
//!
//! # Reference
//! - [ECMA-335 II.24.2.4](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use widestring::U16String;

use crate::{Error::OutOfBounds, Parser, Result};

/// Read-only view over a `#US` heap.
///
/// # Examples
///
/// ```rust
/// use dotforge::metadata::streams::UserStrings;
/// let data = &[0u8, 0x03, b'A', 0x00, 0x00];
/// let us = UserStrings::from(data).unwrap();
/// assert_eq!(us.get(1).unwrap().to_string_lossy(), "A");
/// ```
pub struct UserStrings<'a> {
    data: &'a [u8],
}

impl<'a> UserStrings<'a> {
    /// Create a `UserStrings` view from a sequence of bytes
    ///
    /// # Arguments
    /// * 'data' - The byte slice from which this object shall be created
    ///
    /// # Errors
    /// Returns an error if the heap is empty or does not start with the empty entry
    pub fn from(data: &'a [u8]) -> Result<UserStrings<'a>> {
        if data.is_empty() || data[0] != 0 {
            return Err(malformed_error!("Provided #US heap is invalid"));
        }

        Ok(UserStrings { data })
    }

    /// Raw bytes of the heap
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Decode the user string at the provided heap offset.
    ///
    /// ## Arguments
    /// * 'index' - The offset within the heap (comes from IL string tokens)
    ///
    /// # Errors
    /// Returns an error on out-of-bounds offsets or corrupt length prefixes
    pub fn get(&self, index: usize) -> Result<U16String> {
        let (units, _) = self.get_with_flag(index)?;
        Ok(units)
    }

    /// Decode a user string together with its trailing flag byte.
    ///
    /// The flag is 1 when any character falls outside the simple ASCII range.
    ///
    /// # Errors
    /// Returns an error on out-of-bounds offsets or corrupt length prefixes
    pub fn get_with_flag(&self, index: usize) -> Result<(U16String, u8)> {
        if index >= self.data.len() {
            return Err(OutOfBounds(index));
        }

        let mut parser = Parser::new(self.data);
        parser.seek(index)?;
        let byte_len = parser.read_compressed_uint()? as usize;

        if byte_len == 0 {
            return Ok((U16String::new(), 0));
        }
        if byte_len % 2 != 1 {
            return Err(malformed_error!(
                "User string at {} has even length {} (missing flag byte)",
                index,
                byte_len
            ));
        }

        let unit_count = (byte_len - 1) / 2;
        let mut units = Vec::with_capacity(unit_count);
        for _ in 0..unit_count {
            units.push(parser.read_le::<u16>()?);
        }
        let flag = parser.read_le::<u8>()?;

        Ok((U16String::from_vec(units), flag))
    }

    /// Iterate over (offset, string) pairs of whole entries, front to back
    pub fn iter(&self) -> UserStringsIterator<'a, '_> {
        UserStringsIterator {
            heap: self,
            position: 1,
        }
    }
}

/// Iterator over whole entries of a `#US` heap
pub struct UserStringsIterator<'a, 'h> {
    heap: &'h UserStrings<'a>,
    position: usize,
}

impl Iterator for UserStringsIterator<'_, '_> {
    type Item = (usize, U16String);

    fn next(&mut self) -> Option<Self::Item> {
        while self.position < self.heap.data.len() {
            let start = self.position;

            let mut parser = Parser::new(self.heap.data);
            parser.seek(start).ok()?;
            let Ok(byte_len) = parser.read_compressed_uint() else {
                return None;
            };

            self.position = parser.pos() + byte_len as usize;
            if let Ok((value, _)) = self.heap.get_with_flag(start) {
                if byte_len > 0 {
                    return Some((start, value));
                }
            }
        }
        None
    }
}

/// Append-only builder for a `#US` heap with deduplication.
pub struct UserStringsBuilder {
    data: Vec<u8>,
    dedup: rustc_hash::FxHashMap<Vec<u16>, u32>,
}

impl Default for UserStringsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl UserStringsBuilder {
    /// An empty heap containing only the empty entry
    #[must_use]
    pub fn new() -> UserStringsBuilder {
        UserStringsBuilder {
            data: vec![0],
            dedup: rustc_hash::FxHashMap::default(),
        }
    }

    /// Add a string literal, returning its heap offset.
    ///
    /// # Errors
    /// Returns an error when the encoded entry would exceed the compressed
    /// length range.
    #[allow(clippy::cast_possible_truncation)]
    pub fn add(&mut self, value: &str) -> Result<u32> {
        let units: Vec<u16> = value.encode_utf16().collect();
        if let Some(&offset) = self.dedup.get(&units) {
            return Ok(offset);
        }

        let offset = self.data.len() as u32;
        let byte_len = units.len() * 2 + 1;

        let mut writer = crate::Writer::new();
        writer.write_compressed_uint(byte_len as u32)?;
        for unit in &units {
            writer.write_le::<u16>(*unit);
        }
        writer.write_le::<u8>(high_char_flag(&units));

        self.data.extend_from_slice(writer.as_slice());
        self.dedup.insert(units, offset);
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

/// The trailing flag of a `#US` entry: 1 when any code unit has a bit set in
/// its high byte, or its low byte is one of the special characters called out
/// in II.24.2.4.
fn high_char_flag(units: &[u16]) -> u8 {
    let special = |low: u8| {
        matches!(low, 0x01..=0x08 | 0x0E..=0x1F | 0x27 | 0x2D | 0x7F)
    };

    for &unit in units {
        if unit > 0xFF || special((unit & 0xFF) as u8) {
            return 1;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let data: [u8; 29] = [
            0x00, 0x1b,
            0x48, 0x00, 0x65, 0x00, 0x6c, 0x00, 0x6c, 0x00, 0x6f, 0x00, 0x2c, 0x00, 0x20, 0x00,
            0x57, 0x00, 0x6f, 0x00, 0x72, 0x00, 0x6c, 0x00, 0x64, 0x00, 0x21, 0x00,
            0x01,
        ];

        let heap = UserStrings::from(&data).unwrap();
        let (value, flag) = heap.get_with_flag(1).unwrap();
        assert_eq!(value.to_string_lossy(), "Hello, World!");
        assert_eq!(flag, 1); // carried verbatim from the sample
    }

    #[test]
    fn builder_roundtrip() {
        let mut builder = UserStringsBuilder::new();
        let plain = builder.add("Hello").unwrap();
        let fancy = builder.add("Smile 😀").unwrap();
        let plain_again = builder.add("Hello").unwrap();

        assert_eq!(plain, plain_again);
        assert_ne!(plain, fancy);

        let bytes = builder.into_bytes();
        let heap = UserStrings::from(&bytes).unwrap();

        let (value, flag) = heap.get_with_flag(plain as usize).unwrap();
        assert_eq!(value.to_string_lossy(), "Hello");
        assert_eq!(flag, 0);

        let (value, flag) = heap.get_with_flag(fancy as usize).unwrap();
        assert_eq!(value.to_string_lossy(), "Smile 😀");
        assert_eq!(flag, 1);
    }

    #[test]
    fn flag_special_characters() {
        assert_eq!(high_char_flag(&[b'a' as u16]), 0);
        assert_eq!(high_char_flag(&[0x27]), 1); // apostrophe
        assert_eq!(high_char_flag(&[0x2D]), 1); // hyphen
        assert_eq!(high_char_flag(&[0x7F]), 1);
        assert_eq!(high_char_flag(&[0x100]), 1);
        assert_eq!(high_char_flag(&[0x41, 0x42]), 0);
    }

    #[test]
    fn iteration() {
        let mut builder = UserStringsBuilder::new();
        let first = builder.add("one").unwrap();
        let second = builder.add("two").unwrap();
        let bytes = builder.into_bytes();

        let heap = UserStrings::from(&bytes).unwrap();
        let entries: Vec<_> = heap.iter().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, first as usize);
        assert_eq!(entries[0].1.to_string_lossy(), "one");
        assert_eq!(entries[1].0, second as usize);
        assert_eq!(entries[1].1.to_string_lossy(), "two");
    }

    #[test]
    fn even_length_rejected() {
        let data = [0x00, 0x02, 0x41, 0x00];
        let heap = UserStrings::from(&data).unwrap();
        assert!(heap.get(1).is_err());
    }
}
