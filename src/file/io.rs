//! Low-level byte order utilities for PE and CLI metadata parsing.
//!
//! This module provides the [`LeInt`] trait for safe, bounds-checked reading and writing
//! of primitive types in little-endian byte order. Every on-disk structure handled by this
//! crate is little-endian, so no big-endian counterparts are provided.

use crate::{Error::OutOfBounds, Result};

/// Trait for primitive types that can be read from and written to byte slices
/// in little-endian order.
///
/// Implemented for all integer widths used in PE headers and ECMA-335 metadata.
pub trait LeInt: Sized + Copy {
    /// The fixed-size byte array representation of this type
    type Bytes: Sized + for<'a> TryFrom<&'a [u8]> + AsRef<[u8]>;

    /// Decode Self from its little-endian byte representation
    fn from_le_bytes(bytes: Self::Bytes) -> Self;
    /// Encode Self into its little-endian byte representation
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_le_int {
    ($($ty:ty),*) => {
        $(
            impl LeInt for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_le_int!(u8, i8, u16, i16, u32, i32, u64, i64);

/// Safely read T in little-endian from the start of a data stream.
///
/// ## Arguments
/// * 'data' - The data buffer / stream to read from
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the buffer is shorter than T.
pub fn read_le<T: LeInt>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Safely read T from an offset in little-endian from a data stream.
///
/// ## Arguments
/// * 'data'    - The data buffer / stream to read from
/// * 'offset'  - An offset to read from, will be advanced by the amount of bytes read
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if reading would exceed the data length.
pub fn read_le_at<T: LeInt>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds(*offset));
    };
    if end > data.len() {
        return Err(OutOfBounds(*offset));
    }

    let Ok(read) = data[*offset..*offset + type_len].try_into() else {
        return Err(OutOfBounds(*offset));
    };

    *offset += type_len;

    Ok(T::from_le_bytes(read))
}

/// Safely read 4 or 2 bytes from an offset in little-endian from a data stream.
///
/// Metadata tables encode heap and table indices as either 2 or 4 bytes depending
/// on the computed layout; this helper widens the short form to `u32`.
///
/// ## Arguments
/// * 'data'        - The data buffer / stream to read from
/// * 'offset'      - An offset to read from, will be advanced by the amount of bytes read
/// * `is_large`    - Indicates if 4 or 2 bytes should be read
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if reading would exceed the data length.
pub fn read_le_at_dyn(data: &[u8], offset: &mut usize, is_large: bool) -> Result<u32> {
    let res = if is_large {
        read_le_at::<u32>(data, offset)?
    } else {
        u32::from(read_le_at::<u16>(data, offset)?)
    };

    Ok(res)
}

/// Safely write T at an offset in little-endian into a data buffer.
///
/// ## Arguments
/// * 'data'    - The mutable data buffer to write into
/// * 'offset'  - An offset to write at, will be advanced by the amount of bytes written
/// * 'value'   - The value to encode
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if writing would exceed the buffer length.
pub fn write_le_at<T: LeInt>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds(*offset));
    };
    if end > data.len() {
        return Err(OutOfBounds(*offset));
    }

    data[*offset..*offset + type_len].copy_from_slice(value.to_le_bytes().as_ref());
    *offset += type_len;

    Ok(())
}

/// Safely write a value as 4 or 2 little-endian bytes at an offset.
///
/// The short form is used when `is_large` is false; values exceeding `u16::MAX`
/// cannot be narrowed and are rejected.
///
/// ## Arguments
/// * 'data'        - The mutable data buffer to write into
/// * 'offset'      - An offset to write at, will be advanced by the amount of bytes written
/// * `is_large`    - Indicates if 4 or 2 bytes should be written
/// * 'value'       - The value to encode
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] on short buffers, or [`crate::Error::Malformed`]
/// when a value does not fit the narrow encoding.
pub fn write_le_at_dyn(
    data: &mut [u8],
    offset: &mut usize,
    is_large: bool,
    value: u32,
) -> Result<()> {
    if is_large {
        write_le_at::<u32>(data, offset, value)
    } else {
        let narrow = u16::try_from(value)
            .map_err(|_| malformed_error!("Value {} does not fit a 2-byte index column", value))?;
        write_le_at::<u16>(data, offset, narrow)
    }
}

/// Align a value up to the next multiple of `alignment`.
///
/// `alignment` must be a power of two; PE and metadata alignments always are.
#[must_use]
pub fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}
