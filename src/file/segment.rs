//! The segment abstraction underlying relocatable pieces of an image.
//!
//! A segment is anything with a physical (on-disk) size and a virtual (mapped) size
//! that can be re-stamped with new offsets and emitted. Sections implement it, and the
//! container's rebuild pass drives a [`RelocationParameters`] cursor across all segments
//! in file order; composite segments recursively relocate their children with the same
//! parameter pack.
//!
//! Invariant: for every segment, `physical_size <= virtual_size` once alignment padding
//! is accounted for.

use crate::{
    file::{io::align_up, writer::Writer},
    Result,
};

/// The moving cursor pack threaded through segments during a rebuild.
///
/// Carries the image base and both alignments so segments can re-stamp
/// themselves without reaching back into the container.
#[derive(Debug, Clone)]
pub struct RelocationParameters {
    /// Preferred load address of the image
    pub image_base: u64,
    /// Next free file offset
    pub file_offset: u64,
    /// Next free RVA
    pub rva: u32,
    /// `FileAlignment` from the optional header
    pub file_alignment: u32,
    /// `SectionAlignment` from the optional header
    pub section_alignment: u32,
    /// True for PE32 images, false for PE32+
    pub is_32bit: bool,
}

impl RelocationParameters {
    /// Create a parameter pack positioned at the given cursors.
    #[must_use]
    pub fn new(
        image_base: u64,
        file_offset: u64,
        rva: u32,
        file_alignment: u32,
        section_alignment: u32,
        is_32bit: bool,
    ) -> Self {
        RelocationParameters {
            image_base,
            file_offset,
            rva,
            file_alignment,
            section_alignment,
            is_32bit,
        }
    }

    /// Advance past a segment: the file cursor by its physical size, the RVA
    /// cursor by its virtual size rounded up to the section alignment.
    #[allow(clippy::cast_possible_truncation)]
    pub fn advance(&mut self, physical: u64, virtual_size: u64) {
        self.file_offset += physical;
        self.rva += align_up(virtual_size, u64::from(self.section_alignment)) as u32;
    }

    /// Advance both cursors by the same flat amount, used for header blocks
    /// that are mapped one to one.
    #[allow(clippy::cast_possible_truncation)]
    pub fn advance_flat(&mut self, size: u64) {
        self.file_offset += size;
        self.rva += size as u32;
    }

    /// Snap the file cursor up to the file alignment
    pub fn align_file(&mut self) {
        self.file_offset = align_up(self.file_offset, u64::from(self.file_alignment));
    }

    /// Snap the RVA cursor up to the section alignment
    #[allow(clippy::cast_possible_truncation)]
    pub fn align_rva(&mut self) {
        self.rva = align_up(u64::from(self.rva), u64::from(self.section_alignment)) as u32;
    }
}

/// A relocatable, writable piece of an image.
pub trait Segment {
    /// Bytes this segment occupies on disk, before file alignment padding
    fn physical_size(&self) -> u64;

    /// Bytes this segment occupies once mapped; at least `physical_size`
    fn virtual_size(&self) -> u64 {
        self.physical_size()
    }

    /// Re-stamp this segment (and any children) with offsets taken from the
    /// parameter pack, advancing the pack past the segment.
    fn update_offsets(&mut self, params: &mut RelocationParameters);

    /// Emit the segment's physical bytes.
    ///
    /// # Errors
    /// Propagates output buffer failures.
    fn write(&self, writer: &mut Writer) -> Result<()>;
}
