//! CLI (Cor20) header parsing and emission.
//!
//! The CLI header sits at the `IMAGE_DIRECTORY_ENTRY_COM_DESCRIPTOR` data directory of a
//! managed PE file and points at the metadata directory, resources, strong name data and
//! the vtable fixup table.
//!
//! # Reference
//! - [ECMA-335 II.25.3.3](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use bitflags::bitflags;

use crate::{file::writer::Writer, Parser, Result};

/// Size of the CLI header in bytes
pub const CLI_HEADER_SIZE: u32 = 72;

bitflags! {
    /// Runtime flags of the CLI header
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RuntimeFlags: u32 {
        /// Image contains only IL code
        const IL_ONLY = 0x0000_0001;
        /// Image requires a 32-bit process
        const BIT32_REQUIRED = 0x0000_0002;
        /// Image is signed with a strong name
        const STRONG_NAME_SIGNED = 0x0000_0008;
        /// Entry point is an unmanaged RVA rather than a token
        const NATIVE_ENTRYPOINT = 0x0000_0010;
        /// Image prefers to run 32-bit when possible
        const BIT32_PREFERRED = 0x0002_0000;
    }
}

/// The CLI header of a managed image.
///
/// Reserved fields that ECMA-335 requires to be zero are carried anyway so a
/// damaged-but-loadable image can round-trip unchanged.
pub struct Cor20Header {
    /// Size of this header, always 72
    pub cb: u32,
    /// Minimum runtime major version required
    pub major_runtime_version: u16,
    /// Minimum runtime minor version required
    pub minor_runtime_version: u16,
    /// RVA of the metadata directory
    pub meta_data_rva: u32,
    /// Size of the metadata directory
    pub meta_data_size: u32,
    /// Runtime flags, see [`RuntimeFlags`]
    pub flags: u32,
    /// Entry point token, or native RVA when `NATIVE_ENTRYPOINT` is set
    pub entry_point_token: u32,
    /// RVA of managed resources
    pub resource_rva: u32,
    /// Size of managed resources
    pub resource_size: u32,
    /// RVA of the strong name signature hash
    pub strong_name_signature_rva: u32,
    /// Size of the strong name signature hash
    pub strong_name_signature_size: u32,
    /// Reserved, zero
    pub code_manager_table_rva: u32,
    /// Reserved, zero
    pub code_manager_table_size: u32,
    /// RVA of the vtable fixup table for mixed-mode images
    pub vtable_fixups_rva: u32,
    /// Size of the vtable fixup table
    pub vtable_fixups_size: u32,
    /// Reserved, zero
    pub export_address_table_jmp_rva: u32,
    /// Reserved, zero
    pub export_address_table_jmp_size: u32,
    /// Reserved, zero
    pub managed_native_header_rva: u32,
    /// Reserved, zero
    pub managed_native_header_size: u32,
}

impl Cor20Header {
    /// Create a `Cor20Header` object from a sequence of bytes
    ///
    /// # Arguments
    /// * `data` - The byte slice from which this object shall be created
    ///
    /// # Errors
    /// Returns an error if the data is too short to contain a valid CLI header,
    /// or if the size and metadata fields fail validation.
    pub fn read(data: &[u8]) -> Result<Cor20Header> {
        if data.len() < CLI_HEADER_SIZE as usize {
            return Err(crate::Error::OutOfBounds(data.len()));
        }

        let mut parser = Parser::new(data);

        let cb = parser.read_le::<u32>()?;
        if cb != CLI_HEADER_SIZE {
            return Err(malformed_error!(
                "Invalid CLI header size: expected {}, got {}",
                CLI_HEADER_SIZE,
                cb
            ));
        }

        let major_runtime_version = parser.read_le::<u16>()?;
        let minor_runtime_version = parser.read_le::<u16>()?;
        if major_runtime_version == 0 {
            return Err(malformed_error!(
                "Invalid major runtime version: {}",
                major_runtime_version
            ));
        }

        let meta_data_rva = parser.read_le::<u32>()?;
        if meta_data_rva == 0 {
            return Err(malformed_error!("Metadata RVA cannot be zero"));
        }

        let meta_data_size = parser.read_le::<u32>()?;
        if meta_data_size == 0 {
            return Err(malformed_error!("Metadata size cannot be zero"));
        }

        Ok(Cor20Header {
            cb,
            major_runtime_version,
            minor_runtime_version,
            meta_data_rva,
            meta_data_size,
            flags: parser.read_le::<u32>()?,
            entry_point_token: parser.read_le::<u32>()?,
            resource_rva: parser.read_le::<u32>()?,
            resource_size: parser.read_le::<u32>()?,
            strong_name_signature_rva: parser.read_le::<u32>()?,
            strong_name_signature_size: parser.read_le::<u32>()?,
            code_manager_table_rva: parser.read_le::<u32>()?,
            code_manager_table_size: parser.read_le::<u32>()?,
            vtable_fixups_rva: parser.read_le::<u32>()?,
            vtable_fixups_size: parser.read_le::<u32>()?,
            export_address_table_jmp_rva: parser.read_le::<u32>()?,
            export_address_table_jmp_size: parser.read_le::<u32>()?,
            managed_native_header_rva: parser.read_le::<u32>()?,
            managed_native_header_size: parser.read_le::<u32>()?,
        })
    }

    /// Emit the CLI header
    pub fn write(&self, writer: &mut Writer) {
        writer.write_le::<u32>(self.cb);
        writer.write_le::<u16>(self.major_runtime_version);
        writer.write_le::<u16>(self.minor_runtime_version);
        writer.write_le::<u32>(self.meta_data_rva);
        writer.write_le::<u32>(self.meta_data_size);
        writer.write_le::<u32>(self.flags);
        writer.write_le::<u32>(self.entry_point_token);
        writer.write_le::<u32>(self.resource_rva);
        writer.write_le::<u32>(self.resource_size);
        writer.write_le::<u32>(self.strong_name_signature_rva);
        writer.write_le::<u32>(self.strong_name_signature_size);
        writer.write_le::<u32>(self.code_manager_table_rva);
        writer.write_le::<u32>(self.code_manager_table_size);
        writer.write_le::<u32>(self.vtable_fixups_rva);
        writer.write_le::<u32>(self.vtable_fixups_size);
        writer.write_le::<u32>(self.export_address_table_jmp_rva);
        writer.write_le::<u32>(self.export_address_table_jmp_size);
        writer.write_le::<u32>(self.managed_native_header_rva);
        writer.write_le::<u32>(self.managed_native_header_size);
    }

    /// A header for a freshly built IL-only image pointing at metadata of the
    /// given placement.
    #[must_use]
    pub fn new(meta_data_rva: u32, meta_data_size: u32) -> Cor20Header {
        Cor20Header {
            cb: CLI_HEADER_SIZE,
            major_runtime_version: 2,
            minor_runtime_version: 5,
            meta_data_rva,
            meta_data_size,
            flags: RuntimeFlags::IL_ONLY.bits(),
            entry_point_token: 0,
            resource_rva: 0,
            resource_size: 0,
            strong_name_signature_rva: 0,
            strong_name_signature_size: 0,
            code_manager_table_rva: 0,
            code_manager_table_size: 0,
            vtable_fixups_rva: 0,
            vtable_fixups_size: 0,
            export_address_table_jmp_rva: 0,
            export_address_table_jmp_size: 0,
            managed_native_header_rva: 0,
            managed_native_header_size: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let header_bytes = [
            0x48, 0x00, 0x00, 0x00, // cb = 72 (0x48)
            0x02, 0x00,             // major_runtime_version = 2
            0x05, 0x00,             // minor_runtime_version = 5
            0x00, 0x20, 0x00, 0x00, // meta_data_rva = 0x2000
            0x00, 0x10, 0x00, 0x00, // meta_data_size = 0x1000
            0x01, 0x00, 0x00, 0x00, // flags = IL_ONLY
            0x01, 0x00, 0x00, 0x06, // entry_point_token = 0x06000001
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // resources
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // strong name
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // code manager
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // vtable fixups
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // EAT jumps
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // managed native header
        ];

        let parsed = Cor20Header::read(&header_bytes).unwrap();

        assert_eq!(parsed.cb, 72);
        assert_eq!(parsed.major_runtime_version, 2);
        assert_eq!(parsed.minor_runtime_version, 5);
        assert_eq!(parsed.meta_data_rva, 0x2000);
        assert_eq!(parsed.meta_data_size, 0x1000);
        assert_eq!(parsed.flags, RuntimeFlags::IL_ONLY.bits());
        assert_eq!(parsed.entry_point_token, 0x0600_0001);

        let mut writer = Writer::new();
        parsed.write(&mut writer);
        assert_eq!(writer.into_inner(), header_bytes);
    }

    #[test]
    fn invalid_size_rejected() {
        let mut bytes = [0_u8; 72];
        bytes[0] = 0x40; // cb = 64

        assert!(Cor20Header::read(&bytes).is_err());
    }

    #[test]
    fn zero_metadata_rejected() {
        let mut writer = Writer::new();
        let mut header = Cor20Header::new(0x2000, 0x1000);
        header.meta_data_rva = 0;
        header.write(&mut writer);

        assert!(Cor20Header::read(writer.as_slice()).is_err());
    }
}
