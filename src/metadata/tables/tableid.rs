//! Identifiers of the metadata tables.

use strum::{EnumCount, EnumIter};

/// The metadata tables defined by ECMA-335 II.22, in tag order.
///
/// The discriminant of each variant is the table number, which is also the
/// high byte of tokens referencing that table.
#[derive(Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Clone, Copy, EnumIter, EnumCount)]
#[repr(u8)]
pub enum TableId {
    /// Module definition (0x00)
    Module = 0x00,
    /// Type references (0x01)
    TypeRef = 0x01,
    /// Type definitions (0x02)
    TypeDef = 0x02,
    /// Field pointer indirection, EnC only (0x03)
    FieldPtr = 0x03,
    /// Field definitions (0x04)
    Field = 0x04,
    /// Method pointer indirection, EnC only (0x05)
    MethodPtr = 0x05,
    /// Method definitions (0x06)
    MethodDef = 0x06,
    /// Param pointer indirection, EnC only (0x07)
    ParamPtr = 0x07,
    /// Parameter definitions (0x08)
    Param = 0x08,
    /// Interface implementations (0x09)
    InterfaceImpl = 0x09,
    /// Member references (0x0A)
    MemberRef = 0x0A,
    /// Constant values (0x0B)
    Constant = 0x0B,
    /// Custom attributes (0x0C)
    CustomAttribute = 0x0C,
    /// Field marshalling descriptors (0x0D)
    FieldMarshal = 0x0D,
    /// Declarative security (0x0E)
    DeclSecurity = 0x0E,
    /// Class layout (0x0F)
    ClassLayout = 0x0F,
    /// Field layout (0x10)
    FieldLayout = 0x10,
    /// Standalone signatures (0x11)
    StandAloneSig = 0x11,
    /// Event map (0x12)
    EventMap = 0x12,
    /// Event pointer indirection, EnC only (0x13)
    EventPtr = 0x13,
    /// Event definitions (0x14)
    Event = 0x14,
    /// Property map (0x15)
    PropertyMap = 0x15,
    /// Property pointer indirection, EnC only (0x16)
    PropertyPtr = 0x16,
    /// Property definitions (0x17)
    Property = 0x17,
    /// Method semantics (0x18)
    MethodSemantics = 0x18,
    /// Method implementations (0x19)
    MethodImpl = 0x19,
    /// Module references (0x1A)
    ModuleRef = 0x1A,
    /// Type specifications (0x1B)
    TypeSpec = 0x1B,
    /// P/Invoke implementation map (0x1C)
    ImplMap = 0x1C,
    /// Field RVAs for mapped data (0x1D)
    FieldRva = 0x1D,
    /// Edit-and-Continue log (0x1E)
    EncLog = 0x1E,
    /// Edit-and-Continue map (0x1F)
    EncMap = 0x1F,
    /// Assembly manifest (0x20)
    Assembly = 0x20,
    /// Assembly processor, unused (0x21)
    AssemblyProcessor = 0x21,
    /// Assembly OS, unused (0x22)
    AssemblyOs = 0x22,
    /// Assembly references (0x23)
    AssemblyRef = 0x23,
    /// Assembly reference processor, unused (0x24)
    AssemblyRefProcessor = 0x24,
    /// Assembly reference OS, unused (0x25)
    AssemblyRefOs = 0x25,
    /// Files in the assembly (0x26)
    File = 0x26,
    /// Exported and forwarded types (0x27)
    ExportedType = 0x27,
    /// Manifest resources (0x28)
    ManifestResource = 0x28,
    /// Nested class relationships (0x29)
    NestedClass = 0x29,
    /// Generic parameters (0x2A)
    GenericParam = 0x2A,
    /// Method specifications (0x2B)
    MethodSpec = 0x2B,
    /// Generic parameter constraints (0x2C)
    GenericParamConstraint = 0x2C,
}

/// Highest table number in use
pub const MAX_TABLE_ID: usize = TableId::GenericParamConstraint as usize;

impl TableId {
    /// Decode a raw table number
    #[must_use]
    pub fn from_raw(value: u8) -> Option<TableId> {
        use strum::IntoEnumIterator;
        TableId::iter().find(|&id| id as u8 == value)
    }
}
