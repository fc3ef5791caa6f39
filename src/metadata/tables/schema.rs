//! Column schemas of the 45 metadata tables.
//!
//! Every table row is a fixed sequence of columns; each column is either a fixed-width
//! scalar, a heap index, a simple index into another table, or a coded index. The
//! schemas below drive the generic row codec in [`crate::metadata::tables::row`] and
//! the layout computation in [`crate::metadata::tables::TableInfo`].
//!
//! # Reference
//! - [ECMA-335 II.22](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use crate::metadata::tables::{CodedIndexType, TableId, TableInfo};

/// The kind of one table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Fixed-width little-endian scalar of 1, 2, 4 or 8 bytes
    Fixed(u8),
    /// Index into the `#Strings` heap
    Str,
    /// Index into the `#GUID` heap
    Guid,
    /// Index into the `#Blob` heap
    Blob,
    /// Simple 1-based index into another table
    Table(TableId),
    /// Coded index choosing among a tag set of tables
    Coded(CodedIndexType),
}

impl ColumnKind {
    /// Byte width of this column under the given layout
    #[must_use]
    pub fn width(&self, info: &TableInfo) -> u8 {
        match self {
            ColumnKind::Fixed(bytes) => *bytes,
            ColumnKind::Str => info.str_bytes(),
            ColumnKind::Guid => info.guid_bytes(),
            ColumnKind::Blob => info.blob_bytes(),
            ColumnKind::Table(table) => info.table_index_bytes(*table),
            ColumnKind::Coded(ci_type) => info.coded_index_bytes(*ci_type),
        }
    }
}

/// One named column of a table schema.
#[derive(Debug, Clone, Copy)]
pub struct Column {
    /// Column name as the standard spells it
    pub name: &'static str,
    /// What the column holds
    pub kind: ColumnKind,
}

const fn col(name: &'static str, kind: ColumnKind) -> Column {
    Column { name, kind }
}

use ColumnKind::{Blob, Coded, Fixed, Guid, Str, Table};

impl TableId {
    /// The column schema of this table, in storage order.
    #[must_use]
    pub fn schema(&self) -> &'static [Column] {
        match self {
            TableId::Module => &const { [
                col("Generation", Fixed(2)),
                col("Name", Str),
                col("Mvid", Guid),
                col("EncId", Guid),
                col("EncBaseId", Guid),
            ] },
            TableId::TypeRef => &const { [
                col("ResolutionScope", Coded(CodedIndexType::ResolutionScope)),
                col("TypeName", Str),
                col("TypeNamespace", Str),
            ] },
            TableId::TypeDef => &const { [
                col("Flags", Fixed(4)),
                col("TypeName", Str),
                col("TypeNamespace", Str),
                col("Extends", Coded(CodedIndexType::TypeDefOrRef)),
                col("FieldList", Table(TableId::Field)),
                col("MethodList", Table(TableId::MethodDef)),
            ] },
            TableId::FieldPtr => &const { [col("Field", Table(TableId::Field))] },
            TableId::Field => &const { [
                col("Flags", Fixed(2)),
                col("Name", Str),
                col("Signature", Blob),
            ] },
            TableId::MethodPtr => &const { [col("Method", Table(TableId::MethodDef))] },
            TableId::MethodDef => &const { [
                col("RVA", Fixed(4)),
                col("ImplFlags", Fixed(2)),
                col("Flags", Fixed(2)),
                col("Name", Str),
                col("Signature", Blob),
                col("ParamList", Table(TableId::Param)),
            ] },
            TableId::ParamPtr => &const { [col("Param", Table(TableId::Param))] },
            TableId::Param => &const { [
                col("Flags", Fixed(2)),
                col("Sequence", Fixed(2)),
                col("Name", Str),
            ] },
            TableId::InterfaceImpl => &const { [
                col("Class", Table(TableId::TypeDef)),
                col("Interface", Coded(CodedIndexType::TypeDefOrRef)),
            ] },
            TableId::MemberRef => &const { [
                col("Class", Coded(CodedIndexType::MemberRefParent)),
                col("Name", Str),
                col("Signature", Blob),
            ] },
            TableId::Constant => &const { [
                col("Type", Fixed(1)),
                col("Padding", Fixed(1)),
                col("Parent", Coded(CodedIndexType::HasConstant)),
                col("Value", Blob),
            ] },
            TableId::CustomAttribute => &const { [
                col("Parent", Coded(CodedIndexType::HasCustomAttribute)),
                col("Type", Coded(CodedIndexType::CustomAttributeType)),
                col("Value", Blob),
            ] },
            TableId::FieldMarshal => &const { [
                col("Parent", Coded(CodedIndexType::HasFieldMarshal)),
                col("NativeType", Blob),
            ] },
            TableId::DeclSecurity => &const { [
                col("Action", Fixed(2)),
                col("Parent", Coded(CodedIndexType::HasDeclSecurity)),
                col("PermissionSet", Blob),
            ] },
            TableId::ClassLayout => &const { [
                col("PackingSize", Fixed(2)),
                col("ClassSize", Fixed(4)),
                col("Parent", Table(TableId::TypeDef)),
            ] },
            TableId::FieldLayout => &const { [
                col("Offset", Fixed(4)),
                col("Field", Table(TableId::Field)),
            ] },
            TableId::StandAloneSig => &const { [col("Signature", Blob)] },
            TableId::EventMap => &const { [
                col("Parent", Table(TableId::TypeDef)),
                col("EventList", Table(TableId::Event)),
            ] },
            TableId::EventPtr => &const { [col("Event", Table(TableId::Event))] },
            TableId::Event => &const { [
                col("EventFlags", Fixed(2)),
                col("Name", Str),
                col("EventType", Coded(CodedIndexType::TypeDefOrRef)),
            ] },
            TableId::PropertyMap => &const { [
                col("Parent", Table(TableId::TypeDef)),
                col("PropertyList", Table(TableId::Property)),
            ] },
            TableId::PropertyPtr => &const { [col("Property", Table(TableId::Property))] },
            TableId::Property => &const { [
                col("Flags", Fixed(2)),
                col("Name", Str),
                col("Type", Blob),
            ] },
            TableId::MethodSemantics => &const { [
                col("Semantics", Fixed(2)),
                col("Method", Table(TableId::MethodDef)),
                col("Association", Coded(CodedIndexType::HasSemantics)),
            ] },
            TableId::MethodImpl => &const { [
                col("Class", Table(TableId::TypeDef)),
                col("MethodBody", Coded(CodedIndexType::MethodDefOrRef)),
                col("MethodDeclaration", Coded(CodedIndexType::MethodDefOrRef)),
            ] },
            TableId::ModuleRef => &const { [col("Name", Str)] },
            TableId::TypeSpec => &const { [col("Signature", Blob)] },
            TableId::ImplMap => &const { [
                col("MappingFlags", Fixed(2)),
                col("MemberForwarded", Coded(CodedIndexType::MemberForwarded)),
                col("ImportName", Str),
                col("ImportScope", Table(TableId::ModuleRef)),
            ] },
            TableId::FieldRva => &const { [
                col("RVA", Fixed(4)),
                col("Field", Table(TableId::Field)),
            ] },
            TableId::EncLog => &const { [col("Token", Fixed(4)), col("FuncCode", Fixed(4))] },
            TableId::EncMap => &const { [col("Token", Fixed(4))] },
            TableId::Assembly => &const { [
                col("HashAlgId", Fixed(4)),
                col("MajorVersion", Fixed(2)),
                col("MinorVersion", Fixed(2)),
                col("BuildNumber", Fixed(2)),
                col("RevisionNumber", Fixed(2)),
                col("Flags", Fixed(4)),
                col("PublicKey", Blob),
                col("Name", Str),
                col("Culture", Str),
            ] },
            TableId::AssemblyProcessor => &const { [col("Processor", Fixed(4))] },
            TableId::AssemblyOs => &const { [
                col("OSPlatformId", Fixed(4)),
                col("OSMajorVersion", Fixed(4)),
                col("OSMinorVersion", Fixed(4)),
            ] },
            TableId::AssemblyRef => &const { [
                col("MajorVersion", Fixed(2)),
                col("MinorVersion", Fixed(2)),
                col("BuildNumber", Fixed(2)),
                col("RevisionNumber", Fixed(2)),
                col("Flags", Fixed(4)),
                col("PublicKeyOrToken", Blob),
                col("Name", Str),
                col("Culture", Str),
                col("HashValue", Blob),
            ] },
            TableId::AssemblyRefProcessor => &const { [
                col("Processor", Fixed(4)),
                col("AssemblyRef", Table(TableId::AssemblyRef)),
            ] },
            TableId::AssemblyRefOs => &const { [
                col("OSPlatformId", Fixed(4)),
                col("OSMajorVersion", Fixed(4)),
                col("OSMinorVersion", Fixed(4)),
                col("AssemblyRef", Table(TableId::AssemblyRef)),
            ] },
            TableId::File => &const { [
                col("Flags", Fixed(4)),
                col("Name", Str),
                col("HashValue", Blob),
            ] },
            TableId::ExportedType => &const { [
                col("Flags", Fixed(4)),
                col("TypeDefId", Fixed(4)),
                col("TypeName", Str),
                col("TypeNamespace", Str),
                col("Implementation", Coded(CodedIndexType::Implementation)),
            ] },
            TableId::ManifestResource => &const { [
                col("Offset", Fixed(4)),
                col("Flags", Fixed(4)),
                col("Name", Str),
                col("Implementation", Coded(CodedIndexType::Implementation)),
            ] },
            TableId::NestedClass => &const { [
                col("NestedClass", Table(TableId::TypeDef)),
                col("EnclosingClass", Table(TableId::TypeDef)),
            ] },
            TableId::GenericParam => &const { [
                col("Number", Fixed(2)),
                col("Flags", Fixed(2)),
                col("Owner", Coded(CodedIndexType::TypeOrMethodDef)),
                col("Name", Str),
            ] },
            TableId::MethodSpec => &const { [
                col("Method", Coded(CodedIndexType::MethodDefOrRef)),
                col("Instantiation", Blob),
            ] },
            TableId::GenericParamConstraint => &const { [
                col("Owner", Table(TableId::GenericParam)),
                col("Constraint", Coded(CodedIndexType::TypeDefOrRef)),
            ] },
        }
    }

    /// Byte size of one row of this table under the given layout
    #[must_use]
    pub fn row_size(&self, info: &TableInfo) -> u32 {
        self.schema()
            .iter()
            .map(|column| u32::from(column.kind.width(info)))
            .sum()
    }

    /// The column the standard requires this table to be sorted by, when any.
    ///
    /// Tables in the sorted mask must be emitted in ascending order of this
    /// column's raw value.
    #[must_use]
    pub fn sort_column(&self) -> Option<usize> {
        match self {
            TableId::InterfaceImpl => Some(0),          // Class
            TableId::Constant => Some(2),               // Parent
            TableId::CustomAttribute => Some(0),        // Parent
            TableId::FieldMarshal => Some(0),           // Parent
            TableId::DeclSecurity => Some(1),           // Parent
            TableId::ClassLayout => Some(2),            // Parent
            TableId::FieldLayout => Some(1),            // Field
            TableId::MethodSemantics => Some(2),        // Association
            TableId::MethodImpl => Some(0),             // Class
            TableId::ImplMap => Some(1),                // MemberForwarded
            TableId::FieldRva => Some(1),               // Field
            TableId::NestedClass => Some(0),            // NestedClass
            TableId::GenericParam => Some(2),           // Owner
            TableId::GenericParamConstraint => Some(0), // Owner
            _ => None,
        }
    }

    /// The sorted-tables mask covering every table with a sort key
    #[must_use]
    pub fn default_sorted_mask() -> u64 {
        use strum::IntoEnumIterator;
        TableId::iter()
            .filter(|table| table.sort_column().is_some())
            .fold(0_u64, |mask, table| mask | (1 << (table as u8)))
    }
}
