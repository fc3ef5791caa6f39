//! Coded index types and their decoded representation.
//!
//! Coded indices pack a table selector and a row index into one value: the low bits hold
//! a tag choosing among a fixed set of tables, the remaining bits hold the 1-based row.
//! Which set applies, and therefore how many tag bits are needed, depends on the column.
//!
//! # Reference
//! - [ECMA-335 II.24.2.6](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use strum::{EnumCount, EnumIter};

use crate::{
    metadata::{tables::TableId, token::Token},
    Result,
};

/// The coded index kinds defined in ECMA-335 II.24.2.6.
///
/// Each kind names the set of tables its tag can select. Slots marked unused
/// in the standard decode to an error.
#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy, EnumIter, EnumCount)]
#[repr(usize)]
pub enum CodedIndexType {
    /// `TypeDef`, `TypeRef` or `TypeSpec`
    TypeDefOrRef,
    /// `Field`, `Param` or `Property`
    HasConstant,
    /// Any of the 22 attributable tables
    HasCustomAttribute,
    /// `Field` or `Param`
    HasFieldMarshal,
    /// `TypeDef`, `MethodDef` or `Assembly`
    HasDeclSecurity,
    /// `TypeDef`, `TypeRef`, `ModuleRef`, `MethodDef` or `TypeSpec`
    MemberRefParent,
    /// `Event` or `Property`
    HasSemantics,
    /// `MethodDef` or `MemberRef`
    MethodDefOrRef,
    /// `Field` or `MethodDef`
    MemberForwarded,
    /// `File`, `AssemblyRef` or `ExportedType`
    Implementation,
    /// `MethodDef` or `MemberRef`, with three unused tag slots
    CustomAttributeType,
    /// `Module`, `ModuleRef`, `AssemblyRef` or `TypeRef`
    ResolutionScope,
    /// `TypeDef` or `MethodDef`
    TypeOrMethodDef,
}

impl CodedIndexType {
    /// The tables selectable by this kind, in tag order. `None` marks a tag
    /// value the standard reserves.
    #[must_use]
    pub fn tables(&self) -> &'static [Option<TableId>] {
        match self {
            CodedIndexType::TypeDefOrRef => &[
                Some(TableId::TypeDef),
                Some(TableId::TypeRef),
                Some(TableId::TypeSpec),
            ],
            CodedIndexType::HasConstant => &[
                Some(TableId::Field),
                Some(TableId::Param),
                Some(TableId::Property),
            ],
            CodedIndexType::HasCustomAttribute => &[
                Some(TableId::MethodDef),
                Some(TableId::Field),
                Some(TableId::TypeRef),
                Some(TableId::TypeDef),
                Some(TableId::Param),
                Some(TableId::InterfaceImpl),
                Some(TableId::MemberRef),
                Some(TableId::Module),
                // The standard labels this slot 'Permission'; the table is DeclSecurity
                Some(TableId::DeclSecurity),
                Some(TableId::Property),
                Some(TableId::Event),
                Some(TableId::StandAloneSig),
                Some(TableId::ModuleRef),
                Some(TableId::TypeSpec),
                Some(TableId::Assembly),
                Some(TableId::AssemblyRef),
                Some(TableId::File),
                Some(TableId::ExportedType),
                Some(TableId::ManifestResource),
                Some(TableId::GenericParam),
                Some(TableId::GenericParamConstraint),
                Some(TableId::MethodSpec),
            ],
            CodedIndexType::HasFieldMarshal => &[Some(TableId::Field), Some(TableId::Param)],
            CodedIndexType::HasDeclSecurity => &[
                Some(TableId::TypeDef),
                Some(TableId::MethodDef),
                Some(TableId::Assembly),
            ],
            CodedIndexType::MemberRefParent => &[
                Some(TableId::TypeDef),
                Some(TableId::TypeRef),
                Some(TableId::ModuleRef),
                Some(TableId::MethodDef),
                Some(TableId::TypeSpec),
            ],
            CodedIndexType::HasSemantics => &[Some(TableId::Event), Some(TableId::Property)],
            CodedIndexType::MethodDefOrRef => {
                &[Some(TableId::MethodDef), Some(TableId::MemberRef)]
            }
            CodedIndexType::MemberForwarded => &[Some(TableId::Field), Some(TableId::MethodDef)],
            CodedIndexType::Implementation => &[
                Some(TableId::File),
                Some(TableId::AssemblyRef),
                Some(TableId::ExportedType),
            ],
            CodedIndexType::CustomAttributeType => &[
                None,
                None,
                Some(TableId::MethodDef),
                Some(TableId::MemberRef),
                None,
            ],
            CodedIndexType::ResolutionScope => &[
                Some(TableId::Module),
                Some(TableId::ModuleRef),
                Some(TableId::AssemblyRef),
                Some(TableId::TypeRef),
            ],
            CodedIndexType::TypeOrMethodDef => {
                &[Some(TableId::TypeDef), Some(TableId::MethodDef)]
            }
        }
    }

    /// Number of low bits used by the tag
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn tag_bits(&self) -> u8 {
        let len = self.tables().len() as u32;
        (32 - (len - 1).leading_zeros()) as u8
    }
}

/// A decoded coded index: the selected table, the 1-based row, and the
/// equivalent metadata token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodedIndex {
    /// The table this index refers to
    pub tag: TableId,
    /// The 1-based row within that table; 0 is the null reference
    pub row: u32,
    /// The equivalent metadata token
    pub token: Token,
}

impl CodedIndex {
    /// Create a `CodedIndex` from a table and row, deriving the token
    #[must_use]
    pub fn new(tag: TableId, row: u32) -> CodedIndex {
        CodedIndex {
            tag,
            row,
            token: Token::from_parts(tag as u8, row),
        }
    }

    /// Decode a raw coded value.
    ///
    /// ## Arguments
    /// * 'value' - The raw value read from a table column
    /// * 'ci_type' - Which coded index kind governs the tag set
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] when the tag selects a reserved slot.
    pub fn decode(value: u32, ci_type: CodedIndexType) -> Result<CodedIndex> {
        let tables = ci_type.tables();
        let tag_bits = ci_type.tag_bits();
        let tag = (value & ((1 << tag_bits) - 1)) as usize;
        let row = value >> tag_bits;

        match tables.get(tag) {
            Some(Some(table)) => Ok(CodedIndex::new(*table, row)),
            _ => Err(malformed_error!(
                "Tag {} is not valid for {:?}",
                tag,
                ci_type
            )),
        }
    }

    /// Encode back into the raw coded value.
    ///
    /// # Errors
    /// Returns [`crate::Error::Error`] when this index's table is not a member
    /// of the kind's tag set; that is a caller bug, not damaged input.
    pub fn encode(&self, ci_type: CodedIndexType) -> Result<u32> {
        let tables = ci_type.tables();
        let tag = tables
            .iter()
            .position(|entry| *entry == Some(self.tag))
            .ok_or_else(|| {
                crate::Error::Error(format!(
                    "Table {:?} is not encodable as {:?}",
                    self.tag, ci_type
                ))
            })?;

        #[allow(clippy::cast_possible_truncation)]
        Ok((self.row << ci_type.tag_bits()) | tag as u32)
    }

    /// A null reference within the given tag set's first valid table
    #[must_use]
    pub fn null(ci_type: CodedIndexType) -> CodedIndex {
        let table = ci_type
            .tables()
            .iter()
            .flatten()
            .next()
            .copied()
            .unwrap_or(TableId::Module);
        CodedIndex::new(table, 0)
    }

    /// True when this index references no row
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.row == 0
    }
}

impl TryFrom<Token> for CodedIndex {
    type Error = crate::Error;

    fn try_from(token: Token) -> Result<CodedIndex> {
        let Some(table) = TableId::from_raw(token.table()) else {
            return Err(crate::Error::InvalidToken(token));
        };

        Ok(CodedIndex::new(table, token.row()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_bit_counts() {
        assert_eq!(CodedIndexType::TypeDefOrRef.tag_bits(), 2);
        assert_eq!(CodedIndexType::HasConstant.tag_bits(), 2);
        assert_eq!(CodedIndexType::HasCustomAttribute.tag_bits(), 5);
        assert_eq!(CodedIndexType::HasFieldMarshal.tag_bits(), 1);
        assert_eq!(CodedIndexType::MemberRefParent.tag_bits(), 3);
        assert_eq!(CodedIndexType::CustomAttributeType.tag_bits(), 3);
        assert_eq!(CodedIndexType::ResolutionScope.tag_bits(), 2);
    }

    #[test]
    fn decode_resolution_scope() {
        // (64 << 2) | 1 == ModuleRef row 64
        let index = CodedIndex::decode(0x0101, CodedIndexType::ResolutionScope).unwrap();
        assert_eq!(index.tag, TableId::ModuleRef);
        assert_eq!(index.row, 64);
        assert_eq!(index.token, Token::new(0x1A00_0040));
    }

    #[test]
    fn encode_decode_inverse() {
        use strum::IntoEnumIterator;

        for ci_type in CodedIndexType::iter() {
            for (tag, table) in ci_type.tables().iter().enumerate() {
                let Some(table) = table else { continue };
                let index = CodedIndex::new(*table, 0x123);
                let encoded = index.encode(ci_type).unwrap();
                assert_eq!(encoded & ((1 << ci_type.tag_bits()) - 1), tag as u32);
                assert_eq!(CodedIndex::decode(encoded, ci_type).unwrap(), index);
            }
        }
    }

    #[test]
    fn reserved_tags_are_rejected() {
        // CustomAttributeType tag 0 is reserved
        assert!(CodedIndex::decode(0x8, CodedIndexType::CustomAttributeType).is_err());
        // Tag 2 (MethodDef) decodes
        let index = CodedIndex::decode(0xA, CodedIndexType::CustomAttributeType).unwrap();
        assert_eq!(index.tag, TableId::MethodDef);
        assert_eq!(index.row, 1);
    }

    #[test]
    fn token_conversion() {
        let index = CodedIndex::try_from(Token::new(0x0200_0001)).unwrap();
        assert_eq!(index.tag, TableId::TypeDef);
        assert_eq!(index.row, 1);

        assert!(CodedIndex::try_from(Token::new(0x4500_0001)).is_err());
    }

    #[test]
    fn null_handling() {
        let null = CodedIndex::null(CodedIndexType::TypeDefOrRef);
        assert!(null.is_null());
        assert_eq!(null.tag, TableId::TypeDef);
    }
}
