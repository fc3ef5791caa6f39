//! Signature blob parsing and emission.
//!
//! Signature blobs live in the `#Blob` heap and describe types, methods, fields,
//! properties, local variable slots, type specifications and method specifications.
//! Each blob is a tree of element-type opcodes with compressed integers and coded
//! tokens at the leaves; parsing is mutually recursive and bounded.
//!
//! - [`SignatureParser`] - decodes any blob kind
//! - [`encoders`] - re-emit blobs canonically ([`encode_method_signature`] and friends)
//! - [`TypeSignature`] and friends - the decoded representation
//!
//! # Example
//!
//! ```rust
//! use dotforge::metadata::signatures::{parse_field_signature, TypeSignature};
//! let field = parse_field_signature(&[0x06, 0x0E])?;
//! assert_eq!(field.base, TypeSignature::String);
//! # Ok::<(), dotforge::Error>(())
//! ```
//!
//! # Reference
//! - [ECMA-335 II.23.2](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

mod encoders;
mod parser;
mod types;

pub use encoders::{
    encode_field_signature, encode_local_var_signature, encode_method_signature,
    encode_method_spec_signature, encode_property_signature, encode_type_spec_signature,
};
pub use parser::SignatureParser;
pub use types::{
    ArrayDimension, CallingConvention, SignatureArray, SignatureField, SignatureLocalVariable,
    SignatureLocalVariables, SignatureMethod, SignatureMethodSpec, SignatureModifiedType,
    SignatureModifier, SignatureParameter, SignaturePointer, SignatureProperty, SignatureSzArray,
    SignatureTypeSpec, TypeSignature,
};

use crate::Result;

/// Leading byte of a field signature
pub const FIELD_SIG: u8 = 0x06;
/// Leading byte of a local variable signature
pub const LOCAL_SIG: u8 = 0x07;
/// Property bit of a property signature's leading byte
pub const PROPERTY_SIG: u8 = 0x08;
/// Leading byte of a method specification signature
pub const METHOD_SPEC_SIG: u8 = 0x0A;

/// The element-type opcodes of ECMA-335 II.23.1.16.
#[allow(non_snake_case, missing_docs)]
pub mod ELEMENT_TYPE {
    /// Marks the end of a list in signatures
    pub const END: u8 = 0x00;
    /// Void type (no return value)
    pub const VOID: u8 = 0x01;
    /// Boolean type (true/false)
    pub const BOOLEAN: u8 = 0x02;
    /// 16-bit Unicode character
    pub const CHAR: u8 = 0x03;
    /// Signed 8-bit integer
    pub const I1: u8 = 0x04;
    /// Unsigned 8-bit integer
    pub const U1: u8 = 0x05;
    /// Signed 16-bit integer
    pub const I2: u8 = 0x06;
    /// Unsigned 16-bit integer
    pub const U2: u8 = 0x07;
    /// Signed 32-bit integer
    pub const I4: u8 = 0x08;
    /// Unsigned 32-bit integer
    pub const U4: u8 = 0x09;
    /// Signed 64-bit integer
    pub const I8: u8 = 0x0a;
    /// Unsigned 64-bit integer
    pub const U8: u8 = 0x0b;
    /// 32-bit floating point
    pub const R4: u8 = 0x0c;
    /// 64-bit floating point
    pub const R8: u8 = 0x0d;
    /// String type
    pub const STRING: u8 = 0x0e;
    /// Unmanaged pointer (followed by type)
    pub const PTR: u8 = 0x0f;
    /// Managed reference (followed by type)
    pub const BYREF: u8 = 0x10;
    /// Value type (followed by a `TypeDefOrRef` coded token)
    pub const VALUETYPE: u8 = 0x11;
    /// Reference type (followed by a `TypeDefOrRef` coded token)
    pub const CLASS: u8 = 0x12;
    /// Generic parameter of a generic type, by number
    pub const VAR: u8 = 0x13;
    /// Multi-dimensional array (type, rank, sizes, lower bounds)
    pub const ARRAY: u8 = 0x14;
    /// Generic type instantiation (type, arg count, args)
    pub const GENERICINST: u8 = 0x15;
    /// Typed reference type
    pub const TYPEDBYREF: u8 = 0x16;
    /// Native integer type (System.IntPtr)
    pub const I: u8 = 0x18;
    /// Native unsigned integer type (System.UIntPtr)
    pub const U: u8 = 0x19;
    /// Function pointer (followed by a full method signature)
    pub const FNPTR: u8 = 0x1b;
    /// Object type (System.Object)
    pub const OBJECT: u8 = 0x1c;
    /// Single-dimension array with zero lower bound
    pub const SZARRAY: u8 = 0x1d;
    /// Generic parameter of a generic method, by number
    pub const MVAR: u8 = 0x1e;
    /// Required modifier (followed by a `TypeDefOrRef` coded token)
    pub const CMOD_REQD: u8 = 0x1f;
    /// Optional modifier (followed by a `TypeDefOrRef` coded token)
    pub const CMOD_OPT: u8 = 0x20;
    /// Implemented within the CLI
    pub const INTERNAL: u8 = 0x21;
    /// Modifier flag, OR'd with following element types
    pub const MODIFIER: u8 = 0x40;
    /// Sentinel separating fixed parameters from varargs
    pub const SENTINEL: u8 = 0x41;
    /// Denotes a local variable pinned in place
    pub const PINNED: u8 = 0x45;
}

/// Parse a method signature blob.
///
/// # Errors
/// Propagates parse failures.
pub fn parse_method_signature(data: &[u8]) -> Result<SignatureMethod> {
    SignatureParser::new(data).parse_method_signature()
}

/// Parse a field signature blob.
///
/// # Errors
/// Propagates parse failures.
pub fn parse_field_signature(data: &[u8]) -> Result<SignatureField> {
    SignatureParser::new(data).parse_field_signature()
}

/// Parse a property signature blob.
///
/// # Errors
/// Propagates parse failures.
pub fn parse_property_signature(data: &[u8]) -> Result<SignatureProperty> {
    SignatureParser::new(data).parse_property_signature()
}

/// Parse a local variable signature blob.
///
/// # Errors
/// Propagates parse failures.
pub fn parse_local_var_signature(data: &[u8]) -> Result<SignatureLocalVariables> {
    SignatureParser::new(data).parse_local_var_signature()
}

/// Parse a type specification blob.
///
/// # Errors
/// Propagates parse failures.
pub fn parse_type_spec_signature(data: &[u8]) -> Result<SignatureTypeSpec> {
    SignatureParser::new(data).parse_type_spec_signature()
}

/// Parse a method specification blob.
///
/// # Errors
/// Propagates parse failures.
pub fn parse_method_spec_signature(data: &[u8]) -> Result<SignatureMethodSpec> {
    SignatureParser::new(data).parse_method_spec_signature()
}
