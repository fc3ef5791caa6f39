//! Signature emission, the exact inverse of [`crate::metadata::signatures::SignatureParser`].
//!
//! Every encoder produces the canonical minimal encoding: compressed integers use their
//! shortest form and structures are emitted in the field order the standard prescribes,
//! so `encode(parse(blob)) == blob` for blobs produced by conforming toolchains.

use crate::{
    metadata::signatures::{
        SignatureField, SignatureLocalVariables, SignatureMethod, SignatureMethodSpec,
        SignatureModifier, SignatureParameter, SignatureProperty, SignatureTypeSpec,
        TypeSignature, ELEMENT_TYPE, FIELD_SIG, LOCAL_SIG, METHOD_SPEC_SIG, PROPERTY_SIG,
    },
    Result, Writer,
};

/// Encode a method signature blob (II.23.2.1).
///
/// # Errors
/// Returns an error when a token or count falls outside its compressed range.
pub fn encode_method_signature(method: &SignatureMethod) -> Result<Vec<u8>> {
    let mut writer = Writer::new();
    write_method(&mut writer, method)?;
    Ok(writer.into_inner())
}

/// Encode a field signature blob (II.23.2.4).
///
/// # Errors
/// Returns an error when a token falls outside its compressed range.
pub fn encode_field_signature(field: &SignatureField) -> Result<Vec<u8>> {
    let mut writer = Writer::new();
    writer.write_le::<u8>(FIELD_SIG);
    write_modifiers(&mut writer, &field.modifiers)?;
    write_type(&mut writer, &field.base)?;
    Ok(writer.into_inner())
}

/// Encode a property signature blob (II.23.2.5).
///
/// # Errors
/// Returns an error when a token or count falls outside its compressed range.
pub fn encode_property_signature(property: &SignatureProperty) -> Result<Vec<u8>> {
    let mut writer = Writer::new();

    let mut head = PROPERTY_SIG;
    if property.has_this {
        head |= 0x20;
    }
    writer.write_le::<u8>(head);

    #[allow(clippy::cast_possible_truncation)]
    writer.write_compressed_uint(property.params.len() as u32)?;
    write_modifiers(&mut writer, &property.modifiers)?;
    write_type(&mut writer, &property.base)?;
    for param in &property.params {
        write_param(&mut writer, param)?;
    }

    Ok(writer.into_inner())
}

/// Encode a local variable signature blob (II.23.2.6).
///
/// # Errors
/// Returns an error when a token or count falls outside its compressed range.
pub fn encode_local_var_signature(locals: &SignatureLocalVariables) -> Result<Vec<u8>> {
    let mut writer = Writer::new();
    writer.write_le::<u8>(LOCAL_SIG);

    #[allow(clippy::cast_possible_truncation)]
    writer.write_compressed_uint(locals.locals.len() as u32)?;

    for local in &locals.locals {
        if local.base == TypeSignature::TypedByRef
            && local.modifiers.is_empty()
            && !local.is_byref
            && !local.is_pinned
        {
            writer.write_le::<u8>(ELEMENT_TYPE::TYPEDBYREF);
            continue;
        }

        write_modifiers(&mut writer, &local.modifiers)?;
        if local.is_pinned {
            writer.write_le::<u8>(ELEMENT_TYPE::PINNED);
        }
        if local.is_byref {
            writer.write_le::<u8>(ELEMENT_TYPE::BYREF);
        }
        write_type(&mut writer, &local.base)?;
    }

    Ok(writer.into_inner())
}

/// Encode a type specification blob (II.23.2.14).
///
/// # Errors
/// Returns an error when a token falls outside its compressed range.
pub fn encode_type_spec_signature(spec: &SignatureTypeSpec) -> Result<Vec<u8>> {
    let mut writer = Writer::new();
    write_type(&mut writer, &spec.base)?;
    Ok(writer.into_inner())
}

/// Encode a method specification blob (II.23.2.15).
///
/// # Errors
/// Returns an error when a token or count falls outside its compressed range.
pub fn encode_method_spec_signature(spec: &SignatureMethodSpec) -> Result<Vec<u8>> {
    let mut writer = Writer::new();
    writer.write_le::<u8>(METHOD_SPEC_SIG);

    #[allow(clippy::cast_possible_truncation)]
    writer.write_compressed_uint(spec.generic_args.len() as u32)?;
    for arg in &spec.generic_args {
        write_type(&mut writer, arg)?;
    }

    Ok(writer.into_inner())
}

fn write_method(writer: &mut Writer, method: &SignatureMethod) -> Result<()> {
    let mut convention = method.calling_convention.to_raw();
    if method.has_this {
        convention |= 0x20;
    }
    if method.explicit_this {
        convention |= 0x40;
    }
    if method.param_count_generic > 0 {
        convention |= 0x10;
    }
    writer.write_le::<u8>(convention);

    if method.param_count_generic > 0 {
        writer.write_compressed_uint(method.param_count_generic)?;
    }

    writer.write_compressed_uint(method.param_count())?;
    write_param(writer, &method.return_type)?;

    for param in &method.params {
        write_param(writer, param)?;
    }

    if !method.varargs.is_empty() {
        writer.write_le::<u8>(ELEMENT_TYPE::SENTINEL);
        for param in &method.varargs {
            write_param(writer, param)?;
        }
    }

    Ok(())
}

fn write_param(writer: &mut Writer, param: &SignatureParameter) -> Result<()> {
    write_modifiers(writer, &param.modifiers)?;
    if param.by_ref {
        writer.write_le::<u8>(ELEMENT_TYPE::BYREF);
    }
    write_type(writer, &param.base)
}

fn write_modifiers(writer: &mut Writer, modifiers: &[SignatureModifier]) -> Result<()> {
    for modifier in modifiers {
        writer.write_le::<u8>(if modifier.required {
            ELEMENT_TYPE::CMOD_REQD
        } else {
            ELEMENT_TYPE::CMOD_OPT
        });
        writer.write_compressed_token(modifier.token)?;
    }
    Ok(())
}

#[allow(clippy::cast_possible_truncation)]
fn write_type(writer: &mut Writer, signature: &TypeSignature) -> Result<()> {
    match signature {
        TypeSignature::Void => writer.write_le::<u8>(ELEMENT_TYPE::VOID),
        TypeSignature::Boolean => writer.write_le::<u8>(ELEMENT_TYPE::BOOLEAN),
        TypeSignature::Char => writer.write_le::<u8>(ELEMENT_TYPE::CHAR),
        TypeSignature::I1 => writer.write_le::<u8>(ELEMENT_TYPE::I1),
        TypeSignature::U1 => writer.write_le::<u8>(ELEMENT_TYPE::U1),
        TypeSignature::I2 => writer.write_le::<u8>(ELEMENT_TYPE::I2),
        TypeSignature::U2 => writer.write_le::<u8>(ELEMENT_TYPE::U2),
        TypeSignature::I4 => writer.write_le::<u8>(ELEMENT_TYPE::I4),
        TypeSignature::U4 => writer.write_le::<u8>(ELEMENT_TYPE::U4),
        TypeSignature::I8 => writer.write_le::<u8>(ELEMENT_TYPE::I8),
        TypeSignature::U8 => writer.write_le::<u8>(ELEMENT_TYPE::U8),
        TypeSignature::R4 => writer.write_le::<u8>(ELEMENT_TYPE::R4),
        TypeSignature::R8 => writer.write_le::<u8>(ELEMENT_TYPE::R8),
        TypeSignature::String => writer.write_le::<u8>(ELEMENT_TYPE::STRING),
        TypeSignature::I => writer.write_le::<u8>(ELEMENT_TYPE::I),
        TypeSignature::U => writer.write_le::<u8>(ELEMENT_TYPE::U),
        TypeSignature::Object => writer.write_le::<u8>(ELEMENT_TYPE::OBJECT),
        TypeSignature::TypedByRef => writer.write_le::<u8>(ELEMENT_TYPE::TYPEDBYREF),
        TypeSignature::Internal => writer.write_le::<u8>(ELEMENT_TYPE::INTERNAL),
        TypeSignature::Sentinel => writer.write_le::<u8>(ELEMENT_TYPE::SENTINEL),

        TypeSignature::Ptr(pointer) => {
            writer.write_le::<u8>(ELEMENT_TYPE::PTR);
            write_modifiers(writer, &pointer.modifiers)?;
            write_type(writer, &pointer.base)?;
        }
        TypeSignature::ByRef(inner) => {
            writer.write_le::<u8>(ELEMENT_TYPE::BYREF);
            write_type(writer, inner)?;
        }
        TypeSignature::ValueType(token) => {
            writer.write_le::<u8>(ELEMENT_TYPE::VALUETYPE);
            writer.write_compressed_token(*token)?;
        }
        TypeSignature::Class(token) => {
            writer.write_le::<u8>(ELEMENT_TYPE::CLASS);
            writer.write_compressed_token(*token)?;
        }
        TypeSignature::GenericParamType(index) => {
            writer.write_le::<u8>(ELEMENT_TYPE::VAR);
            writer.write_compressed_uint(*index)?;
        }
        TypeSignature::GenericParamMethod(index) => {
            writer.write_le::<u8>(ELEMENT_TYPE::MVAR);
            writer.write_compressed_uint(*index)?;
        }
        TypeSignature::Array(array) => {
            writer.write_le::<u8>(ELEMENT_TYPE::ARRAY);
            write_type(writer, &array.base)?;
            writer.write_compressed_uint(array.rank)?;

            let sizes: Vec<u32> = array
                .dimensions
                .iter()
                .filter_map(|dimension| dimension.size)
                .collect();
            writer.write_compressed_uint(sizes.len() as u32)?;
            for size in sizes {
                writer.write_compressed_uint(size)?;
            }

            let bounds: Vec<u32> = array
                .dimensions
                .iter()
                .filter_map(|dimension| dimension.lower_bound)
                .collect();
            writer.write_compressed_uint(bounds.len() as u32)?;
            for bound in bounds {
                writer.write_compressed_uint(bound)?;
            }
        }
        TypeSignature::GenericInst(base, args) => {
            writer.write_le::<u8>(ELEMENT_TYPE::GENERICINST);
            write_type(writer, base)?;
            writer.write_compressed_uint(args.len() as u32)?;
            for arg in args {
                write_type(writer, arg)?;
            }
        }
        TypeSignature::FnPtr(method) => {
            writer.write_le::<u8>(ELEMENT_TYPE::FNPTR);
            write_method(writer, method)?;
        }
        TypeSignature::SzArray(array) => {
            writer.write_le::<u8>(ELEMENT_TYPE::SZARRAY);
            write_modifiers(writer, &array.modifiers)?;
            write_type(writer, &array.base)?;
        }
        TypeSignature::Modified(modified) => {
            write_modifiers(writer, &modified.modifiers)?;
            write_type(writer, &modified.base)?;
        }
        TypeSignature::Pinned(inner) => {
            writer.write_le::<u8>(ELEMENT_TYPE::PINNED);
            write_type(writer, inner)?;
        }
        TypeSignature::Unknown => {
            return Err(crate::Error::Error(
                "Cannot encode an unknown type signature".to_string(),
            ))
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::signatures::SignatureParser;

    fn roundtrip_method(blob: &[u8]) {
        let parsed = SignatureParser::new(blob).parse_method_signature().unwrap();
        assert_eq!(encode_method_signature(&parsed).unwrap(), blob);
    }

    #[test]
    fn method_roundtrips() {
        // instance string M(int32)
        roundtrip_method(&[0x20, 0x01, 0x0E, 0x08]);

        // static void M()
        roundtrip_method(&[0x00, 0x00, 0x01]);

        // generic instance with complex types
        roundtrip_method(&[
            0x30, 0x01, 0x02, // HASTHIS|GENERIC, 1 generic, 2 params
            0x15, 0x12, 0x2A, 0x02, 0x15, 0x12, 0x49, 0x01, 0x08, 0x1D, 0x0E, // return
            0x10, 0x13, 0x00, // ref T
            0x1D, 0x15, 0x12, 0x49, 0x01, 0x08, // List<int>[]
        ]);

        // vararg with sentinel
        roundtrip_method(&[0x05, 0x02, 0x08, 0x08, 0x41, 0x0E]);
    }

    #[test]
    fn field_roundtrips() {
        for blob in [
            &[0x06_u8, 0x0E][..],
            // modreq'd field type
            &[0x06, 0x1F, 0x42, 0x08][..],
        ] {
            let parsed = SignatureParser::new(blob).parse_field_signature().unwrap();
            assert_eq!(encode_field_signature(&parsed).unwrap(), blob);
        }
    }

    #[test]
    fn property_roundtrips() {
        // instance int this[string]
        let blob = [0x28, 0x01, 0x08, 0x0E];
        let parsed = SignatureParser::new(&blob)
            .parse_property_signature()
            .unwrap();
        assert!(parsed.has_this);
        assert_eq!(encode_property_signature(&parsed).unwrap(), blob);
    }

    #[test]
    fn locals_roundtrip() {
        // pinned object, ref int, typedref
        let blob = [0x07, 0x03, 0x45, 0x1C, 0x10, 0x08, 0x16];
        let parsed = SignatureParser::new(&blob)
            .parse_local_var_signature()
            .unwrap();
        assert_eq!(parsed.locals.len(), 3);
        assert_eq!(encode_local_var_signature(&parsed).unwrap(), blob);
    }

    #[test]
    fn type_spec_and_method_spec_roundtrip() {
        // TypeSpec: int[,] with sizes
        let blob = [0x14, 0x08, 0x02, 0x02, 0x02, 0x03, 0x00];
        let parsed = SignatureParser::new(&blob)
            .parse_type_spec_signature()
            .unwrap();
        assert_eq!(encode_type_spec_signature(&parsed).unwrap(), blob);

        // MethodSpec: <int, string>
        let blob = [0x0A, 0x02, 0x08, 0x0E];
        let parsed = SignatureParser::new(&blob)
            .parse_method_spec_signature()
            .unwrap();
        assert_eq!(encode_method_spec_signature(&parsed).unwrap(), blob);
    }

    #[test]
    fn fnptr_roundtrips() {
        // void (*)(int)
        let blob = [0x1B, 0x00, 0x01, 0x01, 0x08];
        let parsed = SignatureParser::new(&blob)
            .parse_type_spec_signature()
            .unwrap();
        assert_eq!(encode_type_spec_signature(&parsed).unwrap(), blob);
    }

    #[test]
    fn unknown_type_is_not_encodable() {
        let spec = SignatureTypeSpec {
            base: TypeSignature::Unknown,
        };
        assert!(encode_type_spec_signature(&spec).is_err());
    }
}
