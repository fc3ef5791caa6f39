//! The semantic model: assemblies, modules, types, members, and their identity.
//!
//! This layer sits on top of the raw tables and heaps. Types defined in a module live
//! in an arena (`Vec` of [`TypeDef`] addressed by [`TypeHandle`]), which keeps the
//! cyclic type-module-type graph representable without reference cycles; cross-module
//! references are value-like [`TypeReference`] descriptors. Equality and hashing over
//! all of these are the business of [`comparer::SignatureComparer`], never of derived
//! `PartialEq` impls, because identity rules (version agnosticism, forwarder
//! transparency, null-vs-empty namespaces) are configuration.

mod comparer;
mod loader;
mod resolver;

pub use comparer::{AssemblyKey, SignatureComparer, TypeRefKey};
pub use resolver::AssemblyResolver;

use std::fmt;
use std::sync::Arc;

use crate::metadata::signatures::{
    ArrayDimension, SignatureField, SignatureMethod, SignatureProperty, TypeSignature,
};

/// Four-part assembly version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AssemblyVersion {
    /// Major version component
    pub major: u16,
    /// Minor version component
    pub minor: u16,
    /// Build number component
    pub build: u16,
    /// Revision component
    pub revision: u16,
}

impl AssemblyVersion {
    /// Create a version from its four components
    #[must_use]
    pub fn new(major: u16, minor: u16, build: u16, revision: u16) -> AssemblyVersion {
        AssemblyVersion {
            major,
            minor,
            build,
            revision,
        }
    }
}

impl fmt::Display for AssemblyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

/// Identity of an assembly: the contents of an `Assembly` or `AssemblyRef` row.
///
/// Equality over identities is configuration-dependent (strict or
/// version-agnostic) and therefore lives in [`SignatureComparer`], not here.
#[derive(Debug, Clone)]
pub struct AssemblyIdentity {
    /// Simple assembly name
    pub name: String,
    /// Four-part version
    pub version: AssemblyVersion,
    /// Culture, `None` for culture-neutral assemblies
    pub culture: Option<String>,
    /// Public key or its 8-byte token, as stored in the row
    pub public_key_or_token: Option<Vec<u8>>,
    /// Assembly flags
    pub flags: u32,
}

impl AssemblyIdentity {
    /// A plain identity with only a name and version
    #[must_use]
    pub fn new(name: &str, version: AssemblyVersion) -> AssemblyIdentity {
        AssemblyIdentity {
            name: name.to_string(),
            version,
            culture: None,
            public_key_or_token: None,
            flags: 0,
        }
    }
}

impl fmt::Display for AssemblyIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Version={}", self.name, self.version)?;
        if let Some(culture) = &self.culture {
            write!(f, ", Culture={}", culture)?;
        }
        Ok(())
    }
}

/// Where a type reference resolves: the `ResolutionScope` of its row.
#[derive(Debug, Clone)]
pub enum TypeScope {
    /// A type in another assembly
    Assembly(Arc<AssemblyIdentity>),
    /// A type in another module of the same assembly, by module name
    Module(String),
    /// A type nested inside another referenced type
    Nested(Arc<TypeReference>),
    /// A type defined in the referencing module itself
    CurrentModule,
}

/// A reference to a type by scope, namespace and name.
#[derive(Debug, Clone)]
pub struct TypeReference {
    /// Resolution scope
    pub scope: TypeScope,
    /// Namespace; `None` and the empty string compare equal
    pub namespace: Option<String>,
    /// Type name
    pub name: String,
}

impl TypeReference {
    /// A top-level reference into an assembly
    #[must_use]
    pub fn new(
        assembly: Arc<AssemblyIdentity>,
        namespace: Option<&str>,
        name: &str,
    ) -> TypeReference {
        TypeReference {
            scope: TypeScope::Assembly(assembly),
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
        }
    }

    /// A reference nested inside `declaring`
    #[must_use]
    pub fn nested(declaring: Arc<TypeReference>, name: &str) -> TypeReference {
        TypeReference {
            scope: TypeScope::Nested(declaring),
            namespace: None,
            name: name.to_string(),
        }
    }

    /// Full name in `Namespace.Name` form
    #[must_use]
    pub fn full_name(&self) -> String {
        match self.namespace.as_deref() {
            Some(namespace) if !namespace.is_empty() => format!("{}.{}", namespace, self.name),
            _ => self.name.clone(),
        }
    }
}

/// Handle of a type definition inside its module's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeHandle(pub u32);

/// A type definition or a reference, as they appear at use sites.
#[derive(Debug, Clone)]
pub enum TypeDefOrRef {
    /// A reference to be resolved through scopes
    Ref(Arc<TypeReference>),
    /// A definition pinned to its module and arena handle
    Def {
        /// The module owning the definition
        module: Arc<Module>,
        /// The definition's arena handle
        handle: TypeHandle,
    },
}

/// A field of a type definition.
#[derive(Debug, Clone)]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Field flags
    pub flags: u16,
    /// Decoded field signature
    pub signature: Option<SignatureField>,
}

/// A method of a type definition.
#[derive(Debug, Clone)]
pub struct MethodDef {
    /// Method name
    pub name: String,
    /// Method flags
    pub flags: u16,
    /// Method body RVA, zero for abstract and extern methods
    pub rva: u32,
    /// Decoded method signature
    pub signature: Option<SignatureMethod>,
}

/// A property of a type definition.
#[derive(Debug, Clone)]
pub struct PropertyDef {
    /// Property name
    pub name: String,
    /// Decoded property signature
    pub signature: Option<SignatureProperty>,
}

/// An event of a type definition.
#[derive(Debug, Clone)]
pub struct EventDef {
    /// Event name
    pub name: String,
}

/// A generic parameter of a type definition.
#[derive(Debug, Clone)]
pub struct GenericParamDef {
    /// Ordinal of the parameter
    pub number: u16,
    /// Parameter name
    pub name: String,
}

/// One type definition inside a module's arena.
///
/// The declaring-type and nested-type links are arena handles, so the cyclic
/// graph (type, module, top-level types, type) never owns itself.
#[derive(Debug, Clone, Default)]
pub struct TypeDef {
    /// Namespace; `None` for types without one
    pub namespace: Option<String>,
    /// Type name
    pub name: String,
    /// `TypeAttributes` flags
    pub flags: u32,
    /// Base type, `None` for `<Module>` and interfaces
    pub extends: Option<Arc<TypeReference>>,
    /// Declaring type for nested types
    pub declaring: Option<TypeHandle>,
    /// Nested types in declaration order
    pub nested: Vec<TypeHandle>,
    /// Fields in declaration order
    pub fields: Vec<FieldDef>,
    /// Methods in declaration order
    pub methods: Vec<MethodDef>,
    /// Properties in declaration order
    pub properties: Vec<PropertyDef>,
    /// Events in declaration order
    pub events: Vec<EventDef>,
    /// Generic parameters in ordinal order
    pub generic_params: Vec<GenericParamDef>,
}

impl TypeDef {
    /// Full name in `Namespace.Name` form
    #[must_use]
    pub fn full_name(&self) -> String {
        match self.namespace.as_deref() {
            Some(namespace) if !namespace.is_empty() => format!("{}.{}", namespace, self.name),
            _ => self.name.clone(),
        }
    }
}

/// An `ExportedType` row: a type this assembly re-exports or forwards.
#[derive(Debug, Clone)]
pub struct ExportedTypeEntry {
    /// Namespace of the exported name
    pub namespace: Option<String>,
    /// Exported type name
    pub name: String,
    /// The assembly the name forwards to
    pub target: Arc<AssemblyIdentity>,
}

/// A loaded module: the manifest of its assembly plus its type arena.
#[derive(Debug, Default)]
pub struct Module {
    /// Module name from the `Module` table
    pub name: String,
    /// Module version identifier from the `#GUID` heap
    pub mvid: Option<uguid::Guid>,
    /// Manifest assembly identity, absent for netmodules
    pub assembly: Option<Arc<AssemblyIdentity>>,
    /// Referenced assemblies in row order
    pub assembly_refs: Vec<Arc<AssemblyIdentity>>,
    /// Referenced modules in row order
    pub module_refs: Vec<String>,
    /// Type references in row order
    pub type_refs: Vec<Arc<TypeReference>>,
    /// The type definition arena, in row order
    pub types: Vec<TypeDef>,
    /// Decoded `TypeSpec` signatures in row order
    pub type_specs: Vec<TypeSignature>,
    /// Exported (forwarded) type names
    pub exported_types: Vec<ExportedTypeEntry>,
}

impl Module {
    /// Access a type definition by handle
    #[must_use]
    pub fn type_def(&self, handle: TypeHandle) -> Option<&TypeDef> {
        self.types.get(handle.0 as usize)
    }

    /// Find a top-level type by namespace and name.
    ///
    /// `None` and the empty string are the same namespace.
    #[must_use]
    pub fn top_level_type(&self, namespace: Option<&str>, name: &str) -> Option<TypeHandle> {
        let wanted = namespace.filter(|ns| !ns.is_empty());

        #[allow(clippy::cast_possible_truncation)]
        self.types.iter().enumerate().find_map(|(index, def)| {
            let def_namespace = def.namespace.as_deref().filter(|ns| !ns.is_empty());
            (def.declaring.is_none() && def.name == name && def_namespace == wanted)
                .then_some(TypeHandle(index as u32))
        })
    }

    /// Find a type nested in `declaring` by name
    #[must_use]
    pub fn nested_type(&self, declaring: TypeHandle, name: &str) -> Option<TypeHandle> {
        let parent = self.type_def(declaring)?;
        parent
            .nested
            .iter()
            .copied()
            .find(|&handle| self.type_def(handle).is_some_and(|def| def.name == name))
    }

    /// The forwarder entry for a name, if this assembly forwards it
    #[must_use]
    pub fn forwarder_for(&self, namespace: Option<&str>, name: &str) -> Option<&ExportedTypeEntry> {
        let wanted = namespace.filter(|ns| !ns.is_empty());
        self.exported_types.iter().find(|entry| {
            let entry_namespace = entry.namespace.as_deref().filter(|ns| !ns.is_empty());
            entry.name == name && entry_namespace == wanted
        })
    }

    /// Resolve the tokens of a raw type signature against a module's tables,
    /// producing a module-independent [`TypeDescriptor`].
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidToken`] for tokens outside the module's
    /// tables.
    pub fn resolve_signature(
        module: &Arc<Module>,
        signature: &TypeSignature,
    ) -> crate::Result<TypeDescriptor> {
        resolve_signature_guarded(module, signature, 0)
    }
}

fn resolve_token(
    module: &Arc<Module>,
    token: crate::metadata::token::Token,
    depth: usize,
) -> crate::Result<TypeDescriptor> {
    let row = token.row();
    if row == 0 {
        return Err(crate::Error::InvalidToken(token));
    }

    match token.table() {
        0x02 => {
            if row as usize > module.types.len() {
                return Err(crate::Error::InvalidToken(token));
            }
            Ok(TypeDescriptor::Type(TypeDefOrRef::Def {
                module: module.clone(),
                handle: TypeHandle(row - 1),
            }))
        }
        0x01 => match module.type_refs.get(row as usize - 1) {
            Some(reference) => Ok(TypeDescriptor::Type(TypeDefOrRef::Ref(reference.clone()))),
            None => Err(crate::Error::InvalidToken(token)),
        },
        0x1B => match module.type_specs.get(row as usize - 1) {
            Some(signature) => resolve_signature_guarded(module, &signature.clone(), depth + 1),
            None => Err(crate::Error::InvalidToken(token)),
        },
        _ => Err(crate::Error::InvalidToken(token)),
    }
}

fn resolve_signature_guarded(
    module: &Arc<Module>,
    signature: &TypeSignature,
    depth: usize,
) -> crate::Result<TypeDescriptor> {
    if depth > 50 {
        return Err(crate::Error::RecursionLimit(50));
    }

    Ok(match signature {
        TypeSignature::Class(token) | TypeSignature::ValueType(token) => {
            resolve_token(module, *token, depth)?
        }
        TypeSignature::Ptr(pointer) => TypeDescriptor::Ptr(Box::new(resolve_signature_guarded(
            module,
            &pointer.base,
            depth + 1,
        )?)),
        TypeSignature::ByRef(inner) => TypeDescriptor::ByRef(Box::new(
            resolve_signature_guarded(module, inner, depth + 1)?,
        )),
        TypeSignature::SzArray(array) => TypeDescriptor::SzArray(Box::new(
            resolve_signature_guarded(module, &array.base, depth + 1)?,
        )),
        TypeSignature::Array(array) => TypeDescriptor::Array {
            base: Box::new(resolve_signature_guarded(module, &array.base, depth + 1)?),
            rank: array.rank,
            dimensions: array.dimensions.clone(),
        },
        TypeSignature::GenericInst(base, args) => {
            let mut resolved_args = Vec::with_capacity(args.len());
            for arg in args {
                resolved_args.push(resolve_signature_guarded(module, arg, depth + 1)?);
            }
            TypeDescriptor::GenericInst {
                base: Box::new(resolve_signature_guarded(module, base, depth + 1)?),
                args: resolved_args,
            }
        }
        TypeSignature::GenericParamType(index) => TypeDescriptor::Var(*index),
        TypeSignature::GenericParamMethod(index) => TypeDescriptor::MVar(*index),
        TypeSignature::Pinned(inner) => TypeDescriptor::Pinned(Box::new(
            resolve_signature_guarded(module, inner, depth + 1)?,
        )),
        TypeSignature::Modified(modified) => {
            resolve_signature_guarded(module, &modified.base, depth + 1)?
        }
        other => TypeDescriptor::Primitive(other.clone()),
    })
}

/// A type signature with its tokens resolved to descriptors, comparable
/// across modules.
#[derive(Debug, Clone)]
pub enum TypeDescriptor {
    /// A primitive or otherwise context-free signature element
    Primitive(TypeSignature),
    /// A class or value type
    Type(TypeDefOrRef),
    /// Unmanaged pointer
    Ptr(Box<TypeDescriptor>),
    /// Managed reference
    ByRef(Box<TypeDescriptor>),
    /// Single-dimensional array
    SzArray(Box<TypeDescriptor>),
    /// General array with rank and dimensions
    Array {
        /// Element type
        base: Box<TypeDescriptor>,
        /// Number of dimensions
        rank: u32,
        /// Declared dimensions
        dimensions: Vec<ArrayDimension>,
    },
    /// Generic instantiation
    GenericInst {
        /// The generic type being instantiated
        base: Box<TypeDescriptor>,
        /// The type arguments
        args: Vec<TypeDescriptor>,
    },
    /// Generic parameter of the enclosing type
    Var(u32),
    /// Generic parameter of the enclosing method
    MVar(u32),
    /// A pinned type
    Pinned(Box<TypeDescriptor>),
}

/// A method at a use site: declaring type, name, signature.
#[derive(Debug, Clone)]
pub struct MethodReference {
    /// The type declaring the method
    pub parent: TypeDefOrRef,
    /// Method name
    pub name: String,
    /// The method signature
    pub signature: SignatureMethod,
}

/// A method descriptor: a plain method or an instantiated generic method.
///
/// A specification never equals its base generic method, which the comparer
/// enforces by dispatching on this enum.
#[derive(Debug, Clone)]
pub enum MethodDescriptor {
    /// A method definition or reference
    Method(MethodReference),
    /// An instantiated generic method
    Specialization {
        /// The generic method being instantiated
        method: MethodReference,
        /// The type arguments
        type_args: Vec<TypeSignature>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module_with_types() -> Arc<Module> {
        let mut module = Module {
            name: "lib.dll".to_string(),
            assembly: Some(Arc::new(AssemblyIdentity::new(
                "Lib",
                AssemblyVersion::new(1, 0, 0, 0),
            ))),
            ..Default::default()
        };

        module.types.push(TypeDef {
            namespace: Some("Some.Namespace".to_string()),
            name: "Outer".to_string(),
            nested: vec![TypeHandle(1)],
            ..Default::default()
        });
        module.types.push(TypeDef {
            name: "Inner".to_string(),
            declaring: Some(TypeHandle(0)),
            ..Default::default()
        });
        module.types.push(TypeDef {
            namespace: Some(String::new()),
            name: "GlobalType".to_string(),
            ..Default::default()
        });

        Arc::new(module)
    }

    #[test]
    fn top_level_lookup() {
        let module = module_with_types();

        assert_eq!(
            module.top_level_type(Some("Some.Namespace"), "Outer"),
            Some(TypeHandle(0))
        );
        // Nested types are not top-level
        assert_eq!(module.top_level_type(None, "Inner"), None);
        // Null and empty namespaces coincide
        assert_eq!(
            module.top_level_type(None, "GlobalType"),
            Some(TypeHandle(2))
        );
        assert_eq!(
            module.top_level_type(Some(""), "GlobalType"),
            Some(TypeHandle(2))
        );
    }

    #[test]
    fn nested_lookup() {
        let module = module_with_types();

        assert_eq!(
            module.nested_type(TypeHandle(0), "Inner"),
            Some(TypeHandle(1))
        );
        assert_eq!(module.nested_type(TypeHandle(0), "Absent"), None);
    }

    #[test]
    fn signature_resolution_binds_tokens() {
        let module = module_with_types();

        let descriptor = Module::resolve_signature(
            &module,
            &TypeSignature::Class(crate::metadata::token::Token::new(0x0200_0001)),
        )
        .unwrap();

        let TypeDescriptor::Type(TypeDefOrRef::Def { module: owner, handle }) = descriptor else {
            panic!("expected a definition descriptor");
        };
        assert!(Arc::ptr_eq(&owner, &module));
        assert_eq!(handle, TypeHandle(0));

        // The containing module of a definition is the module owning its row
        assert_eq!(owner.type_def(handle).unwrap().name, "Outer");
    }

    #[test]
    fn out_of_range_tokens_are_invalid() {
        let module = module_with_types();

        assert!(Module::resolve_signature(
            &module,
            &TypeSignature::Class(crate::metadata::token::Token::new(0x0200_0009)),
        )
        .is_err());
        assert!(Module::resolve_signature(
            &module,
            &TypeSignature::ValueType(crate::metadata::token::Token::new(0x0100_0001)),
        )
        .is_err());
    }

    #[test]
    fn display_forms() {
        let identity = AssemblyIdentity {
            culture: Some("en-US".to_string()),
            ..AssemblyIdentity::new("SomeAssembly", AssemblyVersion::new(1, 2, 3, 4))
        };
        assert_eq!(
            identity.to_string(),
            "SomeAssembly, Version=1.2.3.4, Culture=en-US"
        );

        let reference = TypeReference::new(Arc::new(identity), Some("Some.Ns"), "Type");
        assert_eq!(reference.full_name(), "Some.Ns.Type");
    }
}
