//! Structural equality and hashing over the semantic model.
//!
//! A [`SignatureComparer`] compares descriptors under an explicit configuration:
//!
//! - **strict** (default): assembly versions must match exactly;
//! - **version-agnostic**: versions are ignored by both equality and hashing, so
//!   reference sets deduplicate across core-library versions.
//!
//! A comparer carrying an [`AssemblyResolver`] additionally sees through type
//! forwarders: a reference equals a definition it resolves to even when the
//! reference's scope names a different (forwarding) assembly. Equality is always an
//! equivalence relation, and `a == b` implies `hash(a) == hash(b)`.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rustc_hash::FxHasher;

use crate::metadata::typesystem::{
    AssemblyIdentity, AssemblyResolver, MethodDescriptor, Module, TypeDefOrRef, TypeDescriptor,
    TypeHandle, TypeReference, TypeScope,
};

/// Configurable structural comparer over semantic descriptors.
#[derive(Default, Clone, Copy)]
pub struct SignatureComparer<'r> {
    resolver: Option<&'r AssemblyResolver>,
    version_agnostic: bool,
}

impl<'r> SignatureComparer<'r> {
    /// A strict comparer without resolution support
    #[must_use]
    pub fn new() -> SignatureComparer<'r> {
        SignatureComparer {
            resolver: None,
            version_agnostic: false,
        }
    }

    /// Ignore assembly versions in both equality and hashing
    #[must_use]
    pub fn version_agnostic(mut self) -> SignatureComparer<'r> {
        self.version_agnostic = true;
        self
    }

    /// See through type forwarders using `resolver`
    #[must_use]
    pub fn with_resolver(mut self, resolver: &'r AssemblyResolver) -> SignatureComparer<'r> {
        self.resolver = Some(resolver);
        self
    }

    /// Whether this comparer ignores assembly versions
    #[must_use]
    pub fn is_version_agnostic(&self) -> bool {
        self.version_agnostic
    }

    /// Assembly identity equality: name, version (unless agnostic), culture,
    /// and public key or token.
    #[must_use]
    pub fn eq_assembly(&self, a: &AssemblyIdentity, b: &AssemblyIdentity) -> bool {
        a.name == b.name
            && (self.version_agnostic || a.version == b.version)
            && a.culture == b.culture
            && a.public_key_or_token == b.public_key_or_token
    }

    /// Hash an assembly identity consistently with [`SignatureComparer::eq_assembly`]
    pub fn hash_assembly<H: Hasher>(&self, identity: &AssemblyIdentity, state: &mut H) {
        identity.name.hash(state);
        if !self.version_agnostic {
            identity.version.hash(state);
        }
        identity.culture.hash(state);
        identity.public_key_or_token.hash(state);
    }

    fn eq_namespace(a: Option<&str>, b: Option<&str>) -> bool {
        let a = a.filter(|ns| !ns.is_empty());
        let b = b.filter(|ns| !ns.is_empty());
        a == b
    }

    fn eq_scope(&self, a: &TypeScope, b: &TypeScope) -> bool {
        match (a, b) {
            (TypeScope::Assembly(x), TypeScope::Assembly(y)) => self.eq_assembly(x, y),
            (TypeScope::Module(x), TypeScope::Module(y)) => x == y,
            (TypeScope::Nested(x), TypeScope::Nested(y)) => self.eq_type_ref(x, y),
            (TypeScope::CurrentModule, TypeScope::CurrentModule) => true,
            _ => false,
        }
    }

    /// Type reference equality: namespace (null and empty coincide), name,
    /// and scope compared recursively; nested references compare their
    /// declaring types in place of a scope.
    #[must_use]
    pub fn eq_type_ref(&self, a: &TypeReference, b: &TypeReference) -> bool {
        a.name == b.name
            && Self::eq_namespace(a.namespace.as_deref(), b.namespace.as_deref())
            && self.eq_scope(&a.scope, &b.scope)
    }

    /// Hash a type reference consistently with [`SignatureComparer::eq_type_ref`]
    pub fn hash_type_ref<H: Hasher>(&self, reference: &TypeReference, state: &mut H) {
        reference.name.hash(state);
        reference
            .namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .hash(state);

        match &reference.scope {
            TypeScope::Assembly(identity) => {
                state.write_u8(0);
                self.hash_assembly(identity, state);
            }
            TypeScope::Module(name) => {
                state.write_u8(1);
                name.hash(state);
            }
            TypeScope::Nested(declaring) => {
                state.write_u8(2);
                self.hash_type_ref(declaring, state);
            }
            TypeScope::CurrentModule => state.write_u8(3),
        }
    }

    fn eq_def_def(
        &self,
        module_a: &Arc<Module>,
        handle_a: TypeHandle,
        module_b: &Arc<Module>,
        handle_b: TypeHandle,
    ) -> bool {
        if Arc::ptr_eq(module_a, module_b) {
            return handle_a == handle_b;
        }

        let (Some(a), Some(b)) = (module_a.type_def(handle_a), module_b.type_def(handle_b)) else {
            return false;
        };

        if a.name != b.name
            || !Self::eq_namespace(a.namespace.as_deref(), b.namespace.as_deref())
        {
            return false;
        }

        match (a.declaring, b.declaring) {
            (Some(da), Some(db)) => self.eq_def_def(module_a, da, module_b, db),
            (None, None) => match (&module_a.assembly, &module_b.assembly) {
                (Some(x), Some(y)) => self.eq_assembly(x, y),
                (None, None) => module_a.name == module_b.name,
                _ => false,
            },
            _ => false,
        }
    }

    fn eq_def_ref(
        &self,
        module: &Arc<Module>,
        handle: TypeHandle,
        reference: &TypeReference,
    ) -> bool {
        let Some(def) = module.type_def(handle) else {
            return false;
        };

        if def.name != reference.name {
            return false;
        }

        // Nested definitions compare their declaring type against the
        // reference's declaring reference
        if let Some(declaring) = def.declaring {
            let TypeScope::Nested(declaring_ref) = &reference.scope else {
                return false;
            };
            return self.eq_def_ref(module, declaring, declaring_ref);
        }

        if !Self::eq_namespace(def.namespace.as_deref(), reference.namespace.as_deref()) {
            return false;
        }

        match &reference.scope {
            TypeScope::Assembly(scope_assembly) => {
                if let Some(own_assembly) = &module.assembly {
                    if self.eq_assembly(own_assembly, scope_assembly) {
                        return true;
                    }
                }

                // Forwarder transparency: the reference may point at an
                // assembly that forwards the name to this definition
                if let Some(resolver) = self.resolver {
                    if let Some((resolved_module, resolved_handle)) =
                        resolver.resolve_type(reference)
                    {
                        return Arc::ptr_eq(&resolved_module, module)
                            && resolved_handle == handle;
                    }
                }

                false
            }
            TypeScope::Module(name) => *name == module.name,
            TypeScope::CurrentModule => true,
            TypeScope::Nested(_) => false,
        }
    }

    /// Equality between any mix of type definitions and references.
    #[must_use]
    pub fn eq_type(&self, a: &TypeDefOrRef, b: &TypeDefOrRef) -> bool {
        match (a, b) {
            (TypeDefOrRef::Ref(x), TypeDefOrRef::Ref(y)) => self.eq_type_ref(x, y),
            (
                TypeDefOrRef::Def {
                    module: ma,
                    handle: ha,
                },
                TypeDefOrRef::Def {
                    module: mb,
                    handle: hb,
                },
            ) => self.eq_def_def(ma, *ha, mb, *hb),
            (TypeDefOrRef::Def { module, handle }, TypeDefOrRef::Ref(reference))
            | (TypeDefOrRef::Ref(reference), TypeDefOrRef::Def { module, handle }) => {
                self.eq_def_ref(module, *handle, reference)
            }
        }
    }

    /// Structural equality over resolved type descriptors.
    #[must_use]
    pub fn eq_type_desc(&self, a: &TypeDescriptor, b: &TypeDescriptor) -> bool {
        match (a, b) {
            (TypeDescriptor::Primitive(x), TypeDescriptor::Primitive(y)) => x == y,
            (TypeDescriptor::Type(x), TypeDescriptor::Type(y)) => self.eq_type(x, y),
            (TypeDescriptor::Ptr(x), TypeDescriptor::Ptr(y))
            | (TypeDescriptor::ByRef(x), TypeDescriptor::ByRef(y))
            | (TypeDescriptor::SzArray(x), TypeDescriptor::SzArray(y))
            | (TypeDescriptor::Pinned(x), TypeDescriptor::Pinned(y)) => self.eq_type_desc(x, y),
            (
                TypeDescriptor::Array {
                    base: base_a,
                    rank: rank_a,
                    dimensions: dims_a,
                },
                TypeDescriptor::Array {
                    base: base_b,
                    rank: rank_b,
                    dimensions: dims_b,
                },
            ) => rank_a == rank_b && dims_a == dims_b && self.eq_type_desc(base_a, base_b),
            (
                TypeDescriptor::GenericInst {
                    base: base_a,
                    args: args_a,
                },
                TypeDescriptor::GenericInst {
                    base: base_b,
                    args: args_b,
                },
            ) => {
                self.eq_type_desc(base_a, base_b)
                    && args_a.len() == args_b.len()
                    && args_a
                        .iter()
                        .zip(args_b)
                        .all(|(x, y)| self.eq_type_desc(x, y))
            }
            (TypeDescriptor::Var(x), TypeDescriptor::Var(y))
            | (TypeDescriptor::MVar(x), TypeDescriptor::MVar(y)) => x == y,
            _ => false,
        }
    }

    /// Method equality: declaring type, name and signature must match, and a
    /// method specialization never equals its base generic method.
    #[must_use]
    pub fn eq_method(&self, a: &MethodDescriptor, b: &MethodDescriptor) -> bool {
        match (a, b) {
            (MethodDescriptor::Method(x), MethodDescriptor::Method(y)) => {
                x.name == y.name && self.eq_type(&x.parent, &y.parent) && x.signature == y.signature
            }
            (
                MethodDescriptor::Specialization {
                    method: method_a,
                    type_args: args_a,
                },
                MethodDescriptor::Specialization {
                    method: method_b,
                    type_args: args_b,
                },
            ) => {
                method_a.name == method_b.name
                    && self.eq_type(&method_a.parent, &method_b.parent)
                    && method_a.signature == method_b.signature
                    && args_a == args_b
            }
            _ => false,
        }
    }

    /// One-shot hash of an assembly identity
    #[must_use]
    pub fn assembly_hash(&self, identity: &AssemblyIdentity) -> u64 {
        let mut hasher = FxHasher::default();
        self.hash_assembly(identity, &mut hasher);
        hasher.finish()
    }

    /// One-shot hash of a type reference
    #[must_use]
    pub fn type_ref_hash(&self, reference: &TypeReference) -> u64 {
        let mut hasher = FxHasher::default();
        self.hash_type_ref(reference, &mut hasher);
        hasher.finish()
    }
}

/// Set and map key for assembly identities under a comparer configuration.
#[derive(Clone)]
pub struct AssemblyKey {
    /// The wrapped identity
    pub identity: Arc<AssemblyIdentity>,
    /// Ignore versions in equality and hashing
    pub version_agnostic: bool,
}

impl AssemblyKey {
    /// Wrap an identity for strict comparison
    #[must_use]
    pub fn strict(identity: Arc<AssemblyIdentity>) -> AssemblyKey {
        AssemblyKey {
            identity,
            version_agnostic: false,
        }
    }

    /// Wrap an identity for version-agnostic comparison
    #[must_use]
    pub fn version_agnostic(identity: Arc<AssemblyIdentity>) -> AssemblyKey {
        AssemblyKey {
            identity,
            version_agnostic: true,
        }
    }

    fn comparer(&self) -> SignatureComparer<'static> {
        if self.version_agnostic {
            SignatureComparer::new().version_agnostic()
        } else {
            SignatureComparer::new()
        }
    }
}

impl PartialEq for AssemblyKey {
    fn eq(&self, other: &Self) -> bool {
        self.comparer().eq_assembly(&self.identity, &other.identity)
    }
}

impl Eq for AssemblyKey {}

impl Hash for AssemblyKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.comparer().hash_assembly(&self.identity, state);
    }
}

/// Set and map key for type references under a comparer configuration.
#[derive(Clone)]
pub struct TypeRefKey {
    /// The wrapped reference
    pub reference: Arc<TypeReference>,
    /// Ignore assembly versions in equality and hashing
    pub version_agnostic: bool,
}

impl TypeRefKey {
    /// Wrap a reference for strict comparison
    #[must_use]
    pub fn strict(reference: Arc<TypeReference>) -> TypeRefKey {
        TypeRefKey {
            reference,
            version_agnostic: false,
        }
    }

    fn comparer(&self) -> SignatureComparer<'static> {
        if self.version_agnostic {
            SignatureComparer::new().version_agnostic()
        } else {
            SignatureComparer::new()
        }
    }
}

impl PartialEq for TypeRefKey {
    fn eq(&self, other: &Self) -> bool {
        self.comparer()
            .eq_type_ref(&self.reference, &other.reference)
    }
}

impl Eq for TypeRefKey {}

impl Hash for TypeRefKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.comparer().hash_type_ref(&self.reference, state);
    }
}
