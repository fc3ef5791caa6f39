//! Assembly and type resolution with an explicit, injectable cache.
//!
//! An [`AssemblyResolver`] maps assembly names to loaded manifest modules. Resolution is
//! deterministic: the same cache contents always produce the same answers, and there is
//! no process-wide state; callers construct and share resolvers explicitly.
//!
//! Type resolution follows a `TypeRef`'s scope to its assembly, then looks the name up
//! among the manifest module's top-level types; nested references resolve their
//! declaring type first. When the target assembly forwards the name through an
//! `ExportedType` row, resolution continues in the forwarded-to assembly, with a
//! visited set guarding against forwarder cycles.

use std::sync::Arc;

use dashmap::DashMap;

use crate::metadata::typesystem::{
    AssemblyIdentity, Module, TypeHandle, TypeReference, TypeScope,
};

/// Name-keyed cache of loaded assemblies (manifest modules).
#[derive(Default)]
pub struct AssemblyResolver {
    cache: DashMap<String, Arc<Module>>,
}

impl AssemblyResolver {
    /// An empty resolver
    #[must_use]
    pub fn new() -> AssemblyResolver {
        AssemblyResolver {
            cache: DashMap::new(),
        }
    }

    fn cache_key(identity: &AssemblyIdentity) -> String {
        identity.name.to_ascii_lowercase()
    }

    /// Bind an identity to a loaded module.
    ///
    /// Later bindings for the same name replace earlier ones.
    pub fn add_to_cache(&self, identity: &AssemblyIdentity, module: Arc<Module>) {
        self.cache.insert(Self::cache_key(identity), module);
    }

    /// Bind a module under its own manifest identity.
    ///
    /// # Errors
    /// Returns [`crate::Error::Error`] when the module has no assembly
    /// manifest (a netmodule).
    pub fn register(&self, module: Arc<Module>) -> crate::Result<()> {
        let Some(identity) = module.assembly.clone() else {
            return Err(crate::Error::Error(format!(
                "Module '{}' carries no assembly manifest",
                module.name
            )));
        };

        self.add_to_cache(&identity, module);
        Ok(())
    }

    /// Resolve an assembly reference to its manifest module, or `None`.
    ///
    /// Lookups and comparisons never fail; absence is `None`.
    #[must_use]
    pub fn resolve(&self, reference: &AssemblyIdentity) -> Option<Arc<Module>> {
        self.cache
            .get(&Self::cache_key(reference))
            .map(|entry| entry.value().clone())
    }

    /// Resolve an assembly reference that the caller requires to exist.
    ///
    /// # Errors
    /// Returns [`crate::Error::ResolutionFailure`] naming the reference when
    /// no binding is cached.
    pub fn resolve_required(&self, reference: &AssemblyIdentity) -> crate::Result<Arc<Module>> {
        self.resolve(reference)
            .ok_or_else(|| crate::Error::ResolutionFailure(reference.to_string()))
    }

    /// Resolve a type reference to its defining module and handle, or `None`.
    ///
    /// Follows assembly scopes, nested declaring chains, and `ExportedType`
    /// forwarders (cycle-guarded). References scoped to the current module
    /// need context; use [`AssemblyResolver::resolve_type_in`].
    #[must_use]
    pub fn resolve_type(&self, reference: &TypeReference) -> Option<(Arc<Module>, TypeHandle)> {
        match &reference.scope {
            TypeScope::Assembly(identity) => self.resolve_in_assembly(
                identity,
                reference.namespace.as_deref(),
                &reference.name,
                &mut Vec::new(),
            ),
            TypeScope::Nested(declaring) => {
                let (module, declaring_handle) = self.resolve_type(declaring)?;
                let handle = module.nested_type(declaring_handle, &reference.name)?;
                Some((module, handle))
            }
            TypeScope::Module(_) | TypeScope::CurrentModule => None,
        }
    }

    /// Resolve a type reference with a context module for same-module and
    /// same-assembly scopes.
    #[must_use]
    pub fn resolve_type_in(
        &self,
        context: &Arc<Module>,
        reference: &TypeReference,
    ) -> Option<(Arc<Module>, TypeHandle)> {
        match &reference.scope {
            TypeScope::CurrentModule => {
                let handle =
                    context.top_level_type(reference.namespace.as_deref(), &reference.name)?;
                Some((context.clone(), handle))
            }
            TypeScope::Module(name) if *name == context.name => {
                let handle =
                    context.top_level_type(reference.namespace.as_deref(), &reference.name)?;
                Some((context.clone(), handle))
            }
            _ => self.resolve_type(reference),
        }
    }

    fn resolve_in_assembly(
        &self,
        identity: &AssemblyIdentity,
        namespace: Option<&str>,
        name: &str,
        visited: &mut Vec<String>,
    ) -> Option<(Arc<Module>, TypeHandle)> {
        let key = Self::cache_key(identity);
        if visited.contains(&key) {
            return None;
        }
        visited.push(key);

        let module = self.resolve(identity)?;

        if let Some(handle) = module.top_level_type(namespace, name) {
            return Some((module, handle));
        }

        let forwarder = module.forwarder_for(namespace, name)?;
        let target = forwarder.target.clone();
        self.resolve_in_assembly(&target, namespace, name, visited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::typesystem::{
        AssemblyVersion, ExportedTypeEntry, SignatureComparer, TypeDef,
    };

    fn identity(name: &str) -> Arc<AssemblyIdentity> {
        Arc::new(AssemblyIdentity::new(name, AssemblyVersion::new(1, 0, 0, 0)))
    }

    fn module_with_type(
        assembly: &Arc<AssemblyIdentity>,
        namespace: Option<&str>,
        name: &str,
    ) -> Arc<Module> {
        let mut module = Module {
            name: format!("{}.dll", assembly.name),
            assembly: Some(assembly.clone()),
            ..Default::default()
        };
        module.types.push(TypeDef {
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
            ..Default::default()
        });
        Arc::new(module)
    }

    #[test]
    fn resolve_through_cache() {
        let resolver = AssemblyResolver::new();
        let lib = identity("Lib");
        let module = module_with_type(&lib, Some("Ns"), "SomeType");
        resolver.register(module.clone()).unwrap();

        let found = resolver.resolve(&lib).unwrap();
        assert!(Arc::ptr_eq(&found, &module));

        // Lookup is by simple name
        let other_version = identity("lib");
        assert!(resolver.resolve(&other_version).is_some());

        assert!(resolver.resolve(&identity("Absent")).is_none());
        assert!(matches!(
            resolver.resolve_required(&identity("Absent")),
            Err(crate::Error::ResolutionFailure(_))
        ));
    }

    #[test]
    fn resolve_top_level_and_nested_types() {
        let resolver = AssemblyResolver::new();
        let lib = identity("Lib");

        let mut module = Module {
            name: "Lib.dll".to_string(),
            assembly: Some(lib.clone()),
            ..Default::default()
        };
        module.types.push(TypeDef {
            namespace: Some("Ns".to_string()),
            name: "Outer".to_string(),
            nested: vec![TypeHandle(1)],
            ..Default::default()
        });
        module.types.push(TypeDef {
            name: "Inner".to_string(),
            declaring: Some(TypeHandle(0)),
            ..Default::default()
        });
        resolver.register(Arc::new(module)).unwrap();

        let outer_ref = TypeReference::new(lib.clone(), Some("Ns"), "Outer");
        let (_, handle) = resolver.resolve_type(&outer_ref).unwrap();
        assert_eq!(handle, TypeHandle(0));

        let inner_ref = TypeReference::nested(Arc::new(outer_ref), "Inner");
        let (_, handle) = resolver.resolve_type(&inner_ref).unwrap();
        assert_eq!(handle, TypeHandle(1));

        let missing = TypeReference::new(lib, Some("Ns"), "Missing");
        assert!(resolver.resolve_type(&missing).is_none());
    }

    #[test]
    fn forwarded_types_resolve_in_target_assembly() {
        let resolver = AssemblyResolver::new();

        let facade_id = identity("Facade");
        let impl_id = identity("Implementation");

        // The facade assembly forwards Ns.Forwarded to the implementation
        let facade = Arc::new(Module {
            name: "Facade.dll".to_string(),
            assembly: Some(facade_id.clone()),
            exported_types: vec![ExportedTypeEntry {
                namespace: Some("Ns".to_string()),
                name: "Forwarded".to_string(),
                target: impl_id.clone(),
            }],
            ..Default::default()
        });
        let implementation = module_with_type(&impl_id, Some("Ns"), "Forwarded");

        resolver.register(facade).unwrap();
        resolver.register(implementation.clone()).unwrap();

        let reference = TypeReference::new(facade_id.clone(), Some("Ns"), "Forwarded");
        let (module, handle) = resolver.resolve_type(&reference).unwrap();
        assert!(Arc::ptr_eq(&module, &implementation));
        assert_eq!(handle, TypeHandle(0));

        // Forwarder transparency in the comparer: the reference through the
        // facade equals the definition it resolves to
        let comparer = SignatureComparer::new().with_resolver(&resolver);
        use crate::metadata::typesystem::TypeDefOrRef;
        assert!(comparer.eq_type(
            &TypeDefOrRef::Ref(Arc::new(reference)),
            &TypeDefOrRef::Def {
                module: implementation,
                handle: TypeHandle(0),
            },
        ));
    }

    #[test]
    fn references_through_distinct_forwarders_stay_distinct() {
        let resolver = AssemblyResolver::new();

        let first_facade = identity("FirstFacade");
        let second_facade = identity("SecondFacade");
        let first_impl = identity("FirstImpl");
        let second_impl = identity("SecondImpl");

        for (facade, target) in [(&first_facade, &first_impl), (&second_facade, &second_impl)] {
            resolver
                .register(Arc::new(Module {
                    name: format!("{}.dll", facade.name),
                    assembly: Some(facade.clone()),
                    exported_types: vec![ExportedTypeEntry {
                        namespace: Some("Ns".to_string()),
                        name: "Shared".to_string(),
                        target: (*target).clone(),
                    }],
                    ..Default::default()
                }))
                .unwrap();
            resolver
                .register(module_with_type(target, Some("Ns"), "Shared"))
                .unwrap();
        }

        let first_ref = TypeReference::new(first_facade, Some("Ns"), "Shared");
        let second_ref = TypeReference::new(second_facade, Some("Ns"), "Shared");

        // Equality follows resolved identity: distinct definitions, unequal
        let (first_module, _) = resolver.resolve_type(&first_ref).unwrap();
        let (second_module, _) = resolver.resolve_type(&second_ref).unwrap();
        assert!(!Arc::ptr_eq(&first_module, &second_module));

        let comparer = SignatureComparer::new().with_resolver(&resolver);
        assert!(!comparer.eq_type_ref(&first_ref, &second_ref));
    }

    #[test]
    fn forwarder_cycles_terminate() {
        let resolver = AssemblyResolver::new();

        let first = identity("First");
        let second = identity("Second");

        // First forwards to Second, Second forwards back to First
        resolver
            .register(Arc::new(Module {
                name: "First.dll".to_string(),
                assembly: Some(first.clone()),
                exported_types: vec![ExportedTypeEntry {
                    namespace: None,
                    name: "Ghost".to_string(),
                    target: second.clone(),
                }],
                ..Default::default()
            }))
            .unwrap();
        resolver
            .register(Arc::new(Module {
                name: "Second.dll".to_string(),
                assembly: Some(second),
                exported_types: vec![ExportedTypeEntry {
                    namespace: None,
                    name: "Ghost".to_string(),
                    target: first.clone(),
                }],
                ..Default::default()
            }))
            .unwrap();

        let reference = TypeReference::new(first, None, "Ghost");
        assert!(resolver.resolve_type(&reference).is_none());
    }

    #[test]
    fn current_module_scope_needs_context() {
        let resolver = AssemblyResolver::new();
        let lib = identity("Lib");
        let module = module_with_type(&lib, Some("Ns"), "Local");
        resolver.register(module.clone()).unwrap();

        let reference = TypeReference {
            scope: TypeScope::CurrentModule,
            namespace: Some("Ns".to_string()),
            name: "Local".to_string(),
        };

        assert!(resolver.resolve_type(&reference).is_none());
        let (found, handle) = resolver.resolve_type_in(&module, &reference).unwrap();
        assert!(Arc::ptr_eq(&found, &module));
        assert_eq!(handle, TypeHandle(0));
    }
}
