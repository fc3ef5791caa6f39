//! Identity semantics of the comparer across assemblies, namespaces, nesting
//! and forwarders, exercised through the public API.

use std::collections::HashSet;
use std::sync::Arc;

use dotforge::metadata::typesystem::{
    AssemblyIdentity, AssemblyKey, AssemblyResolver, AssemblyVersion, ExportedTypeEntry, Module,
    SignatureComparer, TypeDef, TypeDefOrRef, TypeHandle, TypeRefKey, TypeReference,
};

fn assembly(name: &str, version: AssemblyVersion) -> Arc<AssemblyIdentity> {
    Arc::new(AssemblyIdentity::new(name, version))
}

#[test]
fn strict_comparison_of_equal_references() {
    let comparer = SignatureComparer::new();

    let a = assembly("SomeAssembly", AssemblyVersion::new(1, 2, 3, 4));
    let b = assembly("SomeAssembly", AssemblyVersion::new(1, 2, 3, 4));

    assert!(comparer.eq_assembly(&a, &b));
    assert_eq!(comparer.assembly_hash(&a), comparer.assembly_hash(&b));
}

#[test]
fn version_agnostic_references_deduplicate() {
    let comparer = SignatureComparer::new().version_agnostic();

    let a = assembly("SomeAssembly", AssemblyVersion::new(1, 2, 3, 4));
    let b = assembly("SomeAssembly", AssemblyVersion::new(5, 6, 7, 8));

    assert!(comparer.eq_assembly(&a, &b));

    let mut set = HashSet::new();
    set.insert(AssemblyKey::version_agnostic(a));
    set.insert(AssemblyKey::version_agnostic(b));
    assert_eq!(set.len(), 1);
}

#[test]
fn namespaces_split_otherwise_equal_references() {
    let comparer = SignatureComparer::new();
    let scope = assembly("Lib", AssemblyVersion::new(1, 0, 0, 0));

    let a = TypeReference::new(scope.clone(), Some("SomeNamespace"), "SomeType");
    let b = TypeReference::new(scope, Some("SomeOtherNamespace"), "SomeType");

    assert!(!comparer.eq_type_ref(&a, &b));
}

#[test]
fn nested_types_with_a_common_name_stay_distinct() {
    let comparer = SignatureComparer::new();
    let scope = assembly("Lib", AssemblyVersion::new(1, 0, 0, 0));

    let first = Arc::new(TypeReference::new(scope.clone(), Some("Ns"), "FirstType"));
    let second = Arc::new(TypeReference::new(scope, Some("Ns"), "SecondType"));

    let a = TypeReference::nested(first, "TypeWithCommonName");
    let b = TypeReference::nested(second, "TypeWithCommonName");

    assert!(!comparer.eq_type_ref(&a, &b));
}

#[test]
fn reference_sets_key_on_scope() {
    let first = TypeReference::new(
        assembly("FirstLib", AssemblyVersion::new(1, 0, 0, 0)),
        Some("Ns"),
        "SomeType",
    );
    let second = TypeReference::new(
        assembly("SecondLib", AssemblyVersion::new(1, 0, 0, 0)),
        Some("Ns"),
        "SomeType",
    );

    let mut distinct = HashSet::new();
    distinct.insert(TypeRefKey::strict(Arc::new(first.clone())));
    distinct.insert(TypeRefKey::strict(Arc::new(second)));
    assert_eq!(distinct.len(), 2);

    let mut same = HashSet::new();
    same.insert(TypeRefKey::strict(Arc::new(first.clone())));
    same.insert(TypeRefKey::strict(Arc::new(first)));
    assert_eq!(same.len(), 1);
}

#[test]
fn definitions_equal_their_references_through_forwarders() {
    let resolver = AssemblyResolver::new();

    let facade_id = assembly("System.Runtime", AssemblyVersion::new(4, 0, 0, 0));
    let corlib_id = assembly("mscorlib", AssemblyVersion::new(4, 0, 0, 0));

    // System.Runtime forwards System.Object to mscorlib
    resolver
        .register(Arc::new(Module {
            name: "System.Runtime.dll".to_string(),
            assembly: Some(facade_id.clone()),
            exported_types: vec![ExportedTypeEntry {
                namespace: Some("System".to_string()),
                name: "Object".to_string(),
                target: corlib_id.clone(),
            }],
            ..Default::default()
        }))
        .unwrap();

    let mut corlib = Module {
        name: "mscorlib.dll".to_string(),
        assembly: Some(corlib_id.clone()),
        ..Default::default()
    };
    corlib.types.push(TypeDef {
        namespace: Some("System".to_string()),
        name: "Object".to_string(),
        ..Default::default()
    });
    let corlib = Arc::new(corlib);
    resolver.register(corlib.clone()).unwrap();

    let through_facade = TypeReference::new(facade_id, Some("System"), "Object");
    let direct = TypeReference::new(corlib_id, Some("System"), "Object");

    let comparer = SignatureComparer::new().with_resolver(&resolver);
    let definition = TypeDefOrRef::Def {
        module: corlib,
        handle: TypeHandle(0),
    };

    // Both routes reach the same definition
    assert!(comparer.eq_type(
        &TypeDefOrRef::Ref(Arc::new(through_facade)),
        &definition
    ));
    assert!(comparer.eq_type(&TypeDefOrRef::Ref(Arc::new(direct)), &definition));
}

#[test]
fn forwarders_to_distinct_definitions_stay_unequal() {
    let resolver = AssemblyResolver::new();

    let facades = [
        assembly("FacadeOne", AssemblyVersion::new(1, 0, 0, 0)),
        assembly("FacadeTwo", AssemblyVersion::new(1, 0, 0, 0)),
    ];
    let targets = [
        assembly("ImplOne", AssemblyVersion::new(1, 0, 0, 0)),
        assembly("ImplTwo", AssemblyVersion::new(1, 0, 0, 0)),
    ];

    for (facade, target) in facades.iter().zip(&targets) {
        resolver
            .register(Arc::new(Module {
                name: format!("{}.dll", facade.name),
                assembly: Some(facade.clone()),
                exported_types: vec![ExportedTypeEntry {
                    namespace: Some("Shared".to_string()),
                    name: "Widget".to_string(),
                    target: target.clone(),
                }],
                ..Default::default()
            }))
            .unwrap();

        let mut module = Module {
            name: format!("{}.dll", target.name),
            assembly: Some(target.clone()),
            ..Default::default()
        };
        module.types.push(TypeDef {
            namespace: Some("Shared".to_string()),
            name: "Widget".to_string(),
            ..Default::default()
        });
        resolver.register(Arc::new(module)).unwrap();
    }

    let first = TypeReference::new(facades[0].clone(), Some("Shared"), "Widget");
    let second = TypeReference::new(facades[1].clone(), Some("Shared"), "Widget");

    // Equality follows resolved identity: different definitions, unequal
    let comparer = SignatureComparer::new().with_resolver(&resolver);
    assert!(!comparer.eq_type_ref(&first, &second));

    let (first_module, _) = resolver.resolve_type(&first).unwrap();
    let (second_module, _) = resolver.resolve_type(&second).unwrap();
    assert!(!Arc::ptr_eq(&first_module, &second_module));
}
