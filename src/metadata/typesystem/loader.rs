//! Bridge from the raw tables and heaps to the semantic model.
//!
//! [`Module::from_metadata`] walks a parsed [`MetadataDirectory`] and materializes the
//! module's identity, its reference lists, and the type arena with members attached.
//! Damage inside member signatures is recoverable (the signature field becomes absent);
//! damage in the tables stream or required heaps is fatal.

use std::sync::Arc;

use crate::{
    metadata::{
        directory::MetadataDirectory,
        signatures::{
            parse_field_signature, parse_method_signature, parse_property_signature,
            parse_type_spec_signature, TypeSignature,
        },
        streams::{Blob, Strings},
        tables::{TableId, TableRow},
        token::Token,
        typesystem::{
            AssemblyIdentity, AssemblyVersion, EventDef, ExportedTypeEntry, FieldDef,
            GenericParamDef, MethodDef, Module, PropertyDef, TypeDef, TypeHandle, TypeReference,
            TypeScope,
        },
    },
    Result,
};

/// Nesting bound for chains of `TypeRef` scopes
const MAX_REF_NESTING: usize = 64;

impl Module {
    /// Load the semantic model from parsed metadata.
    ///
    /// # Errors
    /// Returns an error when the tables stream or the `#Strings` heap is
    /// absent or damaged, or when a row index is out of range.
    pub fn from_metadata(directory: &MetadataDirectory) -> Result<Module> {
        let tables = directory.tables()?;
        let strings = directory.strings()?;
        let blob = directory.blob().ok();
        let guids = directory.guid().ok();

        let read_str = |index: u64| -> Result<String> {
            Ok(strings.get(index as usize)?.to_string())
        };
        let read_opt_str = |index: u64| -> Result<Option<String>> {
            let value = strings.get(index as usize)?;
            Ok(if value.is_empty() {
                None
            } else {
                Some(value.to_string())
            })
        };
        let read_blob = |index: u64| -> Option<Vec<u8>> {
            blob.as_ref()
                .and_then(|heap| heap.get(index as usize).ok())
                .map(<[u8]>::to_vec)
        };

        let mut module = Module::default();

        // Module table: name and MVID
        if let Some(table) = tables.table(TableId::Module) {
            let row = table.row(1)?;
            module.name = read_str(row.value_named("Name").unwrap_or_default())?;
            module.mvid = guids.as_ref().and_then(|heap| {
                heap.get(row.value_named("Mvid").unwrap_or_default() as usize).ok()
            });
        }

        // Assembly manifest
        if let Some(table) = tables.table(TableId::Assembly) {
            let row = table.row(1)?;
            module.assembly = Some(Arc::new(read_assembly_identity(
                &row, &strings, blob.as_ref(), true,
            )?));
        }

        // Reference lists
        if let Some(table) = tables.table(TableId::AssemblyRef) {
            for row in table.iter() {
                let row = row?;
                module.assembly_refs.push(Arc::new(read_assembly_identity(
                    &row, &strings, blob.as_ref(), false,
                )?));
            }
        }

        if let Some(table) = tables.table(TableId::ModuleRef) {
            for row in table.iter() {
                let row = row?;
                module
                    .module_refs
                    .push(read_str(row.value_named("Name").unwrap_or_default())?);
            }
        }

        // Type references, with nested scopes resolved recursively
        if let Some(table) = tables.table(TableId::TypeRef) {
            let rows: Result<Vec<TableRow>> = table.iter().collect();
            let rows = rows?;

            let mut cache: Vec<Option<Arc<TypeReference>>> = vec![None; rows.len()];
            for index in 0..rows.len() {
                let reference =
                    build_type_ref(index, &rows, &module, &strings, &mut cache, 0)?;
                module.type_refs.push(reference);
            }
        }

        // Type definitions with member ranges
        if let Some(table) = tables.table(TableId::TypeDef) {
            let rows: Result<Vec<TableRow>> = table.iter().collect();
            let rows = rows?;

            let field_rows = collect_rows(tables.table(TableId::Field))?;
            let method_rows = collect_rows(tables.table(TableId::MethodDef))?;

            for (index, row) in rows.iter().enumerate() {
                let mut def = TypeDef {
                    namespace: read_opt_str(row.value_named("TypeNamespace").unwrap_or_default())?,
                    name: read_str(row.value_named("TypeName").unwrap_or_default())?,
                    flags: row.value_named("Flags").unwrap_or_default() as u32,
                    ..Default::default()
                };

                let extends = row.coded_index(3)?;
                if !extends.is_null() {
                    def.extends = resolve_extends(&extends.token, &rows, &module, &strings)?;
                }

                let fields = list_range(&rows, index, "FieldList", field_rows.len());
                for field_row in &field_rows[fields] {
                    def.fields.push(FieldDef {
                        name: read_str(field_row.value_named("Name").unwrap_or_default())?,
                        flags: field_row.value_named("Flags").unwrap_or_default() as u16,
                        signature: read_blob(
                            field_row.value_named("Signature").unwrap_or_default(),
                        )
                        .and_then(|bytes| parse_field_signature(&bytes).ok()),
                    });
                }

                let methods = list_range(&rows, index, "MethodList", method_rows.len());
                for method_row in &method_rows[methods] {
                    def.methods.push(MethodDef {
                        name: read_str(method_row.value_named("Name").unwrap_or_default())?,
                        flags: method_row.value_named("Flags").unwrap_or_default() as u16,
                        rva: method_row.value_named("RVA").unwrap_or_default() as u32,
                        signature: read_blob(
                            method_row.value_named("Signature").unwrap_or_default(),
                        )
                        .and_then(|bytes| parse_method_signature(&bytes).ok()),
                    });
                }

                module.types.push(def);
            }

            attach_properties(&mut module, tables, &strings, blob.as_ref())?;
            attach_events(&mut module, tables, &strings)?;
            attach_generic_params(&mut module, tables, &strings)?;

            // Nesting links
            if let Some(nested_table) = tables.table(TableId::NestedClass) {
                for row in nested_table.iter() {
                    let row = row?;
                    let nested = row.value_named("NestedClass").unwrap_or_default() as u32;
                    let enclosing = row.value_named("EnclosingClass").unwrap_or_default() as u32;

                    if nested == 0
                        || enclosing == 0
                        || nested as usize > module.types.len()
                        || enclosing as usize > module.types.len()
                    {
                        return Err(crate::Error::InvalidToken(Token::from_parts(
                            TableId::TypeDef as u8,
                            nested,
                        )));
                    }

                    module.types[nested as usize - 1].declaring =
                        Some(TypeHandle(enclosing - 1));
                    module.types[enclosing as usize - 1]
                        .nested
                        .push(TypeHandle(nested - 1));
                }
            }
        }

        // Forwarders
        if let Some(table) = tables.table(TableId::ExportedType) {
            for row in table.iter() {
                let row = row?;
                let implementation = row.coded_index(4)?;
                if implementation.tag != TableId::AssemblyRef || implementation.is_null() {
                    continue;
                }

                let Some(target) = module
                    .assembly_refs
                    .get(implementation.row as usize - 1)
                    .cloned()
                else {
                    return Err(crate::Error::InvalidToken(implementation.token));
                };

                module.exported_types.push(ExportedTypeEntry {
                    namespace: read_opt_str(
                        row.value_named("TypeNamespace").unwrap_or_default(),
                    )?,
                    name: read_str(row.value_named("TypeName").unwrap_or_default())?,
                    target,
                });
            }
        }

        // Type specifications
        if let Some(table) = tables.table(TableId::TypeSpec) {
            for row in table.iter() {
                let row = row?;
                let signature = read_blob(row.value_named("Signature").unwrap_or_default())
                    .and_then(|bytes| parse_type_spec_signature(&bytes).ok())
                    .map_or(TypeSignature::Unknown, |spec| spec.base);
                module.type_specs.push(signature);
            }
        }

        Ok(module)
    }
}

fn collect_rows(
    table: Option<crate::metadata::streams::TableSlice<'_>>,
) -> Result<Vec<TableRow>> {
    match table {
        Some(slice) => slice.iter().collect(),
        None => Ok(Vec::new()),
    }
}

/// The half-open 0-based range a list column covers for row `index`
fn list_range(
    rows: &[TableRow],
    index: usize,
    column: &str,
    total: usize,
) -> std::ops::Range<usize> {
    let start = rows[index].value_named(column).unwrap_or(1).max(1) as usize - 1;
    let end = rows
        .get(index + 1)
        .and_then(|next| next.value_named(column))
        .map_or(total, |value| (value.max(1) as usize - 1).min(total));

    start.min(total)..end.max(start.min(total))
}

fn read_assembly_identity(
    row: &TableRow,
    strings: &Strings,
    blob: Option<&Blob>,
    is_definition: bool,
) -> Result<AssemblyIdentity> {
    let key_column = if is_definition {
        "PublicKey"
    } else {
        "PublicKeyOrToken"
    };

    let key = blob
        .and_then(|heap| {
            heap.get(row.value_named(key_column).unwrap_or_default() as usize)
                .ok()
        })
        .filter(|bytes| !bytes.is_empty())
        .map(<[u8]>::to_vec);

    let culture = strings
        .get(row.value_named("Culture").unwrap_or_default() as usize)?
        .to_string();

    Ok(AssemblyIdentity {
        name: strings
            .get(row.value_named("Name").unwrap_or_default() as usize)?
            .to_string(),
        version: AssemblyVersion::new(
            row.value_named("MajorVersion").unwrap_or_default() as u16,
            row.value_named("MinorVersion").unwrap_or_default() as u16,
            row.value_named("BuildNumber").unwrap_or_default() as u16,
            row.value_named("RevisionNumber").unwrap_or_default() as u16,
        ),
        culture: if culture.is_empty() { None } else { Some(culture) },
        public_key_or_token: key,
        flags: row.value_named("Flags").unwrap_or_default() as u32,
    })
}

fn build_type_ref(
    index: usize,
    rows: &[TableRow],
    module: &Module,
    strings: &Strings,
    cache: &mut Vec<Option<Arc<TypeReference>>>,
    depth: usize,
) -> Result<Arc<TypeReference>> {
    if let Some(cached) = &cache[index] {
        return Ok(cached.clone());
    }
    if depth > MAX_REF_NESTING {
        return Err(crate::Error::RecursionLimit(MAX_REF_NESTING));
    }

    let row = &rows[index];
    let scope_index = row.coded_index(0)?;
    let scope_row = || {
        scope_index
            .row
            .checked_sub(1)
            .map(|value| value as usize)
            .ok_or(crate::Error::InvalidToken(scope_index.token))
    };

    let scope = match scope_index.tag {
        TableId::AssemblyRef => {
            let Some(identity) = module.assembly_refs.get(scope_row()?).cloned() else {
                return Err(crate::Error::InvalidToken(scope_index.token));
            };
            TypeScope::Assembly(identity)
        }
        TableId::ModuleRef => {
            let Some(name) = module.module_refs.get(scope_row()?).cloned() else {
                return Err(crate::Error::InvalidToken(scope_index.token));
            };
            TypeScope::Module(name)
        }
        TableId::Module => TypeScope::CurrentModule,
        TableId::TypeRef => {
            let declaring_index = scope_row()?;
            if declaring_index >= rows.len() {
                return Err(crate::Error::InvalidToken(scope_index.token));
            }
            TypeScope::Nested(build_type_ref(
                declaring_index,
                rows,
                module,
                strings,
                cache,
                depth + 1,
            )?)
        }
        _ => return Err(crate::Error::InvalidToken(scope_index.token)),
    };

    let namespace = strings
        .get(row.value_named("TypeNamespace").unwrap_or_default() as usize)?
        .to_string();

    let reference = Arc::new(TypeReference {
        scope,
        namespace: if namespace.is_empty() {
            None
        } else {
            Some(namespace)
        },
        name: strings
            .get(row.value_named("TypeName").unwrap_or_default() as usize)?
            .to_string(),
    });

    cache[index] = Some(reference.clone());
    Ok(reference)
}

fn resolve_extends(
    token: &Token,
    typedef_rows: &[TableRow],
    module: &Module,
    strings: &Strings,
) -> Result<Option<Arc<TypeReference>>> {
    match TableId::from_raw(token.table()) {
        Some(TableId::TypeRef) => Ok(module
            .type_refs
            .get(token.row() as usize - 1)
            .cloned()),
        Some(TableId::TypeDef) => {
            let Some(row) = typedef_rows.get(token.row() as usize - 1) else {
                return Err(crate::Error::InvalidToken(*token));
            };
            let namespace = strings
                .get(row.value_named("TypeNamespace").unwrap_or_default() as usize)?
                .to_string();
            Ok(Some(Arc::new(TypeReference {
                scope: TypeScope::CurrentModule,
                namespace: if namespace.is_empty() {
                    None
                } else {
                    Some(namespace)
                },
                name: strings
                    .get(row.value_named("TypeName").unwrap_or_default() as usize)?
                    .to_string(),
            })))
        }
        // Generic base types come through TypeSpec and stay unresolved here
        _ => Ok(None),
    }
}

fn attach_properties(
    module: &mut Module,
    tables: &crate::metadata::streams::TablesStream,
    strings: &Strings,
    blob: Option<&Blob>,
) -> Result<()> {
    let Some(map_table) = tables.table(TableId::PropertyMap) else {
        return Ok(());
    };
    let property_rows = collect_rows(tables.table(TableId::Property))?;
    let map_rows: Result<Vec<TableRow>> = map_table.iter().collect();
    let map_rows = map_rows?;

    for (index, row) in map_rows.iter().enumerate() {
        let parent = row.value_named("Parent").unwrap_or_default() as usize;
        if parent == 0 || parent > module.types.len() {
            continue;
        }

        let range = list_range(&map_rows, index, "PropertyList", property_rows.len());
        for property_row in &property_rows[range] {
            module.types[parent - 1].properties.push(PropertyDef {
                name: strings
                    .get(property_row.value_named("Name").unwrap_or_default() as usize)?
                    .to_string(),
                signature: blob
                    .and_then(|heap| {
                        heap.get(property_row.value_named("Type").unwrap_or_default() as usize)
                            .ok()
                    })
                    .and_then(|bytes| parse_property_signature(bytes).ok()),
            });
        }
    }

    Ok(())
}

fn attach_events(
    module: &mut Module,
    tables: &crate::metadata::streams::TablesStream,
    strings: &Strings,
) -> Result<()> {
    let Some(map_table) = tables.table(TableId::EventMap) else {
        return Ok(());
    };
    let event_rows = collect_rows(tables.table(TableId::Event))?;
    let map_rows: Result<Vec<TableRow>> = map_table.iter().collect();
    let map_rows = map_rows?;

    for (index, row) in map_rows.iter().enumerate() {
        let parent = row.value_named("Parent").unwrap_or_default() as usize;
        if parent == 0 || parent > module.types.len() {
            continue;
        }

        let range = list_range(&map_rows, index, "EventList", event_rows.len());
        for event_row in &event_rows[range] {
            module.types[parent - 1].events.push(EventDef {
                name: strings
                    .get(event_row.value_named("Name").unwrap_or_default() as usize)?
                    .to_string(),
            });
        }
    }

    Ok(())
}

fn attach_generic_params(
    module: &mut Module,
    tables: &crate::metadata::streams::TablesStream,
    strings: &Strings,
) -> Result<()> {
    let Some(table) = tables.table(TableId::GenericParam) else {
        return Ok(());
    };

    for row in table.iter() {
        let row = row?;
        let owner = row.coded_index(2)?;
        if owner.tag != TableId::TypeDef || owner.is_null() {
            continue;
        }

        let Some(def) = module.types.get_mut(owner.row as usize - 1) else {
            continue;
        };
        def.generic_params.push(GenericParamDef {
            number: row.value_named("Number").unwrap_or_default() as u16,
            name: strings
                .get(row.value_named("Name").unwrap_or_default() as usize)?
                .to_string(),
        });
    }

    Ok(())
}
