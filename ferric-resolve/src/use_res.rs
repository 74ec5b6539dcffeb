//! `use` statement resolution.
//!
//! Each statement is absolutised against its enclosing module, then bound
//! by walking the name indices. Statements may depend on one another
//! (imports of imports, wildcard chains), so binding runs to a fixpoint:
//! every round binds what it can, and a round with no progress while
//! unbound statements remain is a hard failure. Wildcard cycles terminate
//! because index insertion is idempotent.

use crate::index::{add_import, Namespace, ResolveIndex};
use crate::ResolveError;
use ferric_ast::{
    Bindings, Crate, Edition, IndexEntry, Item, ItemPath, Module, Path, PathClass, TypeBinding,
    ValueBinding,
};
use ferric_diagnostics::Span;

/// One use statement's location in the tree
struct UseSite {
    module: ItemPath,
    item_index: usize,
}

fn gather_uses(module: &Module, out: &mut Vec<UseSite>) {
    for (i, entry) in module.items.iter().enumerate() {
        match &entry.item {
            Item::Use(_) => out.push(UseSite {
                module: module.path.clone(),
                item_index: i,
            }),
            Item::Module(child) => gather_uses(child, out),
            _ => {}
        }
    }
    for anon in &module.anon_modules {
        gather_uses(anon, out);
    }
}

/// Rewrite a use path into absolute form against its enclosing module
fn absolutise_use_path(
    span: &Span,
    module: &ItemPath,
    path: &Path,
) -> Result<(String, Vec<String>), ResolveError> {
    let names = |nodes: &[ferric_ast::PathNode]| -> Vec<String> {
        nodes.iter().map(|n| n.name.clone()).collect()
    };
    match &path.class {
        PathClass::Absolute { krate, nodes } => Ok((krate.clone(), names(nodes))),
        PathClass::Relative { nodes, .. } => {
            // 2015 semantics: a relative use path is crate-root relative
            Ok((module.krate.clone(), names(nodes)))
        }
        PathClass::SelfPath { nodes } => {
            let mut full = module.nodes.clone();
            full.extend(names(nodes));
            Ok((module.krate.clone(), full))
        }
        PathClass::Super { count, nodes } => {
            if *count > module.nodes.len() {
                return Err(ResolveError::SuperOutOfRange { span: span.clone() });
            }
            let mut full = module.nodes[..module.nodes.len() - count].to_vec();
            full.extend(names(nodes));
            Ok((module.krate.clone(), full))
        }
        PathClass::Ufcs { .. } | PathClass::Local { .. } => Err(ResolveError::NameKindMismatch {
            span: span.clone(),
            name: format!("{path}"),
            expected: "module path",
            found: "non-module path".to_string(),
        }),
    }
}

/// Walk the index along a segment list. `None` means "not resolvable with
/// what the index holds so far" - the fixpoint loop retries.
fn lookup_target(
    index: &ResolveIndex,
    edition: Edition,
    krate_name: &str,
    nodes: &[String],
) -> Option<(Bindings, ItemPath)> {
    let mut cur = ItemPath::crate_root(krate_name);
    for (i, seg) in nodes.iter().enumerate() {
        let last = i + 1 == nodes.len();
        let mi = index.module(&cur)?;

        if let Some(entry) = mi.namespace_items.get(seg) {
            if last {
                return Some((entry.binding.clone(), entry.path.clone()));
            }
            match &entry.binding.type_ns {
                TypeBinding::Module(p) => cur = p.clone(),
                TypeBinding::Crate(name) => cur = ItemPath::crate_root(name),
                _ => return None,
            }
            continue;
        }

        if let Some(entry) = mi.type_items.get(seg) {
            if last {
                // Merge with a same-named value entry (tuple structs)
                let mut binding = entry.binding.clone();
                if let Some(ve) = mi.value_items.get(seg) {
                    binding.value_ns = ve.binding.value_ns.clone();
                }
                return Some((binding, entry.path.clone()));
            }
            // `use Enum::Variant` is the only legal continuation through
            // a type
            if let TypeBinding::Enum(enum_path) = &entry.binding.type_ns {
                if i + 2 == nodes.len() {
                    let variants = index.enums.get(enum_path)?;
                    let vname = &nodes[i + 1];
                    let vidx = variants.iter().position(|v| v == vname)?;
                    let binding = Bindings {
                        type_ns: TypeBinding::EnumVariant(enum_path.clone(), vidx),
                        value_ns: ValueBinding::EnumVariant(enum_path.clone(), vidx),
                    };
                    return Some((binding, enum_path.child(vname)));
                }
            }
            return None;
        }

        if last {
            if let Some(entry) = mi.value_items.get(seg) {
                return Some((entry.binding.clone(), entry.path.clone()));
            }
        }

        // 2018: the first segment may name a dependency crate directly
        if i == 0
            && edition == Edition::E2018
            && index.extern_crate_names.iter().any(|n| n == seg)
        {
            cur = ItemPath::crate_root(seg);
            continue;
        }

        return None;
    }
    None
}

/// Copy a wildcard import's entries into the importing module
fn expand_glob(
    index: &mut ResolveIndex,
    span: &Span,
    into: &ItemPath,
    target: &Bindings,
) -> Result<bool, ResolveError> {
    let mut progress = false;
    match &target.type_ns {
        TypeBinding::Module(_) | TypeBinding::Crate(_) => {
            let target_path = match &target.type_ns {
                TypeBinding::Crate(name) => ItemPath::crate_root(name),
                TypeBinding::Module(p) => p.clone(),
                _ => return Ok(false),
            };
            let Some(mi) = index.module(&target_path) else {
                return Ok(false);
            };
            let copies: Vec<(Namespace, String, IndexEntry)> = [
                (Namespace::Namespace, &mi.namespace_items),
                (Namespace::Type, &mi.type_items),
                (Namespace::Value, &mi.value_items),
            ]
            .into_iter()
            .flat_map(|(ns, map)| {
                map.iter().map(move |(name, entry)| {
                    (
                        ns,
                        name.clone(),
                        IndexEntry {
                            is_import: true,
                            ..entry.clone()
                        },
                    )
                })
            })
            .collect();
            for (ns, name, entry) in copies {
                let before = index
                    .module(into)
                    .map(|m| m.map(ns).contains_key(&name))
                    .unwrap_or(false);
                add_import(index, into, ns, &name, entry)?;
                if !before {
                    progress = true;
                }
            }
            Ok(progress)
        }
        TypeBinding::Enum(enum_path) => {
            let variants = index.enums.get(enum_path).cloned().unwrap_or_default();
            for (vidx, vname) in variants.iter().enumerate() {
                let entry = IndexEntry {
                    path: enum_path.child(vname),
                    is_import: true,
                    binding: Bindings {
                        type_ns: TypeBinding::EnumVariant(enum_path.clone(), vidx),
                        value_ns: ValueBinding::EnumVariant(enum_path.clone(), vidx),
                    },
                };
                let before = index
                    .module(into)
                    .map(|m| m.map(Namespace::Value).contains_key(vname))
                    .unwrap_or(false);
                add_import(index, into, Namespace::Type, vname, entry.clone())?;
                add_import(index, into, Namespace::Value, vname, entry)?;
                if !before {
                    progress = true;
                }
            }
            Ok(progress)
        }
        other => Err(ResolveError::BadGlobTarget {
            span: span.clone(),
            found: format!("{other:?}"),
        }),
    }
}

/// Bind every use statement and populate the import entries of the
/// module indices.
pub fn resolve_uses(krate: &mut Crate, index: &mut ResolveIndex) -> Result<(), ResolveError> {
    let edition = krate.edition;
    let mut sites = Vec::new();
    gather_uses(&krate.root, &mut sites);
    log::debug!("use resolution: {} statements", sites.len());

    // (site index, absolute segments, alias name, span, is_glob)
    struct Pending {
        site: usize,
        krate_name: String,
        nodes: Vec<String>,
        alias: String,
        span: Span,
        is_glob: bool,
        bound: Option<Bindings>,
    }
    let mut pending = Vec::new();
    for (i, site) in sites.iter().enumerate() {
        let module = krate
            .module_at(&site.module)
            .and_then(|m| m.items.get(site.item_index));
        let Some(entry) = module else { continue };
        let Item::Use(use_item) = &entry.item else {
            continue;
        };
        let (krate_name, nodes) = absolutise_use_path(&entry.span, &site.module, &use_item.path)?;
        pending.push(Pending {
            site: i,
            krate_name,
            nodes,
            alias: entry.name.clone(),
            span: entry.span.clone(),
            is_glob: use_item.is_glob,
            bound: None,
        });
    }

    loop {
        let mut progress = false;
        for p in pending.iter_mut() {
            if p.bound.is_none() {
                if let Some((binding, path)) = lookup_target(index, edition, &p.krate_name, &p.nodes)
                {
                    let module = sites[p.site].module.clone();
                    if p.is_glob {
                        // Validated during expansion below
                    } else {
                        if !binding.type_ns.is_unbound() {
                            let ns = match binding.type_ns {
                                TypeBinding::Module(_) | TypeBinding::Crate(_) => {
                                    Namespace::Namespace
                                }
                                _ => Namespace::Type,
                            };
                            add_import(
                                index,
                                &module,
                                ns,
                                &p.alias,
                                IndexEntry {
                                    path: path.clone(),
                                    is_import: true,
                                    binding: Bindings {
                                        type_ns: binding.type_ns.clone(),
                                        value_ns: ValueBinding::Unbound,
                                    },
                                },
                            )?;
                        }
                        if !binding.value_ns.is_unbound() {
                            add_import(
                                index,
                                &module,
                                Namespace::Value,
                                &p.alias,
                                IndexEntry {
                                    path: path.clone(),
                                    is_import: true,
                                    binding: Bindings {
                                        type_ns: TypeBinding::Unbound,
                                        value_ns: binding.value_ns.clone(),
                                    },
                                },
                            )?;
                        }
                    }
                    p.bound = Some(binding);
                    progress = true;
                }
            }
            // Globs re-copy each round until the fixpoint settles, so
            // chained wildcards converge
            if p.is_glob {
                if let Some(binding) = p.bound.clone() {
                    let module = sites[p.site].module.clone();
                    if expand_glob(index, &p.span, &module, &binding)? {
                        progress = true;
                    }
                }
            }
        }
        if !progress {
            break;
        }
    }

    // Anything still unbound is a resolution failure
    for p in &pending {
        if p.bound.is_none() {
            return Err(ResolveError::UnresolvedName {
                span: p.span.clone(),
                name: p.nodes.join("::"),
                mode: "import",
                suggestion: None,
            });
        }
    }

    // Write the computed bindings back onto the use statements
    for p in &pending {
        let site = &sites[p.site];
        let module_path = site.module.clone();
        let Some(module) = krate.module_at_mut(&module_path) else {
            continue;
        };
        let Some(entry) = module.items.get_mut(site.item_index) else {
            continue;
        };
        if let Item::Use(use_item) = &mut entry.item {
            use_item.path = Path {
                class: PathClass::Absolute {
                    krate: p.krate_name.clone(),
                    nodes: p.nodes.iter().map(|n| ferric_ast::PathNode::new(n)).collect(),
                },
                bindings: p.bound.clone().unwrap_or_default(),
            };
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::build_definition_index;
    use ferric_ast::{Function, ItemEntry, Module, TypeRef, UseItem};

    /// crate with `mod m { pub fn f() {} }` and `use m::f;` at root
    fn crate_with_use(is_glob: bool) -> Crate {
        let mut krate = Crate::new();
        let m_path = ItemPath::local_root().child("m");
        let mut m = Module::new(m_path);
        m.items.push(ItemEntry::public(
            "f",
            Item::Function(Function::new(vec![], TypeRef::unit(), None)),
        ));
        krate
            .root
            .items
            .push(ItemEntry::public("m", Item::Module(m)));
        let mut use_entry = ItemEntry::new(
            if is_glob { "" } else { "f" },
            Item::Use(UseItem {
                path: Path::relative(vec![
                    ferric_ast::PathNode::new("m"),
                    ferric_ast::PathNode::new("f"),
                ]),
                is_glob: false,
            }),
        );
        if is_glob {
            use_entry.item = Item::Use(UseItem {
                path: Path::relative(vec![ferric_ast::PathNode::new("m")]),
                is_glob: true,
            });
        }
        krate.root.items.push(use_entry);
        krate
    }

    #[test]
    fn test_single_import_binds_value_namespace() {
        let mut krate = crate_with_use(false);
        let mut index = build_definition_index(&krate).unwrap();
        resolve_uses(&mut krate, &mut index).unwrap();

        let root = index.module(&ItemPath::local_root()).unwrap();
        let entry = root.value_items.get("f").expect("imported f");
        assert!(entry.is_import);
        assert_eq!(entry.path, ItemPath::local_root().child("m").child("f"));
        assert!(matches!(
            entry.binding.value_ns,
            ValueBinding::Function(_)
        ));

        // The use statement itself got an absolute, bound path
        let Item::Use(u) = &krate.root.items[1].item else {
            panic!("expected use");
        };
        assert!(matches!(u.path.class, PathClass::Absolute { .. }));
        assert!(matches!(u.path.bindings.value_ns, ValueBinding::Function(_)));
    }

    #[test]
    fn test_glob_import_copies_module_entries() {
        let mut krate = crate_with_use(true);
        let mut index = build_definition_index(&krate).unwrap();
        resolve_uses(&mut krate, &mut index).unwrap();

        let root = index.module(&ItemPath::local_root()).unwrap();
        let entry = root.value_items.get("f").expect("glob-imported f");
        assert!(entry.is_import);
    }

    #[test]
    fn test_unresolvable_import_is_fatal() {
        let mut krate = Crate::new();
        krate.root.items.push(ItemEntry::new(
            "nope",
            Item::Use(UseItem {
                path: Path::relative(vec![ferric_ast::PathNode::new("nope")]),
                is_glob: false,
            }),
        ));
        let mut index = build_definition_index(&krate).unwrap();
        assert!(matches!(
            resolve_uses(&mut krate, &mut index),
            Err(ResolveError::UnresolvedName { .. })
        ));
    }

    #[test]
    fn test_wildcard_cycle_terminates() {
        // mod a { pub use super::b::*; } mod b { pub use super::a::*; }
        let mut krate = Crate::new();
        for (name, other) in [("a", "b"), ("b", "a")] {
            let mut m = Module::new(ItemPath::local_root().child(name));
            let mut e = ItemEntry::new(
                "",
                Item::Use(UseItem {
                    path: Path {
                        class: PathClass::Super {
                            count: 1,
                            nodes: vec![ferric_ast::PathNode::new(other)],
                        },
                        bindings: Default::default(),
                    },
                    is_glob: true,
                }),
            );
            e.is_pub = true;
            m.items.push(e);
            krate
                .root
                .items
                .push(ItemEntry::public(name, Item::Module(m)));
        }
        let mut index = build_definition_index(&krate).unwrap();
        // Must terminate (the cycle carries no real names)
        resolve_uses(&mut krate, &mut index).unwrap();
    }
}
