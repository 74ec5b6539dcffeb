//! Per-module name indices.
//!
//! Stage C builds three maps per module (namespace, type, value). The
//! maps live in a side table while resolution runs, then get written
//! back into the module tree for downstream consumers.

use crate::ResolveError;
use ferric_ast::{
    Bindings, Crate, IndexEntry, Item, ItemEntry, ItemPath, Module, StructKind, TypeBinding,
    ValueBinding,
};
use std::collections::HashMap;

/// Which namespace an index insertion targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Namespace,
    Type,
    Value,
}

#[derive(Debug, Clone, Default)]
pub struct ModuleIndex {
    pub namespace_items: HashMap<String, IndexEntry>,
    pub type_items: HashMap<String, IndexEntry>,
    pub value_items: HashMap<String, IndexEntry>,
}

impl ModuleIndex {
    pub fn map(&self, ns: Namespace) -> &HashMap<String, IndexEntry> {
        match ns {
            Namespace::Namespace => &self.namespace_items,
            Namespace::Type => &self.type_items,
            Namespace::Value => &self.value_items,
        }
    }

    fn map_mut(&mut self, ns: Namespace) -> &mut HashMap<String, IndexEntry> {
        match ns {
            Namespace::Namespace => &mut self.namespace_items,
            Namespace::Type => &mut self.type_items,
            Namespace::Value => &mut self.value_items,
        }
    }
}

/// What a struct looks like to the value namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructShape {
    Unit,
    Tuple,
    Named,
}

/// Name surface of a trait, for UFCS conversion decisions
#[derive(Debug, Clone, Default)]
pub struct TraitInfo {
    /// Associated type names
    pub types: Vec<String>,
    /// Method and associated-const names
    pub values: Vec<String>,
}

impl TraitInfo {
    pub fn has_item(&self, name: &str) -> bool {
        self.types.iter().any(|n| n == name) || self.values.iter().any(|n| n == name)
    }
}

/// The resolver's side tables: module indices plus the item facts needed
/// for path classification.
#[derive(Debug, Default)]
pub struct ResolveIndex {
    pub modules: HashMap<ItemPath, ModuleIndex>,
    pub traits: HashMap<ItemPath, TraitInfo>,
    /// Enum variant names, in declaration order
    pub enums: HashMap<ItemPath, Vec<String>>,
    pub struct_shapes: HashMap<ItemPath, StructShape>,
    /// Extern crate names visible as the implicit 2018 prelude
    pub extern_crate_names: Vec<String>,
}

impl ResolveIndex {
    pub fn module(&self, path: &ItemPath) -> Option<&ModuleIndex> {
        self.modules.get(path)
    }

    fn insert(
        &mut self,
        module: &ItemPath,
        ns: Namespace,
        name: &str,
        entry: IndexEntry,
    ) -> Result<(), ResolveError> {
        let map = self
            .modules
            .entry(module.clone())
            .or_default()
            .map_mut(ns);
        if let Some(existing) = map.get(name) {
            // A re-run over an already-indexed crate must be a no-op
            if existing.path == entry.path {
                return Ok(());
            }
            // Definitions shadow glob imports; two definitions collide
            if existing.is_import && !entry.is_import {
                map.insert(name.to_string(), entry);
                return Ok(());
            }
            if entry.is_import {
                return Ok(());
            }
            return Err(ResolveError::NameCollision {
                span: Default::default(),
                name: name.to_string(),
                module: format!("{module}"),
            });
        }
        map.insert(name.to_string(), entry);
        Ok(())
    }

    /// Add a definition (non-import) entry
    fn define(
        &mut self,
        module: &ItemPath,
        ns: Namespace,
        name: &str,
        bindings: Bindings,
        path: ItemPath,
    ) -> Result<(), ResolveError> {
        self.insert(
            module,
            ns,
            name,
            IndexEntry {
                path,
                is_import: false,
                binding: bindings,
            },
        )
    }
}

fn type_bindings(b: TypeBinding) -> Bindings {
    Bindings {
        type_ns: b,
        value_ns: ValueBinding::Unbound,
    }
}

fn value_bindings(b: ValueBinding) -> Bindings {
    Bindings {
        type_ns: TypeBinding::Unbound,
        value_ns: b,
    }
}

/// Index one module's direct definitions
fn index_module(index: &mut ResolveIndex, module: &Module) -> Result<(), ResolveError> {
    let mod_path = &module.path;
    for entry in &module.items {
        index_item(index, mod_path, entry)?;
    }
    for entry in &module.items {
        if let Item::Module(child) = &entry.item {
            index_module(index, child)?;
        }
    }
    for anon in &module.anon_modules {
        index_module(index, anon)?;
    }
    // Every module gets an index record, even when empty
    index.modules.entry(mod_path.clone()).or_default();
    Ok(())
}

fn index_item(
    index: &mut ResolveIndex,
    mod_path: &ItemPath,
    entry: &ItemEntry,
) -> Result<(), ResolveError> {
    if entry.name.is_empty() {
        return Ok(());
    }
    let item_path = mod_path.child(&entry.name);
    match &entry.item {
        Item::None
        | Item::Use(_)
        | Item::MacroInvocation(_)
        | Item::MacroRules(_)
        | Item::Impl(_)
        | Item::NegImpl(_) => Ok(()),
        Item::Module(_) => index.define(
            mod_path,
            Namespace::Namespace,
            &entry.name,
            type_bindings(TypeBinding::Module(item_path.clone())),
            item_path,
        ),
        Item::ExternCrate { krate } => index.define(
            mod_path,
            Namespace::Namespace,
            &entry.name,
            type_bindings(TypeBinding::Crate(krate.clone())),
            ItemPath::crate_root(krate),
        ),
        Item::Function(_) => index.define(
            mod_path,
            Namespace::Value,
            &entry.name,
            value_bindings(ValueBinding::Function(item_path.clone())),
            item_path,
        ),
        Item::Static(_) => index.define(
            mod_path,
            Namespace::Value,
            &entry.name,
            value_bindings(ValueBinding::Static(item_path.clone())),
            item_path,
        ),
        Item::Const(_) => index.define(
            mod_path,
            Namespace::Value,
            &entry.name,
            value_bindings(ValueBinding::Constant(item_path.clone())),
            item_path,
        ),
        Item::Struct(def) => {
            let shape = match def.kind {
                StructKind::Unit => StructShape::Unit,
                StructKind::Tuple(_) => StructShape::Tuple,
                StructKind::Named(_) => StructShape::Named,
            };
            index.struct_shapes.insert(item_path.clone(), shape);
            index.define(
                mod_path,
                Namespace::Type,
                &entry.name,
                type_bindings(TypeBinding::Struct(item_path.clone())),
                item_path.clone(),
            )?;
            // Unit and tuple structs also occupy the value namespace
            if shape != StructShape::Named {
                index.define(
                    mod_path,
                    Namespace::Value,
                    &entry.name,
                    value_bindings(ValueBinding::Struct(item_path.clone())),
                    item_path,
                )?;
            }
            Ok(())
        }
        Item::Union(_) => index.define(
            mod_path,
            Namespace::Type,
            &entry.name,
            type_bindings(TypeBinding::Union(item_path.clone())),
            item_path,
        ),
        Item::Enum(def) => {
            let variants: Vec<String> = def
                .variants
                .iter()
                .filter(|v| !v.name.is_empty())
                .map(|v| v.name.clone())
                .collect();
            index.enums.insert(item_path.clone(), variants);
            index.define(
                mod_path,
                Namespace::Type,
                &entry.name,
                type_bindings(TypeBinding::Enum(item_path.clone())),
                item_path,
            )
        }
        Item::Trait(def) => {
            let mut info = TraitInfo::default();
            for item in &def.items {
                match &item.item {
                    ferric_ast::TraitItem::Type { .. } => info.types.push(item.name.clone()),
                    ferric_ast::TraitItem::Function(_) | ferric_ast::TraitItem::Const(_) => {
                        info.values.push(item.name.clone())
                    }
                }
            }
            index.traits.insert(item_path.clone(), info);
            index.define(
                mod_path,
                Namespace::Type,
                &entry.name,
                type_bindings(TypeBinding::Trait(item_path.clone())),
                item_path,
            )
        }
        Item::TraitAlias(_) => index.define(
            mod_path,
            Namespace::Type,
            &entry.name,
            type_bindings(TypeBinding::Trait(item_path.clone())),
            item_path,
        ),
        Item::TypeAlias(_) => index.define(
            mod_path,
            Namespace::Type,
            &entry.name,
            type_bindings(TypeBinding::TypeAlias(item_path.clone())),
            item_path,
        ),
        Item::ExternBlock(block) => {
            // Extern functions and statics land in the enclosing module
            for inner in &block.items {
                index_item(index, mod_path, inner)?;
            }
            Ok(())
        }
    }
}

/// Build the definition-level index for the whole crate, including every
/// loaded dependency crate.
pub fn build_definition_index(krate: &Crate) -> Result<ResolveIndex, ResolveError> {
    let mut index = ResolveIndex::default();
    index_module(&mut index, &krate.root)?;
    for info in krate.extern_crates.values() {
        index_module(&mut index, &info.root)?;
        index.extern_crate_names.push(info.name.clone());
    }
    index.extern_crate_names.sort();
    Ok(index)
}

/// Copy the finished indices back into the module tree, fulfilling the
/// "three name indices per module" shape downstream stages consume.
pub fn write_back(krate: &mut Crate, index: &ResolveIndex) {
    fn apply(module: &mut Module, index: &ResolveIndex) {
        if let Some(mi) = index.module(&module.path) {
            module.namespace_items = mi.namespace_items.clone();
            module.type_items = mi.type_items.clone();
            module.value_items = mi.value_items.clone();
        }
        for entry in &mut module.items {
            if let Item::Module(child) = &mut entry.item {
                apply(child, index);
            }
        }
        for anon in &mut module.anon_modules {
            apply(anon, index);
        }
    }
    apply(&mut krate.root, index);
}

/// Add an import (use) entry to a module's index
pub fn add_import(
    index: &mut ResolveIndex,
    module: &ItemPath,
    ns: Namespace,
    name: &str,
    entry: IndexEntry,
) -> Result<(), ResolveError> {
    index.insert(module, ns, name, entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferric_ast::{Enum, EnumVariant, Function, Struct, TypeRef, VariantKind};

    fn sample_crate() -> Crate {
        let mut krate = Crate::new();
        krate.root.items.push(ItemEntry::public(
            "f",
            Item::Function(Function::new(vec![], TypeRef::unit(), None)),
        ));
        krate.root.items.push(ItemEntry::public(
            "S",
            Item::Struct(Struct {
                generics: Default::default(),
                kind: StructKind::Unit,
            }),
        ));
        krate.root.items.push(ItemEntry::public(
            "E",
            Item::Enum(Enum {
                generics: Default::default(),
                variants: vec![
                    EnumVariant {
                        name: "A".to_string(),
                        attrs: vec![],
                        kind: VariantKind::Unit { discriminant: None },
                    },
                    EnumVariant {
                        name: "B".to_string(),
                        attrs: vec![],
                        kind: VariantKind::Unit { discriminant: None },
                    },
                ],
            }),
        ));
        krate
    }

    #[test]
    fn test_definition_index() {
        let krate = sample_crate();
        let index = build_definition_index(&krate).unwrap();
        let root = index.module(&ItemPath::local_root()).unwrap();
        assert!(root.value_items.contains_key("f"));
        assert!(root.type_items.contains_key("S"));
        // A unit struct occupies both namespaces
        assert!(root.value_items.contains_key("S"));
        assert!(root.type_items.contains_key("E"));
        assert_eq!(
            index.enums[&ItemPath::local_root().child("E")],
            vec!["A".to_string(), "B".to_string()]
        );
    }

    #[test]
    fn test_collision_is_fatal() {
        let mut krate = sample_crate();
        krate.root.items.push(ItemEntry::public(
            "f",
            Item::Function(Function::new(vec![], TypeRef::unit(), None)),
        ));
        assert!(matches!(
            build_definition_index(&krate),
            Err(ResolveError::NameCollision { .. })
        ));
    }

    #[test]
    fn test_reindex_is_idempotent() {
        let krate = sample_crate();
        let mut index = build_definition_index(&krate).unwrap();
        // Indexing the same module again changes nothing and errors not
        index_module(&mut index, &krate.root).unwrap();
        let root = index.module(&ItemPath::local_root()).unwrap();
        assert_eq!(root.value_items.len(), 2);
    }
}
