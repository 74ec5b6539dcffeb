//! Absolutisation: rewriting every path into Absolute, UFCS, or Local
//! form and filling its binding pair.
//!
//! Resolution walks the crate with a strictly nested scope stack. Name
//! lookup proceeds from the innermost scope outwards, then falls through
//! to the crate root, the primitive table, and (2018 edition) the
//! implicit extern-crate map.

use crate::index::{ModuleIndex, ResolveIndex, StructShape};
use crate::ResolveError;
use ferric_ast::{
    Bindings, CoreType, Crate, Edition, ExprKind, ExprNode, Function, GenericBound, GenericParams,
    Hygiene, Impl, Item, ItemPath, Lifetime, Module, Path, PathClass, PathNode, Pattern,
    PatternBinding, PatternKind, PatternValue, Stmt, TraitItem, TypeBinding, TypeRef,
    ValueBinding,
};
use ferric_ast::types::slots;
use ferric_diagnostics::Span;
use std::collections::BTreeMap;

/// What kind of name a lookup wants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupMode {
    /// Any path component
    Namespace,
    Type,
    Constant,
    /// Things that may appear as a value pattern: variants, unit
    /// structs, constants, statics
    PatternValue,
    Variable,
}

impl LookupMode {
    fn describe(&self) -> &'static str {
        match self {
            LookupMode::Namespace => "path component",
            LookupMode::Type => "type name",
            LookupMode::Constant => "constant name",
            LookupMode::PatternValue => "pattern value",
            LookupMode::Variable => "variable name",
        }
    }

}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GenericLevel {
    /// Type definitions, impls, traits: slots 0x0000..
    Impl,
    /// Functions and methods: slots 0x0100..
    Method,
    /// `for<'a>` binders: lifetimes only, no in-band growth below them
    Hrb,
}

impl GenericLevel {
    fn base(&self) -> u16 {
        match self {
            GenericLevel::Impl => slots::LEVEL_IMPL,
            GenericLevel::Method | GenericLevel::Hrb => slots::LEVEL_METHOD,
        }
    }
}

#[derive(Debug, Clone)]
struct VarDef {
    name: String,
    hygiene: Hygiene,
    slot: u32,
}

#[derive(Debug)]
enum Scope {
    Module { path: ItemPath },
    Generic { level: GenericLevel, params: GenericParams },
    VarBlock { vars: Vec<VarDef> },
    ConcreteSelf { ty: TypeRef },
}

/// Binding-set tracking for one or-pattern / match-arm group
#[derive(Debug, Default)]
struct PatBindGroup {
    first: Option<BTreeMap<String, u32>>,
    current: BTreeMap<String, u32>,
}

/// Everything a single identifier lookup can come back with
enum Found {
    Item { path: ItemPath, binding: Bindings },
    Variable(u32),
    TypeParam { slot: u16 },
    ConstParam { slot: u16 },
    SelfType(TypeRef),
    Primitive(CoreType),
}

pub struct Context<'i> {
    index: &'i ResolveIndex,
    edition: Edition,
    local_crate: String,
    scopes: Vec<Scope>,
    var_count: u32,
    patbind: Vec<PatBindGroup>,
}

impl<'i> Context<'i> {
    pub fn new(index: &'i ResolveIndex, edition: Edition) -> Self {
        Context {
            index,
            edition,
            local_crate: String::new(),
            scopes: Vec::new(),
            var_count: 0,
            patbind: Vec::new(),
        }
    }

    fn push(&mut self, scope: Scope) {
        self.scopes.push(scope);
    }

    fn pop(&mut self) -> Option<Scope> {
        self.scopes.pop()
    }

    fn current_module(&self) -> ItemPath {
        for scope in self.scopes.iter().rev() {
            if let Scope::Module { path } = scope {
                return path.clone();
            }
        }
        ItemPath::crate_root(&self.local_crate)
    }

    // ---- variable and pattern-binding bookkeeping ----

    fn start_patbind(&mut self) {
        self.patbind.push(PatBindGroup::default());
    }

    /// Freeze the first alternative's binding set; later alternatives
    /// must introduce exactly the same names.
    fn end_patbind_arm(&mut self, span: &Span) -> Result<(), ResolveError> {
        let Some(group) = self.patbind.last_mut() else {
            return Ok(());
        };
        let current = std::mem::take(&mut group.current);
        match &group.first {
            None => group.first = Some(current),
            Some(first) => {
                if first.keys().collect::<Vec<_>>() != current.keys().collect::<Vec<_>>() {
                    return Err(ResolveError::PatternArmMismatch {
                        span: span.clone(),
                        detail: format!(
                            "first alternative binds [{}], this one binds [{}]",
                            first.keys().cloned().collect::<Vec<_>>().join(", "),
                            current.keys().cloned().collect::<Vec<_>>().join(", ")
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    fn end_patbind(&mut self) {
        self.patbind.pop();
    }

    /// Introduce a pattern binding: allocates a slot (or, in a later
    /// or-pattern alternative, reuses the first alternative's slot) and
    /// makes the name visible in the innermost variable block.
    fn define_var(
        &mut self,
        span: &Span,
        name: &str,
        hygiene: &Hygiene,
    ) -> Result<u32, ResolveError> {
        let slot = match self.patbind.last_mut() {
            Some(group) => match &group.first {
                Some(first) => match first.get(name) {
                    Some(slot) => {
                        let slot = *slot;
                        group.current.insert(name.to_string(), slot);
                        slot
                    }
                    None => {
                        return Err(ResolveError::PatternArmMismatch {
                            span: span.clone(),
                            detail: format!("`{name}` is not bound in the first alternative"),
                        })
                    }
                },
                None => {
                    let slot = self.var_count;
                    self.var_count += 1;
                    group.current.insert(name.to_string(), slot);
                    slot
                }
            },
            None => {
                let slot = self.var_count;
                self.var_count += 1;
                slot
            }
        };
        for scope in self.scopes.iter_mut().rev() {
            if let Scope::VarBlock { vars } = scope {
                vars.push(VarDef {
                    name: name.to_string(),
                    hygiene: hygiene.clone(),
                    slot,
                });
                break;
            }
        }
        Ok(slot)
    }

    // ---- single-identifier lookup ----

    /// Search one module index under a lookup mode
    fn search_module(&self, mi: &ModuleIndex, name: &str, mode: LookupMode) -> Option<Found> {
        let from_entry = |entry: &ferric_ast::IndexEntry| Found::Item {
            path: entry.path.clone(),
            binding: entry.binding.clone(),
        };
        match mode {
            LookupMode::Namespace => mi
                .namespace_items
                .get(name)
                .or_else(|| mi.type_items.get(name))
                .or_else(|| mi.value_items.get(name))
                .map(from_entry),
            LookupMode::Type => mi
                .type_items
                .get(name)
                .or_else(|| mi.namespace_items.get(name))
                .map(from_entry),
            LookupMode::Constant | LookupMode::Variable => {
                mi.value_items.get(name).map(from_entry)
            }
            LookupMode::PatternValue => {
                let entry = mi.value_items.get(name)?;
                let ok = match &entry.binding.value_ns {
                    ValueBinding::EnumVariant(..)
                    | ValueBinding::Constant(_)
                    | ValueBinding::Static(_) => true,
                    ValueBinding::Struct(p) => {
                        self.index.struct_shapes.get(p) == Some(&StructShape::Unit)
                    }
                    _ => false,
                };
                if ok {
                    Some(from_entry(entry))
                } else {
                    None
                }
            }
        }
    }

    /// The scope-stack walk of the lookup algorithm
    fn lookup_opt(&self, name: &str, hygiene: &Hygiene, mode: LookupMode) -> Option<Found> {
        // A macro-carried module path overrides the lexical scopes
        if let Some(mp) = &hygiene.module_path {
            if let Some(mi) = self.index.module(mp) {
                if let Some(found) = self.search_module(mi, name, mode) {
                    return Some(found);
                }
            }
        }

        for scope in self.scopes.iter().rev() {
            match scope {
                Scope::Module { path } => {
                    if let Some(mi) = self.index.module(path) {
                        if let Some(found) = self.search_module(mi, name, mode) {
                            return Some(found);
                        }
                    }
                }
                Scope::VarBlock { vars } => {
                    if mode == LookupMode::Variable {
                        if let Some(def) = vars
                            .iter()
                            .rev()
                            .find(|v| v.name == name && hygiene.can_see(&v.hygiene))
                        {
                            return Some(Found::Variable(def.slot));
                        }
                    }
                }
                Scope::Generic { level, params } => match mode {
                    LookupMode::Type | LookupMode::Namespace => {
                        if let Some(idx) = params.type_param_index(name) {
                            return Some(Found::TypeParam {
                                slot: level.base() + idx as u16,
                            });
                        }
                    }
                    LookupMode::Variable | LookupMode::Constant => {
                        if let Some(idx) = params.const_param_index(name) {
                            return Some(Found::ConstParam {
                                slot: level.base() + idx as u16,
                            });
                        }
                    }
                    LookupMode::PatternValue => {}
                },
                Scope::ConcreteSelf { ty } => {
                    if name == "Self"
                        && matches!(mode, LookupMode::Type | LookupMode::Namespace)
                    {
                        return Some(Found::SelfType(ty.clone()));
                    }
                }
            }
        }

        // Fall through to the crate root
        let root = ItemPath::crate_root(&self.local_crate);
        if let Some(mi) = self.index.module(&root) {
            if let Some(found) = self.search_module(mi, name, mode) {
                return Some(found);
            }
        }

        // Primitive type names
        if matches!(mode, LookupMode::Type | LookupMode::Namespace) {
            if let Some(ct) = CoreType::from_name(name) {
                return Some(Found::Primitive(ct));
            }
        }

        // 2018: dependency crates are in the namespace implicitly
        if mode == LookupMode::Namespace
            && self.edition == Edition::E2018
            && self.index.extern_crate_names.iter().any(|n| n == name)
        {
            return Some(Found::Item {
                path: ItemPath::crate_root(name),
                binding: Bindings {
                    type_ns: TypeBinding::Crate(name.to_string()),
                    value_ns: ValueBinding::Unbound,
                },
            });
        }

        None
    }

    fn unresolved(&self, span: &Span, name: &str, mode: LookupMode) -> ResolveError {
        // Gather candidates for a spelling suggestion
        let mut candidates = Vec::new();
        for scope in self.scopes.iter().rev() {
            if let Scope::Module { path } = scope {
                if let Some(mi) = self.index.module(path) {
                    candidates.extend(mi.namespace_items.keys().cloned());
                    candidates.extend(mi.type_items.keys().cloned());
                    candidates.extend(mi.value_items.keys().cloned());
                }
            }
        }
        ResolveError::UnresolvedName {
            span: span.clone(),
            name: name.to_string(),
            mode: mode.describe(),
            suggestion: ferric_diagnostics::suggest_name(name, &candidates),
        }
    }

    // ---- multi-segment path binding ----

    /// Bind a path already in absolute form, converting to UFCS when it
    /// passes through a type or trait.
    fn bind_absolute(
        &self,
        span: &Span,
        mode: LookupMode,
        krate: String,
        nodes: Vec<PathNode>,
        path: &mut Path,
    ) -> Result<(), ResolveError> {
        let mut cur = ItemPath::crate_root(&krate);
        let len = nodes.len();
        for i in 0..len {
            let node = nodes[i].clone();
            let last = i + 1 == len;
            let Some(mi) = self.index.module(&cur) else {
                return Err(self.unresolved(span, &node.name, mode));
            };

            if let Some(entry) = mi.namespace_items.get(&node.name) {
                match &entry.binding.type_ns {
                    TypeBinding::Module(p) => {
                        if last {
                            *path = Path {
                                class: PathClass::Absolute { krate, nodes },
                                bindings: entry.binding.clone(),
                            };
                            return Ok(());
                        }
                        cur = p.clone();
                        continue;
                    }
                    TypeBinding::Crate(name) => {
                        if last {
                            *path = Path {
                                class: PathClass::Absolute { krate, nodes },
                                bindings: entry.binding.clone(),
                            };
                            return Ok(());
                        }
                        cur = ItemPath::crate_root(name);
                        continue;
                    }
                    _ => {}
                }
            }

            if let Some(entry) = mi.type_items.get(&node.name) {
                if last {
                    let mut bindings = entry.binding.clone();
                    if let Some(ve) = mi.value_items.get(&node.name) {
                        bindings.value_ns = ve.binding.value_ns.clone();
                    }
                    if mode == LookupMode::PatternValue
                        && !pattern_value_ok(self.index, &bindings.value_ns)
                    {
                        return Err(ResolveError::NameKindMismatch {
                            span: span.clone(),
                            name: node.name.clone(),
                            expected: mode.describe(),
                            found: format!("{:?}", bindings.type_ns),
                        });
                    }
                    *path = Path {
                        class: PathClass::Absolute { krate, nodes },
                        bindings,
                    };
                    return Ok(());
                }

                // The path continues through a type or trait: UFCS
                let remaining: Vec<PathNode> = nodes[i + 1..].to_vec();
                match &entry.binding.type_ns {
                    TypeBinding::Enum(enum_path) => {
                        // Enum::Variant stays an absolute path
                        if remaining.len() == 1 {
                            if let Some(variants) = self.index.enums.get(enum_path) {
                                if let Some(vidx) =
                                    variants.iter().position(|v| *v == remaining[0].name)
                                {
                                    *path = Path {
                                        class: PathClass::Absolute { krate, nodes },
                                        bindings: Bindings {
                                            type_ns: TypeBinding::EnumVariant(
                                                enum_path.clone(),
                                                vidx,
                                            ),
                                            value_ns: ValueBinding::EnumVariant(
                                                enum_path.clone(),
                                                vidx,
                                            ),
                                        },
                                    };
                                    return Ok(());
                                }
                            }
                        }
                        // Otherwise an associated item of the enum type
                        let ty = type_from_entry(&krate, &nodes[..=i], &node);
                        *path = Path::ufcs(ty, None, remaining);
                        return Ok(());
                    }
                    TypeBinding::Trait(trait_path) => {
                        let info = self.index.traits.get(trait_path);
                        let trait_as_path = Path {
                            class: PathClass::Absolute {
                                krate: krate.clone(),
                                nodes: nodes[..=i].to_vec(),
                            },
                            bindings: Bindings {
                                type_ns: entry.binding.type_ns.clone(),
                                value_ns: ValueBinding::Unbound,
                            },
                        };
                        let names_item = info
                            .map(|t| t.has_item(&remaining[0].name))
                            .unwrap_or(false);
                        if names_item {
                            // `<_ as Trait>::item` - the self type is
                            // inferred later
                            *path =
                                Path::ufcs(TypeRef::infer(), Some(trait_as_path), remaining);
                        } else {
                            // The trait used as a type namespace
                            *path = Path::ufcs(
                                TypeRef::path(trait_as_path),
                                None,
                                remaining,
                            );
                        }
                        return Ok(());
                    }
                    _ => {
                        let ty = type_from_entry(&krate, &nodes[..=i], &node);
                        *path = Path::ufcs(ty, None, remaining);
                        return Ok(());
                    }
                }
            }

            if last {
                if let Some(entry) = mi.value_items.get(&node.name) {
                    if mode == LookupMode::Type {
                        return Err(ResolveError::NameKindMismatch {
                            span: span.clone(),
                            name: node.name.clone(),
                            expected: mode.describe(),
                            found: format!("{:?}", entry.binding.value_ns),
                        });
                    }
                    if mode == LookupMode::PatternValue
                        && !pattern_value_ok(self.index, &entry.binding.value_ns)
                    {
                        return Err(ResolveError::NameKindMismatch {
                            span: span.clone(),
                            name: node.name.clone(),
                            expected: mode.describe(),
                            found: format!("{:?}", entry.binding.value_ns),
                        });
                    }
                    *path = Path {
                        class: PathClass::Absolute { krate, nodes },
                        bindings: entry.binding.clone(),
                    };
                    return Ok(());
                }
            }

            return Err(self.unresolved(span, &node.name, mode));
        }
        Err(self.unresolved(span, "", mode))
    }

    /// The main path entry point: rewrite any path class into Absolute,
    /// UFCS, or Local, and bind it.
    pub fn resolve_path(
        &mut self,
        span: &Span,
        mode: LookupMode,
        path: &mut Path,
    ) -> Result<(), ResolveError> {
        // Generic args in every segment resolve as types first
        if let Some(nodes) = path.nodes_mut() {
            for node in nodes.iter_mut() {
                for arg in &mut node.args {
                    self.resolve_type(span, arg)?;
                }
            }
        }
        self.resolve_path_inner(span, mode, path)
    }

    fn resolve_path_inner(
        &mut self,
        span: &Span,
        mode: LookupMode,
        path: &mut Path,
    ) -> Result<(), ResolveError> {
        let class = std::mem::replace(&mut path.class, PathClass::Local { name: String::new() });
        match class {
            PathClass::Local { name } => {
                path.class = PathClass::Local { name };
                Ok(())
            }
            PathClass::Absolute { krate, nodes } => {
                self.bind_absolute(span, mode, krate, nodes, path)
            }
            PathClass::SelfPath { nodes } => {
                let module = self.current_module();
                let mut full: Vec<PathNode> =
                    module.nodes.iter().map(|n| PathNode::new(n)).collect();
                full.extend(nodes);
                self.bind_absolute(span, mode, module.krate, full, path)
            }
            PathClass::Super { count, nodes } => {
                let module = self.current_module();
                if count > module.nodes.len() {
                    path.class = PathClass::Super { count, nodes };
                    return Err(ResolveError::SuperOutOfRange { span: span.clone() });
                }
                let mut full: Vec<PathNode> = module.nodes[..module.nodes.len() - count]
                    .iter()
                    .map(|n| PathNode::new(n))
                    .collect();
                full.extend(nodes);
                self.bind_absolute(span, mode, module.krate, full, path)
            }
            PathClass::Ufcs {
                mut ty,
                mut trait_path,
                nodes,
            } => {
                self.resolve_type(span, &mut ty)?;
                if let Some(tp) = &mut trait_path {
                    self.resolve_path(span, LookupMode::Type, &mut **tp)?;
                }
                path.class = PathClass::Ufcs {
                    ty,
                    trait_path,
                    nodes,
                };
                Ok(())
            }
            PathClass::Relative { hygiene, nodes } => {
                if nodes.is_empty() {
                    path.class = PathClass::Relative { hygiene, nodes };
                    return Err(self.unresolved(span, "<empty>", mode));
                }

                // A macro's module marker wins outright
                if let Some(mp) = hygiene.module_path.clone() {
                    let mut full: Vec<PathNode> =
                        mp.nodes.iter().map(|n| PathNode::new(n)).collect();
                    full.extend(nodes);
                    return self.bind_absolute(span, mode, mp.krate, full, path);
                }

                let first_mode = if nodes.len() > 1 {
                    LookupMode::Namespace
                } else {
                    mode
                };
                let Some(found) = self.lookup_opt(&nodes[0].name, &hygiene, first_mode) else {
                    let err = self.unresolved(span, &nodes[0].name, first_mode);
                    path.class = PathClass::Relative { hygiene, nodes };
                    return Err(err);
                };
                match found {
                    Found::Variable(slot) => {
                        if nodes.len() != 1 {
                            return Err(ResolveError::NameKindMismatch {
                                span: span.clone(),
                                name: nodes[0].name.clone(),
                                expected: "path component",
                                found: "local variable".to_string(),
                            });
                        }
                        path.class = PathClass::Local {
                            name: nodes[0].name.clone(),
                        };
                        path.bindings.value_ns = ValueBinding::Variable(slot);
                        Ok(())
                    }
                    Found::ConstParam { slot } => {
                        if nodes.len() != 1 {
                            return Err(ResolveError::NameKindMismatch {
                                span: span.clone(),
                                name: nodes[0].name.clone(),
                                expected: "path component",
                                found: "const parameter".to_string(),
                            });
                        }
                        path.class = PathClass::Local {
                            name: nodes[0].name.clone(),
                        };
                        path.bindings.value_ns = ValueBinding::Generic(slot);
                        Ok(())
                    }
                    Found::TypeParam { slot } => {
                        if nodes.len() == 1 {
                            path.class = PathClass::Local {
                                name: nodes[0].name.clone(),
                            };
                            path.bindings.type_ns = TypeBinding::TypeParameter(slot);
                            Ok(())
                        } else {
                            let ty = TypeRef::Generic {
                                name: nodes[0].name.clone(),
                                slot,
                            };
                            *path = Path::ufcs(ty, None, nodes[1..].to_vec());
                            Ok(())
                        }
                    }
                    Found::SelfType(ty) => {
                        if nodes.len() == 1 {
                            path.class = PathClass::Local {
                                name: "Self".to_string(),
                            };
                            // The concrete type is recovered through the
                            // enclosing impl during type resolution
                            Ok(())
                        } else {
                            *path = Path::ufcs(ty, None, nodes[1..].to_vec());
                            Ok(())
                        }
                    }
                    Found::Primitive(ct) => {
                        if nodes.len() == 1 {
                            path.class = PathClass::Local {
                                name: nodes[0].name.clone(),
                            };
                            Ok(())
                        } else {
                            *path = Path::ufcs(
                                TypeRef::Primitive(ct),
                                None,
                                nodes[1..].to_vec(),
                            );
                            Ok(())
                        }
                    }
                    Found::Item {
                        path: item_path, ..
                    } => {
                        // Splice: the found item's absolute location,
                        // keeping the written segments' generic args
                        let mut full: Vec<PathNode> = item_path
                            .nodes
                            .iter()
                            .map(|n| PathNode::new(n))
                            .collect();
                        if let Some(last) = full.last_mut() {
                            last.args = nodes[0].args.clone();
                        }
                        full.extend(nodes[1..].iter().cloned());
                        self.bind_absolute(span, mode, item_path.krate, full, path)
                    }
                }
            }
        }
    }

    // ---- types ----

    pub fn resolve_type(&mut self, span: &Span, ty: &mut TypeRef) -> Result<(), ResolveError> {
        match ty {
            TypeRef::Path(path) => {
                // Single-segment relative names may be primitives,
                // generic parameters, or Self
                self.resolve_path(span, LookupMode::Type, &mut **path)?;
                let replacement = match &path.class {
                    PathClass::Local { name } => match &path.bindings.type_ns {
                        TypeBinding::TypeParameter(slot) => Some(TypeRef::Generic {
                            name: name.clone(),
                            slot: *slot,
                        }),
                        _ => {
                            if name == "Self" {
                                Some(self.concrete_self())
                            } else {
                                CoreType::from_name(name).map(TypeRef::Primitive)
                            }
                        }
                    },
                    PathClass::Ufcs { .. } => None,
                    _ => None,
                };
                if let Some(new_ty) = replacement {
                    *ty = new_ty;
                }
                Ok(())
            }
            TypeRef::Array { inner, .. }
            | TypeRef::Slice { inner }
            | TypeRef::Borrow { inner, .. }
            | TypeRef::Pointer { inner, .. } => self.resolve_type(span, inner),
            TypeRef::Tuple(elems) => {
                for e in elems {
                    self.resolve_type(span, e)?;
                }
                Ok(())
            }
            TypeRef::Function(sig) => {
                for a in &mut sig.args {
                    self.resolve_type(span, a)?;
                }
                self.resolve_type(span, &mut sig.ret)
            }
            TypeRef::Closure { args, ret, .. } => {
                for a in args {
                    self.resolve_type(span, a)?;
                }
                self.resolve_type(span, ret)
            }
            TypeRef::TraitObject { traits, lifetime } => {
                for t in traits {
                    self.resolve_path(span, LookupMode::Type, t)?;
                }
                self.resolve_lifetime(span, lifetime)
            }
            TypeRef::ErasedType { traits } => {
                for t in traits {
                    self.resolve_path(span, LookupMode::Type, t)?;
                }
                Ok(())
            }
            TypeRef::Infer { .. }
            | TypeRef::Diverge
            | TypeRef::Primitive(_)
            | TypeRef::Generic { .. } => Ok(()),
            TypeRef::Macro(tm) => Err(ResolveError::UnresolvedName {
                span: tm.span.clone(),
                name: format!("{}!", tm.name),
                mode: "type macro (expansion left it behind)",
                suggestion: None,
            }),
        }
    }

    /// The `Self` type of the innermost impl/trait scope
    fn concrete_self(&self) -> TypeRef {
        for scope in self.scopes.iter().rev() {
            if let Scope::ConcreteSelf { ty } = scope {
                return ty.clone();
            }
        }
        TypeRef::generic_self()
    }

    // ---- lifetimes ----

    pub fn resolve_lifetime(
        &mut self,
        span: &Span,
        lifetime: &mut Lifetime,
    ) -> Result<(), ResolveError> {
        let name = match lifetime {
            Lifetime::Static | Lifetime::Infer | Lifetime::Param(_) => return Ok(()),
            Lifetime::Named(name) => {
                if name == "static" {
                    *lifetime = Lifetime::Static;
                    return Ok(());
                }
                if name == "_" {
                    *lifetime = Lifetime::Infer;
                    return Ok(());
                }
                name.clone()
            }
        };

        for scope in self.scopes.iter().rev() {
            if let Scope::Generic { level, params } = scope {
                if let Some(idx) = params.lifetime_index(&name) {
                    *lifetime = Lifetime::Param(level.base() + idx as u16);
                    return Ok(());
                }
            }
        }

        // 2018: in-band introduction appends to the innermost generic
        // scope, unless that scope is a higher-ranked binder
        if self.edition == Edition::E2018 {
            for scope in self.scopes.iter_mut().rev() {
                if let Scope::Generic { level, params } = scope {
                    if *level == GenericLevel::Hrb {
                        break;
                    }
                    let idx = params.add_lifetime(&name);
                    *lifetime = Lifetime::Param(level.base() + idx as u16);
                    return Ok(());
                }
            }
        }

        Err(ResolveError::UnresolvedLifetime {
            span: span.clone(),
            name,
        })
    }

    // ---- generics ----

    fn resolve_bounds(
        &mut self,
        span: &Span,
        bounds: &mut [GenericBound],
    ) -> Result<(), ResolveError> {
        for bound in bounds {
            match bound {
                GenericBound::TraitBound {
                    hrtb,
                    ty,
                    trait_path,
                } => {
                    if !hrtb.is_empty() {
                        let mut hrb_params = GenericParams::default();
                        for lt in hrtb.iter() {
                            hrb_params.add_lifetime(lt);
                        }
                        self.push(Scope::Generic {
                            level: GenericLevel::Hrb,
                            params: hrb_params,
                        });
                        self.resolve_type(span, ty)?;
                        self.resolve_path(span, LookupMode::Type, trait_path)?;
                        self.pop();
                    } else {
                        self.resolve_type(span, ty)?;
                        self.resolve_path(span, LookupMode::Type, trait_path)?;
                    }
                }
                GenericBound::TypeEquality { ty, equals } => {
                    self.resolve_type(span, ty)?;
                    self.resolve_type(span, equals)?;
                }
                GenericBound::TypeLifetime { ty, lifetime } => {
                    self.resolve_type(span, ty)?;
                    self.resolve_lifetime(span, lifetime)?;
                }
                GenericBound::LifetimeBound { lifetime, outlives } => {
                    self.resolve_lifetime(span, lifetime)?;
                    self.resolve_lifetime(span, outlives)?;
                }
            }
        }
        Ok(())
    }

    /// Resolve a generic parameter list inside its own scope: bounds and
    /// defaults see the parameters they accompany. Returns with the
    /// scope still pushed; the caller pops via [`Context::pop_generics`],
    /// which also writes back in-band lifetime growth.
    fn push_generics(
        &mut self,
        span: &Span,
        level: GenericLevel,
        generics: &mut GenericParams,
    ) -> Result<(), ResolveError> {
        self.push(Scope::Generic {
            level,
            params: generics.clone(),
        });
        for param in &mut generics.types {
            if let Some(default) = &mut param.default {
                self.resolve_type(span, default)?;
            }
        }
        for param in &mut generics.consts {
            self.resolve_type(span, &mut param.ty)?;
        }
        self.resolve_bounds(span, &mut generics.bounds)?;
        Ok(())
    }

    fn pop_generics(&mut self, generics: &mut GenericParams) {
        if let Some(Scope::Generic { params, .. }) = self.pop() {
            // In-band lifetimes appended during resolution
            if params.lifetimes.len() > generics.lifetimes.len() {
                generics.lifetimes = params.lifetimes;
            }
        }
    }

    // ---- patterns ----

    pub fn resolve_pattern(
        &mut self,
        pat: &mut Pattern,
    ) -> Result<(), ResolveError> {
        let span = pat.span.clone();
        if let Some(binding) = &mut pat.binding {
            let hygiene = binding.hygiene.clone();
            let name = binding.name.clone();
            binding.slot = Some(self.define_var(&span, &name, &hygiene)?);
        }
        let kind = std::mem::replace(&mut pat.kind, PatternKind::Any);
        let new_kind = match kind {
            PatternKind::MaybeBind { name, hygiene } => {
                // A constant or unit variant of this name wins; anything
                // else is a fresh binding
                match self.lookup_opt(&name, &hygiene, LookupMode::PatternValue) {
                    Some(Found::Item { path, binding }) => {
                        let value = PatternValue::Named(Path {
                            class: PathClass::Absolute {
                                krate: path.krate.clone(),
                                nodes: path.nodes.iter().map(|n| PathNode::new(n)).collect(),
                            },
                            bindings: binding,
                        });
                        PatternKind::Value { value }
                    }
                    _ => {
                        let slot = self.define_var(&span, &name, &hygiene)?;
                        pat.binding = Some(PatternBinding {
                            name,
                            hygiene,
                            mode: ferric_ast::BindingMode::Move,
                            slot: Some(slot),
                        });
                        PatternKind::Any
                    }
                }
            }
            PatternKind::Value { mut value } => {
                self.resolve_pattern_value(&span, &mut value)?;
                PatternKind::Value { value }
            }
            PatternKind::Range { mut start, mut end } => {
                self.resolve_pattern_value(&span, &mut start)?;
                self.resolve_pattern_value(&span, &mut end)?;
                PatternKind::Range { start, end }
            }
            PatternKind::Tuple(mut pats) => {
                for p in &mut pats {
                    self.resolve_pattern(p)?;
                }
                PatternKind::Tuple(pats)
            }
            PatternKind::StructTuple { mut path, mut elems } => {
                self.resolve_path(&span, LookupMode::PatternValue, &mut path)?;
                for p in &mut elems {
                    self.resolve_pattern(p)?;
                }
                PatternKind::StructTuple { path, elems }
            }
            PatternKind::Struct {
                mut path,
                mut fields,
                exhaustive,
            } => {
                self.resolve_path(&span, LookupMode::Type, &mut path)?;
                for (_, p) in &mut fields {
                    self.resolve_pattern(p)?;
                }
                PatternKind::Struct {
                    path,
                    fields,
                    exhaustive,
                }
            }
            PatternKind::Slice(mut pats) => {
                for p in &mut pats {
                    self.resolve_pattern(p)?;
                }
                PatternKind::Slice(pats)
            }
            PatternKind::SplitSlice {
                mut leading,
                mut middle,
                mut trailing,
            } => {
                for p in &mut leading {
                    self.resolve_pattern(p)?;
                }
                if let Some(binding) = &mut middle {
                    let hygiene = binding.hygiene.clone();
                    let name = binding.name.clone();
                    binding.slot = Some(self.define_var(&span, &name, &hygiene)?);
                }
                for p in &mut trailing {
                    self.resolve_pattern(p)?;
                }
                PatternKind::SplitSlice {
                    leading,
                    middle,
                    trailing,
                }
            }
            PatternKind::Or(mut alts) => {
                // Alternatives must introduce identical binding sets
                self.start_patbind();
                let mut result = Ok(());
                for p in &mut alts {
                    result = result
                        .and_then(|_| self.resolve_pattern(p))
                        .and_then(|_| self.end_patbind_arm(&span));
                }
                self.end_patbind();
                result?;
                PatternKind::Or(alts)
            }
            PatternKind::Ref { is_mut, mut inner } => {
                self.resolve_pattern(&mut inner)?;
                PatternKind::Ref { is_mut, inner }
            }
            PatternKind::Box_ { mut inner } => {
                self.resolve_pattern(&mut inner)?;
                PatternKind::Box_ { inner }
            }
            PatternKind::Any => PatternKind::Any,
        };
        pat.kind = new_kind;
        Ok(())
    }

    fn resolve_pattern_value(
        &mut self,
        span: &Span,
        value: &mut PatternValue,
    ) -> Result<(), ResolveError> {
        if let PatternValue::Named(path) = value {
            self.resolve_path(span, LookupMode::PatternValue, path)?;
        }
        Ok(())
    }

    // ---- expressions ----

    pub fn resolve_expr(&mut self, node: &mut ExprNode) -> Result<(), ResolveError> {
        let span = node.span.clone();
        match &mut node.kind {
            ExprKind::NamedValue { path } => {
                self.resolve_path(&span, LookupMode::Variable, path)?;
            }
            ExprKind::CallPath { path, .. } => {
                self.resolve_path(&span, LookupMode::Variable, path)?;
            }
            ExprKind::CallMethod { method, .. } => {
                for arg in &mut method.args {
                    self.resolve_type(&span, arg)?;
                }
            }
            ExprKind::StructLiteral { path, .. } => {
                self.resolve_path(&span, LookupMode::Type, path)?;
            }
            ExprKind::Cast { ty, .. } | ExprKind::Unsize { ty, .. } => {
                self.resolve_type(&span, ty)?;
            }
            _ => {}
        }

        // Structured constructs manage their own scopes
        match &mut node.kind {
            ExprKind::Block {
                stmts,
                tail,
                anon_module,
                ..
            } => {
                if let Some(idx) = anon_module {
                    let anon_path = self.current_module().child(&format!("#{idx}"));
                    self.push(Scope::Module { path: anon_path });
                }
                self.push(Scope::VarBlock { vars: Vec::new() });
                let mut result = Ok(());
                'body: {
                    for stmt in stmts.iter_mut() {
                        match stmt {
                            Stmt::Let { pat, ty, value } => {
                                if let Some(v) = value {
                                    if let Err(e) = self.resolve_expr(v) {
                                        result = Err(e);
                                        break 'body;
                                    }
                                }
                                if let Err(e) = self.resolve_type(&span, ty) {
                                    result = Err(e);
                                    break 'body;
                                }
                                if let Err(e) = self.resolve_pattern(pat) {
                                    result = Err(e);
                                    break 'body;
                                }
                            }
                            Stmt::Expr(e) | Stmt::Semi(e) => {
                                if let Err(err) = self.resolve_expr(e) {
                                    result = Err(err);
                                    break 'body;
                                }
                            }
                        }
                    }
                    if let Some(t) = tail {
                        if let Err(e) = self.resolve_expr(t) {
                            result = Err(e);
                        }
                    }
                }
                self.pop();
                if anon_module.is_some() {
                    self.pop();
                }
                result
            }
            ExprKind::Match { value, arms } => {
                self.resolve_expr(value)?;
                for arm in arms.iter_mut() {
                    self.push(Scope::VarBlock { vars: Vec::new() });
                    self.start_patbind();
                    let mut result = Ok(());
                    for pat in &mut arm.pats {
                        result = result
                            .and_then(|_| self.resolve_pattern(pat))
                            .and_then(|_| self.end_patbind_arm(&pat.span.clone()));
                    }
                    self.end_patbind();
                    let result = result.and_then(|_| {
                        if let Some(guard) = &mut arm.guard {
                            self.resolve_expr(guard)?;
                        }
                        self.resolve_expr(&mut arm.body)
                    });
                    self.pop();
                    result?;
                }
                Ok(())
            }
            ExprKind::Closure { args, ret, body, .. } => {
                self.push(Scope::VarBlock { vars: Vec::new() });
                let mut result = Ok(());
                for (pat, ty) in args.iter_mut() {
                    result = result
                        .and_then(|_| self.resolve_type(&span, ty))
                        .and_then(|_| self.resolve_pattern(pat));
                }
                let result = result
                    .and_then(|_| self.resolve_type(&span, ret))
                    .and_then(|_| self.resolve_expr(body));
                self.pop();
                result
            }
            _ => node.for_each_child_mut(&mut |child| self.resolve_expr(child)),
        }
    }

    // ---- items ----

    fn resolve_function(
        &mut self,
        span: &Span,
        f: &mut Function,
        level: GenericLevel,
    ) -> Result<(), ResolveError> {
        self.push_generics(span, level, &mut f.generics)?;
        let mut result = Ok(());
        'body: {
            for (_, ty) in &mut f.args {
                if let Err(e) = self.resolve_type(span, ty) {
                    result = Err(e);
                    break 'body;
                }
            }
            if let Err(e) = self.resolve_type(span, &mut f.ret) {
                result = Err(e);
                break 'body;
            }
            if let Some(body) = &mut f.body {
                self.var_count = 0;
                self.push(Scope::VarBlock { vars: Vec::new() });
                let mut r = Ok(());
                for (pat, _) in &mut f.args {
                    if let Err(e) = self.resolve_pattern(pat) {
                        r = Err(e);
                        break;
                    }
                }
                let r = r.and_then(|_| self.resolve_expr(body));
                self.pop();
                if let Err(e) = r {
                    result = Err(e);
                }
            }
        }
        self.pop_generics(&mut f.generics);
        result
    }

    fn resolve_impl(&mut self, span: &Span, imp: &mut Impl) -> Result<(), ResolveError> {
        if imp.is_cleared() {
            return Ok(());
        }
        self.push_generics(span, GenericLevel::Impl, &mut imp.generics)?;
        let mut result = self.resolve_type(span, &mut imp.self_ty);
        if result.is_ok() {
            if let Some(tp) = &mut imp.trait_path {
                result = self.resolve_path(span, LookupMode::Type, tp);
            }
        }
        if result.is_ok() {
            self.push(Scope::ConcreteSelf {
                ty: imp.self_ty.clone(),
            });
            'items: for item in imp.items.iter_mut() {
                let r = match &mut item.item {
                    ferric_ast::ImplItem::Function(f) => {
                        self.resolve_function(span, f, GenericLevel::Method)
                    }
                    ferric_ast::ImplItem::Const(c) => {
                        let r = self.resolve_type(span, &mut c.ty);
                        match (r, &mut c.value) {
                            (Ok(()), Some(v)) => self.resolve_expr(v),
                            (r, _) => r,
                        }
                    }
                    ferric_ast::ImplItem::Type(ty) => self.resolve_type(span, ty),
                };
                if let Err(e) = r {
                    result = Err(e);
                    break 'items;
                }
            }
            self.pop();
        }
        self.pop_generics(&mut imp.generics);
        result
    }

    pub fn resolve_module(&mut self, module: &mut Module) -> Result<(), ResolveError> {
        log::debug!("resolving module {}", module.path);
        self.push(Scope::Module {
            path: module.path.clone(),
        });
        let result = self.resolve_module_inner(module);
        self.pop();
        result
    }

    fn resolve_module_inner(&mut self, module: &mut Module) -> Result<(), ResolveError> {
        for entry in module.items.iter_mut() {
            let span = entry.span.clone();
            match &mut entry.item {
                Item::Module(child) => self.resolve_module(child)?,
                Item::Function(f) => self.resolve_function(&span, f, GenericLevel::Method)?,
                Item::Static(s) => {
                    self.resolve_type(&span, &mut s.ty)?;
                    if let Some(v) = &mut s.value {
                        self.var_count = 0;
                        self.push(Scope::VarBlock { vars: Vec::new() });
                        let r = self.resolve_expr(v);
                        self.pop();
                        r?;
                    }
                }
                Item::Const(c) => {
                    self.resolve_type(&span, &mut c.ty)?;
                    if let Some(v) = &mut c.value {
                        self.var_count = 0;
                        self.push(Scope::VarBlock { vars: Vec::new() });
                        let r = self.resolve_expr(v);
                        self.pop();
                        r?;
                    }
                }
                Item::Struct(def) => {
                    self.push_generics(&span, GenericLevel::Impl, &mut def.generics)?;
                    let mut r = Ok(());
                    match &mut def.kind {
                        ferric_ast::StructKind::Unit => {}
                        ferric_ast::StructKind::Tuple(fields) => {
                            for field in fields {
                                if let Err(e) = self.resolve_type(&span, &mut field.ty) {
                                    r = Err(e);
                                    break;
                                }
                            }
                        }
                        ferric_ast::StructKind::Named(fields) => {
                            for field in fields {
                                if field.name.is_empty() {
                                    continue;
                                }
                                if let Err(e) = self.resolve_type(&span, &mut field.ty) {
                                    r = Err(e);
                                    break;
                                }
                            }
                        }
                    }
                    self.pop_generics(&mut def.generics);
                    r?;
                }
                Item::Union(def) => {
                    self.push_generics(&span, GenericLevel::Impl, &mut def.generics)?;
                    let mut r = Ok(());
                    for field in &mut def.fields {
                        if field.name.is_empty() {
                            continue;
                        }
                        if let Err(e) = self.resolve_type(&span, &mut field.ty) {
                            r = Err(e);
                            break;
                        }
                    }
                    self.pop_generics(&mut def.generics);
                    r?;
                }
                Item::Enum(def) => {
                    self.push_generics(&span, GenericLevel::Impl, &mut def.generics)?;
                    let mut r = Ok(());
                    'variants: for variant in &mut def.variants {
                        if variant.name.is_empty() {
                            continue;
                        }
                        match &mut variant.kind {
                            ferric_ast::VariantKind::Unit { .. } => {}
                            ferric_ast::VariantKind::Tuple(fields) => {
                                for field in fields {
                                    if let Err(e) = self.resolve_type(&span, &mut field.ty) {
                                        r = Err(e);
                                        break 'variants;
                                    }
                                }
                            }
                            ferric_ast::VariantKind::Struct(fields) => {
                                for field in fields {
                                    if let Err(e) = self.resolve_type(&span, &mut field.ty) {
                                        r = Err(e);
                                        break 'variants;
                                    }
                                }
                            }
                        }
                    }
                    self.pop_generics(&mut def.generics);
                    r?;
                }
                Item::Trait(def) => {
                    self.push_generics(&span, GenericLevel::Impl, &mut def.generics)?;
                    self.push(Scope::ConcreteSelf {
                        ty: TypeRef::generic_self(),
                    });
                    let mut r = Ok(());
                    'items: {
                        for sup in &mut def.supertraits {
                            if let Err(e) = self.resolve_path(&span, LookupMode::Type, sup) {
                                r = Err(e);
                                break 'items;
                            }
                        }
                        for item in &mut def.items {
                            let ir = match &mut item.item {
                                TraitItem::Function(f) => {
                                    self.resolve_function(&span, f, GenericLevel::Method)
                                }
                                TraitItem::Const(c) => {
                                    let tr = self.resolve_type(&span, &mut c.ty);
                                    match (tr, &mut c.value) {
                                        (Ok(()), Some(v)) => self.resolve_expr(v),
                                        (tr, _) => tr,
                                    }
                                }
                                TraitItem::Type { bounds, default } => {
                                    let br = self.resolve_bounds(&span, bounds);
                                    match (br, default) {
                                        (Ok(()), Some(d)) => self.resolve_type(&span, d),
                                        (br, _) => br,
                                    }
                                }
                            };
                            if let Err(e) = ir {
                                r = Err(e);
                                break 'items;
                            }
                        }
                    }
                    self.pop();
                    self.pop_generics(&mut def.generics);
                    r?;
                }
                Item::TraitAlias(def) => {
                    self.push_generics(&span, GenericLevel::Impl, &mut def.generics)?;
                    let mut r = Ok(());
                    for t in &mut def.traits {
                        if let Err(e) = self.resolve_path(&span, LookupMode::Type, t) {
                            r = Err(e);
                            break;
                        }
                    }
                    self.pop_generics(&mut def.generics);
                    r?;
                }
                Item::TypeAlias(alias) => {
                    self.push_generics(&span, GenericLevel::Impl, &mut alias.generics)?;
                    let r = self.resolve_type(&span, &mut alias.ty);
                    self.pop_generics(&mut alias.generics);
                    r?;
                }
                Item::Impl(imp) => self.resolve_impl(&span, imp)?,
                Item::NegImpl(imp) => {
                    self.push_generics(&span, GenericLevel::Impl, &mut imp.generics)?;
                    let r = self
                        .resolve_type(&span, &mut imp.self_ty)
                        .and_then(|_| {
                            self.resolve_path(&span, LookupMode::Type, &mut imp.trait_path)
                        });
                    self.pop_generics(&mut imp.generics);
                    r?;
                }
                Item::ExternBlock(block) => {
                    for inner in &mut block.items {
                        if let Item::Function(f) = &mut inner.item {
                            self.resolve_function(&span, f, GenericLevel::Method)?;
                        } else if let Item::Static(s) = &mut inner.item {
                            self.resolve_type(&span, &mut s.ty)?;
                        }
                    }
                }
                Item::None
                | Item::ExternCrate { .. }
                | Item::Use(_)
                | Item::MacroInvocation(_)
                | Item::MacroRules(_) => {}
            }
        }

        for anon in &mut module.anon_modules {
            self.resolve_module(anon)?;
        }
        Ok(())
    }
}

fn pattern_value_ok(index: &ResolveIndex, binding: &ValueBinding) -> bool {
    match binding {
        ValueBinding::EnumVariant(..) | ValueBinding::Constant(_) | ValueBinding::Static(_) => {
            true
        }
        ValueBinding::Struct(p) => index.struct_shapes.get(p) == Some(&StructShape::Unit),
        _ => false,
    }
}

/// The absolute type for a path prefix ending at a type item
fn type_from_entry(krate: &str, prefix: &[PathNode], last: &PathNode) -> TypeRef {
    let mut nodes: Vec<PathNode> = prefix[..prefix.len() - 1].to_vec();
    nodes.push(last.clone());
    TypeRef::path(Path::absolute(krate, nodes))
}

/// Absolutise every path in the crate
pub fn resolve_absolute(krate: &mut Crate, index: &ResolveIndex) -> Result<(), ResolveError> {
    let mut ctx = Context::new(index, krate.edition);
    let mut root = std::mem::take(&mut krate.root);
    let result = ctx.resolve_module(&mut root);
    krate.root = root;
    result
}
