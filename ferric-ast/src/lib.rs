//! The Ferric syntax tree.
//!
//! One mutable [`Crate`] value flows through the whole middle-end: macro
//! expansion, name resolution, type inference, and layout queries all
//! rewrite or annotate it in place. After inference the same tree is the
//! typed output handed to MIR construction.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod attr;
pub mod expr;
pub mod generics;
pub mod path;
pub mod pattern;
pub mod token;
pub mod types;

pub use attr::{find_attr, Attribute, MetaData, MetaItem};
pub use expr::{BinOp, CallCache, ExprKind, ExprNode, Literal, MatchArm, Stmt, UniOp};
pub use generics::{ConstParam, GenericBound, GenericParams, LifetimeParam, TypeParam};
pub use path::{
    Bindings, Hygiene, ItemPath, Path, PathClass, PathNode, TypeBinding, ValueBinding,
};
pub use pattern::{BindingMode, Pattern, PatternBinding, PatternKind, PatternValue};
pub use token::{stream_to_string, Delim, Token, TokenStream, TokenTree};
pub use types::{CoreType, FunctionSig, InferClass, Lifetime, Substitution, TypeRef};

use ferric_diagnostics::Span;

/// Language edition; affects name lookup (implicit extern crates) and
/// lifetime handling (in-band lifetimes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Edition {
    #[default]
    E2015,
    E2018,
}

/// An unexpanded macro call: `name! ( tokens... )` or
/// `name! ident { tokens... }`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MacroInvocation {
    pub span: Span,
    pub name: String,
    pub ident: Option<String>,
    pub input: TokenStream,
}

impl MacroInvocation {
    pub fn new(name: &str, input: TokenStream) -> Self {
        MacroInvocation {
            span: Span::synthetic(),
            name: name.to_string(),
            ident: None,
            input,
        }
    }

    /// Tombstone this invocation (cfg'd out)
    pub fn clear(&mut self) {
        self.name.clear();
        self.input.clear();
    }

    pub fn is_cleared(&self) -> bool {
        self.name.is_empty()
    }
}

/// One `pattern => body` rule of a macro_rules definition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MacroRule {
    pub pattern: TokenStream,
    pub body: TokenStream,
}

/// A `macro_rules!` definition. The rules are stored as raw token trees;
/// the expansion engine compiles and interprets them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MacroRulesDef {
    pub name: String,
    pub rules: Vec<MacroRule>,
    /// Module to which `$crate`-qualified names resolve
    pub def_module: ItemPath,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UseItem {
    pub path: Path,
    pub is_glob: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructField {
    pub is_pub: bool,
    /// Cleared (emptied) when the field is cfg'd out
    pub name: String,
    pub ty: TypeRef,
    pub attrs: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TupleField {
    pub is_pub: bool,
    /// Reset to an infer hole when the field is cfg'd out
    pub ty: TypeRef,
    pub attrs: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StructKind {
    Unit,
    Tuple(Vec<TupleField>),
    Named(Vec<StructField>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Struct {
    pub generics: GenericParams,
    pub kind: StructKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Union {
    pub generics: GenericParams,
    pub fields: Vec<StructField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VariantKind {
    Unit { discriminant: Option<i64> },
    Tuple(Vec<TupleField>),
    Struct(Vec<StructField>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumVariant {
    /// Cleared when the variant is cfg'd out
    pub name: String,
    pub attrs: Vec<Attribute>,
    pub kind: VariantKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enum {
    pub generics: GenericParams,
    pub variants: Vec<EnumVariant>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub generics: GenericParams,
    pub is_unsafe: bool,
    pub abi: String,
    pub args: Vec<(Pattern, TypeRef)>,
    pub ret: TypeRef,
    /// None for trait method declarations and extern functions
    pub body: Option<ExprNode>,
}

impl Function {
    pub fn new(args: Vec<(Pattern, TypeRef)>, ret: TypeRef, body: Option<ExprNode>) -> Self {
        Function {
            generics: GenericParams::default(),
            is_unsafe: false,
            abi: "Rust".to_string(),
            args,
            ret,
            body,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Static {
    pub is_mut: bool,
    pub ty: TypeRef,
    pub value: Option<ExprNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstItem {
    pub ty: TypeRef,
    pub value: Option<ExprNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeAlias {
    pub generics: GenericParams,
    pub ty: TypeRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TraitItem {
    Function(Function),
    Const(ConstItem),
    /// Associated type declaration, with optional bounds and default
    Type {
        bounds: Vec<GenericBound>,
        default: Option<TypeRef>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitItemEntry {
    pub name: String,
    pub attrs: Vec<Attribute>,
    pub item: TraitItem,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trait {
    pub generics: GenericParams,
    pub supertraits: Vec<Path>,
    pub items: Vec<TraitItemEntry>,
}

impl Trait {
    pub fn item(&self, name: &str) -> Option<&TraitItemEntry> {
        self.items.iter().find(|i| i.name == name)
    }

    pub fn has_item(&self, name: &str) -> bool {
        self.item(name).is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitAlias {
    pub generics: GenericParams,
    pub traits: Vec<Path>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ImplItem {
    Function(Function),
    Const(ConstItem),
    /// Associated type definition
    Type(TypeRef),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImplItemEntry {
    pub name: String,
    pub is_pub: bool,
    pub attrs: Vec<Attribute>,
    pub item: ImplItem,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Impl {
    pub generics: GenericParams,
    /// None for inherent impls
    pub trait_path: Option<Path>,
    /// Reset to an infer hole when the impl is cfg'd out
    pub self_ty: TypeRef,
    pub items: Vec<ImplItemEntry>,
}

impl Impl {
    /// Whether this impl was deleted by a false cfg
    pub fn is_cleared(&self) -> bool {
        self.self_ty.is_infer()
    }

    pub fn item(&self, name: &str) -> Option<&ImplItemEntry> {
        self.items.iter().find(|i| i.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegImpl {
    pub generics: GenericParams,
    pub trait_path: Path,
    pub self_ty: TypeRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternBlock {
    pub abi: String,
    pub items: Vec<ItemEntry>,
}

/// The item tagged sum. `None` is the tombstone left behind when a false
/// `#[cfg]` removes an item; iteration skips tombstones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Item {
    None,
    Module(Module),
    ExternCrate { krate: String },
    Use(UseItem),
    MacroInvocation(MacroInvocation),
    MacroRules(MacroRulesDef),
    Function(Function),
    Static(Static),
    Const(ConstItem),
    Struct(Struct),
    Union(Union),
    Enum(Enum),
    Trait(Trait),
    TraitAlias(TraitAlias),
    TypeAlias(TypeAlias),
    Impl(Impl),
    NegImpl(NegImpl),
    ExternBlock(ExternBlock),
}

impl Item {
    pub fn describe(&self) -> &'static str {
        match self {
            Item::None => "none",
            Item::Module(_) => "module",
            Item::ExternCrate { .. } => "extern crate",
            Item::Use(_) => "use",
            Item::MacroInvocation(_) => "macro invocation",
            Item::MacroRules(_) => "macro_rules",
            Item::Function(_) => "function",
            Item::Static(_) => "static",
            Item::Const(_) => "const",
            Item::Struct(_) => "struct",
            Item::Union(_) => "union",
            Item::Enum(_) => "enum",
            Item::Trait(_) => "trait",
            Item::TraitAlias(_) => "trait alias",
            Item::TypeAlias(_) => "type alias",
            Item::Impl(_) => "impl",
            Item::NegImpl(_) => "negative impl",
            Item::ExternBlock(_) => "extern block",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemEntry {
    pub name: String,
    pub is_pub: bool,
    pub span: Span,
    pub attrs: Vec<Attribute>,
    pub item: Item,
}

impl ItemEntry {
    pub fn new(name: &str, item: Item) -> Self {
        ItemEntry {
            name: name.to_string(),
            is_pub: false,
            span: Span::synthetic(),
            attrs: Vec::new(),
            item,
        }
    }

    pub fn public(name: &str, item: Item) -> Self {
        ItemEntry {
            is_pub: true,
            ..ItemEntry::new(name, item)
        }
    }
}

/// An entry in a module's name index: where the name leads and whether it
/// got there through a `use`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub path: ItemPath,
    pub is_import: bool,
    pub binding: Bindings,
}

/// A module: an ordered item list plus the name indices built during
/// resolution.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Module {
    /// This module's own absolute path
    pub path: ItemPath,
    pub items: Vec<ItemEntry>,
    /// Invocations produced by expansion output, awaiting the same pass
    pub macro_invocations: Vec<MacroInvocation>,
    /// Anonymous sub-modules introduced by expression blocks that define
    /// items; addressed as `#N` path nodes
    pub anon_modules: Vec<Module>,
    /// Name indices, populated during use/index resolution
    pub namespace_items: HashMap<String, IndexEntry>,
    pub type_items: HashMap<String, IndexEntry>,
    pub value_items: HashMap<String, IndexEntry>,
}

impl Module {
    pub fn new(path: ItemPath) -> Self {
        Module {
            path,
            ..Module::default()
        }
    }

    pub fn item(&self, name: &str) -> Option<&ItemEntry> {
        self.items
            .iter()
            .find(|e| e.name == name && !matches!(e.item, Item::None))
    }

    pub fn item_mut(&mut self, name: &str) -> Option<&mut ItemEntry> {
        self.items
            .iter_mut()
            .find(|e| e.name == name && !matches!(e.item, Item::None))
    }

    /// Impl blocks owned by this module
    pub fn impls(&self) -> impl Iterator<Item = &Impl> {
        self.items.iter().filter_map(|e| match &e.item {
            Item::Impl(i) if !i.is_cleared() => Some(i),
            _ => None,
        })
    }

    /// Locally defined macro_rules macros, in definition order
    pub fn macros(&self) -> impl Iterator<Item = &MacroRulesDef> {
        self.items.iter().filter_map(|e| match &e.item {
            Item::MacroRules(def) => Some(def),
            _ => None,
        })
    }

    /// Child module by name; `#N` names address anonymous sub-modules
    pub fn child_module(&self, name: &str) -> Option<&Module> {
        if let Some(idx) = name.strip_prefix('#') {
            return idx.parse::<usize>().ok().and_then(|i| self.anon_modules.get(i));
        }
        match &self.item(name)?.item {
            Item::Module(m) => Some(m),
            _ => None,
        }
    }

    pub fn child_module_mut(&mut self, name: &str) -> Option<&mut Module> {
        if let Some(idx) = name.strip_prefix('#') {
            let i = idx.parse::<usize>().ok()?;
            return self.anon_modules.get_mut(i);
        }
        match &mut self.item_mut(name)?.item {
            Item::Module(m) => Some(m),
            _ => None,
        }
    }
}

/// A test function collected by the `#[test]` decorator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestDesc {
    pub name: String,
    pub path: ItemPath,
    pub should_panic: bool,
    pub ignore: bool,
}

/// A loaded dependency crate: its name and its (already resolved) item
/// tree, consulted during cross-crate lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternCrateInfo {
    pub name: String,
    pub root: Module,
}

/// Root container for one compilation
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Crate {
    pub root: Module,
    pub extern_crates: HashMap<String, ExternCrateInfo>,
    pub attrs: Vec<Attribute>,
    pub edition: Edition,
    /// Whether `--test` harness collection is active
    pub test_harness: bool,
    pub tests: Vec<TestDesc>,
    /// Compiler-known items: operator traits, `unsize`, `non_zero`,
    /// iterator entry points, ...
    pub lang_items: HashMap<String, ItemPath>,
}

impl Crate {
    pub fn new() -> Self {
        Crate::default()
    }

    pub fn lang_item(&self, name: &str) -> Option<&ItemPath> {
        self.lang_items.get(name)
    }

    /// Navigate to the module at `path`. An empty crate name addresses
    /// the crate being compiled; otherwise the extern-crate map is used.
    pub fn module_at(&self, path: &ItemPath) -> Option<&Module> {
        let mut module = if path.krate.is_empty() {
            &self.root
        } else {
            &self.extern_crates.get(&path.krate)?.root
        };
        for node in &path.nodes {
            module = module.child_module(node)?;
        }
        Some(module)
    }

    pub fn module_at_mut(&mut self, path: &ItemPath) -> Option<&mut Module> {
        let mut module = if path.krate.is_empty() {
            &mut self.root
        } else {
            &mut self.extern_crates.get_mut(&path.krate)?.root
        };
        for node in &path.nodes {
            module = module.child_module_mut(node)?;
        }
        Some(module)
    }

    /// Navigate to the item entry at `path` (its parent must be a module
    /// chain).
    pub fn item_at(&self, path: &ItemPath) -> Option<&ItemEntry> {
        let parent = path.parent()?;
        let name = path.last()?;
        self.module_at(&parent)?.item(name)
    }

    pub fn item_at_mut(&mut self, path: &ItemPath) -> Option<&mut ItemEntry> {
        let parent = path.parent()?;
        let name = path.last()?.to_string();
        self.module_at_mut(&parent)?.item_mut(&name)
    }

    /// Visit every module (root, children, anonymous) depth-first
    pub fn visit_modules(&self, f: &mut dyn FnMut(&Module)) {
        fn walk(module: &Module, f: &mut dyn FnMut(&Module)) {
            f(module);
            for entry in &module.items {
                if let Item::Module(child) = &entry.item {
                    walk(child, f);
                }
            }
            for child in &module.anon_modules {
                walk(child, f);
            }
        }
        walk(&self.root, f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_crate() -> Crate {
        let mut krate = Crate::new();
        let mut m = Module::new(ItemPath::local_root().child("m"));
        m.items.push(ItemEntry::public(
            "f",
            Item::Function(Function::new(vec![], TypeRef::unit(), None)),
        ));
        krate
            .root
            .items
            .push(ItemEntry::public("m", Item::Module(m)));
        krate
    }

    #[test]
    fn test_module_navigation() {
        let krate = sample_crate();
        let path = ItemPath::local_root().child("m");
        assert!(krate.module_at(&path).is_some());
        let f = krate.item_at(&path.child("f")).unwrap();
        assert!(matches!(f.item, Item::Function(_)));
        assert!(krate.item_at(&path.child("g")).is_none());
    }

    #[test]
    fn test_tombstones_are_invisible() {
        let mut krate = sample_crate();
        let path = ItemPath::local_root().child("m").child("f");
        krate.item_at_mut(&path).unwrap().item = Item::None;
        assert!(krate.item_at(&path).is_none());
    }

    #[test]
    fn test_anon_module_addressing() {
        let mut krate = sample_crate();
        let m_path = ItemPath::local_root().child("m");
        let anon = Module::new(m_path.child("#0"));
        krate
            .module_at_mut(&m_path)
            .unwrap()
            .anon_modules
            .push(anon);
        assert!(krate.module_at(&m_path.child("#0")).is_some());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let krate = sample_crate();
        let json = serde_json::to_string(&krate).unwrap();
        let back: Crate = serde_json::from_str(&json).unwrap();
        assert_eq!(krate, back);
    }

    #[test]
    fn test_macro_invocation_clear() {
        let mut mac = MacroInvocation::new("vec", vec![]);
        assert!(!mac.is_cleared());
        mac.clear();
        assert!(mac.is_cleared());
    }
}
