//! Paths and their resolution bindings.
//!
//! `Path` is the single most important type in the crate: the resolver's
//! whole job is rewriting every `Relative`/`Self`/`Super` path into
//! `Absolute`, `Ufcs`, or `Local` form, and filling the binding pair.

use crate::types::TypeRef;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Provenance marker distinguishing identifiers introduced by different
/// macro expansions. Scope 0 is hand-written source; every transcription
/// allocates a fresh scope for the identifiers it creates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hygiene {
    pub scope: u32,
    /// Set on `$crate`-qualified names: resolution starts from this module
    /// instead of the lexical scope stack.
    pub module_path: Option<ItemPath>,
}

impl Hygiene {
    pub fn source() -> Self {
        Hygiene {
            scope: 0,
            module_path: None,
        }
    }

    pub fn expansion(scope: u32) -> Self {
        Hygiene {
            scope,
            module_path: None,
        }
    }

    /// Whether a use-site with this hygiene can see a binding created
    /// under `def`. Source-level bindings are visible everywhere; a
    /// macro-introduced binding is only visible to the same expansion.
    pub fn can_see(&self, def: &Hygiene) -> bool {
        def.scope == 0 || def.scope == self.scope
    }
}

impl Default for Hygiene {
    fn default() -> Self {
        Hygiene::source()
    }
}

/// Canonical address of an item: crate name plus the module-rooted name
/// sequence. The empty crate name refers to the crate being compiled.
///
/// All cross-references in the tree are expressed as item paths, never as
/// pointers; they are resolved against the crate at each access.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ItemPath {
    pub krate: String,
    pub nodes: Vec<String>,
}

impl ItemPath {
    pub fn local_root() -> Self {
        ItemPath::default()
    }

    pub fn crate_root(krate: &str) -> Self {
        ItemPath {
            krate: krate.to_string(),
            nodes: Vec::new(),
        }
    }

    pub fn child(&self, name: &str) -> Self {
        let mut nodes = self.nodes.clone();
        nodes.push(name.to_string());
        ItemPath {
            krate: self.krate.clone(),
            nodes,
        }
    }

    pub fn parent(&self) -> Option<Self> {
        if self.nodes.is_empty() {
            return None;
        }
        let mut nodes = self.nodes.clone();
        nodes.pop();
        Some(ItemPath {
            krate: self.krate.clone(),
            nodes,
        })
    }

    pub fn last(&self) -> Option<&str> {
        self.nodes.last().map(String::as_str)
    }
}

impl fmt::Display for ItemPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "::\"{}\"", self.krate)?;
        for node in &self.nodes {
            write!(f, "::{node}")?;
        }
        Ok(())
    }
}

/// One segment of a path, with its generic arguments
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathNode {
    pub name: String,
    pub args: Vec<TypeRef>,
}

impl PathNode {
    pub fn new(name: &str) -> Self {
        PathNode {
            name: name.to_string(),
            args: Vec::new(),
        }
    }

    pub fn with_args(name: &str, args: Vec<TypeRef>) -> Self {
        PathNode {
            name: name.to_string(),
            args,
        }
    }
}

/// Classification of a path, before and after resolution.
///
/// `Relative`, `SelfPath` and `Super` only survive resolution inside
/// macro-input token trees; everywhere else the resolver rewrites them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathClass {
    /// `a::b::c` - relative to the current scope stack
    Relative {
        hygiene: Hygiene,
        nodes: Vec<PathNode>,
    },
    /// `self::a::b`
    SelfPath { nodes: Vec<PathNode> },
    /// `super::super::a`
    Super { count: usize, nodes: Vec<PathNode> },
    /// `::"crate"::a::b` - fully module-rooted
    Absolute { krate: String, nodes: Vec<PathNode> },
    /// `<Type as Trait>::item` or `<Type>::item`
    Ufcs {
        ty: Box<TypeRef>,
        trait_path: Option<Box<Path>>,
        nodes: Vec<PathNode>,
    },
    /// An identifier bound to a local variable or generic parameter
    Local { name: String },
}

/// What the type namespace resolved a path to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TypeBinding {
    #[default]
    Unbound,
    Crate(String),
    Module(ItemPath),
    Trait(ItemPath),
    TypeAlias(ItemPath),
    Struct(ItemPath),
    Union(ItemPath),
    Enum(ItemPath),
    EnumVariant(ItemPath, usize),
    /// A named type parameter; the slot uses the generic-level encoding
    TypeParameter(u16),
}

impl TypeBinding {
    pub fn is_unbound(&self) -> bool {
        matches!(self, TypeBinding::Unbound)
    }

    /// The item path this binding refers to, when it refers to one
    pub fn item_path(&self) -> Option<&ItemPath> {
        match self {
            TypeBinding::Unbound | TypeBinding::Crate(_) | TypeBinding::TypeParameter(_) => None,
            TypeBinding::Module(p)
            | TypeBinding::Trait(p)
            | TypeBinding::TypeAlias(p)
            | TypeBinding::Struct(p)
            | TypeBinding::Union(p)
            | TypeBinding::Enum(p)
            | TypeBinding::EnumVariant(p, _) => Some(p),
        }
    }
}

/// What the value namespace resolved a path to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ValueBinding {
    #[default]
    Unbound,
    /// Unit or tuple struct constructor
    Struct(ItemPath),
    EnumVariant(ItemPath, usize),
    Function(ItemPath),
    Static(ItemPath),
    Constant(ItemPath),
    /// A pattern-bound local, by slot
    Variable(u32),
    /// A const generic parameter slot
    Generic(u16),
}

impl ValueBinding {
    pub fn is_unbound(&self) -> bool {
        matches!(self, ValueBinding::Unbound)
    }
}

/// The binding pair: type and value namespaces bind independently
/// (a tuple struct occupies both with the same name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Bindings {
    pub type_ns: TypeBinding,
    pub value_ns: ValueBinding,
}

impl Bindings {
    pub fn is_unbound(&self) -> bool {
        self.type_ns.is_unbound() && self.value_ns.is_unbound()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Path {
    pub class: PathClass,
    pub bindings: Bindings,
}

impl Path {
    pub fn relative(nodes: Vec<PathNode>) -> Self {
        Path {
            class: PathClass::Relative {
                hygiene: Hygiene::source(),
                nodes,
            },
            bindings: Bindings::default(),
        }
    }

    pub fn relative_hygienic(hygiene: Hygiene, nodes: Vec<PathNode>) -> Self {
        Path {
            class: PathClass::Relative { hygiene, nodes },
            bindings: Bindings::default(),
        }
    }

    /// A single-segment relative path
    pub fn ident(name: &str) -> Self {
        Path::relative(vec![PathNode::new(name)])
    }

    pub fn absolute(krate: &str, nodes: Vec<PathNode>) -> Self {
        Path {
            class: PathClass::Absolute {
                krate: krate.to_string(),
                nodes,
            },
            bindings: Bindings::default(),
        }
    }

    /// An absolute path with plain (argument-free) segments
    pub fn absolute_named(krate: &str, names: &[&str]) -> Self {
        Path::absolute(krate, names.iter().map(|n| PathNode::new(n)).collect())
    }

    pub fn local(name: &str) -> Self {
        Path {
            class: PathClass::Local {
                name: name.to_string(),
            },
            bindings: Bindings::default(),
        }
    }

    pub fn ufcs(ty: TypeRef, trait_path: Option<Path>, nodes: Vec<PathNode>) -> Self {
        Path {
            class: PathClass::Ufcs {
                ty: Box::new(ty),
                trait_path: trait_path.map(Box::new),
                nodes,
            },
            bindings: Bindings::default(),
        }
    }

    pub fn from_item_path(ip: &ItemPath) -> Self {
        Path::absolute(
            &ip.krate,
            ip.nodes.iter().map(|n| PathNode::new(n)).collect(),
        )
    }

    /// The canonical item path, for paths already in absolute form
    pub fn as_item_path(&self) -> Option<ItemPath> {
        match &self.class {
            PathClass::Absolute { krate, nodes } => Some(ItemPath {
                krate: krate.clone(),
                nodes: nodes.iter().map(|n| n.name.clone()).collect(),
            }),
            _ => None,
        }
    }

    /// Whether this path survived resolution in a legal form
    pub fn is_resolved_form(&self) -> bool {
        matches!(
            self.class,
            PathClass::Absolute { .. } | PathClass::Ufcs { .. } | PathClass::Local { .. }
        )
    }

    /// Trailing segments, for the forms that have them
    pub fn nodes(&self) -> &[PathNode] {
        match &self.class {
            PathClass::Relative { nodes, .. }
            | PathClass::SelfPath { nodes }
            | PathClass::Super { nodes, .. }
            | PathClass::Absolute { nodes, .. }
            | PathClass::Ufcs { nodes, .. } => nodes,
            PathClass::Local { .. } => &[],
        }
    }

    pub fn nodes_mut(&mut self) -> Option<&mut Vec<PathNode>> {
        match &mut self.class {
            PathClass::Relative { nodes, .. }
            | PathClass::SelfPath { nodes }
            | PathClass::Super { nodes, .. }
            | PathClass::Absolute { nodes, .. }
            | PathClass::Ufcs { nodes, .. } => Some(nodes),
            PathClass::Local { .. } => None,
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn nodes(f: &mut fmt::Formatter<'_>, nodes: &[PathNode]) -> fmt::Result {
            for (i, node) in nodes.iter().enumerate() {
                if i > 0 {
                    write!(f, "::")?;
                }
                write!(f, "{}", node.name)?;
            }
            Ok(())
        }
        match &self.class {
            PathClass::Relative { nodes: n, .. } => nodes(f, n),
            PathClass::SelfPath { nodes: n } => {
                write!(f, "self::")?;
                nodes(f, n)
            }
            PathClass::Super { count, nodes: n } => {
                for _ in 0..*count {
                    write!(f, "super::")?;
                }
                nodes(f, n)
            }
            PathClass::Absolute { krate, nodes: n } => {
                write!(f, "::\"{krate}\"::")?;
                nodes(f, n)
            }
            PathClass::Ufcs {
                ty,
                trait_path,
                nodes: n,
            } => {
                match trait_path {
                    Some(tp) => write!(f, "<{ty:?} as {tp}>::")?,
                    None => write!(f, "<{ty:?}>::")?,
                }
                nodes(f, n)
            }
            PathClass::Local { name } => write!(f, "{name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_path_child_parent() {
        let root = ItemPath::local_root();
        let m = root.child("m");
        let f = m.child("f");
        assert_eq!(f.nodes, vec!["m".to_string(), "f".to_string()]);
        assert_eq!(f.parent(), Some(m));
        assert_eq!(root.parent(), None);
    }

    #[test]
    fn test_hygiene_visibility() {
        let source = Hygiene::source();
        let mac = Hygiene::expansion(7);
        // Source bindings are visible to macro-expanded code
        assert!(mac.can_see(&source));
        // Macro-introduced bindings are invisible to source code
        assert!(!source.can_see(&mac));
        // ... but visible within the same expansion
        assert!(mac.can_see(&Hygiene::expansion(7)));
    }

    #[test]
    fn test_resolved_form() {
        assert!(!Path::ident("foo").is_resolved_form());
        assert!(Path::absolute_named("", &["m", "f"]).is_resolved_form());
        assert!(Path::local("x").is_resolved_form());
    }

    #[test]
    fn test_as_item_path() {
        let p = Path::absolute_named("core", &["ops", "Add"]);
        let ip = p.as_item_path().unwrap();
        assert_eq!(ip.krate, "core");
        assert_eq!(ip.nodes, vec!["ops".to_string(), "Add".to_string()]);
        assert_eq!(Path::ident("x").as_item_path(), None);
    }
}
