//! The type representation shared by the AST and the typed tree.
//!
//! Before inference most slots are `Infer`; after inference no `Infer`
//! remains anywhere in a function body. Generic parameters are referenced
//! by slot with a level encoding (see [`slots`]).

use crate::path::Path;
use crate::token::TokenStream;
use ferric_diagnostics::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Generic slot encoding. A 16-bit slot holds both the level and the
/// index within that level's parameter list.
pub mod slots {
    /// `Self` inside a trait or impl
    pub const SELF: u16 = 0xFFFF;
    /// Impl-level (or type-level) parameters occupy 0x0000..=0x00FF
    pub const LEVEL_IMPL: u16 = 0x0000;
    /// Method/item-level parameters occupy 0x0100..=0x01FF
    pub const LEVEL_METHOD: u16 = 0x0100;
    /// Mask selecting the index within a level
    pub const INDEX_MASK: u16 = 0x00FF;

    pub fn is_impl_level(slot: u16) -> bool {
        slot != SELF && (slot & !INDEX_MASK) == LEVEL_IMPL
    }

    pub fn is_method_level(slot: u16) -> bool {
        slot != SELF && (slot & !INDEX_MASK) == LEVEL_METHOD
    }

    pub fn index(slot: u16) -> usize {
        (slot & INDEX_MASK) as usize
    }
}

/// Built-in primitive types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoreType {
    Bool,
    Char,
    Str,
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    U128,
    I128,
    Usize,
    Isize,
    F32,
    F64,
}

impl CoreType {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "bool" => CoreType::Bool,
            "char" => CoreType::Char,
            "str" => CoreType::Str,
            "u8" => CoreType::U8,
            "i8" => CoreType::I8,
            "u16" => CoreType::U16,
            "i16" => CoreType::I16,
            "u32" => CoreType::U32,
            "i32" => CoreType::I32,
            "u64" => CoreType::U64,
            "i64" => CoreType::I64,
            "u128" => CoreType::U128,
            "i128" => CoreType::I128,
            "usize" => CoreType::Usize,
            "isize" => CoreType::Isize,
            "f32" => CoreType::F32,
            "f64" => CoreType::F64,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            CoreType::Bool => "bool",
            CoreType::Char => "char",
            CoreType::Str => "str",
            CoreType::U8 => "u8",
            CoreType::I8 => "i8",
            CoreType::U16 => "u16",
            CoreType::I16 => "i16",
            CoreType::U32 => "u32",
            CoreType::I32 => "i32",
            CoreType::U64 => "u64",
            CoreType::I64 => "i64",
            CoreType::U128 => "u128",
            CoreType::I128 => "i128",
            CoreType::Usize => "usize",
            CoreType::Isize => "isize",
            CoreType::F32 => "f32",
            CoreType::F64 => "f64",
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            CoreType::U8
                | CoreType::I8
                | CoreType::U16
                | CoreType::I16
                | CoreType::U32
                | CoreType::I32
                | CoreType::U64
                | CoreType::I64
                | CoreType::U128
                | CoreType::I128
                | CoreType::Usize
                | CoreType::Isize
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, CoreType::F32 | CoreType::F64)
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            CoreType::I8
                | CoreType::I16
                | CoreType::I32
                | CoreType::I64
                | CoreType::I128
                | CoreType::Isize
        )
    }
}

impl fmt::Display for CoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Restriction on what an unresolved inference variable may become
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InferClass {
    #[default]
    None,
    Integer,
    Float,
}

/// Lifetime reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lifetime {
    Static,
    /// `'_` or elided
    Infer,
    /// Named, pre-resolution
    Named(String),
    /// Bound to a lifetime parameter slot of the enclosing definition
    Param(u16),
}

/// A bare function signature type: `fn(u32) -> bool`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionSig {
    pub is_unsafe: bool,
    pub abi: String,
    pub args: Vec<TypeRef>,
    pub ret: TypeRef,
}

/// A macro invocation in type position (pre-expansion only)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeMacro {
    pub span: Span,
    pub name: String,
    pub input: TokenStream,
}

/// The type tagged sum
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeRef {
    /// A type hole. `index` is the inference-variable id once the
    /// enumeration pass has allocated one.
    Infer {
        index: Option<u32>,
        class: InferClass,
    },
    /// `!`
    Diverge,
    Primitive(CoreType),
    /// A named type (struct/enum/union/alias or projection via UFCS)
    Path(Box<Path>),
    /// A generic parameter of the enclosing definition
    Generic { name: String, slot: u16 },
    /// `dyn Trait + ...`
    TraitObject {
        traits: Vec<Path>,
        lifetime: Lifetime,
    },
    /// `impl Trait`
    ErasedType { traits: Vec<Path> },
    /// `[T; N]` - the length is const-evaluated by the parser collaborator
    Array { inner: Box<TypeRef>, size: u64 },
    /// `[T]`
    Slice { inner: Box<TypeRef> },
    /// `(A, B, C)`; the empty tuple is the unit type
    Tuple(Vec<TypeRef>),
    /// `&T` / `&mut T`
    Borrow { is_mut: bool, inner: Box<TypeRef> },
    /// `*const T` / `*mut T`
    Pointer { is_mut: bool, inner: Box<TypeRef> },
    /// `fn(A) -> R`
    Function(Box<FunctionSig>),
    /// The unnameable type of a closure expression
    Closure {
        node_id: u32,
        args: Vec<TypeRef>,
        ret: Box<TypeRef>,
    },
    /// A macro in type position; removed during expansion
    Macro(TypeMacro),
}

impl TypeRef {
    pub fn infer() -> Self {
        TypeRef::Infer {
            index: None,
            class: InferClass::None,
        }
    }

    pub fn infer_class(class: InferClass) -> Self {
        TypeRef::Infer { index: None, class }
    }

    pub fn unit() -> Self {
        TypeRef::Tuple(Vec::new())
    }

    pub fn path(path: Path) -> Self {
        TypeRef::Path(Box::new(path))
    }

    pub fn borrow(inner: TypeRef) -> Self {
        TypeRef::Borrow {
            is_mut: false,
            inner: Box::new(inner),
        }
    }

    pub fn borrow_mut(inner: TypeRef) -> Self {
        TypeRef::Borrow {
            is_mut: true,
            inner: Box::new(inner),
        }
    }

    pub fn generic_self() -> Self {
        TypeRef::Generic {
            name: "Self".to_string(),
            slot: slots::SELF,
        }
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, TypeRef::Tuple(elems) if elems.is_empty())
    }

    pub fn is_infer(&self) -> bool {
        matches!(self, TypeRef::Infer { .. })
    }

    /// Whether any `Infer` node remains anywhere in this type
    pub fn contains_infer(&self) -> bool {
        let mut found = false;
        self.visit(&mut |t| {
            if t.is_infer() {
                found = true;
            }
        });
        found
    }

    /// Whether any generic parameter slot occurs in this type
    pub fn contains_generic(&self) -> bool {
        let mut found = false;
        self.visit(&mut |t| {
            if matches!(t, TypeRef::Generic { .. }) {
                found = true;
            }
        });
        found
    }

    /// Depth-first read-only walk over this type and all component types
    pub fn visit(&self, f: &mut dyn FnMut(&TypeRef)) {
        f(self);
        match self {
            TypeRef::Infer { .. }
            | TypeRef::Diverge
            | TypeRef::Primitive(_)
            | TypeRef::Generic { .. }
            | TypeRef::Macro(_) => {}
            TypeRef::Path(path) => {
                for node in path.nodes() {
                    for arg in &node.args {
                        arg.visit(f);
                    }
                }
                if let crate::path::PathClass::Ufcs { ty, .. } = &path.class {
                    ty.visit(f);
                }
            }
            TypeRef::TraitObject { traits, .. } | TypeRef::ErasedType { traits } => {
                for t in traits {
                    for node in t.nodes() {
                        for arg in &node.args {
                            arg.visit(f);
                        }
                    }
                }
            }
            TypeRef::Array { inner, .. }
            | TypeRef::Slice { inner }
            | TypeRef::Borrow { inner, .. }
            | TypeRef::Pointer { inner, .. } => inner.visit(f),
            TypeRef::Tuple(elems) => {
                for e in elems {
                    e.visit(f);
                }
            }
            TypeRef::Function(sig) => {
                for a in &sig.args {
                    a.visit(f);
                }
                sig.ret.visit(f);
            }
            TypeRef::Closure { args, ret, .. } => {
                for a in args {
                    a.visit(f);
                }
                ret.visit(f);
            }
        }
    }

    /// Depth-first in-place rewrite: `f` is applied to every component
    /// type after its children have been rewritten.
    pub fn visit_mut(&mut self, f: &mut dyn FnMut(&mut TypeRef)) {
        match self {
            TypeRef::Infer { .. }
            | TypeRef::Diverge
            | TypeRef::Primitive(_)
            | TypeRef::Generic { .. }
            | TypeRef::Macro(_) => {}
            TypeRef::Path(path) => {
                if let Some(nodes) = path.nodes_mut() {
                    for node in nodes.iter_mut() {
                        for arg in &mut node.args {
                            arg.visit_mut(f);
                        }
                    }
                }
                if let crate::path::PathClass::Ufcs { ty, .. } = &mut path.class {
                    ty.visit_mut(f);
                }
            }
            TypeRef::TraitObject { traits, .. } | TypeRef::ErasedType { traits } => {
                for t in traits {
                    if let Some(nodes) = t.nodes_mut() {
                        for node in nodes.iter_mut() {
                            for arg in &mut node.args {
                                arg.visit_mut(f);
                            }
                        }
                    }
                }
            }
            TypeRef::Array { inner, .. }
            | TypeRef::Slice { inner }
            | TypeRef::Borrow { inner, .. }
            | TypeRef::Pointer { inner, .. } => inner.visit_mut(f),
            TypeRef::Tuple(elems) => {
                for e in elems {
                    e.visit_mut(f);
                }
            }
            TypeRef::Function(sig) => {
                for a in &mut sig.args {
                    a.visit_mut(f);
                }
                sig.ret.visit_mut(f);
            }
            TypeRef::Closure { args, ret, .. } => {
                for a in args {
                    a.visit_mut(f);
                }
                ret.visit_mut(f);
            }
        }
        f(self);
    }
}

impl Default for TypeRef {
    fn default() -> Self {
        TypeRef::infer()
    }
}

/// Substitution of generic parameter slots by concrete types.
///
/// Used when monomorphising an impl, function signature, or variant field
/// list against a caller's type arguments.
#[derive(Debug, Clone, Default)]
pub struct Substitution {
    pub self_ty: Option<TypeRef>,
    pub impl_params: Vec<TypeRef>,
    pub method_params: Vec<TypeRef>,
}

impl Substitution {
    pub fn for_impl(self_ty: Option<TypeRef>, impl_params: Vec<TypeRef>) -> Self {
        Substitution {
            self_ty,
            impl_params,
            method_params: Vec::new(),
        }
    }

    fn lookup(&self, slot: u16) -> Option<&TypeRef> {
        if slot == slots::SELF {
            self.self_ty.as_ref()
        } else if slots::is_impl_level(slot) {
            self.impl_params.get(slots::index(slot))
        } else if slots::is_method_level(slot) {
            self.method_params.get(slots::index(slot))
        } else {
            None
        }
    }

    /// Replace every `Generic` slot covered by this substitution.
    /// Slots without a replacement are left untouched (partial
    /// monomorphisation is legal while inference is still running).
    pub fn apply(&self, ty: &TypeRef) -> TypeRef {
        let mut out = ty.clone();
        out.visit_mut(&mut |t| {
            if let TypeRef::Generic { slot, .. } = t {
                if let Some(repl) = self.lookup(*slot) {
                    *t = repl.clone();
                }
            }
        });
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::PathNode;

    #[test]
    fn test_core_type_roundtrip() {
        for name in ["bool", "u8", "i128", "usize", "f64", "str", "char"] {
            let ct = CoreType::from_name(name).unwrap();
            assert_eq!(ct.name(), name);
        }
        assert_eq!(CoreType::from_name("u256"), None);
    }

    #[test]
    fn test_slot_encoding() {
        assert!(slots::is_impl_level(0x0003));
        assert!(slots::is_method_level(0x0102));
        assert!(!slots::is_impl_level(slots::SELF));
        assert_eq!(slots::index(0x0102), 2);
    }

    #[test]
    fn test_contains_infer() {
        let t = TypeRef::Borrow {
            is_mut: false,
            inner: Box::new(TypeRef::Tuple(vec![
                TypeRef::Primitive(CoreType::U8),
                TypeRef::infer(),
            ])),
        };
        assert!(t.contains_infer());
        assert!(!TypeRef::Primitive(CoreType::U8).contains_infer());
    }

    #[test]
    fn test_substitution() {
        let subst = Substitution {
            self_ty: Some(TypeRef::Primitive(CoreType::U32)),
            impl_params: vec![TypeRef::Primitive(CoreType::Bool)],
            method_params: vec![TypeRef::Primitive(CoreType::F64)],
        };
        let ty = TypeRef::Tuple(vec![
            TypeRef::generic_self(),
            TypeRef::Generic {
                name: "T".to_string(),
                slot: 0x0000,
            },
            TypeRef::Generic {
                name: "U".to_string(),
                slot: 0x0100,
            },
        ]);
        let out = subst.apply(&ty);
        assert_eq!(
            out,
            TypeRef::Tuple(vec![
                TypeRef::Primitive(CoreType::U32),
                TypeRef::Primitive(CoreType::Bool),
                TypeRef::Primitive(CoreType::F64),
            ])
        );
    }

    #[test]
    fn test_generic_args_visited() {
        let ty = TypeRef::path(crate::path::Path::relative(vec![PathNode::with_args(
            "Vec",
            vec![TypeRef::infer()],
        )]));
        assert!(ty.contains_infer());
    }
}
