//! Expressions and statements.
//!
//! Every expression node carries a `res_type` slot. The slot starts as an
//! unallocated `Infer`; after type inference it holds the node's concrete
//! type, making this tree double as the typed output of the middle-end.

use crate::pattern::Pattern;
use crate::path::{Path, PathNode};
use crate::types::{CoreType, TypeRef};
use crate::MacroInvocation;
use ferric_diagnostics::Span;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    BoolAnd,
    BoolOr,
}

impl BinOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }

    pub fn is_shift(&self) -> bool {
        matches!(self, BinOp::Shl | BinOp::Shr)
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, BinOp::BoolAnd | BinOp::BoolOr)
    }

    /// The lang item anchoring this operator's trait
    pub fn lang_item(&self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Div => "div",
            BinOp::Rem => "rem",
            BinOp::BitAnd => "bitand",
            BinOp::BitOr => "bitor",
            BinOp::BitXor => "bitxor",
            BinOp::Shl => "shl",
            BinOp::Shr => "shr",
            BinOp::Eq | BinOp::Ne => "eq",
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => "ord",
            BinOp::BoolAnd | BinOp::BoolOr => "",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UniOp {
    /// `-x`
    Neg,
    /// `!x`
    Not,
}

impl UniOp {
    pub fn lang_item(&self) -> &'static str {
        match self {
            UniOp::Neg => "neg",
            UniOp::Not => "not",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Integer {
        value: u128,
        suffix: Option<CoreType>,
    },
    Float {
        value: f64,
        suffix: Option<CoreType>,
    },
    Bool(bool),
    Str(String),
    ByteStr(Vec<u8>),
    Char(char),
}

/// Monomorphised signature cached on a call node by inference, so the
/// iteration passes do not recompute it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CallCache {
    pub arg_types: Vec<TypeRef>,
    pub ret_type: Option<TypeRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchArm {
    pub pats: Vec<Pattern>,
    pub guard: Option<ExprNode>,
    pub body: ExprNode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Let {
        pat: Pattern,
        ty: TypeRef,
        value: Option<ExprNode>,
    },
    /// Expression evaluated for its value (block tail position excluded)
    Expr(ExprNode),
    /// Expression followed by `;` - result discarded
    Semi(ExprNode),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Block {
        is_unsafe: bool,
        stmts: Vec<Stmt>,
        tail: Option<Box<ExprNode>>,
        /// Index into the owning module's anonymous sub-modules, when the
        /// block defines items
        anon_module: Option<usize>,
    },
    Literal(Literal),
    /// A value path: variable, constant, unit struct, function reference
    NamedValue { path: Path },
    /// `path(args)` - direct call of a function/constructor path
    CallPath {
        path: Path,
        args: Vec<ExprNode>,
        cache: CallCache,
    },
    /// `value(args)` - call through a value (fn pointer / closure)
    CallValue {
        value: Box<ExprNode>,
        args: Vec<ExprNode>,
    },
    /// `recv.name::<...>(args)` - resolved to a UFCS CallPath during
    /// inference, with any auto-deref made explicit
    CallMethod {
        receiver: Box<ExprNode>,
        method: PathNode,
        args: Vec<ExprNode>,
        cache: CallCache,
    },
    Field {
        receiver: Box<ExprNode>,
        name: String,
    },
    Index {
        value: Box<ExprNode>,
        index: Box<ExprNode>,
    },
    Deref { inner: Box<ExprNode> },
    Borrow {
        is_mut: bool,
        inner: Box<ExprNode>,
    },
    Cast {
        inner: Box<ExprNode>,
        ty: TypeRef,
    },
    /// Coercion wrapper inserted by inference (`&[T; N]` to `&[T]`,
    /// `&T` to `&dyn Trait`, ...)
    Unsize {
        inner: Box<ExprNode>,
        ty: TypeRef,
    },
    Assign {
        op: Option<BinOp>,
        target: Box<ExprNode>,
        value: Box<ExprNode>,
    },
    BinOp {
        op: BinOp,
        left: Box<ExprNode>,
        right: Box<ExprNode>,
    },
    UniOp {
        op: UniOp,
        inner: Box<ExprNode>,
    },
    If {
        cond: Box<ExprNode>,
        then_: Box<ExprNode>,
        else_: Option<Box<ExprNode>>,
    },
    /// `if let` - desugared to a match during expansion
    IfLet {
        pat: Pattern,
        value: Box<ExprNode>,
        then_: Box<ExprNode>,
        else_: Option<Box<ExprNode>>,
    },
    Match {
        value: Box<ExprNode>,
        arms: Vec<MatchArm>,
    },
    Loop {
        label: Option<String>,
        body: Box<ExprNode>,
    },
    While {
        label: Option<String>,
        cond: Box<ExprNode>,
        body: Box<ExprNode>,
    },
    /// Desugared to loop+match during expansion
    WhileLet {
        label: Option<String>,
        pat: Pattern,
        value: Box<ExprNode>,
        body: Box<ExprNode>,
    },
    /// Desugared to IntoIterator/Iterator::next during expansion
    ForLoop {
        label: Option<String>,
        pat: Pattern,
        iter: Box<ExprNode>,
        body: Box<ExprNode>,
    },
    /// `expr?` - desugared during expansion
    Try { inner: Box<ExprNode> },
    /// `a..b`, `a..=b` - desugared to range struct literals
    Range {
        start: Option<Box<ExprNode>>,
        end: Option<Box<ExprNode>>,
        inclusive: bool,
    },
    Break {
        label: Option<String>,
        value: Option<Box<ExprNode>>,
    },
    Continue { label: Option<String> },
    Return { value: Option<Box<ExprNode>> },
    StructLiteral {
        path: Path,
        fields: Vec<(String, ExprNode)>,
        base: Option<Box<ExprNode>>,
    },
    Tuple(Vec<ExprNode>),
    ArrayList(Vec<ExprNode>),
    /// `[value; N]`
    ArraySized {
        value: Box<ExprNode>,
        count: u64,
    },
    Closure {
        node_id: u32,
        args: Vec<(Pattern, TypeRef)>,
        ret: TypeRef,
        body: Box<ExprNode>,
    },
    /// Pre-expansion only
    Macro(MacroInvocation),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExprNode {
    pub span: Span,
    #[serde(default)]
    pub attrs: Vec<crate::attr::Attribute>,
    pub kind: ExprKind,
    pub res_type: TypeRef,
}

impl ExprNode {
    pub fn new(kind: ExprKind) -> Self {
        ExprNode {
            span: Span::synthetic(),
            attrs: Vec::new(),
            kind,
            res_type: TypeRef::infer(),
        }
    }

    pub fn with_span(span: Span, kind: ExprKind) -> Self {
        ExprNode {
            span,
            attrs: Vec::new(),
            kind,
            res_type: TypeRef::infer(),
        }
    }

    pub fn unit() -> Self {
        ExprNode::new(ExprKind::Tuple(Vec::new()))
    }

    pub fn int(value: u128, suffix: Option<CoreType>) -> Self {
        ExprNode::new(ExprKind::Literal(Literal::Integer { value, suffix }))
    }

    pub fn bool_lit(value: bool) -> Self {
        ExprNode::new(ExprKind::Literal(Literal::Bool(value)))
    }

    pub fn named(path: Path) -> Self {
        ExprNode::new(ExprKind::NamedValue { path })
    }

    pub fn call_path(path: Path, args: Vec<ExprNode>) -> Self {
        ExprNode::new(ExprKind::CallPath {
            path,
            args,
            cache: CallCache::default(),
        })
    }

    pub fn block(stmts: Vec<Stmt>, tail: Option<ExprNode>) -> Self {
        ExprNode::new(ExprKind::Block {
            is_unsafe: false,
            stmts,
            tail: tail.map(Box::new),
            anon_module: None,
        })
    }

    /// Apply `f` to every direct child expression, in source order.
    /// The walkers in expansion, resolution, and inference are all built
    /// on this.
    pub fn for_each_child_mut<E>(
        &mut self,
        f: &mut dyn FnMut(&mut ExprNode) -> Result<(), E>,
    ) -> Result<(), E> {
        match &mut self.kind {
            ExprKind::Literal(_)
            | ExprKind::NamedValue { .. }
            | ExprKind::Continue { .. }
            | ExprKind::Macro(_) => Ok(()),
            ExprKind::Block { stmts, tail, .. } => {
                for stmt in stmts {
                    match stmt {
                        Stmt::Let { value, .. } => {
                            if let Some(v) = value {
                                f(v)?;
                            }
                        }
                        Stmt::Expr(e) | Stmt::Semi(e) => f(e)?,
                    }
                }
                if let Some(t) = tail {
                    f(t)?;
                }
                Ok(())
            }
            ExprKind::CallPath { args, .. } => {
                for a in args {
                    f(a)?;
                }
                Ok(())
            }
            ExprKind::CallValue { value, args } => {
                f(value)?;
                for a in args {
                    f(a)?;
                }
                Ok(())
            }
            ExprKind::CallMethod { receiver, args, .. } => {
                f(receiver)?;
                for a in args {
                    f(a)?;
                }
                Ok(())
            }
            ExprKind::Field { receiver, .. } => f(receiver),
            ExprKind::Index { value, index } => {
                f(value)?;
                f(index)
            }
            ExprKind::Deref { inner }
            | ExprKind::Borrow { inner, .. }
            | ExprKind::Cast { inner, .. }
            | ExprKind::Unsize { inner, .. }
            | ExprKind::UniOp { inner, .. }
            | ExprKind::Try { inner } => f(inner),
            ExprKind::Assign { target, value, .. } => {
                f(target)?;
                f(value)
            }
            ExprKind::BinOp { left, right, .. } => {
                f(left)?;
                f(right)
            }
            ExprKind::If { cond, then_, else_ } => {
                f(cond)?;
                f(then_)?;
                if let Some(e) = else_ {
                    f(e)?;
                }
                Ok(())
            }
            ExprKind::IfLet {
                value,
                then_,
                else_,
                ..
            } => {
                f(value)?;
                f(then_)?;
                if let Some(e) = else_ {
                    f(e)?;
                }
                Ok(())
            }
            ExprKind::Match { value, arms } => {
                f(value)?;
                for arm in arms {
                    if let Some(g) = &mut arm.guard {
                        f(g)?;
                    }
                    f(&mut arm.body)?;
                }
                Ok(())
            }
            ExprKind::Loop { body, .. } => f(body),
            ExprKind::While { cond, body, .. } => {
                f(cond)?;
                f(body)
            }
            ExprKind::WhileLet { value, body, .. } => {
                f(value)?;
                f(body)
            }
            ExprKind::ForLoop { iter, body, .. } => {
                f(iter)?;
                f(body)
            }
            ExprKind::Range { start, end, .. } => {
                if let Some(s) = start {
                    f(s)?;
                }
                if let Some(e) = end {
                    f(e)?;
                }
                Ok(())
            }
            ExprKind::Break { value, .. } | ExprKind::Return { value } => {
                if let Some(v) = value {
                    f(v)?;
                }
                Ok(())
            }
            ExprKind::StructLiteral { fields, base, .. } => {
                for (_, e) in fields {
                    f(e)?;
                }
                if let Some(b) = base {
                    f(b)?;
                }
                Ok(())
            }
            ExprKind::Tuple(elems) | ExprKind::ArrayList(elems) => {
                for e in elems {
                    f(e)?;
                }
                Ok(())
            }
            ExprKind::ArraySized { value, .. } => f(value),
            ExprKind::Closure { body, .. } => f(body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_nodes_are_untyped() {
        let node = ExprNode::int(1, None);
        assert!(node.res_type.is_infer());
    }

    #[test]
    fn test_binop_classes() {
        assert!(BinOp::Eq.is_comparison());
        assert!(BinOp::Shl.is_shift());
        assert!(!BinOp::Add.is_comparison());
        assert_eq!(BinOp::Add.lang_item(), "add");
        assert_eq!(BinOp::Lt.lang_item(), "ord");
    }

    #[test]
    fn test_block_builder() {
        let b = ExprNode::block(vec![], Some(ExprNode::bool_lit(true)));
        match &b.kind {
            ExprKind::Block { tail: Some(t), .. } => {
                assert!(matches!(t.kind, ExprKind::Literal(Literal::Bool(true))));
            }
            _ => panic!("expected block"),
        }
    }
}
