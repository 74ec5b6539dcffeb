//! The per-body inference engine: enumeration, iteration, validation.

use crate::ivars::IVarTable;
use crate::{BodyJob, ImplData, TypeError};
use ferric_ast::{
    Crate, ExprKind, ExprNode, GenericParams, InferClass, Literal, Pattern, PatternKind, Stmt,
    TypeRef, UniOp,
};
use ferric_ast::expr::BinOp;
use ferric_diagnostics::Span;
use std::collections::HashMap;

/// Bound on fixpoint rounds; exceeding it means a typing rule oscillates
const MAX_ITERATIONS: usize = 1000;

/// Depth cap for associated-type expansion
pub(crate) const MAX_PROJECTION_DEPTH: usize = 64;

pub(crate) struct LoopCtx {
    pub label: Option<String>,
    pub result: TypeRef,
    pub saw_break: bool,
}

pub struct InferContext<'c> {
    pub(crate) krate: &'c Crate,
    pub(crate) impls: &'c [ImplData],
    pub(crate) ivars: IVarTable,
    pub(crate) ret_type: TypeRef,
    pub(crate) self_ty: Option<TypeRef>,
    pub(crate) impl_generics: GenericParams,
    pub(crate) fn_generics: GenericParams,
    /// Local slot -> its (usually still inferred) type
    pub(crate) locals: HashMap<u32, TypeRef>,
    pub(crate) loop_stack: Vec<LoopCtx>,
}

impl<'c> InferContext<'c> {
    pub(crate) fn new(krate: &'c Crate, impls: &'c [ImplData], job: &BodyJob) -> Self {
        InferContext {
            krate,
            impls,
            ivars: IVarTable::new(),
            ret_type: job.ret.clone(),
            self_ty: job.self_ty.clone(),
            impl_generics: job.impl_generics.clone(),
            fn_generics: job.fn_generics.clone(),
            locals: HashMap::new(),
            loop_stack: Vec::new(),
        }
    }

    pub(crate) fn fresh_hole(&mut self, class: InferClass) -> TypeRef {
        TypeRef::Infer {
            index: Some(self.ivars.new_ivar(class)),
            class,
        }
    }

    /// The representative of a node's current type
    pub(crate) fn resolved(&self, ty: &TypeRef) -> TypeRef {
        self.ivars.resolve_shallow(ty)
    }

    // ---- enumeration ----

    /// Allocate an ivar for every unallocated hole inside a written type
    pub(crate) fn alloc_type_holes(&mut self, ty: &mut TypeRef) {
        // Collected first: visit_mut can't thread &mut self
        let mut count = 0;
        ty.visit(&mut |t| {
            if matches!(t, TypeRef::Infer { index: None, .. }) {
                count += 1;
            }
        });
        if count == 0 {
            return;
        }
        let mut fresh: Vec<u32> = (0..count)
            .map(|_| self.ivars.new_ivar(InferClass::None))
            .collect();
        fresh.reverse();
        ty.visit_mut(&mut |t| {
            if let TypeRef::Infer { index: index @ None, .. } = t {
                *index = fresh.pop();
            }
        });
    }

    fn register_pattern_slots(&mut self, pat: &Pattern) {
        if let Some(binding) = &pat.binding {
            if let Some(slot) = binding.slot {
                let hole = self.fresh_hole(InferClass::None);
                self.locals.entry(slot).or_insert(hole);
            }
        }
        match &pat.kind {
            PatternKind::Tuple(pats)
            | PatternKind::Slice(pats)
            | PatternKind::Or(pats) => {
                for p in pats {
                    self.register_pattern_slots(p);
                }
            }
            PatternKind::StructTuple { elems, .. } => {
                for p in elems {
                    self.register_pattern_slots(p);
                }
            }
            PatternKind::Struct { fields, .. } => {
                for (_, p) in fields {
                    self.register_pattern_slots(p);
                }
            }
            PatternKind::SplitSlice {
                leading,
                middle,
                trailing,
            } => {
                for p in leading.iter().chain(trailing.iter()) {
                    self.register_pattern_slots(p);
                }
                if let Some(binding) = middle {
                    if let Some(slot) = binding.slot {
                        let hole = self.fresh_hole(InferClass::None);
                        self.locals.entry(slot).or_insert(hole);
                    }
                }
            }
            PatternKind::Ref { inner, .. } | PatternKind::Box_ { inner } => {
                self.register_pattern_slots(inner);
            }
            _ => {}
        }
    }

    /// Enumeration pass: give every expression node an allocated ivar
    /// and register every pattern-bound local.
    pub(crate) fn enumerate(&mut self, node: &mut ExprNode) -> Result<(), TypeError> {
        node.for_each_child_mut(&mut |child| self.enumerate(child))?;

        match &mut node.kind {
            ExprKind::Block { stmts, .. } => {
                for stmt in stmts.iter_mut() {
                    if let Stmt::Let { pat, ty, .. } = stmt {
                        self.alloc_type_holes(ty);
                        self.register_pattern_slots(pat);
                    }
                }
            }
            ExprKind::Match { arms, .. } => {
                for arm in arms.iter() {
                    for pat in &arm.pats {
                        self.register_pattern_slots(pat);
                    }
                }
            }
            ExprKind::Closure { args, ret, .. } => {
                for (pat, ty) in args.iter_mut() {
                    self.alloc_type_holes(ty);
                    self.register_pattern_slots(pat);
                }
                self.alloc_type_holes(ret);
            }
            ExprKind::Cast { ty, .. } | ExprKind::Unsize { ty, .. } => {
                self.alloc_type_holes(ty);
            }
            ExprKind::CallPath { path, .. } | ExprKind::NamedValue { path } => {
                if let Some(nodes) = path.nodes_mut() {
                    for pn in nodes.iter_mut() {
                        for arg in &mut pn.args {
                            self.alloc_type_holes(arg);
                        }
                    }
                }
            }
            ExprKind::StructLiteral { path, .. } => {
                if let Some(nodes) = path.nodes_mut() {
                    for pn in nodes.iter_mut() {
                        for arg in &mut pn.args {
                            self.alloc_type_holes(arg);
                        }
                    }
                }
            }
            ExprKind::CallMethod { method, .. } => {
                for arg in &mut method.args {
                    self.alloc_type_holes(arg);
                }
            }
            _ => {}
        }

        if let TypeRef::Infer { index: None, .. } = node.res_type {
            let class = match &node.kind {
                ExprKind::Literal(Literal::Integer { suffix: None, .. }) => InferClass::Integer,
                ExprKind::Literal(Literal::Float { suffix: None, .. }) => InferClass::Float,
                _ => InferClass::None,
            };
            node.res_type = self.fresh_hole(class);
        }
        Ok(())
    }

    // ---- iteration ----

    /// Whether a loop body contains a break targeting that loop: a bare
    /// break binds to the innermost loop (depth 0), a labelled break
    /// matches by name at any depth.
    fn loop_has_break(node: &mut ExprNode, label: &Option<String>, depth: usize) -> bool {
        match &mut node.kind {
            ExprKind::Break { label: blabel, .. } => match blabel {
                None => depth == 0,
                Some(name) => label.as_deref() == Some(name.as_str()),
            },
            ExprKind::Loop { body, .. } => Self::loop_has_break(body, label, depth + 1),
            ExprKind::While { cond, body, .. } => {
                Self::loop_has_break(cond, label, depth)
                    || Self::loop_has_break(body, label, depth + 1)
            }
            ExprKind::Closure { .. } => false,
            _ => {
                let mut found = false;
                let _ = node.for_each_child_mut(&mut |child| {
                    if Self::loop_has_break(child, label, depth) {
                        found = true;
                    }
                    Ok::<(), std::convert::Infallible>(())
                });
                found
            }
        }
    }

    /// One iteration visit over the tree, applying every typing rule
    /// that can make progress.
    pub(crate) fn visit(&mut self, node: &mut ExprNode) -> Result<(), TypeError> {
        let span = node.span.clone();
        let res_type = node.res_type.clone();

        // Loops manage a result slot for their breaks before descending
        if let ExprKind::Loop { label, body } = &mut node.kind {
            let label = label.clone();
            let saw_break = Self::loop_has_break(body, &label, 0);
            self.loop_stack.push(LoopCtx {
                label,
                result: res_type.clone(),
                saw_break,
            });
        }

        node.for_each_child_mut(&mut |child| self.visit(child))?;

        // Rules that may rewrite the node itself run outside the match
        // on its kind
        match &node.kind {
            ExprKind::CallPath { .. } => return self.visit_call_path(&span, node),
            ExprKind::CallMethod { .. } => {
                self.visit_call_method(&span, node)?;
                // A successful lookup rewrote it into a plain call;
                // apply that rule in the same round
                if matches!(node.kind, ExprKind::CallPath { .. }) {
                    return self.visit_call_path(&span, node);
                }
                return Ok(());
            }
            ExprKind::StructLiteral { .. } => return self.visit_struct_literal(&span, node),
            _ => {}
        }

        match &mut node.kind {
            ExprKind::Literal(lit) => self.visit_literal(&span, &res_type, lit)?,
            ExprKind::NamedValue { path } => self.visit_named_value(&span, &res_type, path)?,
            ExprKind::CallValue { value, args } => {
                let callee = self.resolved(&value.res_type);
                match callee {
                    TypeRef::Function(sig) => {
                        if sig.args.len() != args.len() {
                            return Err(TypeError::ArgumentCount {
                                span,
                                expected: sig.args.len(),
                                found: args.len(),
                            });
                        }
                        for (arg, param) in args.iter_mut().zip(sig.args.iter()) {
                            self.equate_coerce(param, arg)?;
                        }
                        self.equate(&span, &res_type, &sig.ret)?;
                    }
                    TypeRef::Closure { args: params, ret, .. } => {
                        if params.len() != args.len() {
                            return Err(TypeError::ArgumentCount {
                                span,
                                expected: params.len(),
                                found: args.len(),
                            });
                        }
                        for (arg, param) in args.iter_mut().zip(params.iter()) {
                            self.equate_coerce(param, arg)?;
                        }
                        self.equate(&span, &res_type, &ret)?;
                    }
                    TypeRef::Infer { .. } => {}
                    other => {
                        return Err(TypeError::Mismatch {
                            span,
                            left: format!("{other:?}"),
                            right: "callable".to_string(),
                        })
                    }
                }
            }
            // Handled before this match
            ExprKind::CallPath { .. } | ExprKind::CallMethod { .. } => {}
            ExprKind::Field { receiver, name } => {
                let recv = self.resolved(&receiver.res_type);
                if !recv.is_infer() {
                    if let Some((field_ty, derefs)) = self.field_lookup(&span, &recv, name)? {
                        for _ in 0..derefs {
                            let hole = self.fresh_hole(InferClass::None);
                            let inner = std::mem::replace(&mut **receiver, ExprNode::unit());
                            let inner_span = inner.span.clone();
                            **receiver = ExprNode {
                                span: inner_span,
                                attrs: Vec::new(),
                                kind: ExprKind::Deref {
                                    inner: Box::new(inner),
                                },
                                res_type: hole,
                            };
                            self.ivars.mark_change();
                        }
                        self.equate(&span, &res_type, &field_ty)?;
                    }
                }
            }
            ExprKind::Index { value, index } => {
                let recv = self.resolved(&value.res_type);
                let elem = match self.peel_borrows(&recv) {
                    TypeRef::Array { inner, .. } | TypeRef::Slice { inner } => Some(*inner),
                    _ => None,
                };
                if let Some(elem) = elem {
                    let usize_ty = TypeRef::Primitive(ferric_ast::CoreType::Usize);
                    self.equate(&span, &index.res_type, &usize_ty)?;
                    self.equate(&span, &res_type, &elem)?;
                }
            }
            ExprKind::Deref { inner } => {
                let pointee = match self.resolved(&inner.res_type) {
                    TypeRef::Borrow { inner, .. } | TypeRef::Pointer { inner, .. } => {
                        Some(*inner)
                    }
                    _ => None,
                };
                if let Some(p) = pointee {
                    self.equate(&span, &res_type, &p)?;
                }
            }
            ExprKind::Borrow { is_mut, inner } => {
                let borrowed = TypeRef::Borrow {
                    is_mut: *is_mut,
                    inner: Box::new(inner.res_type.clone()),
                };
                self.equate(&span, &res_type, &borrowed)?;
            }
            ExprKind::Cast { ty, .. } | ExprKind::Unsize { ty, .. } => {
                let target = ty.clone();
                self.equate(&span, &res_type, &target)?;
            }
            ExprKind::Assign { target, value, .. } => {
                let expected = target.res_type.clone();
                self.equate_coerce(&expected, value)?;
                self.equate(&span, &res_type, &TypeRef::unit())?;
            }
            ExprKind::BinOp { op, left, right } => {
                let op = *op;
                self.visit_binop(&span, &res_type, op, left, right)?;
            }
            ExprKind::UniOp { op, inner } => {
                let op = *op;
                self.visit_uniop(&span, &res_type, op, inner)?;
            }
            ExprKind::If { cond, then_, else_ } => {
                let bool_ty = TypeRef::Primitive(ferric_ast::CoreType::Bool);
                self.equate(&span, &cond.res_type, &bool_ty)?;
                match else_ {
                    Some(e) => {
                        let then_ty = then_.res_type.clone();
                        self.equate(&span, &res_type, &then_ty)?;
                        self.equate_coerce(&res_type, e)?;
                    }
                    None => {
                        self.equate(&span, &res_type, &TypeRef::unit())?;
                        let then_ty = then_.res_type.clone();
                        self.equate(&span, &then_ty, &TypeRef::unit())?;
                    }
                }
            }
            ExprKind::Match { value, arms } => {
                let scrutinee = value.res_type.clone();
                let bool_ty = TypeRef::Primitive(ferric_ast::CoreType::Bool);
                for arm in arms.iter_mut() {
                    for pat in &arm.pats {
                        self.apply_pattern_type(&span, pat, &scrutinee)?;
                    }
                    if let Some(guard) = &mut arm.guard {
                        let gty = guard.res_type.clone();
                        self.equate(&span, &gty, &bool_ty)?;
                    }
                    self.equate_coerce(&res_type, &mut arm.body)?;
                }
            }
            ExprKind::Loop { .. } => {
                let ctx = self.loop_stack.pop();
                if let Some(ctx) = ctx {
                    if !ctx.saw_break {
                        self.equate(&span, &res_type, &TypeRef::Diverge)?;
                    }
                }
            }
            ExprKind::While { cond, body, .. } => {
                let bool_ty = TypeRef::Primitive(ferric_ast::CoreType::Bool);
                self.equate(&span, &cond.res_type, &bool_ty)?;
                let bty = body.res_type.clone();
                self.equate(&span, &bty, &TypeRef::unit())?;
                self.equate(&span, &res_type, &TypeRef::unit())?;
            }
            ExprKind::Break { label, value } => {
                let target = self
                    .loop_stack
                    .iter()
                    .rev()
                    .find(|l| match label {
                        None => true,
                        Some(name) => l.label.as_deref() == Some(name.as_str()),
                    })
                    .map(|l| l.result.clone());
                if let Some(loop_ty) = target {
                    match value {
                        Some(v) => self.equate_coerce(&loop_ty, v)?,
                        None => self.equate(&span, &loop_ty, &TypeRef::unit())?,
                    }
                }
                self.equate(&span, &res_type, &TypeRef::Diverge)?;
            }
            ExprKind::Continue { .. } => {
                self.equate(&span, &res_type, &TypeRef::Diverge)?;
            }
            ExprKind::Return { value } => {
                let ret = self.ret_type.clone();
                match value {
                    Some(v) => self.equate_coerce(&ret, v)?,
                    None => self.equate(&span, &ret, &TypeRef::unit())?,
                }
                self.equate(&span, &res_type, &TypeRef::Diverge)?;
            }
            ExprKind::Block { stmts, tail, .. } => {
                for stmt in stmts.iter_mut() {
                    if let Stmt::Let { pat, ty, value } = stmt {
                        if let Some(v) = value {
                            self.equate_coerce(ty, v)?;
                        }
                        self.apply_pattern_type(&span, pat, &ty.clone())?;
                    }
                }
                match tail {
                    Some(t) => {
                        let tty = t.res_type.clone();
                        self.equate(&span, &res_type, &tty)?;
                    }
                    None => self.equate(&span, &res_type, &TypeRef::unit())?,
                }
            }
            // Handled before this match
            ExprKind::StructLiteral { .. } => {}
            ExprKind::Tuple(elems) => {
                let tuple = TypeRef::Tuple(elems.iter().map(|e| e.res_type.clone()).collect());
                self.equate(&span, &res_type, &tuple)?;
            }
            ExprKind::ArrayList(elems) => {
                match elems.first() {
                    Some(first) => {
                        let elem_ty = first.res_type.clone();
                        for e in elems.iter().skip(1) {
                            let ety = e.res_type.clone();
                            self.equate(&span, &elem_ty, &ety)?;
                        }
                        let arr = TypeRef::Array {
                            inner: Box::new(elem_ty),
                            size: elems.len() as u64,
                        };
                        self.equate(&span, &res_type, &arr)?;
                    }
                    None => {
                        // Allocate the element hole once
                        if self.resolved(&res_type).is_infer() {
                            let arr = TypeRef::Array {
                                inner: Box::new(self.fresh_hole(InferClass::None)),
                                size: 0,
                            };
                            self.equate(&span, &res_type, &arr)?;
                        }
                    }
                }
            }
            ExprKind::ArraySized { value, count } => {
                let arr = TypeRef::Array {
                    inner: Box::new(value.res_type.clone()),
                    size: *count,
                };
                self.equate(&span, &res_type, &arr)?;
            }
            ExprKind::Closure {
                node_id,
                args,
                ret,
                body,
            } => {
                for (pat, ty) in args.iter() {
                    self.apply_pattern_type(&span, pat, ty)?;
                }
                let closure_ty = TypeRef::Closure {
                    node_id: *node_id,
                    args: args.iter().map(|(_, t)| t.clone()).collect(),
                    ret: Box::new(ret.clone()),
                };
                self.equate_coerce(&ret.clone(), body)?;
                self.equate(&span, &res_type, &closure_ty)?;
            }
            ExprKind::Macro(mac) => {
                return Err(TypeError::Unexpected {
                    span,
                    detail: format!("unexpanded macro `{}!`", mac.name),
                })
            }
            ExprKind::IfLet { .. }
            | ExprKind::WhileLet { .. }
            | ExprKind::ForLoop { .. }
            | ExprKind::Try { .. }
            | ExprKind::Range { .. } => {
                return Err(TypeError::Unexpected {
                    span,
                    detail: "sugar survived expansion".to_string(),
                })
            }
        }
        Ok(())
    }

    fn visit_literal(
        &mut self,
        span: &Span,
        res_type: &TypeRef,
        lit: &Literal,
    ) -> Result<(), TypeError> {
        let known = match lit {
            Literal::Integer {
                suffix: Some(ct), ..
            }
            | Literal::Float {
                suffix: Some(ct), ..
            } => Some(TypeRef::Primitive(*ct)),
            Literal::Integer { suffix: None, .. } | Literal::Float { suffix: None, .. } => None,
            Literal::Bool(_) => Some(TypeRef::Primitive(ferric_ast::CoreType::Bool)),
            Literal::Char(_) => Some(TypeRef::Primitive(ferric_ast::CoreType::Char)),
            Literal::Str(_) => Some(TypeRef::borrow(TypeRef::Primitive(
                ferric_ast::CoreType::Str,
            ))),
            Literal::ByteStr(bytes) => Some(TypeRef::borrow(TypeRef::Array {
                inner: Box::new(TypeRef::Primitive(ferric_ast::CoreType::U8)),
                size: bytes.len() as u64,
            })),
        };
        if let Some(ty) = known {
            self.equate(span, res_type, &ty)?;
        }
        Ok(())
    }

    fn visit_uniop(
        &mut self,
        span: &Span,
        res_type: &TypeRef,
        op: UniOp,
        inner: &mut ExprNode,
    ) -> Result<(), TypeError> {
        let ity = self.resolved(&inner.res_type);
        match &ity {
            TypeRef::Primitive(ct) => {
                let ok = match op {
                    UniOp::Neg => ct.is_float() || (ct.is_integer() && ct.is_signed()),
                    UniOp::Not => *ct == ferric_ast::CoreType::Bool || ct.is_integer(),
                };
                if !ok {
                    return Err(TypeError::BadOperator {
                        span: span.clone(),
                        op: format!("{op:?}"),
                        ty: format!("{ct}"),
                    });
                }
                let inner_ty = inner.res_type.clone();
                self.equate(span, res_type, &inner_ty)
            }
            TypeRef::Infer { .. } => {
                // Propagate backwards so `-x` constrains `x`
                let inner_ty = inner.res_type.clone();
                self.equate(span, res_type, &inner_ty)
            }
            _ => {
                let lang = op.lang_item();
                self.op_trait_dispatch(span, res_type, lang, inner, None)
            }
        }
    }

    fn visit_binop(
        &mut self,
        span: &Span,
        res_type: &TypeRef,
        op: BinOp,
        left: &mut ExprNode,
        right: &mut ExprNode,
    ) -> Result<(), TypeError> {
        let bool_ty = TypeRef::Primitive(ferric_ast::CoreType::Bool);
        if op.is_boolean() {
            self.equate(span, &left.res_type.clone(), &bool_ty)?;
            self.equate(span, &right.res_type.clone(), &bool_ty)?;
            return self.equate(span, res_type, &bool_ty);
        }
        if op.is_comparison() {
            let lres = self.resolved(&left.res_type);
            let rres = self.resolved(&right.res_type);
            match (&lres, &rres) {
                (TypeRef::Primitive(lc), TypeRef::Primitive(rc)) => {
                    if lc != rc {
                        return Err(TypeError::Mismatch {
                            span: span.clone(),
                            left: lc.to_string(),
                            right: rc.to_string(),
                        });
                    }
                }
                (TypeRef::Diverge, _) | (_, TypeRef::Diverge) => {}
                (TypeRef::Infer { .. }, _) | (_, TypeRef::Infer { .. }) => {
                    // Same-type default while a side is still open; it
                    // nudges literal classes together
                    let lty = left.res_type.clone();
                    let rty = right.res_type.clone();
                    self.equate(span, &lty, &rty)?;
                }
                _ => {
                    // Non-primitive operands go through the eq/ord lang
                    // items; the operand types stay independent
                    self.cmp_trait_dispatch(span, op.lang_item(), &lres, right)?;
                }
            }
            return self.equate(span, res_type, &bool_ty);
        }

        let lres = self.resolved(&left.res_type);
        let rres = self.resolved(&right.res_type);
        match (&lres, &rres) {
            (TypeRef::Primitive(lc), TypeRef::Primitive(rc)) => {
                if op.is_shift() {
                    if !lc.is_integer() || !rc.is_integer() {
                        return Err(TypeError::BadOperator {
                            span: span.clone(),
                            op: format!("{op:?}"),
                            ty: format!("{lc}"),
                        });
                    }
                } else {
                    if lc != rc {
                        return Err(TypeError::Mismatch {
                            span: span.clone(),
                            left: lc.to_string(),
                            right: rc.to_string(),
                        });
                    }
                    let arith_ok = lc.is_integer() || lc.is_float();
                    let bits_ok = lc.is_integer() || *lc == ferric_ast::CoreType::Bool;
                    let ok = match op {
                        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem => {
                            arith_ok
                        }
                        BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor => bits_ok,
                        _ => true,
                    };
                    if !ok {
                        return Err(TypeError::BadOperator {
                            span: span.clone(),
                            op: format!("{op:?}"),
                            ty: format!("{lc}"),
                        });
                    }
                }
                // Result takes the left type
                let lty = left.res_type.clone();
                self.equate(span, res_type, &lty)
            }
            (TypeRef::Infer { .. }, _) | (_, TypeRef::Infer { .. }) => {
                // Same-type default nudges literal classes together
                if !op.is_shift() {
                    let lty = left.res_type.clone();
                    let rty = right.res_type.clone();
                    self.equate(span, &lty, &rty)?;
                    self.equate(span, res_type, &lty)?;
                }
                Ok(())
            }
            _ => {
                let lang = op.lang_item();
                self.op_trait_dispatch(span, res_type, lang, left, Some(right))
            }
        }
    }

    /// Strip any number of borrows off a resolved type
    pub(crate) fn peel_borrows(&self, ty: &TypeRef) -> TypeRef {
        let mut t = self.resolved(ty);
        loop {
            match t {
                TypeRef::Borrow { inner, .. } => t = self.resolved(&inner),
                other => return other,
            }
        }
    }

    // ---- validation ----

    /// Final pass: resolve every node type in place; any remaining hole
    /// is fatal.
    pub(crate) fn validate(&self, node: &mut ExprNode) -> Result<(), TypeError> {
        let resolved = self.ivars.resolve_deep(&node.res_type);
        if resolved.contains_infer() {
            return Err(TypeError::CannotInfer {
                span: node.span.clone(),
                detail: format!("expression type is still `{resolved:?}`"),
            });
        }
        node.res_type = resolved;
        node.for_each_child_mut(&mut |child| self.validate(child))
    }
}

/// Infer one body to completion
pub(crate) fn infer_body(
    krate: &Crate,
    impls: &[ImplData],
    job: &BodyJob,
    body: &mut ExprNode,
) -> Result<(), TypeError> {
    let mut ctx = InferContext::new(krate, impls, job);
    let span = job.span.clone();

    // Phase 1: enumeration
    ctx.enumerate(body)?;
    for (pat, _) in &job.args {
        ctx.register_pattern_slots(pat);
    }
    log::debug!("inference: {} ivars allocated", ctx.ivars.len());

    // Phase 2: iteration to fixpoint
    let mut rounds = 0;
    loop {
        // Argument patterns re-seed each round (cheap, idempotent)
        for (pat, ty) in &job.args {
            ctx.apply_pattern_type(&span, pat, ty)?;
        }
        // The body's own value is the function result
        ctx.equate_coerce(&job.ret.clone(), body)?;
        ctx.visit(body)?;
        if !ctx.ivars.take_changed() {
            break;
        }
        rounds += 1;
        if rounds > MAX_ITERATIONS {
            return Err(TypeError::InferLoop { span });
        }
    }
    log::debug!("inference: fixpoint after {rounds} round(s)");

    // Phase 3: validation
    ctx.validate(body)
}
