//! Unification with coercion insertion.

use crate::infer::{InferContext, MAX_PROJECTION_DEPTH};
use crate::TypeError;
use ferric_ast::{ExprKind, ExprNode, PathClass, TypeRef};
use ferric_diagnostics::Span;

impl<'c> InferContext<'c> {
    /// Plain equality: no expression node, so no coercions
    pub(crate) fn equate(
        &mut self,
        span: &Span,
        left: &TypeRef,
        right: &TypeRef,
    ) -> Result<(), TypeError> {
        self.apply_equality(span, left, right, None)
    }

    /// Expected type against an expression's type; permitted coercions
    /// wrap the node
    pub(crate) fn equate_coerce(
        &mut self,
        expected: &TypeRef,
        node: &mut ExprNode,
    ) -> Result<(), TypeError> {
        let span = node.span.clone();
        let actual = node.res_type.clone();
        self.apply_equality(&span, expected, &actual, Some(node))
    }

    /// Replace the node with a coercion wrapper around itself. The old
    /// node keeps its un-coerced type; the wrapper carries the target.
    fn wrap_coercion(&mut self, node: &mut ExprNode, target: &TypeRef, unsize: bool) {
        let span = node.span.clone();
        let inner = std::mem::replace(node, ExprNode::unit());
        let kind = if unsize {
            ExprKind::Unsize {
                inner: Box::new(inner),
                ty: target.clone(),
            }
        } else {
            ExprKind::Cast {
                inner: Box::new(inner),
                ty: target.clone(),
            }
        };
        *node = ExprNode {
            span,
            attrs: Vec::new(),
            kind,
            res_type: target.clone(),
        };
        self.ivars.mark_change();
    }

    /// The unification core. `left` is the expected side; when `node` is
    /// supplied it is the expression whose type is `right`, eligible for
    /// coercion wrapping.
    pub(crate) fn apply_equality(
        &mut self,
        span: &Span,
        left: &TypeRef,
        right: &TypeRef,
        node: Option<&mut ExprNode>,
    ) -> Result<(), TypeError> {
        let l0 = self.resolved(left);
        let r0 = self.resolved(right);
        // Projections reduce before comparison
        let l = self.expand_associated_types(span, &l0, MAX_PROJECTION_DEPTH)?;
        let r = self.expand_associated_types(span, &r0, MAX_PROJECTION_DEPTH)?;

        // Unreduced projections cannot be decided yet; the iteration
        // loop retries once more ivars land
        if is_projection(&l) || is_projection(&r) {
            if let (Some(lk), Some(rk)) = (projection_key(&l), projection_key(&r)) {
                if lk == rk {
                    if let (
                        TypeRef::Path(lp),
                        TypeRef::Path(rp),
                    ) = (&l, &r)
                    {
                        if let (
                            PathClass::Ufcs { ty: lt, .. },
                            PathClass::Ufcs { ty: rt, .. },
                        ) = (&lp.class, &rp.class)
                        {
                            return self.apply_equality(span, lt, rt, None);
                        }
                    }
                }
            }
            return Ok(());
        }

        match (&l, &r) {
            (
                TypeRef::Infer { index: Some(a), .. },
                TypeRef::Infer { index: Some(b), .. },
            ) => self.ivars.unify_ivars(span, *a, *b),
            (TypeRef::Infer { index: Some(a), .. }, other) => {
                self.ivars.bind(span, *a, other.clone())
            }
            (other, TypeRef::Infer { index: Some(b), .. }) => {
                self.ivars.bind(span, *b, other.clone())
            }
            (TypeRef::Infer { index: None, .. }, _) | (_, TypeRef::Infer { index: None, .. }) => {
                Err(TypeError::Unexpected {
                    span: span.clone(),
                    detail: "unallocated inference hole".to_string(),
                })
            }
            // A diverging value satisfies any expectation
            (TypeRef::Diverge, _) | (_, TypeRef::Diverge) => Ok(()),

            (TypeRef::Primitive(a), TypeRef::Primitive(b)) => {
                if a == b {
                    Ok(())
                } else {
                    Err(self.mismatch(span, &l, &r))
                }
            }
            (
                TypeRef::Generic { slot: a, .. },
                TypeRef::Generic { slot: b, .. },
            ) => {
                if a == b {
                    Ok(())
                } else {
                    Err(self.mismatch(span, &l, &r))
                }
            }
            (TypeRef::Path(lp), TypeRef::Path(rp)) => {
                let (Some(lk), Some(rk)) = (type_path_key(lp), type_path_key(rp)) else {
                    return Ok(());
                };
                if lk != rk {
                    return Err(self.mismatch(span, &l, &r));
                }
                // Same nominal type: its argument lists unify pairwise
                let largs = lp.nodes().last().map(|n| n.args.clone()).unwrap_or_default();
                let rargs = rp.nodes().last().map(|n| n.args.clone()).unwrap_or_default();
                if largs.len() != rargs.len() {
                    return Err(self.mismatch(span, &l, &r));
                }
                for (la, ra) in largs.iter().zip(rargs.iter()) {
                    self.apply_equality(span, la, ra, None)?;
                }
                Ok(())
            }
            (TypeRef::Tuple(la), TypeRef::Tuple(ra)) => {
                if la.len() != ra.len() {
                    return Err(self.mismatch(span, &l, &r));
                }
                for (a, b) in la.iter().zip(ra.iter()) {
                    self.apply_equality(span, a, b, None)?;
                }
                Ok(())
            }
            (
                TypeRef::Array { inner: li, size: ls },
                TypeRef::Array { inner: ri, size: rs },
            ) => {
                if ls != rs {
                    return Err(self.mismatch(span, &l, &r));
                }
                self.apply_equality(span, li, ri, None)
            }
            (TypeRef::Slice { inner: li }, TypeRef::Slice { inner: ri }) => {
                self.apply_equality(span, li, ri, None)
            }
            (
                TypeRef::Borrow {
                    is_mut: lm,
                    inner: li,
                },
                TypeRef::Borrow {
                    is_mut: rm,
                    inner: ri,
                },
            ) => {
                if lm == rm {
                    // Matching mutability still allows unsizing inside
                    self.borrow_equality(span, li, ri, node)
                } else if !*lm && *rm {
                    // Reborrow `&mut T` as `&T` - permitted with an
                    // expression to attach it to
                    if node.is_some() {
                        self.apply_equality(span, li, ri, None)
                    } else {
                        Err(self.mismatch(span, &l, &r))
                    }
                } else {
                    Err(self.mismatch(span, &l, &r))
                }
            }
            (
                TypeRef::Pointer {
                    is_mut: lm,
                    inner: li,
                },
                TypeRef::Pointer {
                    is_mut: rm,
                    inner: ri,
                },
            ) => {
                if lm == rm {
                    self.apply_equality(span, li, ri, None)
                } else {
                    Err(self.mismatch(span, &l, &r))
                }
            }
            // `&T` / `&mut T` coerce to raw pointers of matching shape
            (
                TypeRef::Pointer {
                    is_mut: lm,
                    inner: li,
                },
                TypeRef::Borrow {
                    is_mut: rm,
                    inner: ri,
                },
            ) => {
                if *lm && !*rm {
                    return Err(self.mismatch(span, &l, &r));
                }
                match node {
                    Some(n) => {
                        self.apply_equality(span, li, ri, None)?;
                        self.wrap_coercion(n, &l, false);
                        Ok(())
                    }
                    None => Err(self.mismatch(span, &l, &r)),
                }
            }
            (TypeRef::Function(ls), TypeRef::Function(rs)) => {
                if ls.args.len() != rs.args.len() {
                    return Err(self.mismatch(span, &l, &r));
                }
                for (a, b) in ls.args.iter().zip(rs.args.iter()) {
                    self.apply_equality(span, a, b, None)?;
                }
                self.apply_equality(span, &ls.ret, &rs.ret, None)
            }
            (TypeRef::TraitObject { traits: lt, .. }, TypeRef::TraitObject { traits: rt, .. }) => {
                let lkeys: Vec<_> = lt.iter().filter_map(trait_path_key).collect();
                let rkeys: Vec<_> = rt.iter().filter_map(trait_path_key).collect();
                if lkeys == rkeys {
                    Ok(())
                } else {
                    Err(self.mismatch(span, &l, &r))
                }
            }
            (
                TypeRef::Closure { node_id: la, .. },
                TypeRef::Closure { node_id: ra, .. },
            ) => {
                if la == ra {
                    Ok(())
                } else {
                    Err(self.mismatch(span, &l, &r))
                }
            }
            _ => Err(self.mismatch(span, &l, &r)),
        }
    }

    /// Equality under one matching borrow: where `&U` is expected and
    /// `&T` supplied, the unsizing coercions apply to the pointee.
    fn borrow_equality(
        &mut self,
        span: &Span,
        expected_inner: &TypeRef,
        actual_inner: &TypeRef,
        node: Option<&mut ExprNode>,
    ) -> Result<(), TypeError> {
        let exp = self.resolved(expected_inner);
        let act = self.resolved(actual_inner);
        match (&exp, &act) {
            // `&[T; N]` to `&[T]`
            (TypeRef::Slice { inner: si }, TypeRef::Array { inner: ai, .. }) => {
                if let Some(n) = node {
                    self.apply_equality(span, si, ai, None)?;
                    let target = TypeRef::borrow(exp.clone());
                    self.wrap_coercion(n, &target, true);
                    return Ok(());
                }
                Err(self.mismatch(span, &exp, &act))
            }
            // `&T` to `&dyn Trait` when an impl of the trait exists
            (TypeRef::TraitObject { traits, .. }, concrete)
                if !matches!(concrete, TypeRef::TraitObject { .. })
                    && !concrete.is_infer() =>
            {
                if let Some(n) = node {
                    let satisfied = traits.iter().all(|tp| {
                        trait_path_key(tp)
                            .map(|key| self.trait_impl_exists(&key, concrete))
                            .unwrap_or(false)
                    });
                    if satisfied {
                        let target = TypeRef::borrow(exp.clone());
                        self.wrap_coercion(n, &target, true);
                        return Ok(());
                    }
                }
                Err(self.mismatch(span, &exp, &act))
            }
            _ => self.apply_equality(span, &exp, &act, None),
        }
    }

    pub(crate) fn mismatch(&self, span: &Span, left: &TypeRef, right: &TypeRef) -> TypeError {
        TypeError::Mismatch {
            span: span.clone(),
            left: format!("{left:?}"),
            right: format!("{right:?}"),
        }
    }
}

/// Whether a type is an unreduced associated-type projection
pub(crate) fn is_projection(ty: &TypeRef) -> bool {
    matches!(
        ty,
        TypeRef::Path(p) if matches!(p.class, PathClass::Ufcs { trait_path: Some(_), .. })
    )
}

/// (trait item path, associated item name) identifying a projection
fn projection_key(ty: &TypeRef) -> Option<(ferric_ast::ItemPath, String)> {
    let TypeRef::Path(p) = ty else { return None };
    let PathClass::Ufcs {
        trait_path: Some(tp),
        nodes,
        ..
    } = &p.class
    else {
        return None;
    };
    let trait_key = trait_path_key(tp)?;
    Some((trait_key, nodes.first()?.name.clone()))
}

/// The nominal identity of a path type
pub(crate) fn type_path_key(path: &ferric_ast::Path) -> Option<ferric_ast::ItemPath> {
    path.bindings
        .type_ns
        .item_path()
        .cloned()
        .or_else(|| path.as_item_path())
}

/// The item a trait path refers to
pub(crate) fn trait_path_key(path: &ferric_ast::Path) -> Option<ferric_ast::ItemPath> {
    match &path.bindings.type_ns {
        ferric_ast::TypeBinding::Trait(p) => Some(p.clone()),
        _ => path.as_item_path(),
    }
}
