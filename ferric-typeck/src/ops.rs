//! Operator dispatch through the lang-item traits.

use crate::infer::{InferContext, MAX_PROJECTION_DEPTH};
use crate::traits::MatchQuality;
use crate::TypeError;
use ferric_ast::{ExprNode, ImplItem, TypeRef};
use ferric_diagnostics::Span;

impl<'c> InferContext<'c> {
    /// Non-primitive operator resolution: find the impl of the
    /// operator's lang-item trait for the left type. Exact matches win;
    /// a single fuzzy match unifies its argument with the right operand.
    pub(crate) fn op_trait_dispatch(
        &mut self,
        span: &Span,
        res_type: &TypeRef,
        lang: &str,
        left: &mut ExprNode,
        right: Option<&mut ExprNode>,
    ) -> Result<(), TypeError> {
        // Once settled there is nothing left to do
        if !self.resolved(res_type).is_infer() {
            return Ok(());
        }
        let Some(trait_key) = self.krate.lang_item(lang).cloned() else {
            return Err(TypeError::BadOperator {
                span: span.clone(),
                op: lang.to_string(),
                ty: format!("{:?}", self.resolved(&left.res_type)),
            });
        };

        let lty = self.resolved(&left.res_type);
        if lty.is_infer() {
            return Ok(());
        }

        let candidates = self.search_impls(&trait_key, &lty, &[], MAX_PROJECTION_DEPTH);
        let exact: Vec<_> = candidates
            .iter()
            .filter(|c| c.quality == MatchQuality::Exact)
            .cloned()
            .collect();
        let fuzzy: Vec<_> = candidates
            .iter()
            .filter(|c| c.quality == MatchQuality::Fuzzy)
            .cloned()
            .collect();

        let chosen = match (exact.first(), fuzzy.as_slice()) {
            (Some(best), _) => best.clone(),
            (None, [single]) => single.clone(),
            (None, []) => {
                if lty.contains_infer() {
                    return Ok(());
                }
                return Err(TypeError::BadOperator {
                    span: span.clone(),
                    op: lang.to_string(),
                    ty: format!("{lty:?}"),
                });
            }
            (None, _) => {
                return Err(TypeError::AmbiguousMethod {
                    span: span.clone(),
                    name: lang.to_string(),
                })
            }
        };

        let impls = self.impls;
        let imp = &impls[chosen.impl_index].imp;
        let subst = self.instantiate_subst(&chosen.subst);

        // The trait's single argument pattern unifies with the right
        // operand
        if let Some(right) = right {
            let impl_trait_arg = imp
                .trait_path
                .as_ref()
                .and_then(|tp| tp.nodes().last())
                .and_then(|n| n.args.first())
                .map(|a| subst.apply(a));
            if let Some(expected) = impl_trait_arg {
                self.equate_coerce(&expected, right)?;
            } else {
                // Unparameterised operator trait: same-type operands
                let rty = right.res_type.clone();
                let lty2 = left.res_type.clone();
                self.equate(span, &lty2, &rty)?;
            }
        }

        // Result: the impl's Output definition when present, else the
        // method's return type
        let output = imp
            .item("Output")
            .and_then(|it| match &it.item {
                ImplItem::Type(ty) => Some(subst.apply(ty)),
                _ => None,
            })
            .or_else(|| {
                imp.items.iter().find_map(|it| match &it.item {
                    ImplItem::Function(f) => Some(subst.apply(&f.ret)),
                    _ => None,
                })
            });
        match output {
            Some(out) => self.equate(span, res_type, &out),
            None => {
                let lty2 = left.res_type.clone();
                self.equate(span, res_type, &lty2)
            }
        }
    }

    /// Comparison operators (`eq`/`ord` lang items): an impl for the
    /// left type must exist, and the trait's single argument unifies
    /// with the right operand - `PartialEq<Rhs>` with `Rhs != Self` is
    /// legal. The caller forces the result to bool; the impl's Output
    /// (`Option<Ordering>` for `ord`) never reaches the node type.
    pub(crate) fn cmp_trait_dispatch(
        &mut self,
        span: &Span,
        lang: &str,
        lty: &TypeRef,
        right: &mut ExprNode,
    ) -> Result<(), TypeError> {
        let Some(trait_key) = self.krate.lang_item(lang).cloned() else {
            return Err(TypeError::BadOperator {
                span: span.clone(),
                op: lang.to_string(),
                ty: format!("{lty:?}"),
            });
        };
        // Generic code: an in-scope bound promises the comparison
        if self.bound_in_scope(&trait_key, lty) {
            return Ok(());
        }

        let candidates = self.search_impls(&trait_key, lty, &[], MAX_PROJECTION_DEPTH);
        let exact: Vec<_> = candidates
            .iter()
            .filter(|c| c.quality == MatchQuality::Exact)
            .cloned()
            .collect();
        let fuzzy: Vec<_> = candidates
            .iter()
            .filter(|c| c.quality == MatchQuality::Fuzzy)
            .cloned()
            .collect();
        let chosen = match (exact.first(), fuzzy.as_slice()) {
            (Some(best), _) => best.clone(),
            (None, [single]) => single.clone(),
            (None, []) => {
                if lty.contains_infer() {
                    // Not enough information yet; retry next round
                    return Ok(());
                }
                return Err(TypeError::BadOperator {
                    span: span.clone(),
                    op: lang.to_string(),
                    ty: format!("{lty:?}"),
                });
            }
            (None, _) => {
                return Err(TypeError::AmbiguousMethod {
                    span: span.clone(),
                    name: lang.to_string(),
                })
            }
        };

        let impls = self.impls;
        let imp = &impls[chosen.impl_index].imp;
        let impl_trait_arg = imp
            .trait_path
            .as_ref()
            .and_then(|tp| tp.nodes().last())
            .and_then(|n| n.args.first())
            .map(|a| chosen.subst.apply(a));
        match impl_trait_arg {
            // Only unify when the match pinned the argument down; an
            // undetermined impl parameter must not allocate per round
            Some(expected) if !has_placeholder(&expected) => {
                self.equate_coerce(&expected, right)?;
            }
            Some(_) => {}
            None => {
                // Unparameterised comparison trait: same-type operands
                let rty = right.res_type.clone();
                self.equate(span, lty, &rty)?;
            }
        }
        Ok(())
    }
}

/// Whether a type still contains unallocated inference holes (impl
/// parameters the match left open)
fn has_placeholder(ty: &TypeRef) -> bool {
    let mut found = false;
    ty.visit(&mut |t| {
        if matches!(t, TypeRef::Infer { index: None, .. }) {
            found = true;
        }
    });
    found
}
