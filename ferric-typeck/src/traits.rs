//! Trait-impl selection and associated-type expansion.

use crate::equality::{trait_path_key, type_path_key};
use crate::infer::InferContext;
use crate::TypeError;
use ferric_ast::types::slots;
use ferric_ast::{
    GenericBound, GenericParams, ImplItem, ItemPath, PathClass, Substitution, TypeRef,
};
use ferric_diagnostics::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MatchQuality {
    Exact,
    /// The target still contains inference holes; the match is
    /// provisional
    Fuzzy,
}

/// One impl that matched a trait query
#[derive(Debug, Clone)]
pub(crate) struct ImplMatch {
    pub impl_index: usize,
    pub subst: Substitution,
    pub quality: MatchQuality,
}

impl<'c> InferContext<'c> {
    /// Structurally match an impl's (generic-slotted) pattern type
    /// against a concrete target, capturing impl parameters.
    pub(crate) fn match_types(
        &self,
        pattern: &TypeRef,
        target: &TypeRef,
        params: &mut Vec<Option<TypeRef>>,
    ) -> Option<MatchQuality> {
        let target = self.resolved(target);
        if let TypeRef::Generic { slot, .. } = pattern {
            if slots::is_impl_level(*slot) {
                let idx = slots::index(*slot);
                if idx >= params.len() {
                    params.resize(idx + 1, None);
                }
                match &params[idx] {
                    Some(existing) if *existing != target => return None,
                    _ => params[idx] = Some(target.clone()),
                }
                return Some(if target.contains_infer() {
                    MatchQuality::Fuzzy
                } else {
                    MatchQuality::Exact
                });
            }
        }
        if target.is_infer() {
            return Some(MatchQuality::Fuzzy);
        }

        let merge = |a: MatchQuality, b: MatchQuality| {
            if a == MatchQuality::Fuzzy || b == MatchQuality::Fuzzy {
                MatchQuality::Fuzzy
            } else {
                MatchQuality::Exact
            }
        };
        match (pattern, &target) {
            (TypeRef::Primitive(a), TypeRef::Primitive(b)) => {
                (a == b).then_some(MatchQuality::Exact)
            }
            (TypeRef::Path(pp), TypeRef::Path(tp)) => {
                let (pk, tk) = (type_path_key(pp)?, type_path_key(tp)?);
                if pk != tk {
                    return None;
                }
                let pargs = pp.nodes().last().map(|n| n.args.as_slice()).unwrap_or(&[]);
                let targs = tp.nodes().last().map(|n| n.args.as_slice()).unwrap_or(&[]);
                if pargs.len() != targs.len() {
                    return None;
                }
                let mut quality = MatchQuality::Exact;
                for (p, t) in pargs.iter().zip(targs.iter()) {
                    quality = merge(quality, self.match_types(p, t, params)?);
                }
                Some(quality)
            }
            (TypeRef::Tuple(pa), TypeRef::Tuple(ta)) => {
                if pa.len() != ta.len() {
                    return None;
                }
                let mut quality = MatchQuality::Exact;
                for (p, t) in pa.iter().zip(ta.iter()) {
                    quality = merge(quality, self.match_types(p, t, params)?);
                }
                Some(quality)
            }
            (
                TypeRef::Borrow {
                    is_mut: pm,
                    inner: pi,
                },
                TypeRef::Borrow {
                    is_mut: tm,
                    inner: ti,
                },
            )
            | (
                TypeRef::Pointer {
                    is_mut: pm,
                    inner: pi,
                },
                TypeRef::Pointer {
                    is_mut: tm,
                    inner: ti,
                },
            ) => {
                if pm != tm {
                    return None;
                }
                self.match_types(pi, ti, params)
            }
            (
                TypeRef::Array { inner: pi, size: ps },
                TypeRef::Array { inner: ti, size: ts },
            ) => {
                if ps != ts {
                    return None;
                }
                self.match_types(pi, ti, params)
            }
            (TypeRef::Slice { inner: pi }, TypeRef::Slice { inner: ti }) => {
                self.match_types(pi, ti, params)
            }
            (TypeRef::Generic { slot: a, .. }, TypeRef::Generic { slot: b, .. }) => {
                (a == b).then_some(MatchQuality::Exact)
            }
            _ => None,
        }
    }

    /// Deterministic candidate order: exact before fuzzy, then by the
    /// rendering of the impl's self type. Never depends on the crate's
    /// impl-list iteration order.
    fn rank_candidates(&self, candidates: &mut Vec<ImplMatch>) {
        candidates.sort_by(|a, b| {
            let qa = matches!(a.quality, MatchQuality::Fuzzy) as u8;
            let qb = matches!(b.quality, MatchQuality::Fuzzy) as u8;
            qa.cmp(&qb).then_with(|| {
                let ra = format!("{:?}", self.impls[a.impl_index].imp.self_ty);
                let rb = format!("{:?}", self.impls[b.impl_index].imp.self_ty);
                ra.cmp(&rb)
            })
        });
    }

    /// All impls of `trait_path` whose self type (and, when requested,
    /// trait arguments) match, with their where-bounds verified.
    pub(crate) fn search_impls(
        &self,
        trait_path: &ItemPath,
        ty: &TypeRef,
        trait_args: &[TypeRef],
        depth: usize,
    ) -> Vec<ImplMatch> {
        let mut out = Vec::new();
        if depth == 0 {
            return out;
        }
        for (i, data) in self.impls.iter().enumerate() {
            let Some(tp) = &data.imp.trait_path else {
                continue;
            };
            if trait_path_key(tp).as_ref() != Some(trait_path) {
                continue;
            }
            let mut params = Vec::new();
            let Some(mut quality) = self.match_types(&data.imp.self_ty, ty, &mut params)
            else {
                continue;
            };
            // Trait-argument patterns participate in parameter capture
            if !trait_args.is_empty() {
                let impl_targs = tp.nodes().last().map(|n| n.args.as_slice()).unwrap_or(&[]);
                if impl_targs.len() != trait_args.len() {
                    continue;
                }
                let mut ok = true;
                for (pattern, target) in impl_targs.iter().zip(trait_args.iter()) {
                    match self.match_types(pattern, target, &mut params) {
                        Some(MatchQuality::Exact) => {}
                        Some(MatchQuality::Fuzzy) => quality = MatchQuality::Fuzzy,
                        None => {
                            ok = false;
                            break;
                        }
                    }
                }
                if !ok {
                    continue;
                }
            }
            let subst = Substitution::for_impl(
                Some(self.resolved(ty)),
                params
                    .into_iter()
                    .map(|p| {
                        p.unwrap_or(TypeRef::Infer {
                            index: None,
                            class: ferric_ast::InferClass::None,
                        })
                    })
                    .collect(),
            );
            if !self.where_bounds_hold(&data.imp.generics, &subst, depth - 1) {
                continue;
            }
            out.push(ImplMatch {
                impl_index: i,
                subst,
                quality,
            });
        }
        let mut ranked = out;
        self.rank_candidates(&mut ranked);
        ranked
    }

    /// Allocate fresh holes for any impl parameter the match left
    /// undetermined.
    pub(crate) fn instantiate_subst(&mut self, subst: &Substitution) -> Substitution {
        let mut out = subst.clone();
        for param in out.impl_params.iter_mut().chain(out.method_params.iter_mut()) {
            if matches!(param, TypeRef::Infer { index: None, .. }) {
                *param = self.fresh_hole(ferric_ast::InferClass::None);
            }
        }
        out
    }

    /// Check an impl's where clause under a substitution. Bounds that
    /// still mention unknowns pass provisionally.
    fn where_bounds_hold(
        &self,
        generics: &GenericParams,
        subst: &Substitution,
        depth: usize,
    ) -> bool {
        for bound in &generics.bounds {
            let GenericBound::TraitBound { ty, trait_path, .. } = bound else {
                continue;
            };
            let target = subst.apply(ty);
            if target.contains_infer() || target.contains_generic() {
                continue;
            }
            let Some(key) = trait_path_key(trait_path) else {
                continue;
            };
            if self.bound_in_scope(&key, &target) {
                continue;
            }
            let targs: Vec<TypeRef> = trait_path
                .nodes()
                .last()
                .map(|n| n.args.iter().map(|a| subst.apply(a)).collect())
                .unwrap_or_default();
            if self.search_impls(&key, &target, &targs, depth).is_empty() {
                return false;
            }
        }
        true
    }

    /// Is `ty: Trait` promised by the enclosing definition's bounds?
    pub(crate) fn bound_in_scope(&self, trait_path: &ItemPath, ty: &TypeRef) -> bool {
        let resolved = self.resolved(ty);
        self.impl_generics
            .bounds
            .iter()
            .chain(self.fn_generics.bounds.iter())
            .any(|bound| {
                let GenericBound::TraitBound {
                    ty: bty,
                    trait_path: btp,
                    ..
                } = bound
                else {
                    return false;
                };
                trait_path_key(btp).as_ref() == Some(trait_path) && *bty == resolved
            })
    }

    /// Whether any impl (or in-scope bound) provides `ty: Trait`
    pub(crate) fn trait_impl_exists(&self, trait_path: &ItemPath, ty: &TypeRef) -> bool {
        self.bound_in_scope(trait_path, ty)
            || !self
                .search_impls(trait_path, ty, &[], crate::infer::MAX_PROJECTION_DEPTH)
                .is_empty()
    }

    /// Reduce `<T as Trait>::Assoc` projections. Unresolvable
    /// projections return unchanged; the iteration loop retries them.
    pub(crate) fn expand_associated_types(
        &mut self,
        span: &Span,
        ty: &TypeRef,
        depth: usize,
    ) -> Result<TypeRef, TypeError> {
        if depth == 0 {
            return Err(TypeError::ProjectionDepth { span: span.clone() });
        }
        let ty = self.resolved(ty);
        let TypeRef::Path(path) = &ty else {
            return Ok(ty);
        };
        let PathClass::Ufcs {
            ty: self_ty,
            trait_path: Some(trait_path),
            nodes,
        } = &path.class
        else {
            return Ok(ty);
        };
        let Some(assoc_name) = nodes.first().map(|n| n.name.clone()) else {
            return Ok(ty);
        };
        let Some(trait_key) = trait_path_key(trait_path) else {
            return Ok(ty);
        };

        let inner = self.expand_associated_types(span, self_ty, depth - 1)?;
        if inner.is_infer() || inner.contains_generic() {
            // A direct equality bound may still decide it
            if let Some(rhs) = self.equality_bound_for(&trait_key, &assoc_name, &inner) {
                return self.expand_associated_types(span, &rhs, depth - 1);
            }
            return Ok(ty);
        }

        // Bounds first: `T: Trait<Assoc = U>` written as TypeEquality
        if let Some(rhs) = self.equality_bound_for(&trait_key, &assoc_name, &inner) {
            return self.expand_associated_types(span, &rhs, depth - 1);
        }

        // Then the crate's impls
        let trait_args: Vec<TypeRef> = trait_path
            .nodes()
            .last()
            .map(|n| n.args.clone())
            .unwrap_or_default();
        let candidates = self.search_impls(&trait_key, &inner, &trait_args, depth - 1);
        let Some(best) = candidates
            .iter()
            .find(|c| c.quality == MatchQuality::Exact)
            .cloned()
        else {
            return Ok(ty);
        };
        // The impl slice outlives the context; detach it so the item
        // reference doesn't pin `self`
        let impls = self.impls;
        let imp = &impls[best.impl_index].imp;
        let Some(item) = imp.item(&assoc_name) else {
            return Ok(ty);
        };
        let ImplItem::Type(def) = &item.item else {
            return Ok(ty);
        };
        let subst = self.instantiate_subst(&best.subst);
        let substituted = subst.apply(def);
        log::trace!(
            "projection <{inner:?} as {trait_key}>::{assoc_name} -> {substituted:?}"
        );
        self.expand_associated_types(span, &substituted, depth - 1)
    }

    /// Find a `TypeEquality` bound equating this projection with a type
    fn equality_bound_for(
        &self,
        trait_key: &ItemPath,
        assoc_name: &str,
        self_ty: &TypeRef,
    ) -> Option<TypeRef> {
        let resolved_self = self.resolved(self_ty);
        for bound in self
            .impl_generics
            .bounds
            .iter()
            .chain(self.fn_generics.bounds.iter())
        {
            let GenericBound::TypeEquality { ty, equals } = bound else {
                continue;
            };
            let TypeRef::Path(p) = ty else { continue };
            let PathClass::Ufcs {
                ty: bty,
                trait_path: Some(btp),
                nodes,
            } = &p.class
            else {
                continue;
            };
            if trait_path_key(btp).as_ref() != Some(trait_key) {
                continue;
            }
            if nodes.first().map(|n| n.name.as_str()) != Some(assoc_name) {
                continue;
            }
            if self.resolved(bty) == resolved_self {
                return Some(equals.clone());
            }
        }
        None
    }
}
