//! Method lookup with auto-deref.

use crate::calls::CallSig;
use crate::equality::trait_path_key;
use crate::infer::{InferContext, MAX_PROJECTION_DEPTH};
use crate::traits::MatchQuality;
use crate::TypeError;
use ferric_ast::{
    ExprKind, ExprNode, GenericBound, InferClass, Item, ItemPath, Path, PathNode, TraitItem,
    TypeRef,
};
use ferric_diagnostics::Span;

/// A resolved method: the UFCS path to rewrite the call with, its
/// monomorphised signature, and how many derefs the receiver needs.
pub(crate) struct MethodHit {
    pub path: Path,
    pub sig: CallSig,
    pub deref_count: usize,
}

impl<'c> InferContext<'c> {
    /// Does this trait (or any super-trait, recursively) declare a
    /// method of the given name?
    fn trait_method(&self, trait_key: &ItemPath, name: &str, depth: usize) -> Option<(ItemPath, ferric_ast::Function)> {
        if depth == 0 {
            return None;
        }
        let krate = self.krate;
        let entry = krate.item_at(trait_key)?;
        let Item::Trait(def) = &entry.item else {
            return None;
        };
        if let Some(item) = def.item(name) {
            if let TraitItem::Function(f) = &item.item {
                return Some((trait_key.clone(), f.clone()));
            }
        }
        for sup in &def.supertraits {
            if let Some(key) = trait_path_key(sup) {
                if let Some(hit) = self.trait_method(&key, name, depth - 1) {
                    return Some(hit);
                }
            }
        }
        None
    }

    /// One auto-deref step of the lookup: bounds, then inherent impls,
    /// then trait impls.
    fn find_method_at(
        &mut self,
        span: &Span,
        ty: &TypeRef,
        name: &str,
        explicit_args: &[TypeRef],
    ) -> Result<Option<(Path, CallSig)>, TypeError> {
        // 1. Bounds in scope (including super-traits)
        let bounds: Vec<(TypeRef, Path)> = self
            .impl_generics
            .bounds
            .iter()
            .chain(self.fn_generics.bounds.iter())
            .filter_map(|b| match b {
                GenericBound::TraitBound { ty, trait_path, .. } => {
                    Some((ty.clone(), trait_path.clone()))
                }
                _ => None,
            })
            .collect();
        for (bty, btp) in bounds {
            if self.resolved(&bty) != self.resolved(ty) {
                continue;
            }
            let Some(bound_key) = trait_path_key(&btp) else {
                continue;
            };
            if let Some((owner_key, f)) = self.trait_method(&bound_key, name, MAX_PROJECTION_DEPTH)
            {
                let trait_args: Vec<TypeRef> = btp
                    .nodes()
                    .last()
                    .map(|n| n.args.clone())
                    .unwrap_or_default();
                // Arguments only carry over when the method comes from
                // the bound's own trait
                let impl_params = if owner_key == bound_key {
                    trait_args
                } else {
                    Vec::new()
                };
                let sig =
                    self.function_sig(&f, explicit_args, Some(ty.clone()), impl_params);
                let path = Path::ufcs(
                    ty.clone(),
                    Some(btp.clone()),
                    vec![PathNode::new(name)],
                );
                return Ok(Some((path, sig)));
            }
        }

        // 2. Inherent impls of the concrete type
        if let Some((f, impl_params)) = self.find_inherent_fn(span, ty, name)? {
            let sig = self.function_sig(&f, explicit_args, Some(ty.clone()), impl_params);
            let path = Path::ufcs(ty.clone(), None, vec![PathNode::new(name)]);
            return Ok(Some((path, sig)));
        }

        // 3. Trait impls whose trait declares the method
        let mut candidates: Vec<(usize, MatchQuality)> = Vec::new();
        for (i, data) in self.impls.iter().enumerate() {
            let Some(tp) = &data.imp.trait_path else {
                continue;
            };
            let Some(trait_key) = trait_path_key(tp) else {
                continue;
            };
            let provides = data.imp.item(name).is_some()
                || self.trait_method(&trait_key, name, MAX_PROJECTION_DEPTH).is_some();
            if !provides {
                continue;
            }
            let mut params = Vec::new();
            if let Some(q) = self.match_types(&data.imp.self_ty, ty, &mut params) {
                candidates.push((i, q));
            }
        }
        // Deterministic: exact first, then self-type rendering
        candidates.sort_by(|a, b| {
            let qa = matches!(a.1, MatchQuality::Fuzzy) as u8;
            let qb = matches!(b.1, MatchQuality::Fuzzy) as u8;
            qa.cmp(&qb).then_with(|| {
                let ra = format!("{:?}", self.impls[a.0].imp.self_ty);
                let rb = format!("{:?}", self.impls[b.0].imp.self_ty);
                ra.cmp(&rb)
            })
        });
        if let Some((idx, _)) = candidates.first().cloned() {
            let impls = self.impls;
            let data = &impls[idx];
            let tp = data.imp.trait_path.clone();
            let trait_key = tp.as_ref().and_then(trait_path_key);
            let mut params = Vec::new();
            self.match_types(&data.imp.self_ty, ty, &mut params);
            let impl_params: Vec<TypeRef> = params
                .into_iter()
                .map(|p| p.unwrap_or_else(TypeRef::infer))
                .collect();
            let subst = ferric_ast::Substitution::for_impl(Some(ty.clone()), impl_params);
            let inst = self.instantiate_subst(&subst);

            // Prefer the impl's own definition; fall back to a default
            // method on the trait
            let method = match data.imp.item(name).map(|it| &it.item) {
                Some(ferric_ast::ImplItem::Function(f)) => Some(f.clone()),
                _ => trait_key
                    .as_ref()
                    .and_then(|k| self.trait_method(k, name, MAX_PROJECTION_DEPTH))
                    .map(|(_, f)| f),
            };
            if let Some(f) = method {
                let sig =
                    self.function_sig(&f, explicit_args, Some(ty.clone()), inst.impl_params);
                let path = Path::ufcs(ty.clone(), tp, vec![PathNode::new(name)]);
                return Ok(Some((path, sig)));
            }
        }

        Ok(None)
    }

    /// The full auto-deref loop of `recv.name(...)` resolution
    pub(crate) fn autoderef_find_method(
        &mut self,
        span: &Span,
        recv_ty: &TypeRef,
        name: &str,
        explicit_args: &[TypeRef],
    ) -> Result<Option<MethodHit>, TypeError> {
        let mut t = self.resolved(recv_ty);
        let mut deref_count = 0;
        loop {
            if t.is_infer() {
                // Not enough information yet; retry next round
                return Ok(None);
            }
            if let Some((path, sig)) = self.find_method_at(span, &t, name, explicit_args)? {
                log::debug!("method {name} found at deref depth {deref_count}");
                return Ok(Some(MethodHit {
                    path,
                    sig,
                    deref_count,
                }));
            }
            match t {
                TypeRef::Borrow { inner, .. } => {
                    t = self.resolved(&inner);
                    deref_count += 1;
                }
                _ => return Ok(None),
            }
        }
    }

    /// The iteration rule for `recv.name(args)`: once the receiver type
    /// is known, rewrite the node into an explicit UFCS call with the
    /// counted derefs (and the auto-borrow the signature asks for).
    pub(crate) fn visit_call_method(
        &mut self,
        span: &Span,
        node: &mut ExprNode,
    ) -> Result<(), TypeError> {
        let ExprKind::CallMethod {
            receiver, method, ..
        } = &node.kind
        else {
            return Ok(());
        };
        let recv_ty = self.resolved(&receiver.res_type);
        if recv_ty.is_infer() {
            return Ok(());
        }
        let name = method.name.clone();
        let explicit_args = method.args.clone();

        let hit = self.autoderef_find_method(span, &recv_ty, &name, &explicit_args)?;
        let Some(hit) = hit else {
            // The receiver is known and nothing matched anywhere along
            // the deref chain
            if !recv_ty.contains_infer() {
                return Err(TypeError::NoMethod {
                    span: span.clone(),
                    ty: format!("{recv_ty:?}"),
                    name,
                });
            }
            return Ok(());
        };

        // Rebuild the node as a plain call: receiver (derefed, maybe
        // auto-borrowed), then the written arguments
        let ExprKind::CallMethod {
            receiver, args, ..
        } = std::mem::replace(&mut node.kind, ExprKind::Tuple(Vec::new()))
        else {
            return Ok(());
        };
        let mut recv = *receiver;
        for _ in 0..hit.deref_count {
            let span = recv.span.clone();
            let hole = self.fresh_hole(InferClass::None);
            recv = ExprNode {
                span,
                attrs: Vec::new(),
                kind: ExprKind::Deref {
                    inner: Box::new(recv),
                },
                res_type: hole,
            };
        }
        // Auto-borrow when the self parameter is a reference and the
        // receiver (post-deref) is not
        if let Some(TypeRef::Borrow { is_mut, .. }) =
            hit.sig.params.first().map(|p| self.resolved(p))
        {
            let recv_now = self.resolved(&recv.res_type);
            if !matches!(recv_now, TypeRef::Borrow { .. }) {
                let span = recv.span.clone();
                let hole = self.fresh_hole(InferClass::None);
                recv = ExprNode {
                    span,
                    attrs: Vec::new(),
                    kind: ExprKind::Borrow {
                        is_mut,
                        inner: Box::new(recv),
                    },
                    res_type: hole,
                };
            }
        }

        let mut call_args = vec![recv];
        call_args.extend(args);
        node.kind = ExprKind::CallPath {
            path: hit.path,
            args: call_args,
            cache: ferric_ast::CallCache {
                arg_types: hit.sig.params,
                ret_type: Some(hit.sig.ret),
            },
        };
        self.ivars.mark_change();
        Ok(())
    }
}
