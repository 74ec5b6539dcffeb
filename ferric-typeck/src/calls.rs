//! Call-path resolution: function signatures, constructors, and field
//! access, monomorphised against the caller's type arguments.

use crate::equality::trait_path_key;
use crate::infer::{InferContext, MAX_PROJECTION_DEPTH};
use crate::traits::MatchQuality;
use crate::TypeError;
use ferric_ast::{
    ExprKind, ExprNode, Function, GenericParams, InferClass, Item, ItemPath, Path, PathClass,
    PathNode, StructKind, Substitution, TraitItem, TypeRef, ValueBinding, VariantKind,
};
use ferric_diagnostics::Span;

/// A monomorphised callable signature
#[derive(Debug, Clone)]
pub(crate) struct CallSig {
    pub params: Vec<TypeRef>,
    pub ret: TypeRef,
}

impl<'c> InferContext<'c> {
    /// Pad explicit type arguments with declared defaults, then fresh
    /// holes, up to the parameter count.
    pub(crate) fn fill_type_args(
        &mut self,
        generics: &GenericParams,
        explicit: &[TypeRef],
    ) -> Vec<TypeRef> {
        let mut args = explicit.to_vec();
        for param in generics.types.iter().skip(args.len()) {
            match &param.default {
                Some(d) => args.push(d.clone()),
                None => args.push(self.fresh_hole(InferClass::None)),
            }
        }
        args
    }

    /// A nominal type reference for an item, with the given arguments
    pub(crate) fn nominal_type(&self, ip: &ItemPath, args: Vec<TypeRef>) -> TypeRef {
        let mut nodes: Vec<PathNode> = ip.nodes.iter().map(|n| PathNode::new(n)).collect();
        if let Some(last) = nodes.last_mut() {
            last.args = args;
        }
        let mut path = Path::absolute(&ip.krate, nodes);
        // Preserve the binding so nominal identity survives comparison
        path.bindings.type_ns = match self.krate.item_at(ip).map(|e| &e.item) {
            Some(Item::Enum(_)) => ferric_ast::TypeBinding::Enum(ip.clone()),
            Some(Item::Union(_)) => ferric_ast::TypeBinding::Union(ip.clone()),
            _ => ferric_ast::TypeBinding::Struct(ip.clone()),
        };
        TypeRef::path(path)
    }

    /// Monomorphise a function item's signature
    pub(crate) fn function_sig(
        &mut self,
        f: &Function,
        explicit_args: &[TypeRef],
        self_ty: Option<TypeRef>,
        impl_params: Vec<TypeRef>,
    ) -> CallSig {
        let method_params = self.fill_type_args(&f.generics, explicit_args);
        let subst = Substitution {
            self_ty,
            impl_params,
            method_params,
        };
        CallSig {
            params: f.args.iter().map(|(_, t)| subst.apply(t)).collect(),
            ret: subst.apply(&f.ret),
        }
    }

    fn item_function(&self, ip: &ItemPath) -> Option<&'c Function> {
        let krate = self.krate;
        match &krate.item_at(ip)?.item {
            Item::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Signature of a bound call path: function, tuple-struct
    /// constructor, tuple-variant constructor, or UFCS item. `None`
    /// means "not decidable yet" and the iteration loop retries.
    pub(crate) fn resolve_call_sig(
        &mut self,
        span: &Span,
        path: &Path,
    ) -> Result<Option<CallSig>, TypeError> {
        let explicit: Vec<TypeRef> = path
            .nodes()
            .last()
            .map(|n| n.args.clone())
            .unwrap_or_default();
        match &path.bindings.value_ns {
            ValueBinding::Function(ip) => {
                let Some(f) = self.item_function(ip) else {
                    return Err(TypeError::Unexpected {
                        span: span.clone(),
                        detail: format!("dangling function path {ip}"),
                    });
                };
                Ok(Some(self.function_sig(f, &explicit, None, Vec::new())))
            }
            ValueBinding::Struct(ip) => {
                let ip = ip.clone();
                let krate = self.krate;
                let Some(entry) = krate.item_at(&ip) else {
                    return Err(TypeError::Unexpected {
                        span: span.clone(),
                        detail: format!("dangling struct path {ip}"),
                    });
                };
                let Item::Struct(def) = &entry.item else {
                    return Ok(None);
                };
                let args = self.fill_type_args(&def.generics, &explicit);
                let subst = Substitution::for_impl(None, args.clone());
                let params = match &def.kind {
                    StructKind::Tuple(fields) => fields
                        .iter()
                        .filter(|f| !f.ty.is_infer())
                        .map(|f| subst.apply(&f.ty))
                        .collect(),
                    _ => Vec::new(),
                };
                Ok(Some(CallSig {
                    params,
                    ret: self.nominal_type(&ip, args),
                }))
            }
            ValueBinding::EnumVariant(ip, idx) => {
                let ip = ip.clone();
                let idx = *idx;
                let krate = self.krate;
                let Some(entry) = krate.item_at(&ip) else {
                    return Err(TypeError::Unexpected {
                        span: span.clone(),
                        detail: format!("dangling enum path {ip}"),
                    });
                };
                let Item::Enum(def) = &entry.item else {
                    return Ok(None);
                };
                let args = self.fill_type_args(&def.generics, &explicit);
                let subst = Substitution::for_impl(None, args.clone());
                let params = match def.variants.get(idx).map(|v| &v.kind) {
                    Some(VariantKind::Tuple(fields)) => fields
                        .iter()
                        .filter(|f| !f.ty.is_infer())
                        .map(|f| subst.apply(&f.ty))
                        .collect(),
                    _ => Vec::new(),
                };
                Ok(Some(CallSig {
                    params,
                    ret: self.nominal_type(&ip, args),
                }))
            }
            ValueBinding::Unbound => {
                if let PathClass::Ufcs {
                    ty,
                    trait_path,
                    nodes,
                } = &path.class
                {
                    let name = nodes
                        .first()
                        .map(|n| n.name.clone())
                        .unwrap_or_default();
                    let ty = ty.as_ref().clone();
                    let trait_path = trait_path.as_deref().cloned();
                    self.resolve_ufcs_sig(span, &ty, trait_path.as_ref(), &name, &explicit)
                } else {
                    Ok(None)
                }
            }
            _ => Ok(None),
        }
    }

    /// Signature for `<T as Trait>::item` / `<T>::item`
    pub(crate) fn resolve_ufcs_sig(
        &mut self,
        span: &Span,
        self_ty: &TypeRef,
        trait_path: Option<&Path>,
        name: &str,
        explicit_args: &[TypeRef],
    ) -> Result<Option<CallSig>, TypeError> {
        let resolved_self = self.resolved(self_ty);
        match trait_path {
            Some(tp) => {
                let Some(trait_key) = trait_path_key(tp) else {
                    return Ok(None);
                };
                let trait_args: Vec<TypeRef> = tp
                    .nodes()
                    .last()
                    .map(|n| n.args.clone())
                    .unwrap_or_default();

                if !resolved_self.is_infer() {
                    let candidates = self.search_impls(
                        &trait_key,
                        &resolved_self,
                        &trait_args,
                        MAX_PROJECTION_DEPTH,
                    );
                    if let Some(best) = candidates
                        .iter()
                        .find(|c| c.quality == MatchQuality::Exact)
                        .cloned()
                    {
                        let impls = self.impls;
                        let imp = &impls[best.impl_index].imp;
                        if let Some(item) = imp.item(name) {
                            if let ferric_ast::ImplItem::Function(f) = &item.item {
                                let subst = self.instantiate_subst(&best.subst);
                                return Ok(Some(self.function_sig(
                                    f,
                                    explicit_args,
                                    Some(resolved_self.clone()),
                                    subst.impl_params,
                                )));
                            }
                        }
                    }
                }

                // Generic code: the bound promises the trait, so the
                // trait's own declaration supplies the signature
                if self.bound_in_scope(&trait_key, &resolved_self)
                    || resolved_self.contains_generic()
                {
                    let krate = self.krate;
                    if let Some(entry) = krate.item_at(&trait_key) {
                        if let Item::Trait(def) = &entry.item {
                            if let Some(item) = def.item(name) {
                                if let TraitItem::Function(f) = &item.item {
                                    return Ok(Some(self.function_sig(
                                        f,
                                        explicit_args,
                                        Some(resolved_self),
                                        trait_args,
                                    )));
                                }
                            }
                        }
                    }
                }
                Ok(None)
            }
            None => {
                if resolved_self.is_infer() {
                    return Ok(None);
                }
                // Inherent impls of the type
                let hit = self.find_inherent_fn(span, &resolved_self, name)?;
                match hit {
                    Some((f, impl_params)) => Ok(Some(self.function_sig(
                        &f,
                        explicit_args,
                        Some(resolved_self),
                        impl_params,
                    ))),
                    None => Ok(None),
                }
            }
        }
    }

    /// Search inherent impls for a function item; ambiguity between
    /// equally-exact candidates is fatal.
    pub(crate) fn find_inherent_fn(
        &mut self,
        span: &Span,
        ty: &TypeRef,
        name: &str,
    ) -> Result<Option<(Function, Vec<TypeRef>)>, TypeError> {
        let mut exact: Vec<(usize, Vec<Option<TypeRef>>)> = Vec::new();
        let mut fuzzy: Vec<(usize, Vec<Option<TypeRef>>)> = Vec::new();
        for (i, data) in self.impls.iter().enumerate() {
            if data.imp.trait_path.is_some() {
                continue;
            }
            let has_fn = matches!(
                data.imp.item(name).map(|it| &it.item),
                Some(ferric_ast::ImplItem::Function(_))
            );
            if !has_fn {
                continue;
            }
            let mut params = Vec::new();
            match self.match_types(&data.imp.self_ty, ty, &mut params) {
                Some(MatchQuality::Exact) => exact.push((i, params)),
                Some(MatchQuality::Fuzzy) => fuzzy.push((i, params)),
                None => {}
            }
        }
        if exact.len() > 1 {
            return Err(TypeError::AmbiguousMethod {
                span: span.clone(),
                name: name.to_string(),
            });
        }
        let Some((idx, params)) = exact.into_iter().next().or_else(|| fuzzy.into_iter().next())
        else {
            return Ok(None);
        };
        let impls = self.impls;
        let imp = &impls[idx].imp;
        let Some(item) = imp.item(name) else {
            return Ok(None);
        };
        let ferric_ast::ImplItem::Function(f) = &item.item else {
            return Ok(None);
        };
        let impl_params: Vec<TypeRef> = params
            .into_iter()
            .map(|p| p.unwrap_or_else(|| TypeRef::infer()))
            .collect();
        let subst = Substitution::for_impl(Some(ty.clone()), impl_params);
        let inst = self.instantiate_subst(&subst);
        Ok(Some((f.clone(), inst.impl_params)))
    }

    // ---- iteration rules that live on call shapes ----

    pub(crate) fn visit_call_path(
        &mut self,
        span: &Span,
        node: &mut ExprNode,
    ) -> Result<(), TypeError> {
        let res_type = node.res_type.clone();
        let ExprKind::CallPath { path, args, cache } = &mut node.kind else {
            return Ok(());
        };

        // A local holding a fn pointer: route through its value type
        if let ValueBinding::Variable(slot) = &path.bindings.value_ns {
            let local_ty = self.locals.get(slot).cloned();
            if let Some(local_ty) = local_ty {
                if let TypeRef::Function(sig) = self.resolved(&local_ty) {
                    if sig.args.len() != args.len() {
                        return Err(TypeError::ArgumentCount {
                            span: span.clone(),
                            expected: sig.args.len(),
                            found: args.len(),
                        });
                    }
                    for (arg, param) in args.iter_mut().zip(sig.args.iter()) {
                        self.equate_coerce(param, arg)?;
                    }
                    self.equate(span, &res_type, &sig.ret)?;
                }
            }
            return Ok(());
        }

        if cache.ret_type.is_none() {
            let path_snapshot = path.clone();
            if let Some(sig) = self.resolve_call_sig(span, &path_snapshot)? {
                cache.arg_types = sig.params;
                cache.ret_type = Some(sig.ret);
                self.ivars.mark_change();
            }
        }
        let Some(ret) = cache.ret_type.clone() else {
            return Ok(());
        };
        if cache.arg_types.len() != args.len() {
            return Err(TypeError::ArgumentCount {
                span: span.clone(),
                expected: cache.arg_types.len(),
                found: args.len(),
            });
        }
        let params = cache.arg_types.clone();
        for (arg, param) in args.iter_mut().zip(params.iter()) {
            self.equate_coerce(param, arg)?;
        }
        self.equate(span, &res_type, &ret)
    }

    pub(crate) fn visit_named_value(
        &mut self,
        span: &Span,
        res_type: &TypeRef,
        path: &mut Path,
    ) -> Result<(), TypeError> {
        match &path.bindings.value_ns {
            ValueBinding::Variable(slot) => {
                let local = self.locals.get(slot).cloned();
                if let Some(local) = local {
                    self.equate(span, res_type, &local)?;
                }
                Ok(())
            }
            ValueBinding::Generic(slot) => {
                use ferric_ast::types::slots;
                let idx = slots::index(*slot);
                let params = if slots::is_method_level(*slot) {
                    &self.fn_generics.consts
                } else {
                    &self.impl_generics.consts
                };
                let ty = params.get(idx).map(|p| p.ty.clone());
                if let Some(ty) = ty {
                    self.equate(span, res_type, &ty)?;
                }
                Ok(())
            }
            ValueBinding::Static(ip) => {
                let krate = self.krate;
                if let Some(entry) = krate.item_at(ip) {
                    if let Item::Static(s) = &entry.item {
                        let ty = s.ty.clone();
                        self.equate(span, res_type, &ty)?;
                    }
                }
                Ok(())
            }
            ValueBinding::Constant(ip) => {
                let krate = self.krate;
                if let Some(entry) = krate.item_at(ip) {
                    if let Item::Const(c) = &entry.item {
                        let ty = c.ty.clone();
                        self.equate(span, res_type, &ty)?;
                    }
                }
                Ok(())
            }
            ValueBinding::Function(_)
            | ValueBinding::Struct(_)
            | ValueBinding::EnumVariant(..) => {
                // These allocate holes; do it once
                if !self.resolved(res_type).is_infer() {
                    return Ok(());
                }
                let value_ty = self.named_value_type(span, path)?;
                if let Some(value_ty) = value_ty {
                    self.equate(span, res_type, &value_ty)?;
                }
                Ok(())
            }
            ValueBinding::Unbound => {
                if !self.resolved(res_type).is_infer() {
                    return Ok(());
                }
                if let PathClass::Ufcs {
                    ty,
                    trait_path,
                    nodes,
                } = &path.class
                {
                    let name = nodes.first().map(|n| n.name.clone()).unwrap_or_default();
                    let explicit: Vec<TypeRef> = nodes
                        .first()
                        .map(|n| n.args.clone())
                        .unwrap_or_default();
                    let ty = ty.as_ref().clone();
                    let tp = trait_path.as_deref().cloned();
                    if let Some(sig) =
                        self.resolve_ufcs_sig(span, &ty, tp.as_ref(), &name, &explicit)?
                    {
                        let fn_ty = TypeRef::Function(Box::new(ferric_ast::FunctionSig {
                            is_unsafe: false,
                            abi: "Rust".to_string(),
                            args: sig.params,
                            ret: sig.ret,
                        }));
                        self.equate(span, res_type, &fn_ty)?;
                    }
                }
                Ok(())
            }
        }
    }

    /// The value type of a path naming a function, constructor, or
    /// variant
    fn named_value_type(
        &mut self,
        span: &Span,
        path: &Path,
    ) -> Result<Option<TypeRef>, TypeError> {
        let explicit: Vec<TypeRef> = path
            .nodes()
            .last()
            .map(|n| n.args.clone())
            .unwrap_or_default();
        match &path.bindings.value_ns {
            ValueBinding::Function(ip) => {
                let Some(f) = self.item_function(ip) else {
                    return Ok(None);
                };
                let sig = self.function_sig(f, &explicit, None, Vec::new());
                Ok(Some(TypeRef::Function(Box::new(ferric_ast::FunctionSig {
                    is_unsafe: f.is_unsafe,
                    abi: f.abi.clone(),
                    args: sig.params,
                    ret: sig.ret,
                }))))
            }
            ValueBinding::Struct(ip) => {
                let ip = ip.clone();
                let krate = self.krate;
                let Some(entry) = krate.item_at(&ip) else {
                    return Ok(None);
                };
                let Item::Struct(def) = &entry.item else {
                    return Ok(None);
                };
                let args = self.fill_type_args(&def.generics, &explicit);
                match &def.kind {
                    StructKind::Unit => Ok(Some(self.nominal_type(&ip, args))),
                    StructKind::Tuple(_) => {
                        let sig = self.resolve_call_sig(span, path)?;
                        Ok(sig.map(|s| {
                            TypeRef::Function(Box::new(ferric_ast::FunctionSig {
                                is_unsafe: false,
                                abi: "Rust".to_string(),
                                args: s.params,
                                ret: s.ret,
                            }))
                        }))
                    }
                    StructKind::Named(_) => Err(TypeError::Unexpected {
                        span: span.clone(),
                        detail: "struct with named fields used as a value".to_string(),
                    }),
                }
            }
            ValueBinding::EnumVariant(ip, idx) => {
                let ip = ip.clone();
                let idx = *idx;
                let krate = self.krate;
                let Some(entry) = krate.item_at(&ip) else {
                    return Ok(None);
                };
                let Item::Enum(def) = &entry.item else {
                    return Ok(None);
                };
                let args = self.fill_type_args(&def.generics, &explicit);
                match def.variants.get(idx).map(|v| &v.kind) {
                    Some(VariantKind::Unit { .. }) => Ok(Some(self.nominal_type(&ip, args))),
                    Some(VariantKind::Tuple(_)) => {
                        let sig = self.resolve_call_sig(span, path)?;
                        Ok(sig.map(|s| {
                            TypeRef::Function(Box::new(ferric_ast::FunctionSig {
                                is_unsafe: false,
                                abi: "Rust".to_string(),
                                args: s.params,
                                ret: s.ret,
                            }))
                        }))
                    }
                    _ => Ok(None),
                }
            }
            _ => Ok(None),
        }
    }

    pub(crate) fn visit_struct_literal(
        &mut self,
        span: &Span,
        node: &mut ExprNode,
    ) -> Result<(), TypeError> {
        let res_type = node.res_type.clone();
        let ExprKind::StructLiteral { path, fields, base } = &mut node.kind else {
            return Ok(());
        };

        // Locate the definition and its generic arity
        let (ip, def_generics, field_list): (ItemPath, GenericParams, Vec<(String, TypeRef)>) =
            match (&path.bindings.type_ns, &path.bindings.value_ns) {
                (ferric_ast::TypeBinding::Struct(ip), _) => {
                    let krate = self.krate;
                    let Some(entry) = krate.item_at(ip) else {
                        return Ok(());
                    };
                    let Item::Struct(def) = &entry.item else {
                        return Ok(());
                    };
                    let fields = match &def.kind {
                        StructKind::Named(fs) => fs
                            .iter()
                            .filter(|f| !f.name.is_empty())
                            .map(|f| (f.name.clone(), f.ty.clone()))
                            .collect(),
                        StructKind::Unit => Vec::new(),
                        StructKind::Tuple(fs) => fs
                            .iter()
                            .enumerate()
                            .map(|(i, f)| (i.to_string(), f.ty.clone()))
                            .collect(),
                    };
                    (ip.clone(), def.generics.clone(), fields)
                }
                (ferric_ast::TypeBinding::EnumVariant(ip, idx), _)
                | (_, ValueBinding::EnumVariant(ip, idx)) => {
                    let krate = self.krate;
                    let Some(entry) = krate.item_at(ip) else {
                        return Ok(());
                    };
                    let Item::Enum(def) = &entry.item else {
                        return Ok(());
                    };
                    let fields = match def.variants.get(*idx).map(|v| &v.kind) {
                        Some(VariantKind::Struct(fs)) => fs
                            .iter()
                            .filter(|f| !f.name.is_empty())
                            .map(|f| (f.name.clone(), f.ty.clone()))
                            .collect(),
                        _ => Vec::new(),
                    };
                    (ip.clone(), def.generics.clone(), fields)
                }
                _ => return Ok(()),
            };

        // The literal's arguments: reuse the node's settled type when it
        // is already nominal, otherwise instantiate once
        let node_res = self.resolved(&res_type);
        let args: Vec<TypeRef> = match &node_res {
            TypeRef::Path(p) if crate::equality::type_path_key(p).as_ref() == Some(&ip) => p
                .nodes()
                .last()
                .map(|n| n.args.clone())
                .unwrap_or_default(),
            _ => {
                let explicit: Vec<TypeRef> = path
                    .nodes()
                    .last()
                    .map(|n| n.args.clone())
                    .unwrap_or_default();
                let args = self.fill_type_args(&def_generics, &explicit);
                let nominal = self.nominal_type(&ip, args.clone());
                self.equate(span, &res_type, &nominal)?;
                args
            }
        };

        let subst = Substitution::for_impl(None, args);
        for (name, expr) in fields.iter_mut() {
            let Some((_, fty)) = field_list.iter().find(|(fname, _)| fname == name) else {
                return Err(TypeError::NoField {
                    span: span.clone(),
                    ty: format!("{ip}"),
                    name: name.clone(),
                });
            };
            let expected = subst.apply(fty);
            self.equate_coerce(&expected, expr)?;
        }
        if let Some(b) = base {
            let bty = b.res_type.clone();
            self.equate(span, &res_type, &bty)?;
        }
        Ok(())
    }

    /// Field projection with auto-deref: returns the field type and how
    /// many derefs to insert. `None` when the receiver is not resolved
    /// far enough to decide.
    pub(crate) fn field_lookup(
        &mut self,
        span: &Span,
        recv: &TypeRef,
        name: &str,
    ) -> Result<Option<(TypeRef, usize)>, TypeError> {
        let mut t = self.resolved(recv);
        let mut derefs = 0;
        loop {
            match t {
                TypeRef::Borrow { inner, .. } => {
                    t = self.resolved(&inner);
                    derefs += 1;
                }
                other => {
                    t = other;
                    break;
                }
            }
        }
        if t.is_infer() {
            return Ok(None);
        }
        match &t {
            TypeRef::Tuple(elems) => {
                let idx: usize = name.parse().map_err(|_| TypeError::NoField {
                    span: span.clone(),
                    ty: format!("{t:?}"),
                    name: name.to_string(),
                })?;
                elems
                    .get(idx)
                    .cloned()
                    .map(|ty| Some((ty, derefs)))
                    .ok_or_else(|| TypeError::NoField {
                        span: span.clone(),
                        ty: format!("{t:?}"),
                        name: name.to_string(),
                    })
            }
            TypeRef::Path(p) => {
                let Some(ip) = crate::equality::type_path_key(p) else {
                    return Err(TypeError::NoField {
                        span: span.clone(),
                        ty: format!("{t:?}"),
                        name: name.to_string(),
                    });
                };
                let args: Vec<TypeRef> = p
                    .nodes()
                    .last()
                    .map(|n| n.args.clone())
                    .unwrap_or_default();
                let subst = Substitution::for_impl(None, args);
                let krate = self.krate;
                let field_ty = krate.item_at(&ip).and_then(|entry| match &entry.item {
                    Item::Struct(def) => match &def.kind {
                        StructKind::Named(fs) => fs
                            .iter()
                            .find(|f| f.name == name)
                            .map(|f| subst.apply(&f.ty)),
                        StructKind::Tuple(fs) => name
                            .parse::<usize>()
                            .ok()
                            .and_then(|i| fs.get(i))
                            .map(|f| subst.apply(&f.ty)),
                        StructKind::Unit => None,
                    },
                    Item::Union(def) => def
                        .fields
                        .iter()
                        .find(|f| f.name == name)
                        .map(|f| subst.apply(&f.ty)),
                    _ => None,
                });
                field_ty
                    .map(|ty| Some((ty, derefs)))
                    .ok_or_else(|| TypeError::NoField {
                        span: span.clone(),
                        ty: format!("{ip}"),
                        name: name.to_string(),
                    })
            }
            _ => Err(TypeError::NoField {
                span: span.clone(),
                ty: format!("{t:?}"),
                name: name.to_string(),
            }),
        }
    }
}
