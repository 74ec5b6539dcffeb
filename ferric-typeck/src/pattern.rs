//! Pattern typing: deconstruct the scrutinee type through the pattern,
//! constraining every binding slot along the way.

use crate::equality::type_path_key;
use crate::infer::InferContext;
use crate::TypeError;
use ferric_ast::{
    BindingMode, InferClass, Item, ItemPath, Pattern, PatternKind, PatternValue, StructKind,
    Substitution, TypeBinding, TypeRef, ValueBinding, VariantKind,
};
use ferric_diagnostics::Span;

impl<'c> InferContext<'c> {
    /// Constrain a type to a literal class (integer/float) without
    /// naming a primitive.
    fn equate_class(&mut self, span: &Span, ty: &TypeRef, class: InferClass) -> Result<(), TypeError> {
        let resolved = self.resolved(ty);
        match &resolved {
            TypeRef::Infer {
                index: Some(idx), ..
            } => {
                // Already constrained: re-running must not re-allocate
                if self.ivars.class_of(*idx) == class {
                    return Ok(());
                }
                let hole = self.fresh_hole(class);
                self.equate(span, &resolved, &hole)
            }
            TypeRef::Primitive(ct) => {
                let ok = match class {
                    InferClass::None => true,
                    InferClass::Integer => ct.is_integer(),
                    InferClass::Float => ct.is_float(),
                };
                if ok {
                    Ok(())
                } else {
                    Err(TypeError::Mismatch {
                        span: span.clone(),
                        left: format!("{{{class:?} literal}}"),
                        right: ct.to_string(),
                    })
                }
            }
            _ => Ok(()),
        }
    }

    /// The enum/struct behind a pattern path, with the scrutinee's
    /// argument list (reusing settled arguments for idempotence).
    fn nominal_args_for(
        &mut self,
        span: &Span,
        ip: &ItemPath,
        generics_len: usize,
        scrutinee: &TypeRef,
    ) -> Result<Vec<TypeRef>, TypeError> {
        let resolved = self.resolved(scrutinee);
        if let TypeRef::Path(p) = &resolved {
            if type_path_key(p).as_ref() == Some(ip) {
                return Ok(p
                    .nodes()
                    .last()
                    .map(|n| n.args.clone())
                    .unwrap_or_default());
            }
        }
        if resolved.is_infer() {
            let args: Vec<TypeRef> = (0..generics_len)
                .map(|_| self.fresh_hole(InferClass::None))
                .collect();
            let nominal = self.nominal_type(ip, args.clone());
            self.equate(span, scrutinee, &nominal)?;
            return Ok(args);
        }
        Err(TypeError::Mismatch {
            span: span.clone(),
            left: format!("{ip}"),
            right: format!("{resolved:?}"),
        })
    }

    /// Apply one pattern against the scrutinee type
    pub(crate) fn apply_pattern_type(
        &mut self,
        span: &Span,
        pat: &Pattern,
        ty: &TypeRef,
    ) -> Result<(), TypeError> {
        if let Some(binding) = &pat.binding {
            if let Some(slot) = binding.slot {
                let local = self.locals.get(&slot).cloned();
                if let Some(local) = local {
                    let bound_ty = match binding.mode {
                        BindingMode::Move => ty.clone(),
                        BindingMode::Ref => TypeRef::borrow(ty.clone()),
                        BindingMode::RefMut => TypeRef::borrow_mut(ty.clone()),
                    };
                    self.equate(span, &local, &bound_ty)?;
                }
            }
        }

        match &pat.kind {
            PatternKind::Any => Ok(()),
            PatternKind::MaybeBind { .. } => Err(TypeError::Unexpected {
                span: span.clone(),
                detail: "unresolved MaybeBind pattern".to_string(),
            }),
            PatternKind::Value { value } => self.apply_pattern_value(span, value, ty),
            PatternKind::Range { start, end } => {
                self.apply_pattern_value(span, start, ty)?;
                self.apply_pattern_value(span, end, ty)
            }
            PatternKind::Tuple(pats) => {
                let resolved = self.resolved(ty);
                let elems = match &resolved {
                    TypeRef::Tuple(elems) => elems.clone(),
                    TypeRef::Infer { .. } => {
                        let elems: Vec<TypeRef> = (0..pats.len())
                            .map(|_| self.fresh_hole(InferClass::None))
                            .collect();
                        let tuple = TypeRef::Tuple(elems.clone());
                        self.equate(span, ty, &tuple)?;
                        elems
                    }
                    other => {
                        return Err(TypeError::Mismatch {
                            span: span.clone(),
                            left: "tuple pattern".to_string(),
                            right: format!("{other:?}"),
                        })
                    }
                };
                if elems.len() != pats.len() {
                    return Err(TypeError::Mismatch {
                        span: span.clone(),
                        left: format!("{}-element tuple pattern", pats.len()),
                        right: format!("{}-element tuple", elems.len()),
                    });
                }
                for (p, e) in pats.iter().zip(elems.iter()) {
                    self.apply_pattern_type(span, p, e)?;
                }
                Ok(())
            }
            PatternKind::StructTuple { path, elems } => {
                match &path.bindings.value_ns {
                    ValueBinding::EnumVariant(ip, idx) => {
                        let ip = ip.clone();
                        let idx = *idx;
                        let krate = self.krate;
                        let Some(Item::Enum(def)) =
                            krate.item_at(&ip).map(|e| &e.item)
                        else {
                            return Ok(());
                        };
                        let generics_len = def.generics.types.len();
                        let field_tys: Vec<TypeRef> =
                            match def.variants.get(idx).map(|v| &v.kind) {
                                Some(VariantKind::Tuple(fs)) => fs
                                    .iter()
                                    .filter(|f| !f.ty.is_infer())
                                    .map(|f| f.ty.clone())
                                    .collect(),
                                _ => Vec::new(),
                            };
                        let args = self.nominal_args_for(span, &ip, generics_len, ty)?;
                        let subst = Substitution::for_impl(None, args);
                        for (p, fty) in elems.iter().zip(field_tys.iter()) {
                            self.apply_pattern_type(span, p, &subst.apply(fty))?;
                        }
                        Ok(())
                    }
                    ValueBinding::Struct(ip) => {
                        let ip = ip.clone();
                        let krate = self.krate;
                        let Some(Item::Struct(def)) =
                            krate.item_at(&ip).map(|e| &e.item)
                        else {
                            return Ok(());
                        };
                        let generics_len = def.generics.types.len();
                        let field_tys: Vec<TypeRef> = match &def.kind {
                            StructKind::Tuple(fs) => fs
                                .iter()
                                .filter(|f| !f.ty.is_infer())
                                .map(|f| f.ty.clone())
                                .collect(),
                            _ => Vec::new(),
                        };
                        let args = self.nominal_args_for(span, &ip, generics_len, ty)?;
                        let subst = Substitution::for_impl(None, args);
                        for (p, fty) in elems.iter().zip(field_tys.iter()) {
                            self.apply_pattern_type(span, p, &subst.apply(fty))?;
                        }
                        Ok(())
                    }
                    _ => Ok(()),
                }
            }
            PatternKind::Struct { path, fields, .. } => {
                let (ip, generics_len, field_list): (ItemPath, usize, Vec<(String, TypeRef)>) =
                    match (&path.bindings.type_ns, &path.bindings.value_ns) {
                        (TypeBinding::Struct(ip), _) => {
                            let krate = self.krate;
                            let Some(Item::Struct(def)) =
                                krate.item_at(ip).map(|e| &e.item)
                            else {
                                return Ok(());
                            };
                            let fs = match &def.kind {
                                StructKind::Named(fs) => fs
                                    .iter()
                                    .filter(|f| !f.name.is_empty())
                                    .map(|f| (f.name.clone(), f.ty.clone()))
                                    .collect(),
                                _ => Vec::new(),
                            };
                            (ip.clone(), def.generics.types.len(), fs)
                        }
                        (TypeBinding::EnumVariant(ip, idx), _)
                        | (_, ValueBinding::EnumVariant(ip, idx)) => {
                            let krate = self.krate;
                            let Some(Item::Enum(def)) =
                                krate.item_at(ip).map(|e| &e.item)
                            else {
                                return Ok(());
                            };
                            let fs = match def.variants.get(*idx).map(|v| &v.kind) {
                                Some(VariantKind::Struct(fs)) => fs
                                    .iter()
                                    .filter(|f| !f.name.is_empty())
                                    .map(|f| (f.name.clone(), f.ty.clone()))
                                    .collect(),
                                _ => Vec::new(),
                            };
                            (ip.clone(), def.generics.types.len(), fs)
                        }
                        _ => return Ok(()),
                    };
                let args = self.nominal_args_for(span, &ip, generics_len, ty)?;
                let subst = Substitution::for_impl(None, args);
                for (fname, p) in fields {
                    if let Some((_, fty)) = field_list.iter().find(|(n, _)| n == fname) {
                        self.apply_pattern_type(span, p, &subst.apply(fty))?;
                    }
                }
                Ok(())
            }
            PatternKind::Slice(pats) => {
                let resolved = self.resolved(ty);
                let elem = match self.peel_borrows(&resolved) {
                    TypeRef::Array { inner, .. } | TypeRef::Slice { inner } => Some(*inner),
                    _ => None,
                };
                if let Some(elem) = elem {
                    for p in pats {
                        self.apply_pattern_type(span, p, &elem)?;
                    }
                }
                Ok(())
            }
            PatternKind::SplitSlice {
                leading,
                middle,
                trailing,
            } => {
                let resolved = self.resolved(ty);
                let elem = match self.peel_borrows(&resolved) {
                    TypeRef::Array { inner, .. } | TypeRef::Slice { inner } => Some(*inner),
                    _ => None,
                };
                if let Some(elem) = elem {
                    for p in leading.iter().chain(trailing.iter()) {
                        self.apply_pattern_type(span, p, &elem)?;
                    }
                    if let Some(binding) = middle {
                        if let Some(slot) = binding.slot {
                            let local = self.locals.get(&slot).cloned();
                            if let Some(local) = local {
                                let sub = TypeRef::borrow(TypeRef::Slice {
                                    inner: Box::new(elem),
                                });
                                self.equate(span, &local, &sub)?;
                            }
                        }
                    }
                }
                Ok(())
            }
            PatternKind::Or(alts) => {
                for p in alts {
                    self.apply_pattern_type(span, p, ty)?;
                }
                Ok(())
            }
            PatternKind::Ref { inner, .. } => {
                let resolved = self.resolved(ty);
                match resolved {
                    TypeRef::Borrow { inner: pointee, .. } => {
                        self.apply_pattern_type(span, inner, &pointee)
                    }
                    TypeRef::Infer { .. } => {
                        let hole = self.fresh_hole(InferClass::None);
                        let borrow = TypeRef::borrow(hole.clone());
                        self.equate(span, ty, &borrow)?;
                        self.apply_pattern_type(span, inner, &hole)
                    }
                    other => Err(TypeError::Mismatch {
                        span: span.clone(),
                        left: "reference pattern".to_string(),
                        right: format!("{other:?}"),
                    }),
                }
            }
            PatternKind::Box_ { inner } => {
                // Box internals are the library's business; the pointee
                // type flows through untouched when it is known
                let _ = inner;
                Ok(())
            }
        }
    }

    fn apply_pattern_value(
        &mut self,
        span: &Span,
        value: &PatternValue,
        ty: &TypeRef,
    ) -> Result<(), TypeError> {
        match value {
            PatternValue::Integer(_) => self.equate_class(span, ty, InferClass::Integer),
            PatternValue::Float(_) => self.equate_class(span, ty, InferClass::Float),
            PatternValue::Bool(_) => self.equate(
                span,
                ty,
                &TypeRef::Primitive(ferric_ast::CoreType::Bool),
            ),
            PatternValue::Char(_) => self.equate(
                span,
                ty,
                &TypeRef::Primitive(ferric_ast::CoreType::Char),
            ),
            PatternValue::Str(_) => self.equate(
                span,
                ty,
                &TypeRef::borrow(TypeRef::Primitive(ferric_ast::CoreType::Str)),
            ),
            PatternValue::ByteStr(bytes) => self.equate(
                span,
                ty,
                &TypeRef::borrow(TypeRef::Array {
                    inner: Box::new(TypeRef::Primitive(ferric_ast::CoreType::U8)),
                    size: bytes.len() as u64,
                }),
            ),
            PatternValue::Named(path) => match &path.bindings.value_ns {
                ValueBinding::EnumVariant(ip, _) => {
                    let ip = ip.clone();
                    let krate = self.krate;
                    let generics_len = match krate.item_at(&ip).map(|e| &e.item) {
                        Some(Item::Enum(def)) => def.generics.types.len(),
                        _ => 0,
                    };
                    self.nominal_args_for(span, &ip, generics_len, ty)?;
                    Ok(())
                }
                ValueBinding::Constant(ip) => {
                    let krate = self.krate;
                    if let Some(Item::Const(c)) = krate.item_at(ip).map(|e| &e.item) {
                        let cty = c.ty.clone();
                        self.equate(span, ty, &cty)?;
                    }
                    Ok(())
                }
                ValueBinding::Static(ip) => {
                    let krate = self.krate;
                    if let Some(Item::Static(s)) = krate.item_at(ip).map(|e| &e.item) {
                        let sty = s.ty.clone();
                        self.equate(span, ty, &sty)?;
                    }
                    Ok(())
                }
                ValueBinding::Struct(ip) => {
                    let ip = ip.clone();
                    let krate = self.krate;
                    let generics_len = match krate.item_at(&ip).map(|e| &e.item) {
                        Some(Item::Struct(def)) => def.generics.types.len(),
                        _ => 0,
                    };
                    self.nominal_args_for(span, &ip, generics_len, ty)?;
                    Ok(())
                }
                _ => Ok(()),
            },
        }
    }
}
